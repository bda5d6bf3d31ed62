//! Read-only query surface over a finished analysis run.
//!
//! The oracle owns the sealed call graph and the total classification. It is
//! shared behind an `Arc` and never mutated, so any number of readers can
//! query it concurrently.

use crate::analysis::access::{LocalDirections, UnresolvedAccess};
use crate::analysis::aggregation::{CallSite, Program};
use crate::analysis::call_graph::{
    summarize_modules, CallGraph, CallGraphBuild, FunctionPointerStatistics, ModuleSummary,
};
use crate::analysis::propagation::{Propagation, PropagationStats};
use crate::core::{
    CallSiteId, DirectionLabel, QualifiedName, Signature, Symbol, SymbolId, SymbolKind,
    SymbolTable,
};
use crate::errors::{AnalysisError, Diagnostic, Result};
use serde::Serialize;
use std::collections::BTreeSet;

/// Final label of one symbol
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Classification {
    pub symbol: SymbolId,
    pub name: QualifiedName,
    pub kind: SymbolKind,
    pub direction: DirectionLabel,
}

/// Total mapping from symbol to direction, one entry per symbol
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ClassificationResult {
    entries: Vec<Classification>,
}

impl ClassificationResult {
    fn new(symbols: &SymbolTable, propagation: &Propagation, locals: &LocalDirections) -> Self {
        let entries = symbols
            .iter()
            .map(|symbol| {
                let direction = match symbol.kind {
                    SymbolKind::Function => propagation
                        .labels
                        .get(symbol.id.index())
                        .copied()
                        .unwrap_or_default(),
                    SymbolKind::Global => locals.global(symbol.id),
                };
                Classification {
                    symbol: symbol.id,
                    name: symbol.name.clone(),
                    kind: symbol.kind,
                    direction,
                }
            })
            .collect();
        Self { entries }
    }

    pub fn get(&self, id: SymbolId) -> DirectionLabel {
        self.entries
            .get(id.index())
            .map(|entry| entry.direction)
            .unwrap_or_default()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Classification> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Number of symbols per label
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DirectionCounts {
    pub unknown: usize,
    pub input: usize,
    pub output: usize,
    pub in_out: usize,
}

impl DirectionCounts {
    fn add(&mut self, label: DirectionLabel) {
        match label {
            DirectionLabel::Unknown => self.unknown += 1,
            DirectionLabel::In => self.input += 1,
            DirectionLabel::Out => self.output += 1,
            DirectionLabel::InOut => self.in_out += 1,
        }
    }

    pub fn total(&self) -> usize {
        self.unknown + self.input + self.output + self.in_out
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FunctionReport {
    pub name: String,
    pub module: String,
    pub signature: Option<Signature>,
    pub direction: DirectionLabel,
    /// Direction from the function's own accesses only
    pub local_direction: DirectionLabel,
    pub callees: Vec<String>,
    pub callers: Vec<String>,
    pub has_unresolved_calls: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AccessorReport {
    pub function: String,
    pub direction: DirectionLabel,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GlobalReport {
    pub name: String,
    pub module: String,
    pub type_name: Option<String>,
    pub direction: DirectionLabel,
    pub accessors: Vec<AccessorReport>,
}

/// Everything a reporting layer needs, ready to serialize
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ClassificationReport {
    pub functions: Vec<FunctionReport>,
    pub globals: Vec<GlobalReport>,
    pub modules: Vec<ModuleSummary>,
    pub unresolved: Vec<Diagnostic>,
    pub unresolved_accesses: Vec<UnresolvedAccess>,
    pub stats: PropagationStats,
}

#[derive(Debug, Clone)]
pub struct DirectionOracle {
    symbols: SymbolTable,
    call_sites: Vec<CallSite>,
    graph: CallGraph,
    locals: LocalDirections,
    classification: ClassificationResult,
    diagnostics: Vec<Diagnostic>,
    modules: Vec<ModuleSummary>,
    stats: PropagationStats,
    pointer_statistics: FunctionPointerStatistics,
}

impl DirectionOracle {
    /// Freeze the results of one run
    pub fn finalize(
        program: Program,
        build: CallGraphBuild,
        locals: LocalDirections,
        propagation: Propagation,
    ) -> Self {
        let classification = ClassificationResult::new(&program.symbols, &propagation, &locals);
        let modules = summarize_modules(&program.symbols, &build.graph);
        let mut diagnostics = build.diagnostics;
        diagnostics.sort_by_key(|d| d.site);

        Self {
            symbols: program.symbols,
            call_sites: program.call_sites,
            graph: build.graph,
            locals,
            classification,
            diagnostics,
            modules,
            stats: propagation.stats,
            pointer_statistics: build.pointer_statistics,
        }
    }

    fn symbol_id(&self, name: &str) -> Result<SymbolId> {
        self.symbols
            .lookup(name)
            .ok_or_else(|| AnalysisError::unresolved(name, "oracle query"))
    }

    fn function_id(&self, name: &str) -> Result<SymbolId> {
        self.symbols
            .lookup_function(name)
            .ok_or_else(|| AnalysisError::unresolved(name, "oracle function query"))
    }

    /// Final direction of the symbol with qualified name `name`
    pub fn classify(&self, name: &str) -> Result<DirectionLabel> {
        Ok(self.classify_id(self.symbol_id(name)?))
    }

    pub fn classify_id(&self, id: SymbolId) -> DirectionLabel {
        self.classification.get(id)
    }

    /// Functions `name` may call, sorted by qualified name
    pub fn callees_of(&self, name: &str) -> Result<Vec<&Symbol>> {
        let id = self.function_id(name)?;
        Ok(self.sorted_symbols(self.graph.get_callees(id)))
    }

    /// Functions that may call `name`, sorted by qualified name
    pub fn callers_of(&self, name: &str) -> Result<Vec<&Symbol>> {
        let id = self.function_id(name)?;
        Ok(self.sorted_symbols(self.graph.get_callers(id)))
    }

    fn sorted_symbols(&self, ids: Vec<SymbolId>) -> Vec<&Symbol> {
        let mut symbols: Vec<_> = ids.into_iter().map(|id| self.symbols.get(id)).collect();
        symbols.sort_by(|a, b| a.name.cmp(&b.name));
        symbols
    }

    /// Call sites that produced no edge, sorted by site id
    pub fn unresolved_calls(&self) -> Vec<&CallSite> {
        let sites: BTreeSet<CallSiteId> = self.diagnostics.iter().map(|d| d.site).collect();
        sites
            .into_iter()
            .map(|site| &self.call_sites[site.0 as usize])
            .collect()
    }

    pub fn unresolved_diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    pub fn unresolved_accesses(&self) -> &[UnresolvedAccess] {
        self.locals.unresolved()
    }

    pub fn has_unresolved_calls(&self, name: &str) -> Result<bool> {
        let id = self.function_id(name)?;
        Ok(self.graph.has_unresolved_calls(id))
    }

    /// Functions touching `global` directly, with their effective direction
    pub fn global_accessors(&self, global: &str) -> Result<Vec<(&Symbol, DirectionLabel)>> {
        let id = self
            .symbols
            .lookup(global)
            .filter(|&id| self.symbols.get(id).is_global())
            .ok_or_else(|| AnalysisError::unresolved(global, "oracle global query"))?;
        let mut accessors: Vec<_> = self
            .locals
            .accessors_of(id)
            .into_iter()
            .map(|(function, label)| (self.symbols.get(function), label))
            .collect();
        accessors.sort_by(|a, b| a.0.name.cmp(&b.0.name));
        Ok(accessors)
    }

    pub fn module_summaries(&self) -> &[ModuleSummary] {
        &self.modules
    }

    pub fn direction_counts(&self, kind: SymbolKind) -> DirectionCounts {
        let mut counts = DirectionCounts::default();
        for entry in self.classification.iter().filter(|e| e.kind == kind) {
            counts.add(entry.direction);
        }
        counts
    }

    pub fn classification(&self) -> &ClassificationResult {
        &self.classification
    }

    pub fn call_graph(&self) -> &CallGraph {
        &self.graph
    }

    pub fn symbols(&self) -> &SymbolTable {
        &self.symbols
    }

    pub fn call_site(&self, id: CallSiteId) -> Option<&CallSite> {
        self.call_sites.get(id.0 as usize)
    }

    pub fn stats(&self) -> PropagationStats {
        self.stats
    }

    pub fn pointer_statistics(&self) -> &FunctionPointerStatistics {
        &self.pointer_statistics
    }

    /// Labels indexed by symbol id, as accepted by `DirectionPropagator::resume`
    pub fn labels(&self) -> Vec<DirectionLabel> {
        self.classification.iter().map(|e| e.direction).collect()
    }

    pub fn local_directions(&self) -> &LocalDirections {
        &self.locals
    }

    pub fn report(&self) -> ClassificationReport {
        let names = |ids: Vec<SymbolId>| -> Vec<String> {
            let mut names: Vec<_> = ids
                .into_iter()
                .map(|id| self.symbols.get(id).name.to_string())
                .collect();
            names.sort();
            names
        };

        let mut functions: Vec<_> = self
            .symbols
            .functions()
            .map(|f| FunctionReport {
                name: f.name.to_string(),
                module: f.module.clone(),
                signature: f.signature.clone(),
                direction: self.classify_id(f.id),
                local_direction: self.locals.local(f.id),
                callees: names(self.graph.get_callees(f.id)),
                callers: names(self.graph.get_callers(f.id)),
                has_unresolved_calls: self.graph.has_unresolved_calls(f.id),
            })
            .collect();
        functions.sort_by(|a, b| a.name.cmp(&b.name));

        let mut globals: Vec<_> = self
            .symbols
            .globals()
            .map(|g| {
                let mut accessors: Vec<_> = self
                    .locals
                    .accessors_of(g.id)
                    .into_iter()
                    .map(|(f, direction)| AccessorReport {
                        function: self.symbols.get(f).name.to_string(),
                        direction,
                    })
                    .collect();
                accessors.sort_by(|a, b| a.function.cmp(&b.function));
                GlobalReport {
                    name: g.name.to_string(),
                    module: g.module.clone(),
                    type_name: g.type_name.clone(),
                    direction: self.classify_id(g.id),
                    accessors,
                }
            })
            .collect();
        globals.sort_by(|a, b| a.name.cmp(&b.name));

        ClassificationReport {
            functions,
            globals,
            modules: self.modules.clone(),
            unresolved: self.diagnostics.clone(),
            unresolved_accesses: self.locals.unresolved().to_vec(),
            stats: self.stats,
        }
    }
}
