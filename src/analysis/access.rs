//! Access collection: body-level global reads and writes per function.
//!
//! Each access fact becomes one [`AccessRecord`] carrying the fact's own mode,
//! whether the global was touched directly or through a pointer. Records collapse to
//! one effective label per (function, global) pair, a local label per
//! function and a final label per global.

use crate::analysis::aggregation::Program;
use crate::analysis::call_graph::NameResolver;
use crate::core::{AccessFact, AccessMode, AccessPath, DirectionLabel, SymbolId};
use serde::Serialize;
use std::collections::BTreeMap;

/// One resolved access of `global` by `function`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct AccessRecord {
    pub function: SymbolId,
    pub global: SymbolId,
    pub mode: AccessMode,
}

/// An access fact that could not be tied to a known function and global
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub struct UnresolvedAccess {
    pub module: String,
    pub function: String,
    pub global: String,
}

/// Collapsed access information, indexed by [`SymbolId`]
#[derive(Debug, Clone, Default)]
pub struct LocalDirections {
    /// Join of each function's own records; `Unknown` for globals
    local: Vec<DirectionLabel>,
    /// Join over all records against each global; `Unknown` for functions
    global: Vec<DirectionLabel>,
    /// Effective label per (function, global) pair
    effective: BTreeMap<(SymbolId, SymbolId), DirectionLabel>,
    unresolved: Vec<UnresolvedAccess>,
}

impl LocalDirections {
    /// Empty directions for a table of `symbol_count` symbols
    pub fn new(symbol_count: usize) -> Self {
        Self {
            local: vec![DirectionLabel::Unknown; symbol_count],
            global: vec![DirectionLabel::Unknown; symbol_count],
            effective: BTreeMap::new(),
            unresolved: Vec::new(),
        }
    }

    pub fn record(&mut self, record: AccessRecord) {
        let label = DirectionLabel::from_mode(record.mode);
        let local = &mut self.local[record.function.index()];
        *local = local.join(label);
        let global = &mut self.global[record.global.index()];
        *global = global.join(label);
        let pair = self
            .effective
            .entry((record.function, record.global))
            .or_default();
        *pair = pair.join(label);
    }

    pub fn local(&self, function: SymbolId) -> DirectionLabel {
        self.local
            .get(function.index())
            .copied()
            .unwrap_or_default()
    }

    pub fn global(&self, global: SymbolId) -> DirectionLabel {
        self.global.get(global.index()).copied().unwrap_or_default()
    }

    pub fn effective(&self, function: SymbolId, global: SymbolId) -> DirectionLabel {
        self.effective
            .get(&(function, global))
            .copied()
            .unwrap_or_default()
    }

    /// Functions touching `global` directly, with their effective label
    pub fn accessors_of(&self, global: SymbolId) -> Vec<(SymbolId, DirectionLabel)> {
        self.effective
            .iter()
            .filter(|((_, g), _)| *g == global)
            .map(|(&(f, _), &label)| (f, label))
            .collect()
    }

    pub fn unresolved(&self) -> &[UnresolvedAccess] {
        &self.unresolved
    }

    pub fn symbol_count(&self) -> usize {
        self.local.len()
    }
}

/// Turns access facts into records against symbol ids
pub struct AccessCollector<'a> {
    program: &'a Program,
    resolver: NameResolver<'a>,
}

impl<'a> AccessCollector<'a> {
    pub fn new(program: &'a Program, scoped_lookup: bool) -> Self {
        Self {
            program,
            resolver: NameResolver::new(&program.symbols, scoped_lookup),
        }
    }

    pub fn collect(&self) -> LocalDirections {
        let mut directions = LocalDirections::new(self.program.symbols.len());

        for (module, fact) in &self.program.accesses {
            match self.record_for(fact) {
                Some(record) => directions.record(record),
                None => {
                    log::warn!(
                        "Skipping access of `{}` by `{}` in {}: unknown function or global",
                        fact.global,
                        fact.function,
                        module
                    );
                    directions.unresolved.push(UnresolvedAccess {
                        module: module.clone(),
                        function: fact.function.to_string(),
                        global: fact.global.clone(),
                    });
                }
            }
        }

        directions.unresolved.sort();
        log::debug!(
            "Collected {} (function, global) access pairs, {} unresolved accesses",
            directions.effective.len(),
            directions.unresolved.len()
        );
        directions
    }

    /// Record for one fact, or `None` when it cannot be resolved.
    ///
    /// A pointer-mediated access keeps its observed mode: a read through a
    /// non-const pointer is still only a read.
    pub fn record_for(&self, fact: &AccessFact) -> Option<AccessRecord> {
        let function = self
            .program
            .symbols
            .lookup_function(fact.function.as_str())?;
        let global = self
            .resolver
            .resolve_global(&fact.global, self.program.scope_of(function))?;

        if let AccessPath::Pointer { is_const } = fact.via {
            log::trace!(
                "{:?} of `{}` by `{}` through a {} pointer",
                fact.mode,
                fact.global,
                fact.function,
                if is_const { "const" } else { "non-const" }
            );
        }
        Some(AccessRecord {
            function,
            global,
            mode: fact.mode,
        })
    }
}
