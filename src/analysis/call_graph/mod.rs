//! Call Graph Construction
//!
//! Resolves every aggregated call site into call graph edges:
//! 1. Direct calls through scoped qualified-name lookup
//! 2. Function-pointer calls through slot bindings
//! 3. Virtual calls through the dispatch registry
//!
//! Sites that cannot be resolved are recorded as [`Diagnostic`]s and their
//! caller is flagged; they never abort the build.

use crate::analysis::aggregation::{CallSite, Program};
use crate::config::AnalysisSettings;
use crate::core::{CallTarget, QualifiedName, Signature, Slot};
use crate::errors::{AnalysisError, Diagnostic, Result};

mod dispatch_registry;
mod function_pointer;
mod graph;
mod module_deps;
mod name_resolver;

pub use dispatch_registry::{DispatchRegistry, VirtualResolution};
pub use function_pointer::{
    FunctionPointerStatistics, FunctionPointerTracker, PointerResolution, PointerTarget,
};
pub use graph::{CallEdge, CallGraph, CallType};
pub use module_deps::{summarize_modules, ModuleSummary};
pub use name_resolver::NameResolver;

/// Sealed call graph plus everything recorded while building it
#[derive(Debug, Clone)]
pub struct CallGraphBuild {
    pub graph: CallGraph,
    /// Unresolved and ambiguous sites, sorted by site id
    pub diagnostics: Vec<Diagnostic>,
    pub pointer_statistics: FunctionPointerStatistics,
}

/// Builder for the program call graph
pub struct CallGraphBuilder<'a> {
    program: &'a Program,
    settings: &'a AnalysisSettings,
    resolver: NameResolver<'a>,
    pointers: FunctionPointerTracker,
    dispatch: DispatchRegistry,
}

impl<'a> CallGraphBuilder<'a> {
    pub fn new(program: &'a Program, settings: &'a AnalysisSettings) -> Self {
        let resolver = NameResolver::new(&program.symbols, settings.scoped_lookup);
        let pointers = FunctionPointerTracker::build(program, &resolver);
        let dispatch = DispatchRegistry::build(program);
        Self {
            program,
            settings,
            resolver,
            pointers,
            dispatch,
        }
    }

    pub fn build(self) -> Result<CallGraphBuild> {
        let mut graph = CallGraph::new();
        let mut diagnostics = Vec::new();

        for function in self.program.symbols.functions() {
            graph.add_function(function.id)?;
        }

        for site in &self.program.call_sites {
            match self.resolve_site(site) {
                Ok(edges) => {
                    log::trace!(
                        "Site {} in {} resolved to {} edge(s)",
                        site.id,
                        self.program.name_of(site.caller),
                        edges.len()
                    );
                    for edge in edges {
                        graph.add_call(edge)?;
                    }
                }
                Err(err) => {
                    let Some(diagnostic) = Diagnostic::from_error(site.id, &err) else {
                        return Err(err);
                    };
                    log::debug!("Recorded unresolved site {}: {}", site.id, err);
                    graph.flag_unresolved(site.caller)?;
                    diagnostics.push(diagnostic);
                }
            }
        }

        graph.seal();
        log::debug!(
            "Built call graph: {} functions, {} edges ({} distinct), {} unresolved sites",
            graph.function_count(),
            graph.edges().count(),
            graph.edge_count(),
            diagnostics.len()
        );

        Ok(CallGraphBuild {
            graph,
            diagnostics,
            pointer_statistics: self.pointers.get_statistics(),
        })
    }

    /// Resolve one site into its edges
    pub fn resolve_site(&self, site: &CallSite) -> Result<Vec<CallEdge>> {
        match &site.target {
            CallTarget::Direct { name } => self.resolve_direct(site, name),
            CallTarget::FunctionPointer { signature, slot } => {
                self.resolve_pointer(site, signature, slot)
            }
            CallTarget::Virtual {
                interface,
                method,
                exact_type,
            } => self.resolve_virtual(site, interface, method, exact_type.as_ref()),
        }
    }

    fn resolve_direct(&self, site: &CallSite, name: &str) -> Result<Vec<CallEdge>> {
        let scope = self.program.scope_of(site.caller);
        let callee = self
            .resolver
            .resolve_function(name, scope)
            .ok_or_else(|| AnalysisError::unresolved(name, self.caller_name(site)))?;
        Ok(vec![CallEdge {
            caller: site.caller,
            callee,
            call_type: CallType::Direct,
            site: site.id,
            binding_site: None,
            candidate_count: 1,
        }])
    }

    fn resolve_pointer(
        &self,
        site: &CallSite,
        signature: &Signature,
        slot: &Slot,
    ) -> Result<Vec<CallEdge>> {
        let resolution = self
            .pointers
            .resolve(slot, signature, &self.program.symbols);

        for rejected in &resolution.rejected {
            log::warn!(
                "Skipping `{}` for pointer call {} in {}: signature does not match {}",
                self.program.name_of(*rejected),
                site.id,
                self.caller_name(site),
                signature
            );
        }

        if resolution.is_empty() {
            return Err(AnalysisError::ambiguous(
                site.id,
                self.caller_name(site),
                site.target.kind_name(),
            ));
        }

        let bound = resolution.bound.iter().map(|target| CallEdge {
            caller: site.caller,
            callee: target.function,
            call_type: CallType::FunctionPointer,
            site: site.id,
            binding_site: target.binding_site,
            candidate_count: 1,
        });
        let fallback_count = resolution.fallback.len();
        let fallback = resolution.fallback.iter().map(|&callee| CallEdge {
            caller: site.caller,
            callee,
            call_type: CallType::FunctionPointer,
            site: site.id,
            binding_site: None,
            candidate_count: fallback_count,
        });
        Ok(bound.chain(fallback).collect())
    }

    fn resolve_virtual(
        &self,
        site: &CallSite,
        interface: &QualifiedName,
        method: &str,
        exact_type: Option<&QualifiedName>,
    ) -> Result<Vec<CallEdge>> {
        let resolution = self.dispatch.resolve(
            interface,
            method,
            exact_type,
            self.settings,
            &self.program.symbols,
        );
        if resolution.candidates.is_empty() {
            return Err(AnalysisError::ambiguous(
                site.id,
                self.caller_name(site),
                site.target.kind_name(),
            ));
        }

        let call_type = if resolution.monomorphic {
            CallType::Direct
        } else {
            CallType::Virtual
        };
        let count = resolution.candidates.len();
        Ok(resolution
            .candidates
            .into_iter()
            .map(|callee| CallEdge {
                caller: site.caller,
                callee,
                call_type,
                site: site.id,
                binding_site: None,
                candidate_count: count,
            })
            .collect())
    }

    fn caller_name(&self, site: &CallSite) -> String {
        self.program.name_of(site.caller).to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ParallelConfig;
    use crate::core::{
        BoundValue, CallSiteFact, FactStream, Implements, Instantiation, ModuleFacts,
        SlotBinding, SymbolDecl, SymbolKind,
    };
    use crate::errors::UnresolvedReason;

    fn function(name: &str, signature: Option<&str>) -> SymbolDecl {
        SymbolDecl {
            name: name.into(),
            kind: SymbolKind::Function,
            signature: signature.map(|s| Signature::parse(s).unwrap()),
            type_name: None,
        }
    }

    fn call(id: u32, caller: &str, target: CallTarget) -> CallSiteFact {
        CallSiteFact {
            id,
            caller: caller.into(),
            target,
        }
    }

    fn direct(name: &str) -> CallTarget {
        CallTarget::Direct { name: name.into() }
    }

    fn build(module: ModuleFacts) -> (Program, CallGraphBuild) {
        let mut stream = FactStream::new();
        stream.push(module).unwrap();
        let closed = stream.close(&ParallelConfig::sequential()).unwrap();
        let program = Program::aggregate(closed).unwrap();
        let settings = AnalysisSettings::default();
        let build = CallGraphBuilder::new(&program, &settings).build().unwrap();
        (program, build)
    }

    fn callee_names(program: &Program, graph: &CallGraph, caller: &str) -> Vec<String> {
        let id = program.symbols.lookup(caller).unwrap();
        let mut names: Vec<_> = graph
            .get_callees(id)
            .into_iter()
            .map(|c| program.name_of(c).to_string())
            .collect();
        names.sort();
        names
    }

    #[test]
    fn test_unresolved_direct_call_is_recorded_and_flagged() {
        let mut m = ModuleFacts::new("main");
        m.symbols.push(function("main", None));
        m.symbols.push(function("helper", None));
        m.call_sites.push(call(1, "main", direct("helper")));
        m.call_sites.push(call(2, "main", direct("missing")));

        let (program, build) = build(m);
        let main = program.symbols.lookup("main").unwrap();
        assert_eq!(callee_names(&program, &build.graph, "main"), vec!["helper"]);
        assert!(build.graph.has_unresolved_calls(main));
        assert_eq!(build.diagnostics.len(), 1);
        assert_eq!(
            build.diagnostics[0].reason,
            UnresolvedReason::UnresolvedSymbol
        );
        assert!(build.graph.is_sealed());
    }

    #[test]
    fn test_callback_edges_are_per_binding_site() {
        let mut m = ModuleFacts::new("callbacks");
        m.symbols.push(function("main", Some("int()")));
        m.symbols.push(function("add", Some("int(int,int)")));
        m.symbols.push(function("subtract", Some("int(int,int)")));
        m.symbols
            .push(function("applyWithCallback", Some("int(int,int,int(*)(int,int))")));
        m.call_sites.push(call(1, "main", direct("applyWithCallback")));
        m.call_sites.push(call(2, "main", direct("applyWithCallback")));
        let slot = Slot::Param {
            function: "applyWithCallback".into(),
            index: 2,
        };
        m.call_sites.push(call(
            3,
            "applyWithCallback",
            CallTarget::FunctionPointer {
                signature: Signature::parse("int(int,int)").unwrap(),
                slot: slot.clone(),
            },
        ));
        for (site, name) in [(1, "add"), (2, "subtract")] {
            m.bindings.push(SlotBinding {
                slot: slot.clone(),
                value: BoundValue::Function { name: name.into() },
                site: Some(site),
                in_function: Some("main".into()),
            });
        }

        let (program, build) = build(m);
        let pointer_edges = build.graph.edges_from_site(crate::core::CallSiteId(2));
        assert_eq!(pointer_edges.len(), 2);
        assert!(pointer_edges.iter().all(|e| e.candidate_count == 1));
        let mut by_binding: Vec<_> = pointer_edges
            .iter()
            .map(|e| (e.binding_site, program.name_of(e.callee).to_string()))
            .collect();
        by_binding.sort();
        assert_eq!(
            by_binding,
            vec![
                (Some(crate::core::CallSiteId(0)), "add".to_string()),
                (Some(crate::core::CallSiteId(1)), "subtract".to_string()),
            ]
        );
    }

    #[test]
    fn test_pointer_without_bindings_is_ambiguous() {
        let mut m = ModuleFacts::new("m");
        m.symbols.push(function("run", None));
        m.call_sites.push(call(
            1,
            "run",
            CallTarget::FunctionPointer {
                signature: Signature::parse("void()").unwrap(),
                slot: Slot::Variable {
                    name: "g_handler".into(),
                },
            },
        ));
        let (_, build) = build(m);
        assert_eq!(
            build.diagnostics[0].reason,
            UnresolvedReason::AmbiguousCandidateSet
        );
    }

    #[test]
    fn test_virtual_call_reaches_instantiated_implementors() {
        let mut m = ModuleFacts::new("polymorphism_tests");
        m.symbols.push(function("applyWithOperation", None));
        m.symbols.push(function("AddOperation::apply", None));
        m.symbols.push(function("MultiplyOperation::apply", None));
        for t in ["AddOperation", "MultiplyOperation"] {
            m.implements.push(Implements {
                type_name: t.into(),
                base: "Operation".into(),
            });
            m.instantiations.push(Instantiation {
                type_name: t.into(),
                site: None,
            });
        }
        m.call_sites.push(call(
            1,
            "applyWithOperation",
            CallTarget::Virtual {
                interface: "Operation".into(),
                method: "apply".into(),
                exact_type: None,
            },
        ));

        let (program, build) = build(m);
        assert_eq!(
            callee_names(&program, &build.graph, "applyWithOperation"),
            vec!["AddOperation::apply", "MultiplyOperation::apply"]
        );
        assert!(build
            .graph
            .edges()
            .all(|e| e.call_type == CallType::Virtual && e.candidate_count == 2));
    }
}
