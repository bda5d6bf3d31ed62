//! Serialized merge of module batches into one program view.
//!
//! Symbols from every module are declared first so that call sites and
//! accesses can refer across modules. Call sites receive program-wide
//! [`CallSiteId`]s in (module name, local id) order, which keeps ids stable
//! regardless of the order in which batches arrived.

use crate::core::{
    AccessFact, CallSiteId, CallTarget, ClosedFacts, Implements, Instantiation, QualifiedName,
    SlotBinding, SymbolId, SymbolTable,
};
use crate::errors::{AnalysisError, Result};
use serde::Serialize;
use std::collections::HashMap;

/// A syntactic call inside a function body
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CallSite {
    pub id: CallSiteId,
    pub module: String,
    /// Identity inside the originating module batch
    pub local_id: u32,
    /// Enclosing function
    pub caller: SymbolId,
    pub target: CallTarget,
}

/// A binding fact together with its program-wide binding site
#[derive(Debug, Clone)]
pub struct ProgramBinding {
    pub module: String,
    pub binding: SlotBinding,
    pub site: Option<CallSiteId>,
}

/// Everything the analysis phases need, merged across modules
#[derive(Debug, Clone, Default)]
pub struct Program {
    pub symbols: SymbolTable,
    pub call_sites: Vec<CallSite>,
    pub accesses: Vec<(String, AccessFact)>,
    pub bindings: Vec<ProgramBinding>,
    pub implements: Vec<Implements>,
    pub instantiations: Vec<Instantiation>,
}

impl Program {
    /// Merge closed module batches. This phase owns the symbol table
    /// exclusively and is never parallelized.
    pub fn aggregate(facts: ClosedFacts) -> Result<Self> {
        let mut program = Program::default();

        for module in &facts.modules {
            for decl in &module.symbols {
                program.symbols.declare(
                    decl.name.clone(),
                    decl.kind,
                    &module.module,
                    decl.signature.clone(),
                    decl.type_name.clone(),
                )?;
            }
        }

        let mut site_ids: HashMap<(String, u32), CallSiteId> = HashMap::new();
        for module in &facts.modules {
            for fact in &module.call_sites {
                let caller = program
                    .symbols
                    .lookup_function(fact.caller.as_str())
                    .ok_or_else(|| {
                        AnalysisError::invalid_fact(
                            &module.module,
                            format!(
                                "call site {} is inside undeclared function `{}`",
                                fact.id, fact.caller
                            ),
                        )
                    })?;
                let id = CallSiteId(program.call_sites.len() as u32);
                site_ids.insert((module.module.clone(), fact.id), id);
                program.call_sites.push(CallSite {
                    id,
                    module: module.module.clone(),
                    local_id: fact.id,
                    caller,
                    target: fact.target.clone(),
                });
            }
        }

        for module in facts.modules {
            for access in module.accesses {
                program.accesses.push((module.module.clone(), access));
            }
            for binding in module.bindings {
                let site = binding
                    .site
                    .and_then(|local| site_ids.get(&(module.module.clone(), local)).copied());
                if binding.site.is_some() && site.is_none() {
                    log::warn!(
                        "Binding into {} in {} names unknown call site {:?}",
                        binding.slot,
                        module.module,
                        binding.site
                    );
                }
                program.bindings.push(ProgramBinding {
                    module: module.module.clone(),
                    binding,
                    site,
                });
            }
            program.implements.extend(module.implements);
            program.instantiations.extend(module.instantiations);
        }

        log::debug!(
            "Aggregated {} symbols, {} call sites, {} accesses",
            program.symbols.len(),
            program.call_sites.len(),
            program.accesses.len()
        );
        Ok(program)
    }

    pub fn call_site(&self, id: CallSiteId) -> &CallSite {
        &self.call_sites[id.0 as usize]
    }

    /// Scope that names written inside `function` are resolved against
    pub fn scope_of(&self, function: SymbolId) -> &str {
        self.symbols.get(function).name.scope()
    }

    pub fn name_of(&self, id: SymbolId) -> &QualifiedName {
        &self.symbols.get(id).name
    }
}
