//! Cross-Module Dependency Summaries
//!
//! Lifts the function-level call graph to modules: for each module, which
//! other modules call into it and which it calls out to.

use super::graph::CallGraph;
use crate::core::SymbolTable;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};

/// Per-module view of symbols and call dependencies
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ModuleSummary {
    pub module: String,
    pub functions: Vec<String>,
    pub globals: Vec<String>,
    /// Other modules containing callers of this module's functions
    pub caller_modules: Vec<String>,
    /// Other modules containing callees of this module's functions
    pub callee_modules: Vec<String>,
}

#[derive(Default)]
struct ModuleAccumulator {
    functions: BTreeSet<String>,
    globals: BTreeSet<String>,
    caller_modules: BTreeSet<String>,
    callee_modules: BTreeSet<String>,
}

/// Summaries for every declaring module, sorted by module name
pub fn summarize_modules(symbols: &SymbolTable, graph: &CallGraph) -> Vec<ModuleSummary> {
    let mut modules: BTreeMap<&str, ModuleAccumulator> = BTreeMap::new();

    for symbol in symbols.iter() {
        let entry = modules.entry(symbol.module.as_str()).or_default();
        if symbol.is_function() {
            entry.functions.insert(symbol.name.to_string());
        } else {
            entry.globals.insert(symbol.name.to_string());
        }
    }

    for edge in graph.edges() {
        let caller_module = symbols.get(edge.caller).module.as_str();
        let callee_module = symbols.get(edge.callee).module.as_str();
        if caller_module == callee_module {
            continue;
        }
        modules
            .entry(caller_module)
            .or_default()
            .callee_modules
            .insert(callee_module.to_string());
        modules
            .entry(callee_module)
            .or_default()
            .caller_modules
            .insert(caller_module.to_string());
    }

    modules
        .into_iter()
        .map(|(module, acc)| ModuleSummary {
            module: module.to_string(),
            functions: acc.functions.into_iter().collect(),
            globals: acc.globals.into_iter().collect(),
            caller_modules: acc.caller_modules.into_iter().collect(),
            callee_modules: acc.callee_modules.into_iter().collect(),
        })
        .collect()
}
