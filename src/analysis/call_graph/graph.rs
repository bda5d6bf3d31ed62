//! Call graph storage and basic queries

use crate::core::{CallSiteId, SymbolId};
use crate::errors::{AnalysisError, Result};
use im::{HashMap, HashSet, Vector};
use serde::Serialize;
use std::collections::BTreeSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CallType {
    Direct,
    FunctionPointer,
    Virtual,
}

/// One resolved (caller, callee) relation for a call site
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct CallEdge {
    pub caller: SymbolId,
    pub callee: SymbolId,
    pub call_type: CallType,
    pub site: CallSiteId,
    /// Call site that stored the callee's address into the called slot
    pub binding_site: Option<CallSiteId>,
    /// Size of the candidate set this edge was drawn from
    pub candidate_count: usize,
}

/// Directed graph of functions. Sealed once construction finishes.
#[derive(Debug, Clone, Default)]
pub struct CallGraph {
    functions: HashSet<SymbolId>,
    edges: Vector<CallEdge>,
    callee_index: HashMap<SymbolId, HashSet<SymbolId>>,
    caller_index: HashMap<SymbolId, HashSet<SymbolId>>,
    site_index: HashMap<CallSiteId, Vector<usize>>,
    unresolved_callers: HashSet<SymbolId>,
    sealed: bool,
}

impl CallGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_function(&mut self, id: SymbolId) -> Result<()> {
        self.ensure_open("add_function")?;
        self.functions.insert(id);
        Ok(())
    }

    pub fn add_call(&mut self, edge: CallEdge) -> Result<()> {
        self.ensure_open("add_call")?;
        self.functions.insert(edge.caller);
        self.functions.insert(edge.callee);
        self.callee_index
            .entry(edge.caller)
            .or_default()
            .insert(edge.callee);
        self.caller_index
            .entry(edge.callee)
            .or_default()
            .insert(edge.caller);
        self.site_index
            .entry(edge.site)
            .or_default()
            .push_back(self.edges.len());
        self.edges.push_back(edge);
        Ok(())
    }

    /// Remember that `caller` contains a call site that could not be resolved
    pub fn flag_unresolved(&mut self, caller: SymbolId) -> Result<()> {
        self.ensure_open("flag_unresolved")?;
        self.unresolved_callers.insert(caller);
        Ok(())
    }

    pub fn seal(&mut self) {
        self.sealed = true;
    }

    pub fn is_sealed(&self) -> bool {
        self.sealed
    }

    fn ensure_open(&self, operation: &str) -> Result<()> {
        if self.sealed {
            return Err(AnalysisError::finalized(format!(
                "{} on a sealed call graph",
                operation
            )));
        }
        Ok(())
    }

    /// Direct callees, sorted by id
    pub fn get_callees(&self, id: SymbolId) -> Vec<SymbolId> {
        sorted(self.callee_index.get(&id))
    }

    /// Direct callers, sorted by id
    pub fn get_callers(&self, id: SymbolId) -> Vec<SymbolId> {
        sorted(self.caller_index.get(&id))
    }

    pub fn callees_iter(&self, id: SymbolId) -> impl Iterator<Item = SymbolId> + '_ {
        self.callee_index
            .get(&id)
            .into_iter()
            .flat_map(|set| set.iter().copied())
    }

    pub fn callers_iter(&self, id: SymbolId) -> impl Iterator<Item = SymbolId> + '_ {
        self.caller_index
            .get(&id)
            .into_iter()
            .flat_map(|set| set.iter().copied())
    }

    pub fn edges(&self) -> impl Iterator<Item = &CallEdge> {
        self.edges.iter()
    }

    /// Edges created for one call site, in insertion order
    pub fn edges_from_site(&self, site: CallSiteId) -> Vec<&CallEdge> {
        self.site_index
            .get(&site)
            .map(|indices| indices.iter().map(|&i| &self.edges[i]).collect())
            .unwrap_or_default()
    }

    /// Number of distinct (caller, callee) pairs
    pub fn edge_count(&self) -> usize {
        self.callee_index.values().map(|set| set.len()).sum()
    }

    pub fn function_count(&self) -> usize {
        self.functions.len()
    }

    /// All functions, sorted by id
    pub fn functions(&self) -> Vec<SymbolId> {
        let mut functions: Vec<_> = self.functions.iter().copied().collect();
        functions.sort_unstable();
        functions
    }

    pub fn contains(&self, id: SymbolId) -> bool {
        self.functions.contains(&id)
    }

    pub fn has_unresolved_calls(&self, id: SymbolId) -> bool {
        self.unresolved_callers.contains(&id)
    }

    /// Functions reachable from `id` through one or more calls
    pub fn get_transitive_callees(&self, id: SymbolId, max_depth: usize) -> BTreeSet<SymbolId> {
        let mut result = BTreeSet::new();
        let mut frontier = vec![id];
        for _ in 0..max_depth {
            let mut next = Vec::new();
            for current in frontier {
                for callee in self.callees_iter(current) {
                    if result.insert(callee) {
                        next.push(callee);
                    }
                }
            }
            if next.is_empty() {
                break;
            }
            frontier = next;
        }
        result
    }
}

fn sorted(set: Option<&HashSet<SymbolId>>) -> Vec<SymbolId> {
    let mut ids: Vec<_> = set
        .map(|s| s.iter().copied().collect())
        .unwrap_or_default();
    ids.sort_unstable();
    ids
}
