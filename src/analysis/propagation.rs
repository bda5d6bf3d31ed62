//! Fixed-point direction propagation over the call graph.
//!
//! Every function's label is the join of its local direction and the labels
//! of all its callees. The worklist starts with callees before callers
//! (reverse topological order of strongly connected components) and a
//! function is revisited only when one of its callees increased. Weakly
//! connected components share no edges, so they can be solved independently.

use crate::analysis::access::LocalDirections;
use crate::analysis::call_graph::CallGraph;
use crate::config::{AnalysisSettings, ParallelConfig};
use crate::core::{DirectionLabel, SymbolId};
use crate::errors::{AnalysisError, Result};
use crate::observability::{set_phase, AnalysisPhase};
use petgraph::algo::tarjan_scc;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::unionfind::UnionFind;
use rayon::prelude::*;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};

/// Counters describing one propagation run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PropagationStats {
    /// Worklist items processed
    pub iterations: usize,
    /// Label increases
    pub relaxations: usize,
    /// Weakly connected components solved
    pub components: usize,
    /// Distinct caller/callee pairs
    pub edges: usize,
}

/// Converged labels, indexed by [`SymbolId`]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Propagation {
    pub labels: Vec<DirectionLabel>,
    pub stats: PropagationStats,
}

struct ComponentSolution {
    labels: Vec<(SymbolId, DirectionLabel)>,
    iterations: usize,
    relaxations: usize,
}

pub struct DirectionPropagator<'a> {
    graph: &'a CallGraph,
    settings: &'a AnalysisSettings,
    parallel: &'a ParallelConfig,
}

impl<'a> DirectionPropagator<'a> {
    pub fn new(
        graph: &'a CallGraph,
        settings: &'a AnalysisSettings,
        parallel: &'a ParallelConfig,
    ) -> Self {
        Self {
            graph,
            settings,
            parallel,
        }
    }

    /// Propagate starting from every function's local direction
    pub fn propagate(&self, locals: &LocalDirections) -> Result<Propagation> {
        let initial = (0..locals.symbol_count())
            .map(|i| locals.local(SymbolId(i as u32)))
            .collect();
        self.run(locals, initial)
    }

    /// Propagate starting from previously computed labels.
    ///
    /// On converged labels this performs no relaxation.
    pub fn resume(
        &self,
        locals: &LocalDirections,
        labels: Vec<DirectionLabel>,
    ) -> Result<Propagation> {
        if labels.len() != locals.symbol_count() {
            return Err(AnalysisError::divergence(format!(
                "resumed with {} labels for {} symbols",
                labels.len(),
                locals.symbol_count()
            )));
        }
        let initial = labels
            .into_iter()
            .enumerate()
            .map(|(i, label)| label.join(locals.local(SymbolId(i as u32))))
            .collect();
        self.run(locals, initial)
    }

    fn run(
        &self,
        locals: &LocalDirections,
        mut labels: Vec<DirectionLabel>,
    ) -> Result<Propagation> {
        let order = self.seed_order();
        let components = if self.parallel.enabled {
            self.components(&order)
        } else {
            vec![order]
        };

        let solve = |members: &Vec<SymbolId>| self.solve_component(members, locals, &labels);
        let solutions = if self.parallel.enabled && components.len() > 1 {
            log::debug!(
                "Solving {} components on up to {} threads",
                components.len(),
                self.parallel.effective_concurrency()
            );
            self.parallel
                .install(|| components.par_iter().map(solve).collect::<Result<Vec<_>>>())?
        } else {
            components.iter().map(solve).collect::<Result<Vec<_>>>()?
        };

        let mut stats = PropagationStats {
            components: components.len(),
            edges: self.graph.edge_count(),
            ..PropagationStats::default()
        };
        for solution in solutions {
            stats.iterations += solution.iterations;
            stats.relaxations += solution.relaxations;
            for (function, label) in solution.labels {
                labels[function.index()] = label;
            }
        }

        let budget = self.settings.relaxation_budget(stats.edges);
        if stats.relaxations > budget {
            return Err(AnalysisError::divergence(format!(
                "{} relaxations exceed the budget of {}",
                stats.relaxations, budget
            )));
        }

        log::debug!(
            "Propagation converged: {} iterations, {} relaxations over {} edges in {} component(s)",
            stats.iterations,
            stats.relaxations,
            stats.edges,
            stats.components
        );
        Ok(Propagation { labels, stats })
    }

    /// Functions ordered callees-first by strongly connected component
    fn seed_order(&self) -> Vec<SymbolId> {
        let (graph, _) = build_petgraph(self.graph);
        tarjan_scc(&graph)
            .into_iter()
            .flatten()
            .map(|node| graph[node])
            .collect()
    }

    /// Split `order` into weakly connected components, keeping seed order
    fn components(&self, order: &[SymbolId]) -> Vec<Vec<SymbolId>> {
        let position: HashMap<SymbolId, usize> =
            order.iter().enumerate().map(|(i, &f)| (f, i)).collect();
        let mut sets = UnionFind::<usize>::new(order.len());
        for edge in self.graph.edges() {
            if let (Some(&a), Some(&b)) = (position.get(&edge.caller), position.get(&edge.callee)) {
                sets.union(a, b);
            }
        }

        let mut grouped: BTreeMap<usize, Vec<SymbolId>> = BTreeMap::new();
        for (i, &function) in order.iter().enumerate() {
            grouped.entry(sets.find(i)).or_default().push(function);
        }
        grouped.into_values().collect()
    }

    fn solve_component(
        &self,
        members: &[SymbolId],
        locals: &LocalDirections,
        initial: &[DirectionLabel],
    ) -> Result<ComponentSolution> {
        let _phase = set_phase(AnalysisPhase::Propagation);

        let edges: usize = members
            .iter()
            .map(|&f| self.graph.callees_iter(f).count())
            .sum();
        let budget = self.settings.relaxation_budget(edges);

        let mut current: HashMap<SymbolId, DirectionLabel> = members
            .iter()
            .map(|&f| (f, initial[f.index()]))
            .collect();
        let mut queue: VecDeque<SymbolId> = members.iter().copied().collect();
        let mut queued: HashSet<SymbolId> = members.iter().copied().collect();
        let mut iterations = 0;
        let mut relaxations = 0;

        while let Some(function) = queue.pop_front() {
            queued.remove(&function);
            iterations += 1;

            let old = current.get(&function).copied().unwrap_or_default();
            let callees = self.graph.callees_iter(function).map(|callee| {
                current
                    .get(&callee)
                    .copied()
                    .unwrap_or_else(|| initial[callee.index()])
            });
            let new =
                DirectionLabel::join_all(std::iter::once(locals.local(function)).chain(callees));

            if new == old {
                continue;
            }
            if !old.leq(new) {
                return Err(AnalysisError::divergence(format!(
                    "label of {:?} would move from {} to {}",
                    function, old, new
                )));
            }
            relaxations += 1;
            if relaxations > budget {
                return Err(AnalysisError::divergence(format!(
                    "{} relaxations exceed the budget of {} for a component of {} functions",
                    relaxations,
                    budget,
                    members.len()
                )));
            }

            current.insert(function, new);
            for caller in self.graph.callers_iter(function) {
                if queued.insert(caller) {
                    queue.push_back(caller);
                }
            }
        }

        let mut labels: Vec<_> = current.into_iter().collect();
        labels.sort_unstable_by_key(|(f, _)| *f);
        Ok(ComponentSolution {
            labels,
            iterations,
            relaxations,
        })
    }
}

/// Build a petgraph DiGraph from our CallGraph for SCC ordering
fn build_petgraph(call_graph: &CallGraph) -> (DiGraph<SymbolId, ()>, HashMap<SymbolId, NodeIndex>) {
    let mut graph = DiGraph::new();
    let mut node_map = HashMap::new();

    for function in call_graph.functions() {
        let node = graph.add_node(function);
        node_map.insert(function, node);
    }
    for caller in call_graph.functions() {
        for callee in call_graph.get_callees(caller) {
            if let (Some(&from), Some(&to)) = (node_map.get(&caller), node_map.get(&callee)) {
                graph.add_edge(from, to, ());
            }
        }
    }

    (graph, node_map)
}
