//! Whole-program analysis: call graph construction and direction inference.

pub mod access;
pub mod aggregation;
pub mod call_graph;
pub mod oracle;
pub mod pipeline;
pub mod propagation;

pub use access::{AccessCollector, AccessRecord, LocalDirections, UnresolvedAccess};
pub use aggregation::{CallSite, Program, ProgramBinding};
pub use call_graph::{
    CallEdge, CallGraph, CallGraphBuild, CallGraphBuilder, CallType, ModuleSummary,
};
pub use oracle::{
    Classification, ClassificationReport, ClassificationResult, DirectionCounts, DirectionOracle,
};
pub use pipeline::{analyze, AnalysisSession};
pub use propagation::{DirectionPropagator, Propagation, PropagationStats};
