// Export modules for library usage
pub mod analysis;
pub mod config;
pub mod core;
pub mod errors;
pub mod observability;

// Re-export commonly used types
pub use crate::analysis::{
    analyze, AnalysisSession, CallEdge, CallGraph, CallSite, CallType, ClassificationReport,
    ClassificationResult, DirectionOracle, ModuleSummary, PropagationStats,
};
pub use crate::config::{load_config, AnalysisSettings, DirmapConfig, ParallelConfig};
pub use crate::core::{
    AccessMode, CallSiteId, CallTarget, DirectionLabel, FactStream, ModuleFacts, QualifiedName,
    Signature, Symbol, SymbolId, SymbolKind, SymbolTable,
};
pub use crate::errors::{AnalysisError, Diagnostic, Result, UnresolvedReason};
