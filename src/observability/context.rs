//! Thread-local context tracking for diagnostics.
//!
//! Records which analysis phase the current thread is working on. Fatal
//! errors capture the phase so a divergence report says where it happened.
//! Guards restore the previous phase on drop, so phases nest.

use serde::Serialize;
use std::cell::Cell;

thread_local! {
    static CURRENT_PHASE: Cell<Option<AnalysisPhase>> = const { Cell::new(None) };
}

/// Phases of one analysis run, in pipeline order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum AnalysisPhase {
    /// Normalizing the collected module batches
    Normalization,
    /// Merging module batches into the symbol table
    Aggregation,
    /// Resolving call sites into call graph edges
    CallGraphBuilding,
    /// Collapsing access records into local directions
    AccessCollection,
    /// Fixed-point direction propagation
    Propagation,
    /// Building the read-only oracle
    Finalization,
}

impl std::fmt::Display for AnalysisPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Normalization => write!(f, "normalization"),
            Self::Aggregation => write!(f, "aggregation"),
            Self::CallGraphBuilding => write!(f, "call_graph_building"),
            Self::AccessCollection => write!(f, "access_collection"),
            Self::Propagation => write!(f, "propagation"),
            Self::Finalization => write!(f, "finalization"),
        }
    }
}

/// RAII guard restoring the previous phase on drop.
pub struct ContextGuard {
    previous: Option<AnalysisPhase>,
}

impl Drop for ContextGuard {
    fn drop(&mut self) {
        CURRENT_PHASE.with(|phase| phase.set(self.previous));
    }
}

/// Set the current analysis phase.
///
/// Returns a guard that restores the previous phase on drop.
#[must_use]
pub fn set_phase(phase: AnalysisPhase) -> ContextGuard {
    CURRENT_PHASE.with(|current| ContextGuard {
        previous: current.replace(Some(phase)),
    })
}

#[must_use]
pub fn current_phase() -> Option<AnalysisPhase> {
    CURRENT_PHASE.with(Cell::get)
}
