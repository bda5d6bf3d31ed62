//! Observability for analysis runs.
//!
//! - **Context tracking**: thread-local analysis phase, captured by fatal
//!   errors.
//! - **Tracing**: each pipeline phase runs inside a `tracing` span; hosts
//!   (and tests) can install a subscriber with [`init_tracing`].
//!
//! ```ignore
//! use dirmap::observability::{set_phase, AnalysisPhase};
//!
//! let _phase = set_phase(AnalysisPhase::Propagation);
//! // a divergence raised here reports `Propagation`
//! ```

pub mod context;

pub use context::{current_phase, set_phase, AnalysisPhase, ContextGuard};

use tracing_subscriber::EnvFilter;

/// Install a global `tracing` subscriber filtered by `RUST_LOG`, or by
/// `default_filter` when the variable is unset.
///
/// Returns `false` if a global subscriber was already installed.
pub fn init_tracing(default_filter: &str) -> bool {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_test_writer()
        .try_init()
        .is_ok()
}
