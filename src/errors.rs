//! Error types for dirmap analysis runs.
//!
//! Two kinds of failure exist in an analysis run:
//!
//! - **Recorded** failures (`UnresolvedSymbol`, `AmbiguousCandidateSet`) are
//!   attached to a call site or fact as a [`Diagnostic`]. The run continues and
//!   the affected caller is flagged.
//! - **Fatal** failures (`AnalysisDivergence`, `ConflictingSymbol`,
//!   `AnalysisFinalized`, ...) abort the operation that raised them.
//!
//! # Example
//!
//! ```rust
//! use dirmap::errors::AnalysisError;
//!
//! let err = AnalysisError::unresolved("outer::missing", "outer::bar");
//! assert!(err.is_recoverable());
//! assert!(!AnalysisError::finalized("ingest").is_recoverable());
//! ```

use crate::core::CallSiteId;
use crate::observability::AnalysisPhase;
use serde::Serialize;
use thiserror::Error;

/// Main error type for dirmap operations
#[derive(Debug, Error)]
pub enum AnalysisError {
    /// A call site or access fact names a symbol absent from the table
    #[error("Unresolved symbol `{name}` referenced from `{referenced_from}`")]
    UnresolvedSymbol {
        name: String,
        referenced_from: String,
    },

    /// An indirect or virtual call site produced no plausible candidate
    #[error("No candidates for {kind} call site {site} in `{caller}`")]
    AmbiguousCandidateSet {
        site: CallSiteId,
        caller: String,
        kind: &'static str,
    },

    /// Mutation attempted after the run converged
    #[error("Analysis already finalized: cannot {operation}")]
    AnalysisFinalized { operation: String },

    /// Propagation violated the lattice or the relaxation budget
    #[error("Analysis diverged during {phase:?}: {message}")]
    AnalysisDivergence {
        phase: Option<AnalysisPhase>,
        message: String,
    },

    /// Same qualified name declared with two different kinds
    #[error("Conflicting declarations for `{name}`: {first} vs {second}")]
    ConflictingSymbol {
        name: String,
        first: &'static str,
        second: &'static str,
    },

    /// Malformed fact in the input stream
    #[error("Invalid fact in module `{module}`: {message}")]
    InvalidFact { module: String, message: String },

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// IO errors
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// JSON errors
    #[error(transparent)]
    Json(#[from] serde_json::Error),

    /// TOML errors
    #[error(transparent)]
    Toml(#[from] toml::de::Error),
}

impl AnalysisError {
    pub fn unresolved(name: impl Into<String>, referenced_from: impl Into<String>) -> Self {
        Self::UnresolvedSymbol {
            name: name.into(),
            referenced_from: referenced_from.into(),
        }
    }

    pub fn ambiguous(site: CallSiteId, caller: impl Into<String>, kind: &'static str) -> Self {
        Self::AmbiguousCandidateSet {
            site,
            caller: caller.into(),
            kind,
        }
    }

    pub fn finalized(operation: impl Into<String>) -> Self {
        Self::AnalysisFinalized {
            operation: operation.into(),
        }
    }

    /// Create a divergence error tagged with the current analysis phase
    pub fn divergence(message: impl Into<String>) -> Self {
        Self::AnalysisDivergence {
            phase: crate::observability::current_phase(),
            message: message.into(),
        }
    }

    pub fn invalid_fact(module: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidFact {
            module: module.into(),
            message: message.into(),
        }
    }

    /// Whether the run can continue after this error (it is only recorded)
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::UnresolvedSymbol { .. } | Self::AmbiguousCandidateSet { .. }
        )
    }
}

/// Result type alias using our error type
pub type Result<T> = std::result::Result<T, AnalysisError>;

/// Why a call site could not contribute edges
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum UnresolvedReason {
    /// No symbol with a matching qualified name
    UnresolvedSymbol,
    /// Indirect or virtual call with an empty candidate set
    AmbiguousCandidateSet,
}

/// A recorded, non-fatal failure attached to one call site
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Diagnostic {
    pub site: CallSiteId,
    pub reason: UnresolvedReason,
    pub message: String,
}

impl Diagnostic {
    /// Convert a recoverable error into a diagnostic for `site`.
    ///
    /// Returns `None` for fatal errors, which must be propagated instead.
    pub fn from_error(site: CallSiteId, error: &AnalysisError) -> Option<Self> {
        let reason = match error {
            AnalysisError::UnresolvedSymbol { .. } => UnresolvedReason::UnresolvedSymbol,
            AnalysisError::AmbiguousCandidateSet { .. } => {
                UnresolvedReason::AmbiguousCandidateSet
            }
            _ => return None,
        };
        Some(Self {
            site,
            reason,
            message: error.to_string(),
        })
    }
}
