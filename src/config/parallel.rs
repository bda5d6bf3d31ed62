//! Parallelism configuration for fact normalization and propagation.
//!
//! Controls whether per-module normalization and per-component propagation
//! run on rayon's thread pool. Results never depend on this setting.

use crate::errors::{AnalysisError, Result};
use serde::{Deserialize, Serialize};

/// Default value for parallel processing enabled
fn default_enabled() -> bool {
    true
}

/// Configuration for parallel processing operations.
///
/// # Example
///
/// ```rust
/// use dirmap::config::ParallelConfig;
///
/// let config = ParallelConfig {
///     enabled: true,
///     max_concurrency: Some(4),
/// };
/// assert_eq!(config.effective_concurrency(), 4);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ParallelConfig {
    /// Enable parallel processing (default: true)
    ///
    /// When disabled, modules and components are processed sequentially.
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    /// Maximum concurrent tasks (default: num_cpus)
    #[serde(default)]
    pub max_concurrency: Option<usize>,
}

impl Default for ParallelConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            max_concurrency: None,
        }
    }
}

impl ParallelConfig {
    /// Create a config with parallel processing disabled.
    pub fn sequential() -> Self {
        Self {
            enabled: false,
            ..Default::default()
        }
    }

    /// Get the effective concurrency level.
    ///
    /// Returns the configured max_concurrency, or the number of
    /// available CPU cores if not specified.
    pub fn effective_concurrency(&self) -> usize {
        self.max_concurrency.unwrap_or_else(num_cpus).max(1)
    }

    /// Run `op` on a pool sized by `max_concurrency`, or on the global pool
    /// when no limit is configured.
    pub fn install<R, F>(&self, op: F) -> Result<R>
    where
        R: Send,
        F: FnOnce() -> Result<R> + Send,
    {
        match self.max_concurrency {
            Some(_) => {
                let pool = rayon::ThreadPoolBuilder::new()
                    .num_threads(self.effective_concurrency())
                    .build()
                    .map_err(|e| {
                        AnalysisError::Configuration(format!("Failed to build thread pool: {}", e))
                    })?;
                pool.install(op)
            }
            None => op(),
        }
    }
}

/// Returns the number of available CPU cores.
fn num_cpus() -> usize {
    std::thread::available_parallelism()
        .map(|p| p.get())
        .unwrap_or(1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parallel_config_default() {
        let config = ParallelConfig::default();
        assert!(config.enabled);
        assert!(config.max_concurrency.is_none());
    }

    #[test]
    fn test_parallel_config_sequential() {
        let config = ParallelConfig::sequential();
        assert!(!config.enabled);
    }

    #[test]
    fn test_effective_concurrency() {
        let config = ParallelConfig {
            enabled: true,
            max_concurrency: Some(4),
        };
        assert_eq!(config.effective_concurrency(), 4);

        let config = ParallelConfig::default();
        assert!(config.effective_concurrency() >= 1);
    }

    #[test]
    fn test_install_with_bounded_pool() {
        let config = ParallelConfig {
            enabled: true,
            max_concurrency: Some(2),
        };
        let threads = config
            .install(|| Ok(rayon::current_num_threads()))
            .unwrap();
        assert_eq!(threads, 2);
    }
}
