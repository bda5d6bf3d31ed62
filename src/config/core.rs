use serde::{Deserialize, Serialize};

use super::parallel::ParallelConfig;

fn default_relaxation_factor() -> u32 {
    4
}

fn default_true() -> bool {
    true
}

/// Root configuration structure for dirmap
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct DirmapConfig {
    /// Call graph and propagation settings
    #[serde(default)]
    pub analysis: AnalysisSettings,

    /// Parallelism settings
    #[serde(default)]
    pub parallel: ParallelConfig,
}

/// Settings that shape resolution and propagation
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AnalysisSettings {
    /// Relaxation budget per call graph edge before the run is declared
    /// divergent (default: 4)
    #[serde(default = "default_relaxation_factor")]
    pub relaxation_factor: u32,

    /// Resolve direct calls by walking enclosing namespaces/classes
    /// innermost-first (default: true). When false only exact qualified
    /// names match.
    #[serde(default = "default_true")]
    pub scoped_lookup: bool,

    /// Collapse a virtual call whose receiver type is exactly known into a
    /// single direct edge (default: true)
    #[serde(default = "default_true")]
    pub narrow_monomorphic: bool,

    /// Only implementors observed to be instantiated are virtual-call
    /// candidates (default: true)
    #[serde(default = "default_true")]
    pub require_instantiation: bool,
}

impl Default for AnalysisSettings {
    fn default() -> Self {
        Self {
            relaxation_factor: default_relaxation_factor(),
            scoped_lookup: true,
            narrow_monomorphic: true,
            require_instantiation: true,
        }
    }
}

impl AnalysisSettings {
    pub fn validate(&self) -> Result<(), String> {
        if self.relaxation_factor == 0 {
            return Err("relaxation_factor must be at least 1".to_string());
        }
        Ok(())
    }

    /// Maximum number of label increases allowed for a graph with `edges`
    /// distinct caller/callee pairs
    pub fn relaxation_budget(&self, edges: usize) -> usize {
        self.relaxation_factor as usize * edges.max(1)
    }
}
