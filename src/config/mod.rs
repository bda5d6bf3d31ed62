//! Configuration for dirmap analysis runs.
//!
//! Settings are read from `.dirmap.toml` (searched upward from the working
//! directory) and fall back to defaults field by field:
//!
//! ```toml
//! [analysis]
//! relaxation_factor = 4
//! scoped_lookup = true
//! narrow_monomorphic = true
//! require_instantiation = true
//!
//! [parallel]
//! enabled = true
//! max_concurrency = 8
//! ```

mod core;
mod loader;
mod parallel;

pub use self::core::{AnalysisSettings, DirmapConfig};
pub use loader::{
    directory_ancestors, load_config, load_config_file, load_config_from,
    parse_and_validate_config, CONFIG_FILE_NAME,
};
pub use parallel::ParallelConfig;
