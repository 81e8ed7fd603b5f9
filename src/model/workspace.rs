use std::path::PathBuf;

use super::config::Config;

/// A discovered aftercare workspace on disk
#[derive(Debug)]
pub struct Workspace {
    /// Root directory of the workspace (parent of `aftercare/`)
    pub root: PathBuf,
    /// Path to the `aftercare/` directory
    pub data_dir: PathBuf,
    /// Parsed config.toml
    pub config: Config,
}
