use std::fs;
use std::path::{Path, PathBuf};

use crate::model::config::Config;
use crate::model::workspace::Workspace;

/// Name of the data directory inside a workspace root
pub const DATA_DIR: &str = "aftercare";

#[derive(Debug, thiserror::Error)]
pub enum WorkspaceError {
    #[error("not an aftercare workspace: no aftercare/ directory found (run `ac init`)")]
    NotAWorkspace,
    #[error("workspace already initialized at {0}")]
    AlreadyInitialized(PathBuf),
    #[error("could not read {path}: {source}")]
    ReadError {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("could not parse config.toml: {0}")]
    ConfigParseError(#[from] toml::de::Error),
    #[error("could not edit config.toml: {0}")]
    ConfigEditError(#[from] toml_edit::TomlError),
    #[error("io error: {0}")]
    IoError(#[from] std::io::Error),
}

/// Walk up from `start` looking for a directory with `aftercare/config.toml`.
pub fn discover_workspace(start: &Path) -> Result<PathBuf, WorkspaceError> {
    let mut current = start.to_path_buf();
    loop {
        let data_dir = current.join(DATA_DIR);
        if data_dir.is_dir() && data_dir.join("config.toml").exists() {
            return Ok(current);
        }
        if !current.pop() {
            return Err(WorkspaceError::NotAWorkspace);
        }
    }
}

pub fn load_workspace(root: &Path) -> Result<Workspace, WorkspaceError> {
    let data_dir = root.join(DATA_DIR);
    if !data_dir.is_dir() {
        return Err(WorkspaceError::NotAWorkspace);
    }
    let config_path = data_dir.join("config.toml");
    let config_text = fs::read_to_string(&config_path).map_err(|e| WorkspaceError::ReadError {
        path: config_path.clone(),
        source: e,
    })?;
    let config: Config = toml::from_str(&config_text)?;
    tracing::debug!(root = %root.display(), strategy = %config.sync.strategy, "workspace loaded");
    Ok(Workspace {
        root: root.to_path_buf(),
        data_dir,
        config,
    })
}
