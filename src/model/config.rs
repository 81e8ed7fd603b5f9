use serde::{Deserialize, Serialize};

/// Configuration from config.toml
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub workspace: WorkspaceInfo,
    #[serde(default)]
    pub sync: SyncConfig,
    #[serde(default)]
    pub session: SessionConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkspaceInfo {
    pub name: String,
}

/// How local state follows a successful store write
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncStrategy {
    /// Re-fetch the whole tree after every write
    #[default]
    Refetch,
    /// Patch the local tree in place after every write
    Patch,
}

impl SyncStrategy {
    pub fn parse_strategy(s: &str) -> Option<Self> {
        match s {
            "refetch" => Some(SyncStrategy::Refetch),
            "patch" => Some(SyncStrategy::Patch),
            _ => None,
        }
    }
}

impl std::fmt::Display for SyncStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SyncStrategy::Refetch => write!(f, "refetch"),
            SyncStrategy::Patch => write!(f, "patch"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Default: see TEMPLATE in cli/handlers/init.rs
    #[serde(default)]
    pub strategy: SyncStrategy,
    /// How long a store call waits for the write lock before giving up
    #[serde(default = "default_lock_timeout_ms")]
    pub lock_timeout_ms: u64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        SyncConfig {
            strategy: SyncStrategy::Refetch,
            lock_timeout_ms: default_lock_timeout_ms(),
        }
    }
}

fn default_lock_timeout_ms() -> u64 {
    5000
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Email of the signed-in user, if any
    #[serde(default)]
    pub user: Option<String>,
}
