use std::fs;
use std::path::Path;

use crate::io::workspace_io::WorkspaceError;
use crate::model::config::{Config, SyncStrategy};

/// Read the config, returning both the parsed config and the raw toml_edit
/// document for comment-preserving edits.
pub fn read_config(data_dir: &Path) -> Result<(Config, toml_edit::DocumentMut), WorkspaceError> {
    let config_path = data_dir.join("config.toml");
    let config_text = fs::read_to_string(&config_path).map_err(|e| WorkspaceError::ReadError {
        path: config_path.clone(),
        source: e,
    })?;
    let config: Config = toml::from_str(&config_text)?;
    let doc: toml_edit::DocumentMut = config_text.parse()?;
    Ok((config, doc))
}

/// Write the config document back to disk, preserving formatting.
pub fn write_config(data_dir: &Path, doc: &toml_edit::DocumentMut) -> Result<(), WorkspaceError> {
    let config_path = data_dir.join("config.toml");
    fs::write(&config_path, doc.to_string()).map_err(|e| WorkspaceError::ReadError {
        path: config_path,
        source: e,
    })
}

fn ensure_table(doc: &mut toml_edit::DocumentMut, name: &str) {
    if !doc.contains_key(name) {
        doc[name] = toml_edit::Item::Table(toml_edit::Table::new());
    }
}

/// Record the signed-in user's email under `[session]`.
pub fn set_session_user(doc: &mut toml_edit::DocumentMut, email: &str) {
    ensure_table(doc, "session");
    doc["session"]["user"] = toml_edit::value(email);
}

pub fn clear_session_user(doc: &mut toml_edit::DocumentMut) {
    if let Some(session) = doc.get_mut("session").and_then(|s| s.as_table_mut()) {
        session.remove("user");
    }
}

pub fn set_sync_strategy(doc: &mut toml_edit::DocumentMut, strategy: SyncStrategy) {
    ensure_table(doc, "sync");
    doc["sync"]["strategy"] = toml_edit::value(strategy.to_string());
}

pub fn set_lock_timeout(doc: &mut toml_edit::DocumentMut, ms: u64) {
    ensure_table(doc, "sync");
    doc["sync"]["lock_timeout_ms"] = toml_edit::value(ms as i64);
}

pub fn set_workspace_name(doc: &mut toml_edit::DocumentMut, name: &str) {
    ensure_table(doc, "workspace");
    doc["workspace"]["name"] = toml_edit::value(name);
}
