use std::fs;

use crate::cli::commands::InitArgs;
use crate::io::config_io;
use crate::io::store::{FileStore, StoreData, SyncAdapter};
use crate::io::workspace_io::{self, DATA_DIR, WorkspaceError};
use crate::model::user::UserRole;

const CONFIG_TEMPLATE: &str = r##"[workspace]
name = "{name}"

[sync]
# How local state follows a successful write:
#   "refetch"  re-read the whole tree after every change
#   "patch"    apply the change to the tree already in memory
strategy = "refetch"
# Give up on a store write after waiting this long for the lock
lock_timeout_ms = 5000

[session]
# Set by `ac login`, cleared by `ac logout`
# user = "someone@example.com"
"##;

/// Infer a workspace name from a directory name: replace hyphens with spaces, title-case.
fn infer_name(dir_name: &str) -> String {
    dir_name
        .split(['-', '_'])
        .filter(|w| !w.is_empty())
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                None => String::new(),
                Some(c) => {
                    let upper: String = c.to_uppercase().collect();
                    upper + chars.as_str()
                }
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

fn render_config(name: &str) -> String {
    CONFIG_TEMPLATE.replace("{name}", &name.replace('"', "\\\""))
}

pub fn cmd_init(args: InitArgs) -> Result<(), Box<dyn std::error::Error>> {
    let cwd = super::start_dir()?;
    let data_dir = cwd.join(DATA_DIR);

    if data_dir.is_dir() {
        return Err(WorkspaceError::AlreadyInitialized(data_dir).into());
    }

    if let Some(parent) = cwd.parent()
        && let Ok(parent_root) = workspace_io::discover_workspace(parent)
    {
        eprintln!("Note: parent workspace found at {}/", parent_root.join(DATA_DIR).display());
        eprintln!("Creating new workspace in ./{}/", DATA_DIR);
    }

    let name = args.name.unwrap_or_else(|| {
        cwd.file_name()
            .and_then(|n| n.to_str())
            .map(infer_name)
            .unwrap_or_else(|| "Untitled".to_string())
    });

    fs::create_dir_all(&data_dir)?;
    fs::write(data_dir.join("config.toml"), render_config(&name))?;
    let store = FileStore::open(&data_dir, 5000);
    let mut empty = serde_json::to_string_pretty(&StoreData::default())?;
    empty.push('\n');
    fs::write(store.path(), empty)?;
    tracing::info!(root = %cwd.display(), "workspace initialized");

    println!("Initialized aftercare workspace: {}", name);

    if let Some(email) = args.admin {
        let admin = store.sign_up(&email, UserRole::Admin)?;
        let (_, mut doc) = config_io::read_config(&data_dir)?;
        config_io::set_session_user(&mut doc, &admin.email);
        config_io::write_config(&data_dir, &doc)?;
        println!("  admin: {} ({}), signed in", admin.email, admin.id);
    }

    Ok(())
}
