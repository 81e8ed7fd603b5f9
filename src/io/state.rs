use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::session::detail::TaskDetail;

/// Persisted detail-view state (written to .state.json) so `ac follow` and
/// `ac back` work across invocations.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct DetailState {
    /// Task currently open in the detail view
    #[serde(default)]
    pub open_task: Option<String>,
    /// Task that was open before the last link was followed
    #[serde(default)]
    pub referrer: Option<String>,
}

impl From<&TaskDetail> for DetailState {
    fn from(detail: &TaskDetail) -> Self {
        DetailState {
            open_task: detail.open_task().map(str::to_string),
            referrer: detail.referrer().map(str::to_string),
        }
    }
}

impl From<DetailState> for TaskDetail {
    fn from(state: DetailState) -> Self {
        TaskDetail::restore(state.open_task, state.referrer)
    }
}

pub fn read_detail_state(data_dir: &Path) -> Option<DetailState> {
    let content = fs::read_to_string(data_dir.join(".state.json")).ok()?;
    serde_json::from_str(&content).ok()
}

pub fn write_detail_state(data_dir: &Path, state: &DetailState) -> Result<(), std::io::Error> {
    let content = serde_json::to_string_pretty(state)?;
    fs::write(data_dir.join(".state.json"), content)
}
