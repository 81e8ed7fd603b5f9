use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// An admin-authored reference document, linkable from task content
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LearningPage {
    /// Page ID like `P-002`
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub body: String,
    /// User ID of the author
    pub author_id: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Tasks this page is related to (many-to-many)
    #[serde(default)]
    pub task_ids: Vec<String>,
}

/// Fields an admin supplies when creating or editing a page
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LearningPageDraft {
    pub title: String,
    pub body: String,
    pub task_ids: Vec<String>,
}
