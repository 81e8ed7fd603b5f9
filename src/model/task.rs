use serde::{Deserialize, Serialize};

/// Detail content shown when a task is opened
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskContent {
    /// One-line lead shown under the title
    #[serde(default)]
    pub subheader: String,
    /// Long-form body; may contain `[[task:<id>|<label>]]` markers
    #[serde(default)]
    pub body: String,
}

impl TaskContent {
    pub fn new(subheader: impl Into<String>, body: impl Into<String>) -> Self {
        TaskContent {
            subheader: subheader.into(),
            body: body.into(),
        }
    }
}

/// A leaf work item inside a dropdown
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    /// Task ID like `T-014`
    pub id: String,
    pub title: String,
    /// Completion as seen by the current user
    #[serde(default)]
    pub completed: bool,
    #[serde(default)]
    pub content: TaskContent,
    /// Sibling order key (dense, 0-based) when persisted
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position: Option<i64>,
}

impl Task {
    /// Create an incomplete task with empty content
    pub fn new(id: impl Into<String>, title: impl Into<String>) -> Self {
        Task {
            id: id.into(),
            title: title.into(),
            completed: false,
            content: TaskContent::default(),
            position: None,
        }
    }

    pub fn with_content(mut self, content: TaskContent) -> Self {
        self.content = content;
        self
    }

    /// Flip the completion flag
    pub fn toggle(&mut self) {
        self.completed = !self.completed;
    }
}

/// A task that has not been assigned an ID yet
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskDraft {
    pub title: String,
    #[serde(default)]
    pub completed: bool,
    #[serde(default)]
    pub content: TaskContent,
}

impl TaskDraft {
    pub fn new(title: impl Into<String>) -> Self {
        TaskDraft {
            title: title.into(),
            ..Default::default()
        }
    }
}
