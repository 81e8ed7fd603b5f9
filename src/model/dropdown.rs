use serde::{Deserialize, Serialize};

use super::task::{Task, TaskDraft};

/// A collapsible named section. Holds tasks and nested sections.
///
/// Each dropdown is owned by exactly one parent (a checklist's root sequence
/// or another dropdown's `dropdowns`). Parentage is implied by position in the
/// tree; no back-reference is stored here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dropdown {
    /// Dropdown ID like `D-003`
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub expanded: bool,
    #[serde(default)]
    pub tasks: Vec<Task>,
    /// Nested dropdowns (recursive)
    #[serde(default)]
    pub dropdowns: Vec<Dropdown>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position: Option<i64>,
}

impl Dropdown {
    /// Create a collapsed, empty dropdown
    pub fn new(id: impl Into<String>, title: impl Into<String>) -> Self {
        Dropdown {
            id: id.into(),
            title: title.into(),
            expanded: false,
            tasks: Vec::new(),
            dropdowns: Vec::new(),
            position: None,
        }
    }

    pub fn with_tasks(mut self, tasks: Vec<Task>) -> Self {
        self.tasks = tasks;
        self
    }

    pub fn with_dropdowns(mut self, dropdowns: Vec<Dropdown>) -> Self {
        self.dropdowns = dropdowns;
        self
    }

    /// Count `(completed, total)` tasks in this dropdown and every nested one
    pub fn completion(&self) -> (usize, usize) {
        let mut done = self.tasks.iter().filter(|t| t.completed).count();
        let mut total = self.tasks.len();
        for child in &self.dropdowns {
            let (d, t) = child.completion();
            done += d;
            total += t;
        }
        (done, total)
    }

    /// Completion as a whole-number percentage (0 for an empty dropdown)
    pub fn completion_percentage(&self) -> u8 {
        let (done, total) = self.completion();
        completion_percentage(done, total)
    }
}

/// Integer percentage, rounding down. An empty set counts as 0%.
pub fn completion_percentage(done: usize, total: usize) -> u8 {
    if total == 0 {
        return 0;
    }
    ((done * 100) / total) as u8
}

/// A dropdown that has not been assigned an ID yet; may carry children
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DropdownDraft {
    pub title: String,
    #[serde(default)]
    pub expanded: bool,
    #[serde(default)]
    pub tasks: Vec<TaskDraft>,
    #[serde(default)]
    pub dropdowns: Vec<DropdownDraft>,
}

impl DropdownDraft {
    pub fn new(title: impl Into<String>) -> Self {
        DropdownDraft {
            title: title.into(),
            ..Default::default()
        }
    }
}
