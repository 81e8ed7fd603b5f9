use serde::{Deserialize, Serialize};

use super::dropdown::{Dropdown, DropdownDraft, completion_percentage};
use super::task::Task;

/// Top-level container of root dropdowns
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Checklist {
    /// Checklist ID like `C-001`
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub dropdowns: Vec<Dropdown>,
}

impl Checklist {
    pub fn new(id: impl Into<String>, title: impl Into<String>) -> Self {
        Checklist {
            id: id.into(),
            title: title.into(),
            dropdowns: Vec::new(),
        }
    }

    pub fn with_dropdowns(mut self, dropdowns: Vec<Dropdown>) -> Self {
        self.dropdowns = dropdowns;
        self
    }

    /// `(completed, total)` over every task in the checklist
    pub fn completion(&self) -> (usize, usize) {
        self.dropdowns.iter().fold((0, 0), |(d, t), dd| {
            let (d2, t2) = dd.completion();
            (d + d2, t + t2)
        })
    }

    pub fn completion_percentage(&self) -> u8 {
        let (done, total) = self.completion();
        completion_percentage(done, total)
    }
}

/// A checklist that has not been assigned an ID yet
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChecklistDraft {
    pub title: String,
    #[serde(default)]
    pub dropdowns: Vec<DropdownDraft>,
}

impl ChecklistDraft {
    pub fn new(title: impl Into<String>) -> Self {
        ChecklistDraft {
            title: title.into(),
            dropdowns: Vec::new(),
        }
    }
}

/// Anything that carries an optional sibling position
pub trait Positioned {
    fn position(&self) -> Option<i64>;
    fn set_position(&mut self, position: Option<i64>);
}

impl Positioned for Task {
    fn position(&self) -> Option<i64> {
        self.position
    }
    fn set_position(&mut self, position: Option<i64>) {
        self.position = position;
    }
}

impl Positioned for Dropdown {
    fn position(&self) -> Option<i64> {
        self.position
    }
    fn set_position(&mut self, position: Option<i64>) {
        self.position = position;
    }
}

/// Sort siblings so that ascending position is authoritative.
///
/// Stable: positioned items come first in position order, unpositioned items
/// keep their insertion order after them.
pub fn sort_by_position<T: Positioned>(items: &mut [T]) {
    items.sort_by_key(|item| match item.position() {
        Some(p) => (0u8, p),
        None => (1u8, 0),
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    fn task_at(id: &str, pos: Option<i64>) -> Task {
        let mut t = Task::new(id, id);
        t.position = pos;
        t
    }

    #[test]
    fn sort_by_position_orders_positioned_first() {
        let mut tasks = vec![
            task_at("a", None),
            task_at("b", Some(2)),
            task_at("c", Some(0)),
            task_at("d", None),
            task_at("e", Some(1)),
        ];
        sort_by_position(&mut tasks);
        let ids: Vec<&str> = tasks.iter().map(|t| t.id.as_str()).collect();
        assert_eq!(ids, vec!["c", "e", "b", "a", "d"]);
    }

    #[test]
    fn sort_without_positions_keeps_insertion_order() {
        let mut tasks = vec![task_at("x", None), task_at("y", None), task_at("z", None)];
        sort_by_position(&mut tasks);
        let ids: Vec<&str> = tasks.iter().map(|t| t.id.as_str()).collect();
        assert_eq!(ids, vec!["x", "y", "z"]);
    }

    #[test]
    fn checklist_completion_spans_root_dropdowns() {
        let mut done = Task::new("T-001", "a");
        done.completed = true;
        let c = Checklist::new("C-001", "List").with_dropdowns(vec![
            Dropdown::new("D-001", "One").with_tasks(vec![done]),
            Dropdown::new("D-002", "Two").with_tasks(vec![Task::new("T-002", "b")]),
        ]);
        assert_eq!(c.completion(), (1, 2));
        assert_eq!(c.completion_percentage(), 50);
    }
}
