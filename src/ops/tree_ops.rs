use tracing::debug;

use crate::model::checklist::{Checklist, sort_by_position};
use crate::model::dropdown::Dropdown;
use crate::model::task::Task;

/// The sibling sequence an item lives in
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum SiblingGroup {
    /// Root-level dropdowns of a checklist
    Root { checklist_id: String },
    /// Dropdowns nested directly under another dropdown
    Nested {
        checklist_id: String,
        parent_id: String,
    },
    /// Tasks of one dropdown
    Tasks { dropdown_id: String },
}

impl SiblingGroup {
    /// The parent dropdown for nested groups, `None` for checklist roots
    pub fn parent_dropdown(&self) -> Option<&str> {
        match self {
            SiblingGroup::Root { .. } => None,
            SiblingGroup::Nested { parent_id, .. } => Some(parent_id),
            SiblingGroup::Tasks { dropdown_id } => Some(dropdown_id),
        }
    }
}

// ---------------------------------------------------------------------------
// Lookup
// ---------------------------------------------------------------------------

pub fn find_checklist<'a>(tree: &'a [Checklist], checklist_id: &str) -> Option<&'a Checklist> {
    tree.iter().find(|c| c.id == checklist_id)
}

pub fn find_checklist_mut<'a>(
    tree: &'a mut [Checklist],
    checklist_id: &str,
) -> Option<&'a mut Checklist> {
    tree.iter_mut().find(|c| c.id == checklist_id)
}

/// Depth-first search for a dropdown at any nesting level. First match wins.
pub fn find_dropdown<'a>(dropdowns: &'a [Dropdown], id: &str) -> Option<&'a Dropdown> {
    for dropdown in dropdowns {
        if dropdown.id == id {
            return Some(dropdown);
        }
        if let Some(d) = find_dropdown(&dropdown.dropdowns, id) {
            return Some(d);
        }
    }
    None
}

/// Mutable counterpart of [`find_dropdown`].
pub fn find_dropdown_mut<'a>(dropdowns: &'a mut [Dropdown], id: &str) -> Option<&'a mut Dropdown> {
    for dropdown in dropdowns.iter_mut() {
        if dropdown.id == id {
            return Some(dropdown);
        }
        if let Some(d) = find_dropdown_mut(&mut dropdown.dropdowns, id) {
            return Some(d);
        }
    }
    None
}

/// Find a task at any depth below the given dropdowns.
pub fn find_task<'a>(dropdowns: &'a [Dropdown], task_id: &str) -> Option<&'a Task> {
    for dropdown in dropdowns {
        if let Some(t) = dropdown.tasks.iter().find(|t| t.id == task_id) {
            return Some(t);
        }
        if let Some(t) = find_task(&dropdown.dropdowns, task_id) {
            return Some(t);
        }
    }
    None
}

/// Find a task anywhere in the tree, with the checklist and dropdown holding it.
pub fn find_task_anywhere<'a>(
    tree: &'a [Checklist],
    task_id: &str,
) -> Option<(&'a Checklist, &'a Dropdown, &'a Task)> {
    for checklist in tree {
        if let Some(dropdown_id) = locate_task(&checklist.dropdowns, task_id)
            && let Some(dropdown) = find_dropdown(&checklist.dropdowns, &dropdown_id)
            && let Some(task) = dropdown.tasks.iter().find(|t| t.id == task_id)
        {
            return Some((checklist, dropdown, task));
        }
    }
    None
}

/// Return the ID of the dropdown that directly holds `task_id`.
pub fn locate_task(dropdowns: &[Dropdown], task_id: &str) -> Option<String> {
    for dropdown in dropdowns {
        if dropdown.tasks.iter().any(|t| t.id == task_id) {
            return Some(dropdown.id.clone());
        }
        if let Some(id) = locate_task(&dropdown.dropdowns, task_id) {
            return Some(id);
        }
    }
    None
}

/// Return the sibling group a dropdown lives in, searching the whole checklist.
pub fn locate_dropdown(checklist: &Checklist, dropdown_id: &str) -> Option<SiblingGroup> {
    if checklist.dropdowns.iter().any(|d| d.id == dropdown_id) {
        return Some(SiblingGroup::Root {
            checklist_id: checklist.id.clone(),
        });
    }
    locate_nested(&checklist.dropdowns, dropdown_id).map(|parent_id| SiblingGroup::Nested {
        checklist_id: checklist.id.clone(),
        parent_id,
    })
}

fn locate_nested(dropdowns: &[Dropdown], dropdown_id: &str) -> Option<String> {
    for dropdown in dropdowns {
        if dropdown.dropdowns.iter().any(|d| d.id == dropdown_id) {
            return Some(dropdown.id.clone());
        }
        if let Some(id) = locate_nested(&dropdown.dropdowns, dropdown_id) {
            return Some(id);
        }
    }
    None
}

/// Find a dropdown anywhere in the tree, returning its checklist ID and sibling group.
pub fn locate_dropdown_anywhere(tree: &[Checklist], dropdown_id: &str) -> Option<SiblingGroup> {
    tree.iter().find_map(|c| locate_dropdown(c, dropdown_id))
}

/// The dropdown sequence addressed by `parent`: the checklist root when absent,
/// otherwise the children of that parent wherever it is nested.
pub fn dropdown_siblings<'a>(
    checklist: &'a Checklist,
    parent: Option<&str>,
) -> Option<&'a [Dropdown]> {
    match parent {
        None => Some(&checklist.dropdowns),
        Some(parent_id) => find_dropdown(&checklist.dropdowns, parent_id).map(|p| &p.dropdowns[..]),
    }
}

/// Resolve the dropdown that owns tasks, with the same parent rule as the
/// task mutators.
pub fn task_owner<'a>(
    checklist: &'a Checklist,
    dropdown_id: &str,
    parent: Option<&str>,
) -> Option<&'a Dropdown> {
    match parent {
        None => find_dropdown(&checklist.dropdowns, dropdown_id),
        Some(parent_id) => find_dropdown(&checklist.dropdowns, parent_id)?
            .dropdowns
            .iter()
            .find(|d| d.id == dropdown_id),
    }
}

fn dropdown_siblings_mut<'a>(
    checklist: &'a mut Checklist,
    parent: Option<&str>,
) -> Option<&'a mut Vec<Dropdown>> {
    match parent {
        None => Some(&mut checklist.dropdowns),
        Some(parent_id) => {
            find_dropdown_mut(&mut checklist.dropdowns, parent_id).map(|p| &mut p.dropdowns)
        }
    }
}

/// Resolve the dropdown that owns tasks. With a parent, the dropdown must be
/// a direct child of that parent; without one, it may be at any depth.
fn task_owner_mut<'a>(
    checklist: &'a mut Checklist,
    dropdown_id: &str,
    parent: Option<&str>,
) -> Option<&'a mut Dropdown> {
    match parent {
        None => find_dropdown_mut(&mut checklist.dropdowns, dropdown_id),
        Some(parent_id) => find_dropdown_mut(&mut checklist.dropdowns, parent_id)?
            .dropdowns
            .iter_mut()
            .find(|d| d.id == dropdown_id),
    }
}

// ---------------------------------------------------------------------------
// Toggles
// ---------------------------------------------------------------------------

/// Flip a dropdown's expanded flag. Returns false if it can't be found.
pub fn toggle_dropdown_expanded(
    tree: &mut [Checklist],
    checklist_id: &str,
    dropdown_id: &str,
) -> bool {
    let Some(checklist) = find_checklist_mut(tree, checklist_id) else {
        return false;
    };
    match find_dropdown_mut(&mut checklist.dropdowns, dropdown_id) {
        Some(dropdown) => {
            dropdown.expanded = !dropdown.expanded;
            debug!(dropdown_id, expanded = dropdown.expanded, "toggled dropdown");
            true
        }
        None => false,
    }
}

/// Flip a task's completion flag. Returns false if either lookup fails.
pub fn toggle_task_completion(
    tree: &mut [Checklist],
    checklist_id: &str,
    dropdown_id: &str,
    task_id: &str,
) -> bool {
    let Some(checklist) = find_checklist_mut(tree, checklist_id) else {
        return false;
    };
    let Some(dropdown) = find_dropdown_mut(&mut checklist.dropdowns, dropdown_id) else {
        return false;
    };
    match dropdown.tasks.iter_mut().find(|t| t.id == task_id) {
        Some(task) => {
            task.toggle();
            debug!(task_id, completed = task.completed, "toggled task");
            true
        }
        None => false,
    }
}

// ---------------------------------------------------------------------------
// Checklist CRUD
// ---------------------------------------------------------------------------

pub fn add_checklist(tree: &mut Vec<Checklist>, checklist: Checklist) {
    tree.push(checklist);
}

pub fn update_checklist_title(tree: &mut [Checklist], checklist_id: &str, title: &str) -> bool {
    match find_checklist_mut(tree, checklist_id) {
        Some(c) => {
            c.title = title.to_string();
            true
        }
        None => false,
    }
}

pub fn delete_checklist(tree: &mut Vec<Checklist>, checklist_id: &str) -> Option<Checklist> {
    let idx = tree.iter().position(|c| c.id == checklist_id)?;
    Some(tree.remove(idx))
}

// ---------------------------------------------------------------------------
// Dropdown CRUD
// ---------------------------------------------------------------------------

/// Append a dropdown at the checklist root or under `parent` (any depth).
pub fn add_dropdown(
    tree: &mut [Checklist],
    checklist_id: &str,
    dropdown: Dropdown,
    parent: Option<&str>,
) -> bool {
    let Some(checklist) = find_checklist_mut(tree, checklist_id) else {
        return false;
    };
    match dropdown_siblings_mut(checklist, parent) {
        Some(siblings) => {
            siblings.push(dropdown);
            sort_by_position(siblings);
            true
        }
        None => false,
    }
}

/// Replace a dropdown's title and expanded flag, keeping its children.
pub fn update_dropdown(
    tree: &mut [Checklist],
    checklist_id: &str,
    dropdown: &Dropdown,
    parent: Option<&str>,
) -> bool {
    let Some(checklist) = find_checklist_mut(tree, checklist_id) else {
        return false;
    };
    let Some(siblings) = dropdown_siblings_mut(checklist, parent) else {
        return false;
    };
    match siblings.iter_mut().find(|d| d.id == dropdown.id) {
        Some(existing) => {
            existing.title = dropdown.title.clone();
            existing.expanded = dropdown.expanded;
            true
        }
        None => false,
    }
}

/// Remove a dropdown and everything nested below it.
pub fn delete_dropdown(
    tree: &mut [Checklist],
    checklist_id: &str,
    dropdown_id: &str,
    parent: Option<&str>,
) -> Option<Dropdown> {
    let checklist = find_checklist_mut(tree, checklist_id)?;
    let siblings = dropdown_siblings_mut(checklist, parent)?;
    let idx = siblings.iter().position(|d| d.id == dropdown_id)?;
    Some(siblings.remove(idx))
}

// ---------------------------------------------------------------------------
// Task CRUD
// ---------------------------------------------------------------------------

pub fn add_task(
    tree: &mut [Checklist],
    checklist_id: &str,
    dropdown_id: &str,
    task: Task,
    parent: Option<&str>,
) -> bool {
    let Some(checklist) = find_checklist_mut(tree, checklist_id) else {
        return false;
    };
    match task_owner_mut(checklist, dropdown_id, parent) {
        Some(dropdown) => {
            dropdown.tasks.push(task);
            sort_by_position(&mut dropdown.tasks);
            true
        }
        None => false,
    }
}

/// Replace a task's title, content and completion; position is kept.
pub fn update_task(
    tree: &mut [Checklist],
    checklist_id: &str,
    dropdown_id: &str,
    task: &Task,
    parent: Option<&str>,
) -> bool {
    let Some(checklist) = find_checklist_mut(tree, checklist_id) else {
        return false;
    };
    let Some(dropdown) = task_owner_mut(checklist, dropdown_id, parent) else {
        return false;
    };
    match dropdown.tasks.iter_mut().find(|t| t.id == task.id) {
        Some(existing) => {
            existing.title = task.title.clone();
            existing.completed = task.completed;
            existing.content = task.content.clone();
            true
        }
        None => false,
    }
}

pub fn delete_task(
    tree: &mut [Checklist],
    checklist_id: &str,
    dropdown_id: &str,
    task_id: &str,
    parent: Option<&str>,
) -> Option<Task> {
    let checklist = find_checklist_mut(tree, checklist_id)?;
    let dropdown = task_owner_mut(checklist, dropdown_id, parent)?;
    let idx = dropdown.tasks.iter().position(|t| t.id == task_id)?;
    Some(dropdown.tasks.remove(idx))
}

// ---------------------------------------------------------------------------
// Traversal
// ---------------------------------------------------------------------------

/// Visit every dropdown in pre-order with its nesting depth (0 = root).
pub fn for_each_dropdown(dropdowns: &[Dropdown], f: &mut dyn FnMut(&Dropdown, usize)) {
    walk_dropdowns(dropdowns, 0, f);
}

fn walk_dropdowns(dropdowns: &[Dropdown], depth: usize, f: &mut dyn FnMut(&Dropdown, usize)) {
    for dropdown in dropdowns {
        f(dropdown, depth);
        walk_dropdowns(&dropdown.dropdowns, depth + 1, f);
    }
}

/// Visit every task below the given dropdowns.
pub fn for_each_task(dropdowns: &[Dropdown], f: &mut dyn FnMut(&Task)) {
    for_each_dropdown(dropdowns, &mut |d, _| {
        for task in &d.tasks {
            f(task);
        }
    });
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
