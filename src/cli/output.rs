use serde::Serialize;

use crate::io::recovery::RecoveryEntry;
use crate::model::checklist::Checklist;
use crate::model::dropdown::{Dropdown, completion_percentage};
use crate::model::learning_page::LearningPage;
use crate::model::task::Task;
use crate::ops::reorder::DropOutcome;
use crate::ops::task_links::{extract_task_links, render_task_links, render_task_links_plain};

// ---------------------------------------------------------------------------
// JSON output structs
// ---------------------------------------------------------------------------

#[derive(Serialize)]
pub struct TaskJson {
    pub id: String,
    pub title: String,
    pub completed: bool,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub subheader: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub body: String,
}

#[derive(Serialize)]
pub struct ProgressJson {
    pub done: usize,
    pub total: usize,
    pub percent: u8,
}

#[derive(Serialize)]
pub struct DropdownJson {
    pub id: String,
    pub title: String,
    pub expanded: bool,
    pub progress: ProgressJson,
    pub tasks: Vec<TaskJson>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub dropdowns: Vec<DropdownJson>,
}

#[derive(Serialize)]
pub struct ChecklistJson {
    pub id: String,
    pub title: String,
    pub progress: ProgressJson,
    pub dropdowns: Vec<DropdownJson>,
}

#[derive(Serialize)]
pub struct TaskLinkJson {
    pub id: String,
    pub label: String,
}

#[derive(Serialize)]
pub struct PageSummaryJson {
    pub id: String,
    pub title: String,
}

#[derive(Serialize)]
pub struct TaskDetailJson {
    pub checklist: String,
    pub dropdown: String,
    #[serde(flatten)]
    pub task: TaskJson,
    pub body_html: String,
    pub links: Vec<TaskLinkJson>,
    pub pages: Vec<PageSummaryJson>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub referrer: Option<String>,
}

#[derive(Serialize)]
pub struct StatsJson {
    pub checklists: Vec<ChecklistStatsJson>,
    pub totals: ProgressJson,
}

#[derive(Serialize)]
pub struct ChecklistStatsJson {
    pub id: String,
    pub title: String,
    pub dropdowns: usize,
    pub progress: ProgressJson,
}

#[derive(Serialize)]
pub struct DropJson {
    pub outcome: &'static str,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub order: Vec<String>,
}

// ---------------------------------------------------------------------------
// Conversions
// ---------------------------------------------------------------------------

pub fn progress_json(done: usize, total: usize) -> ProgressJson {
    ProgressJson {
        done,
        total,
        percent: completion_percentage(done, total),
    }
}

pub fn task_to_json(task: &Task) -> TaskJson {
    TaskJson {
        id: task.id.clone(),
        title: task.title.clone(),
        completed: task.completed,
        subheader: task.content.subheader.clone(),
        body: task.content.body.clone(),
    }
}

pub fn dropdown_to_json(dropdown: &Dropdown) -> DropdownJson {
    let (done, total) = dropdown.completion();
    DropdownJson {
        id: dropdown.id.clone(),
        title: dropdown.title.clone(),
        expanded: dropdown.expanded,
        progress: progress_json(done, total),
        tasks: dropdown.tasks.iter().map(task_to_json).collect(),
        dropdowns: dropdown.dropdowns.iter().map(dropdown_to_json).collect(),
    }
}

pub fn checklist_to_json(checklist: &Checklist) -> ChecklistJson {
    let (done, total) = checklist.completion();
    ChecklistJson {
        id: checklist.id.clone(),
        title: checklist.title.clone(),
        progress: progress_json(done, total),
        dropdowns: checklist.dropdowns.iter().map(dropdown_to_json).collect(),
    }
}

pub fn task_detail_to_json(
    checklist: &Checklist,
    dropdown: &Dropdown,
    task: &Task,
    pages: &[LearningPage],
    referrer: Option<&str>,
) -> TaskDetailJson {
    TaskDetailJson {
        checklist: checklist.id.clone(),
        dropdown: dropdown.id.clone(),
        task: task_to_json(task),
        body_html: render_task_links(&task.content.body),
        links: extract_task_links(&task.content.body)
            .into_iter()
            .map(|l| TaskLinkJson {
                id: l.id,
                label: l.label,
            })
            .collect(),
        pages: pages
            .iter()
            .map(|p| PageSummaryJson {
                id: p.id.clone(),
                title: p.title.clone(),
            })
            .collect(),
        referrer: referrer.map(str::to_string),
    }
}

pub fn drop_to_json(outcome: &DropOutcome) -> DropJson {
    DropJson {
        outcome: drop_outcome_name(outcome),
        order: match outcome {
            DropOutcome::Reorder(plan) => plan.order.clone(),
            _ => Vec::new(),
        },
    }
}

pub fn drop_outcome_name(outcome: &DropOutcome) -> &'static str {
    match outcome {
        DropOutcome::NoDrag => "no_drag",
        DropOutcome::SameItem => "same_item",
        DropOutcome::KindMismatch => "kind_mismatch",
        DropOutcome::CrossParent => "cross_parent",
        DropOutcome::Stale => "stale",
        DropOutcome::Reorder(_) => "reordered",
    }
}

// ---------------------------------------------------------------------------
// Human-readable formatting
// ---------------------------------------------------------------------------

fn checkbox(completed: bool) -> char {
    if completed { 'x' } else { ' ' }
}

/// Format a single task as a one-line summary
pub fn format_task_line(task: &Task) -> String {
    format!("[{}] {} {}", checkbox(task.completed), task.id, task.title)
}

/// Format a dropdown header: arrow, title, ID and progress
pub fn format_dropdown_line(dropdown: &Dropdown) -> String {
    let arrow = if dropdown.expanded { '▾' } else { '▸' };
    let (done, total) = dropdown.completion();
    format!("{} {} ({})  {}/{}", arrow, dropdown.title, dropdown.id, done, total)
}

/// Format a dropdown and, when expanded (or `all`), its tasks and children
pub fn format_dropdown_tree(dropdown: &Dropdown, indent: usize, all: bool) -> Vec<String> {
    let prefix = "  ".repeat(indent);
    let mut lines = vec![format!("{}{}", prefix, format_dropdown_line(dropdown))];
    if !dropdown.expanded && !all {
        return lines;
    }
    for task in &dropdown.tasks {
        lines.push(format!("{}  {}", prefix, format_task_line(task)));
    }
    for child in &dropdown.dropdowns {
        lines.extend(format_dropdown_tree(child, indent + 1, all));
    }
    lines
}

pub fn format_checklist_header(checklist: &Checklist) -> String {
    let (done, total) = checklist.completion();
    format!(
        "== {} ({}) ==  {}/{} {}%",
        checklist.title,
        checklist.id,
        done,
        total,
        completion_percentage(done, total)
    )
}

pub fn format_checklist(checklist: &Checklist, all: bool) -> Vec<String> {
    let mut lines = vec![format_checklist_header(checklist)];
    for dropdown in &checklist.dropdowns {
        lines.extend(format_dropdown_tree(dropdown, 0, all));
    }
    lines
}

/// Format the detail view of a task; `html` renders task links as anchors
pub fn format_task_detail(
    checklist: &Checklist,
    dropdown: &Dropdown,
    task: &Task,
    pages: &[LearningPage],
    referrer: Option<&str>,
    html: bool,
) -> Vec<String> {
    let mut lines = vec![format_task_line(task)];
    lines.push(format!("in: {} › {}", checklist.title, dropdown.title));
    if !task.content.subheader.is_empty() {
        lines.push(task.content.subheader.clone());
    }
    if !task.content.body.is_empty() {
        lines.push(String::new());
        let body = if html {
            render_task_links(&task.content.body)
        } else {
            render_task_links_plain(&task.content.body)
        };
        for line in body.lines() {
            lines.push(format!("  {}", line));
        }
    }
    if !pages.is_empty() {
        lines.push(String::new());
        lines.push("learn more:".to_string());
        for page in pages {
            lines.push(format!("  {} {}", page.id, page.title));
        }
    }
    if let Some(referrer) = referrer {
        lines.push(String::new());
        lines.push(format!("back: {}", referrer));
    }
    lines
}

pub fn format_page_line(page: &LearningPage) -> String {
    if page.task_ids.is_empty() {
        format!("{} {}", page.id, page.title)
    } else {
        format!("{} {}  [{}]", page.id, page.title, page.task_ids.join(", "))
    }
}

/// Format a learning page; `html` renders task links as anchors
pub fn format_page(page: &LearningPage, html: bool) -> Vec<String> {
    let mut lines = vec![format!("{} {}", page.id, page.title)];
    lines.push(format!(
        "updated: {}",
        page.updated_at.format("%Y-%m-%d %H:%M")
    ));
    if !page.task_ids.is_empty() {
        lines.push(format!("tasks: {}", page.task_ids.join(", ")));
    }
    if !page.body.is_empty() {
        lines.push(String::new());
        let body = if html {
            render_task_links(&page.body)
        } else {
            render_task_links_plain(&page.body)
        };
        lines.extend(body.lines().map(str::to_string));
    }
    lines
}

pub fn format_drop_outcome(outcome: &DropOutcome) -> String {
    match outcome {
        DropOutcome::NoDrag => "nothing was being dragged".to_string(),
        DropOutcome::SameItem => "dropped on itself; order unchanged".to_string(),
        DropOutcome::KindMismatch => {
            "sections and tasks can't be dropped on each other; order unchanged".to_string()
        }
        DropOutcome::CrossParent => {
            "items must share a parent to be reordered; order unchanged".to_string()
        }
        DropOutcome::Stale => "item no longer exists; order unchanged".to_string(),
        DropOutcome::Reorder(plan) => format!("new {} order: {}", plan.kind, plan.order.join(", ")),
    }
}

pub fn format_recovery_entry(entry: &RecoveryEntry) -> Vec<String> {
    let mut lines = vec![format!(
        "{} {}: {}",
        entry.timestamp.format("%Y-%m-%d %H:%M:%S"),
        entry.category,
        entry.description
    )];
    for (key, value) in &entry.fields {
        lines.push(format!("  {}: {}", key, value));
    }
    lines
}
