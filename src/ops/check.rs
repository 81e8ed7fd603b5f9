use std::collections::HashMap;

use serde::Serialize;

use crate::model::checklist::Checklist;
use crate::model::dropdown::Dropdown;
use crate::model::learning_page::LearningPage;
use crate::ops::task_links::extract_task_links;
use crate::ops::tree_ops::{for_each_dropdown, for_each_task};

/// Structured result from `ac check`, suitable for --json output.
#[derive(Debug, Default, Serialize)]
pub struct CheckResult {
    pub valid: bool,
    pub errors: Vec<CheckError>,
    pub warnings: Vec<CheckWarning>,
}

/// A validation error (something that should be fixed).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type")]
pub enum CheckError {
    /// The same ID is used by more than one node of a kind
    #[serde(rename = "duplicate_id")]
    DuplicateId { kind: String, id: String, count: usize },
    /// A `[[task:…]]` marker in a task body points at a missing task
    #[serde(rename = "dangling_task_link")]
    DanglingTaskLink { task_id: String, target: String },
    /// A learning page is linked to a task that doesn't exist
    #[serde(rename = "dangling_page_link")]
    DanglingPageLink { page_id: String, task_id: String },
}

/// A validation warning (non-critical issue).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type")]
pub enum CheckWarning {
    /// Positions in a sibling group aren't 0..n-1
    #[serde(rename = "sparse_positions")]
    SparsePositions { parent: String, positions: Vec<i64> },
    /// Two siblings share a position, so their order is ambiguous
    #[serde(rename = "duplicate_position")]
    DuplicatePosition { parent: String, position: i64 },
    #[serde(rename = "empty_title")]
    EmptyTitle { kind: String, id: String },
}

// ---------------------------------------------------------------------------
// Entry points
// ---------------------------------------------------------------------------

/// Validate a checklist tree. Read-only.
///
/// Checks performed:
/// 1. No duplicate checklist, dropdown or task IDs
/// 2. Task-link markers in task bodies resolve
/// 3. Warnings for sparse or duplicated sibling positions and empty titles
pub fn check_tree(tree: &[Checklist]) -> CheckResult {
    let mut result = CheckResult::default();

    let mut checklist_ids: HashMap<&str, usize> = HashMap::new();
    let mut dropdown_ids: HashMap<String, usize> = HashMap::new();
    let mut task_ids: HashMap<String, usize> = HashMap::new();

    for checklist in tree {
        *checklist_ids.entry(checklist.id.as_str()).or_default() += 1;
        if checklist.title.trim().is_empty() {
            result.warnings.push(CheckWarning::EmptyTitle {
                kind: "checklist".into(),
                id: checklist.id.clone(),
            });
        }
        check_positions(&checklist.id, &checklist.dropdowns, |d| d.position, &mut result);

        for_each_dropdown(&checklist.dropdowns, &mut |d: &Dropdown, _depth| {
            *dropdown_ids.entry(d.id.clone()).or_default() += 1;
            if d.title.trim().is_empty() {
                result.warnings.push(CheckWarning::EmptyTitle {
                    kind: "dropdown".into(),
                    id: d.id.clone(),
                });
            }
            check_positions(&d.id, &d.dropdowns, |c| c.position, &mut result);
            check_positions(&d.id, &d.tasks, |t| t.position, &mut result);
        });

        for_each_task(&checklist.dropdowns, &mut |t| {
            *task_ids.entry(t.id.clone()).or_default() += 1;
            if t.title.trim().is_empty() {
                result.warnings.push(CheckWarning::EmptyTitle {
                    kind: "task".into(),
                    id: t.id.clone(),
                });
            }
        });
    }

    push_duplicates("checklist", checklist_ids, &mut result);
    push_duplicates("dropdown", dropdown_ids.iter().map(|(k, v)| (k.as_str(), *v)), &mut result);
    push_duplicates("task", task_ids.iter().map(|(k, v)| (k.as_str(), *v)), &mut result);

    for checklist in tree {
        for_each_task(&checklist.dropdowns, &mut |t| {
            for link in extract_task_links(&t.content.body) {
                if !task_ids.contains_key(&link.id) {
                    result.errors.push(CheckError::DanglingTaskLink {
                        task_id: t.id.clone(),
                        target: link.id,
                    });
                }
            }
        });
    }

    result.valid = result.errors.is_empty();
    result
}

/// `check_tree` plus learning-page link validation.
pub fn check_workspace(tree: &[Checklist], pages: &[LearningPage]) -> CheckResult {
    let mut result = check_tree(tree);
    let mut known = std::collections::HashSet::new();
    for checklist in tree {
        for_each_task(&checklist.dropdowns, &mut |t| {
            known.insert(t.id.clone());
        });
    }
    for page in pages {
        for task_id in &page.task_ids {
            if !known.contains(task_id) {
                result.errors.push(CheckError::DanglingPageLink {
                    page_id: page.id.clone(),
                    task_id: task_id.clone(),
                });
            }
        }
        if page.title.trim().is_empty() {
            result.warnings.push(CheckWarning::EmptyTitle {
                kind: "page".into(),
                id: page.id.clone(),
            });
        }
    }
    result.valid = result.errors.is_empty();
    result
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn push_duplicates<'a>(
    kind: &str,
    counts: impl IntoIterator<Item = (&'a str, usize)>,
    result: &mut CheckResult,
) {
    let mut dups: Vec<(&str, usize)> = counts.into_iter().filter(|(_, n)| *n > 1).collect();
    dups.sort();
    for (id, count) in dups {
        result.errors.push(CheckError::DuplicateId {
            kind: kind.to_string(),
            id: id.to_string(),
            count,
        });
    }
}

fn check_positions<T>(
    parent: &str,
    items: &[T],
    position_of: impl Fn(&T) -> Option<i64>,
    result: &mut CheckResult,
) {
    let mut positions: Vec<i64> = items.iter().filter_map(&position_of).collect();
    if positions.is_empty() {
        return;
    }
    positions.sort_unstable();
    let mut duplicated = false;
    for pair in positions.windows(2) {
        if pair[0] == pair[1] {
            duplicated = true;
            result.warnings.push(CheckWarning::DuplicatePosition {
                parent: parent.to_string(),
                position: pair[0],
            });
        }
    }
    let dense = positions.iter().enumerate().all(|(i, &p)| p == i as i64);
    if !dense && !duplicated {
        result.warnings.push(CheckWarning::SparsePositions {
            parent: parent.to_string(),
            positions,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::task::{Task, TaskContent};
    use chrono::Utc;
    use pretty_assertions::assert_eq;

    fn positioned(mut d: Dropdown, p: i64) -> Dropdown {
        d.position = Some(p);
        d
    }

    fn clean_tree() -> Vec<Checklist> {
        vec![Checklist::new("C-001", "After a death").with_dropdowns(vec![
            positioned(
                Dropdown::new("D-001", "First days").with_tasks(vec![
                    Task::new("T-001", "Register the death"),
                    Task::new("T-002", "Contact the bank").with_content(TaskContent::new(
                        "",
                        "Needs [[task:T-001|the certificate]]",
                    )),
                ]),
                0,
            ),
            positioned(Dropdown::new("D-002", "Later"), 1),
        ])]
    }

    #[test]
    fn clean_tree_is_valid() {
        let result = check_tree(&clean_tree());
        assert!(result.valid);
        assert!(result.errors.is_empty());
        assert!(result.warnings.is_empty(), "{:?}", result.warnings);
    }

    #[test]
    fn duplicate_ids_across_depths() {
        let mut tree = clean_tree();
        tree[0].dropdowns[1]
            .dropdowns
            .push(Dropdown::new("D-003", "deep").with_tasks(vec![Task::new("T-001", "again")]));
        let result = check_tree(&tree);
        assert!(!result.valid);
        assert_eq!(
            result.errors,
            vec![CheckError::DuplicateId {
                kind: "task".into(),
                id: "T-001".into(),
                count: 2
            }]
        );
    }

    #[test]
    fn dangling_task_link_is_error() {
        let mut tree = clean_tree();
        tree[0].dropdowns[0].tasks[0].content.body = "see [[task:T-404|nowhere]]".into();
        let result = check_tree(&tree);
        assert_eq!(
            result.errors,
            vec![CheckError::DanglingTaskLink {
                task_id: "T-001".into(),
                target: "T-404".into()
            }]
        );
    }

    #[test]
    fn position_warnings() {
        let mut tree = clean_tree();
        tree[0].dropdowns[1].position = Some(5);
        let result = check_tree(&tree);
        assert!(result.valid);
        assert_eq!(
            result.warnings,
            vec![CheckWarning::SparsePositions {
                parent: "C-001".into(),
                positions: vec![0, 5]
            }]
        );

        tree[0].dropdowns[1].position = Some(0);
        let result = check_tree(&tree);
        assert_eq!(
            result.warnings,
            vec![CheckWarning::DuplicatePosition {
                parent: "C-001".into(),
                position: 0
            }]
        );
    }

    #[test]
    fn empty_title_warning() {
        let mut tree = clean_tree();
        tree[0].dropdowns[0].tasks[1].title = "  ".into();
        let result = check_tree(&tree);
        assert_eq!(
            result.warnings,
            vec![CheckWarning::EmptyTitle {
                kind: "task".into(),
                id: "T-002".into()
            }]
        );
    }

    #[test]
    fn dangling_page_link() {
        let now = Utc::now();
        let page = LearningPage {
            id: "P-001".into(),
            title: "Probate".into(),
            body: String::new(),
            author_id: "U-001".into(),
            created_at: now,
            updated_at: now,
            task_ids: vec!["T-001".into(), "T-999".into()],
        };
        let result = check_workspace(&clean_tree(), &[page]);
        assert!(!result.valid);
        assert_eq!(
            result.errors,
            vec![CheckError::DanglingPageLink {
                page_id: "P-001".into(),
                task_id: "T-999".into()
            }]
        );
    }

    #[test]
    fn result_serializes_with_type_tags() {
        let mut tree = clean_tree();
        tree[0].dropdowns[0].tasks[0].content.body = "[[task:X-1|x]]".into();
        let json = serde_json::to_value(check_tree(&tree)).unwrap();
        assert_eq!(json["valid"], false);
        assert_eq!(json["errors"][0]["type"], "dangling_task_link");
        assert_eq!(json["errors"][0]["target"], "X-1");
    }
}
