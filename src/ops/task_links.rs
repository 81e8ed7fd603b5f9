use std::ops::Range;
use std::sync::LazyLock;

use regex::{Captures, Regex};

use crate::model::checklist::Checklist;
use crate::ops::tree_ops::find_task_anywhere;

/// `[[task:<id>|<label>]]`. IDs are ASCII alphanumerics and hyphens; the label
/// runs to the first `]`.
static TASK_LINK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\[\[task:([a-zA-Z0-9-]+)\|([^\]]+)\]\]").expect("task link pattern is valid")
});

/// A task-link marker found in body text
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskLink {
    pub id: String,
    pub label: String,
    /// Byte range of the whole marker in the source text
    pub span: Range<usize>,
}

/// Replace every marker with an anchor the detail view can intercept.
///
/// Text without markers comes back unchanged, so rendering already-rendered
/// output is a no-op.
pub fn render_task_links(text: &str) -> String {
    TASK_LINK
        .replace_all(text, |caps: &Captures| {
            format!(
                r##"<a href="#" data-task-id="{}" class="task-link">{}</a>"##,
                &caps[1], &caps[2]
            )
        })
        .into_owned()
}

/// Plain-text rendering for terminals: `label [→ id]`.
pub fn render_task_links_plain(text: &str) -> String {
    TASK_LINK
        .replace_all(text, |caps: &Captures| format!("{} [→ {}]", &caps[2], &caps[1]))
        .into_owned()
}

/// All markers in `text`, in order of appearance.
pub fn extract_task_links(text: &str) -> Vec<TaskLink> {
    TASK_LINK
        .captures_iter(text)
        .filter_map(|caps| {
            let whole = caps.get(0)?;
            Some(TaskLink {
                id: caps[1].to_string(),
                label: caps[2].to_string(),
                span: whole.start()..whole.end(),
            })
        })
        .collect()
}

/// Markers whose target task doesn't exist anywhere in the tree.
pub fn unresolved_task_links(text: &str, tree: &[Checklist]) -> Vec<TaskLink> {
    extract_task_links(text)
        .into_iter()
        .filter(|link| find_task_anywhere(tree, &link.id).is_none())
        .collect()
}
