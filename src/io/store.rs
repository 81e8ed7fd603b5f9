use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::io::lock::{FileLock, LockError};
use crate::io::recovery::{RecoveryCategory, RecoveryEntry, atomic_write, log_recovery};
use crate::model::checklist::{Checklist, ChecklistDraft, sort_by_position};
use crate::model::dropdown::{Dropdown, DropdownDraft};
use crate::model::learning_page::{LearningPage, LearningPageDraft};
use crate::model::task::{Task, TaskContent, TaskDraft};
use crate::model::user::{User, UserRole};
use crate::ops::reorder::{ItemKind, PositionUpdate};

pub const STORE_FILE: &str = "store.json";

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("{kind} {id} not found")]
    NotFound { kind: &'static str, id: String },
    #[error("permission denied: only admins can {action}")]
    PermissionDenied { action: &'static str },
    #[error("invalid input: {0}")]
    Invalid(String),
    #[error("a user with email {0} already exists")]
    EmailTaken(String),
    #[error(transparent)]
    Lock(#[from] LockError),
    #[error("could not access {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("store data is corrupt: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("creating {what} failed after {created} rows (all rolled back): {source}")]
    PartialCreate {
        what: String,
        created: usize,
        #[source]
        source: Box<StoreError>,
    },
}

impl StoreError {
    fn not_found(kind: &'static str, id: &str) -> Self {
        StoreError::NotFound {
            kind,
            id: id.to_string(),
        }
    }

    pub fn is_permission_denied(&self) -> bool {
        matches!(self, StoreError::PermissionDenied { .. })
    }
}

// ---------------------------------------------------------------------------
// Adapter trait
// ---------------------------------------------------------------------------

/// The only write path to persisted checklist state.
///
/// Completion is per user: `fetch_tree` reports each task's `completed` as the
/// caller's own completion record, falling back to the task's default.
pub trait SyncAdapter {
    fn fetch_tree(&self, user: Option<&User>) -> Result<Vec<Checklist>, StoreError>;

    fn create_checklist(&self, user: &User, draft: &ChecklistDraft)
    -> Result<Checklist, StoreError>;
    fn update_checklist(&self, user: &User, id: &str, title: &str)
    -> Result<Checklist, StoreError>;
    fn delete_checklist(&self, user: &User, id: &str) -> Result<(), StoreError>;

    fn create_dropdown(
        &self,
        user: &User,
        checklist_id: &str,
        draft: &DropdownDraft,
        parent: Option<&str>,
    ) -> Result<Dropdown, StoreError>;
    fn update_dropdown(&self, user: &User, dropdown: &Dropdown) -> Result<Dropdown, StoreError>;
    fn delete_dropdown(&self, user: &User, id: &str) -> Result<(), StoreError>;

    fn create_task(&self, user: &User, dropdown_id: &str, draft: &TaskDraft)
    -> Result<Task, StoreError>;
    fn update_task(&self, user: &User, task: &Task) -> Result<Task, StoreError>;
    fn delete_task(&self, user: &User, id: &str) -> Result<(), StoreError>;

    fn toggle_completion(&self, user: &User, task_id: &str, completed: bool)
    -> Result<(), StoreError>;
    fn toggle_expanded(&self, user: &User, dropdown_id: &str, expanded: bool)
    -> Result<(), StoreError>;
    fn update_positions(
        &self,
        user: &User,
        kind: ItemKind,
        updates: &[PositionUpdate],
    ) -> Result<(), StoreError>;

    fn list_pages(&self) -> Result<Vec<LearningPage>, StoreError>;
    fn get_page(&self, id: &str) -> Result<LearningPage, StoreError>;
    fn create_page(&self, user: &User, draft: &LearningPageDraft)
    -> Result<LearningPage, StoreError>;
    fn update_page(
        &self,
        user: &User,
        id: &str,
        draft: &LearningPageDraft,
    ) -> Result<LearningPage, StoreError>;
    fn delete_page(&self, user: &User, id: &str) -> Result<(), StoreError>;
    fn link_page(&self, user: &User, page_id: &str, task_id: &str) -> Result<(), StoreError>;
    /// Returns false if the link didn't exist.
    fn unlink_page(&self, user: &User, page_id: &str, task_id: &str) -> Result<bool, StoreError>;
    fn pages_for_task(&self, task_id: &str) -> Result<Vec<LearningPage>, StoreError>;

    fn sign_up(&self, email: &str, role: UserRole) -> Result<User, StoreError>;
    fn find_user(&self, email: &str) -> Result<Option<User>, StoreError>;
    fn list_users(&self) -> Result<Vec<User>, StoreError>;
}

// ---------------------------------------------------------------------------
// Persisted rows
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChecklistRow {
    pub id: String,
    pub title: String,
    /// Creating user
    pub user_id: String,
    /// Visible to every user (set for admin-authored checklists)
    pub is_global: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DropdownRow {
    pub id: String,
    pub title: String,
    pub checklist_id: String,
    #[serde(default)]
    pub parent_dropdown_id: Option<String>,
    pub expanded: bool,
    #[serde(default)]
    pub position: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TaskRow {
    pub id: String,
    pub title: String,
    pub default_completed: bool,
    #[serde(default)]
    pub content_subheader: String,
    #[serde(default)]
    pub content_text: String,
    pub dropdown_id: String,
    #[serde(default)]
    pub position: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CompletionRow {
    pub user_id: String,
    pub task_id: String,
    pub completed: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PageRow {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub body: String,
    pub author_id: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PageLinkRow {
    pub task_id: String,
    pub learning_page_id: String,
}

/// The whole of `store.json`: one table per relation, keyed by row id.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct StoreData {
    #[serde(default)]
    pub users: IndexMap<String, User>,
    #[serde(default)]
    pub checklists: IndexMap<String, ChecklistRow>,
    #[serde(default)]
    pub dropdowns: IndexMap<String, DropdownRow>,
    #[serde(default)]
    pub tasks: IndexMap<String, TaskRow>,
    /// Keyed by `user_id/task_id`
    #[serde(default)]
    pub user_task_completions: IndexMap<String, CompletionRow>,
    #[serde(default)]
    pub learning_pages: IndexMap<String, PageRow>,
    #[serde(default)]
    pub task_learning_pages: Vec<PageLinkRow>,
    /// Highest number ever issued per id prefix; never decreases, so ids of
    /// deleted rows are not handed out again.
    #[serde(default)]
    pub next_ids: IndexMap<String, usize>,
}

fn completion_key(user_id: &str, task_id: &str) -> String {
    format!("{}/{}", user_id, task_id)
}

/// Highest `PREFIX-NNN` number among `keys`, 0 when there is none.
fn highest_id<'a>(keys: impl Iterator<Item = &'a String>, prefix: &str) -> usize {
    let prefix_dash = format!("{}-", prefix);
    keys.filter_map(|k| k.strip_prefix(&prefix_dash))
        .filter_map(|n| n.parse::<usize>().ok())
        .max()
        .unwrap_or(0)
}

/// Position for a new sibling appended after the existing ones.
fn next_position(existing: impl Iterator<Item = Option<i64>>) -> i64 {
    existing.flatten().max().map_or(0, |p| p + 1)
}

fn require_admin(user: &User, action: &'static str) -> Result<(), StoreError> {
    if user.is_admin() {
        Ok(())
    } else {
        warn!(user = %user.email, action, "rejected non-admin mutation");
        Err(StoreError::PermissionDenied { action })
    }
}

fn require_title(kind: &str, title: &str) -> Result<(), StoreError> {
    if title.trim().is_empty() {
        return Err(StoreError::Invalid(format!("{} title cannot be empty", kind)));
    }
    Ok(())
}

/// A row written during a composite create, for compensating deletes.
#[derive(Debug, Clone)]
enum CreatedRow {
    Checklist(String),
    Dropdown(String),
    Task(String),
}

// ---------------------------------------------------------------------------
// Tree assembly
// ---------------------------------------------------------------------------

impl StoreData {
    /// Issue the next id for a table. Seeds the counter from existing rows
    /// so stores written before `next_ids` existed keep counting upward.
    fn allocate_id(&mut self, prefix: &str) -> String {
        let existing = match prefix {
            "U" => highest_id(self.users.keys(), prefix),
            "C" => highest_id(self.checklists.keys(), prefix),
            "D" => highest_id(self.dropdowns.keys(), prefix),
            "T" => highest_id(self.tasks.keys(), prefix),
            "P" => highest_id(self.learning_pages.keys(), prefix),
            _ => 0,
        };
        let counter = self.next_ids.entry(prefix.to_string()).or_insert(0);
        *counter = (*counter).max(existing) + 1;
        format!("{}-{:03}", prefix, *counter)
    }

    fn checklist_visible(&self, row: &ChecklistRow, user: Option<&User>) -> bool {
        row.is_global || user.is_some_and(|u| u.id == row.user_id)
    }

    fn build_tree(&self, user: Option<&User>) -> Vec<Checklist> {
        self.checklists
            .values()
            .filter(|row| self.checklist_visible(row, user))
            .map(|row| self.build_checklist(row, user))
            .collect()
    }

    fn build_checklist(&self, row: &ChecklistRow, user: Option<&User>) -> Checklist {
        Checklist {
            id: row.id.clone(),
            title: row.title.clone(),
            dropdowns: self.build_children(&row.id, None, user),
        }
    }

    fn build_children(
        &self,
        checklist_id: &str,
        parent: Option<&str>,
        user: Option<&User>,
    ) -> Vec<Dropdown> {
        let mut dropdowns: Vec<Dropdown> = self
            .dropdowns
            .values()
            .filter(|d| d.checklist_id == checklist_id && d.parent_dropdown_id.as_deref() == parent)
            .map(|d| self.build_dropdown(d, user))
            .collect();
        sort_by_position(&mut dropdowns);
        dropdowns
    }

    fn build_dropdown(&self, row: &DropdownRow, user: Option<&User>) -> Dropdown {
        let mut tasks: Vec<Task> = self
            .tasks
            .values()
            .filter(|t| t.dropdown_id == row.id)
            .map(|t| self.build_task(t, user))
            .collect();
        sort_by_position(&mut tasks);
        Dropdown {
            id: row.id.clone(),
            title: row.title.clone(),
            expanded: row.expanded,
            tasks,
            dropdowns: self.build_children(&row.checklist_id, Some(&row.id), user),
            position: row.position,
        }
    }

    fn build_task(&self, row: &TaskRow, user: Option<&User>) -> Task {
        let completed = user
            .and_then(|u| self.user_task_completions.get(&completion_key(&u.id, &row.id)))
            .map_or(row.default_completed, |c| c.completed);
        Task {
            id: row.id.clone(),
            title: row.title.clone(),
            completed,
            content: TaskContent::new(row.content_subheader.clone(), row.content_text.clone()),
            position: row.position,
        }
    }

    fn build_page(&self, row: &PageRow) -> LearningPage {
        LearningPage {
            id: row.id.clone(),
            title: row.title.clone(),
            body: row.body.clone(),
            author_id: row.author_id.clone(),
            created_at: row.created_at,
            updated_at: row.updated_at,
            task_ids: self
                .task_learning_pages
                .iter()
                .filter(|l| l.learning_page_id == row.id)
                .map(|l| l.task_id.clone())
                .collect(),
        }
    }

    fn dropdown_row(&self, id: &str) -> Result<&DropdownRow, StoreError> {
        self.dropdowns
            .get(id)
            .ok_or_else(|| StoreError::not_found("dropdown", id))
    }

    fn task_row(&self, id: &str) -> Result<&TaskRow, StoreError> {
        self.tasks.get(id).ok_or_else(|| StoreError::not_found("task", id))
    }

    fn set_completion(&mut self, user_id: &str, task_id: &str, completed: bool) {
        self.user_task_completions.insert(
            completion_key(user_id, task_id),
            CompletionRow {
                user_id: user_id.to_string(),
                task_id: task_id.to_string(),
                completed,
            },
        );
    }

    // -----------------------------------------------------------------------
    // Row inserts
    // -----------------------------------------------------------------------

    fn insert_checklist(
        &mut self,
        user: &User,
        draft: &ChecklistDraft,
        created: &mut Vec<CreatedRow>,
    ) -> Result<String, StoreError> {
        require_title("checklist", &draft.title)?;
        let id = self.allocate_id("C");
        self.checklists.insert(
            id.clone(),
            ChecklistRow {
                id: id.clone(),
                title: draft.title.clone(),
                user_id: user.id.clone(),
                is_global: user.is_admin(),
            },
        );
        created.push(CreatedRow::Checklist(id.clone()));
        for dropdown in &draft.dropdowns {
            self.insert_dropdown(user, &id, None, dropdown, created)?;
        }
        Ok(id)
    }

    fn insert_dropdown(
        &mut self,
        user: &User,
        checklist_id: &str,
        parent: Option<&str>,
        draft: &DropdownDraft,
        created: &mut Vec<CreatedRow>,
    ) -> Result<String, StoreError> {
        require_title("dropdown", &draft.title)?;
        let id = self.allocate_id("D");
        let position = next_position(
            self.dropdowns
                .values()
                .filter(|d| {
                    d.checklist_id == checklist_id && d.parent_dropdown_id.as_deref() == parent
                })
                .map(|d| d.position),
        );
        self.dropdowns.insert(
            id.clone(),
            DropdownRow {
                id: id.clone(),
                title: draft.title.clone(),
                checklist_id: checklist_id.to_string(),
                parent_dropdown_id: parent.map(str::to_string),
                expanded: draft.expanded,
                position: Some(position),
            },
        );
        created.push(CreatedRow::Dropdown(id.clone()));
        for task in &draft.tasks {
            self.insert_task(user, &id, task, created)?;
        }
        for nested in &draft.dropdowns {
            self.insert_dropdown(user, checklist_id, Some(&id), nested, created)?;
        }
        Ok(id)
    }

    fn insert_task(
        &mut self,
        user: &User,
        dropdown_id: &str,
        draft: &TaskDraft,
        created: &mut Vec<CreatedRow>,
    ) -> Result<String, StoreError> {
        require_title("task", &draft.title)?;
        let id = self.allocate_id("T");
        let position = next_position(
            self.tasks
                .values()
                .filter(|t| t.dropdown_id == dropdown_id)
                .map(|t| t.position),
        );
        self.tasks.insert(
            id.clone(),
            TaskRow {
                id: id.clone(),
                title: draft.title.clone(),
                default_completed: draft.completed,
                content_subheader: draft.content.subheader.clone(),
                content_text: draft.content.body.clone(),
                dropdown_id: dropdown_id.to_string(),
                position: Some(position),
            },
        );
        self.set_completion(&user.id, &id, draft.completed);
        created.push(CreatedRow::Task(id.clone()));
        Ok(id)
    }

    /// Undo a partial composite create, newest row first. Returns rows removed.
    fn compensate(&mut self, created: &[CreatedRow]) -> usize {
        for row in created.iter().rev() {
            match row {
                CreatedRow::Task(id) => self.remove_task(id),
                CreatedRow::Dropdown(id) => {
                    self.dropdowns.shift_remove(id);
                }
                CreatedRow::Checklist(id) => {
                    self.checklists.shift_remove(id);
                }
            }
        }
        created.len()
    }

    // -----------------------------------------------------------------------
    // Cascading deletes
    // -----------------------------------------------------------------------

    fn remove_task(&mut self, id: &str) {
        self.tasks.shift_remove(id);
        self.user_task_completions.retain(|_, c| c.task_id != id);
        self.task_learning_pages.retain(|l| l.task_id != id);
    }

    /// Remove a dropdown, every dropdown below it, and all their tasks.
    fn remove_dropdown(&mut self, id: &str) -> usize {
        let mut doomed = vec![id.to_string()];
        let mut i = 0;
        while i < doomed.len() {
            let parent = doomed[i].clone();
            doomed.extend(
                self.dropdowns
                    .values()
                    .filter(|d| d.parent_dropdown_id.as_deref() == Some(parent.as_str()))
                    .map(|d| d.id.clone()),
            );
            i += 1;
        }
        let doomed: HashSet<String> = doomed.into_iter().collect();
        let task_ids: Vec<String> = self
            .tasks
            .values()
            .filter(|t| doomed.contains(&t.dropdown_id))
            .map(|t| t.id.clone())
            .collect();
        for task_id in &task_ids {
            self.remove_task(task_id);
        }
        self.dropdowns.retain(|k, _| !doomed.contains(k));
        doomed.len() + task_ids.len()
    }

    fn remove_checklist(&mut self, id: &str) -> usize {
        let roots: Vec<String> = self
            .dropdowns
            .values()
            .filter(|d| d.checklist_id == id && d.parent_dropdown_id.is_none())
            .map(|d| d.id.clone())
            .collect();
        let mut removed = 1;
        for root in roots {
            removed += self.remove_dropdown(&root);
        }
        self.checklists.shift_remove(id);
        removed
    }
}

// ---------------------------------------------------------------------------
// File-backed store
// ---------------------------------------------------------------------------

/// `SyncAdapter` over a JSON document in the workspace data directory.
///
/// Reads see the last complete write (writes go through a temp file and
/// rename). Writes hold the advisory lock for the whole read-modify-write,
/// so a caller blocked longer than `lock_timeout_ms` gets `StoreError::Lock`.
#[derive(Debug, Clone)]
pub struct FileStore {
    data_dir: PathBuf,
    lock_timeout_ms: u64,
}

impl FileStore {
    pub fn open(data_dir: &Path, lock_timeout_ms: u64) -> Self {
        FileStore {
            data_dir: data_dir.to_path_buf(),
            lock_timeout_ms,
        }
    }

    pub fn path(&self) -> PathBuf {
        self.data_dir.join(STORE_FILE)
    }

    /// Read the whole document. A missing file is an empty store.
    pub fn load(&self) -> Result<StoreData, StoreError> {
        let path = self.path();
        match fs::read_to_string(&path) {
            Ok(text) => Ok(serde_json::from_str(&text)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(StoreData::default()),
            Err(e) => Err(StoreError::Io { path, source: e }),
        }
    }

    /// Every checklist regardless of owner, with default completion.
    pub fn fetch_all(&self) -> Result<Vec<Checklist>, StoreError> {
        let data = self.load()?;
        Ok(data
            .checklists
            .values()
            .map(|row| data.build_checklist(row, None))
            .collect())
    }

    fn save(&self, data: &StoreData) -> Result<(), StoreError> {
        let path = self.path();
        let mut json = serde_json::to_string_pretty(data)?;
        json.push('\n');
        atomic_write(&path, json.as_bytes()).map_err(|e| StoreError::Io { path, source: e })
    }

    /// Locked read-modify-write. Nothing is saved when `f` fails.
    fn mutate<T>(
        &self,
        op: &'static str,
        f: impl FnOnce(&mut StoreData) -> Result<T, StoreError>,
    ) -> Result<T, StoreError> {
        let _lock = FileLock::acquire_ms(&self.data_dir, self.lock_timeout_ms)?;
        let mut data = self.load()?;
        let out = f(&mut data)?;
        if let Err(e) = self.save(&data) {
            log_recovery(
                &self.data_dir,
                RecoveryEntry::now(RecoveryCategory::Write, format!("{} not saved", op))
                    .field("Error", e.to_string()),
            );
            return Err(e);
        }
        debug!(op, "store write");
        Ok(out)
    }

    fn log_partial_create(&self, what: &str, created: &[CreatedRow], cause: &StoreError) {
        let rows: Vec<String> = created
            .iter()
            .map(|r| match r {
                CreatedRow::Checklist(id) | CreatedRow::Dropdown(id) | CreatedRow::Task(id) => {
                    id.clone()
                }
            })
            .collect();
        warn!(what, rows = rows.len(), error = %cause, "composite create rolled back");
        log_recovery(
            &self.data_dir,
            RecoveryEntry::now(RecoveryCategory::PartialCreate, format!("{} rolled back", what))
                .field("Rows", rows.join(", "))
                .field("Error", cause.to_string()),
        );
    }

    /// Run a composite create; on failure after the first row, undo every
    /// row it wrote and report `PartialCreate`.
    fn composite<T>(
        &self,
        data: &mut StoreData,
        what: String,
        create: impl FnOnce(&mut StoreData, &mut Vec<CreatedRow>) -> Result<T, StoreError>,
    ) -> Result<T, StoreError> {
        let mut created = Vec::new();
        match create(data, &mut created) {
            Ok(out) => Ok(out),
            Err(e) if created.is_empty() => Err(e),
            Err(e) => {
                self.log_partial_create(&what, &created, &e);
                let rolled_back = data.compensate(&created);
                Err(StoreError::PartialCreate {
                    what,
                    created: rolled_back,
                    source: Box::new(e),
                })
            }
        }
    }

    fn log_deleted(&self, kind: &str, id: &str, rows: usize, snapshot: impl Serialize) {
        info!(kind, id, rows, "cascading delete");
        let body = serde_json::to_string_pretty(&snapshot).unwrap_or_default();
        log_recovery(
            &self.data_dir,
            RecoveryEntry::now(RecoveryCategory::Delete, format!("{} {} deleted", kind, id))
                .field("Rows", rows.to_string())
                .body(body),
        );
    }
}

impl SyncAdapter for FileStore {
    fn fetch_tree(&self, user: Option<&User>) -> Result<Vec<Checklist>, StoreError> {
        Ok(self.load()?.build_tree(user))
    }

    fn create_checklist(
        &self,
        user: &User,
        draft: &ChecklistDraft,
    ) -> Result<Checklist, StoreError> {
        require_admin(user, "create checklists")?;
        self.mutate("create_checklist", |data| {
            let what = format!("checklist \"{}\"", draft.title);
            let id = self.composite(data, what, |data, created| {
                data.insert_checklist(user, draft, created)
            })?;
            let row = data
                .checklists
                .get(&id)
                .ok_or_else(|| StoreError::not_found("checklist", &id))?;
            Ok(data.build_checklist(row, Some(user)))
        })
    }

    fn update_checklist(
        &self,
        user: &User,
        id: &str,
        title: &str,
    ) -> Result<Checklist, StoreError> {
        require_admin(user, "rename checklists")?;
        require_title("checklist", title)?;
        self.mutate("update_checklist", |data| {
            let row = data
                .checklists
                .get_mut(id)
                .ok_or_else(|| StoreError::not_found("checklist", id))?;
            row.title = title.to_string();
            let row = row.clone();
            Ok(data.build_checklist(&row, Some(user)))
        })
    }

    fn delete_checklist(&self, user: &User, id: &str) -> Result<(), StoreError> {
        require_admin(user, "delete checklists")?;
        let (rows, snapshot) = self.mutate("delete_checklist", |data| {
            let row = data
                .checklists
                .get(id)
                .ok_or_else(|| StoreError::not_found("checklist", id))?;
            let snapshot = data.build_checklist(row, Some(user));
            Ok((data.remove_checklist(id), snapshot))
        })?;
        self.log_deleted("checklist", id, rows, snapshot);
        Ok(())
    }

    fn create_dropdown(
        &self,
        user: &User,
        checklist_id: &str,
        draft: &DropdownDraft,
        parent: Option<&str>,
    ) -> Result<Dropdown, StoreError> {
        require_admin(user, "create sections")?;
        self.mutate("create_dropdown", |data| {
            if !data.checklists.contains_key(checklist_id) {
                return Err(StoreError::not_found("checklist", checklist_id));
            }
            if let Some(parent_id) = parent {
                let parent_row = data.dropdown_row(parent_id)?;
                if parent_row.checklist_id != checklist_id {
                    return Err(StoreError::Invalid(format!(
                        "section {} is not in checklist {}",
                        parent_id, checklist_id
                    )));
                }
            }
            let what = format!("section \"{}\"", draft.title);
            let id = self.composite(data, what, |data, created| {
                data.insert_dropdown(user, checklist_id, parent, draft, created)
            })?;
            let row = data.dropdown_row(&id)?;
            Ok(data.build_dropdown(row, Some(user)))
        })
    }

    fn update_dropdown(&self, user: &User, dropdown: &Dropdown) -> Result<Dropdown, StoreError> {
        require_admin(user, "edit sections")?;
        require_title("dropdown", &dropdown.title)?;
        self.mutate("update_dropdown", |data| {
            let row = data
                .dropdowns
                .get_mut(&dropdown.id)
                .ok_or_else(|| StoreError::not_found("dropdown", &dropdown.id))?;
            row.title = dropdown.title.clone();
            row.expanded = dropdown.expanded;
            let row = row.clone();
            Ok(data.build_dropdown(&row, Some(user)))
        })
    }

    fn delete_dropdown(&self, user: &User, id: &str) -> Result<(), StoreError> {
        require_admin(user, "delete sections")?;
        let (rows, snapshot) = self.mutate("delete_dropdown", |data| {
            let snapshot = data.build_dropdown(data.dropdown_row(id)?, Some(user));
            Ok((data.remove_dropdown(id), snapshot))
        })?;
        self.log_deleted("dropdown", id, rows, snapshot);
        Ok(())
    }

    fn create_task(
        &self,
        user: &User,
        dropdown_id: &str,
        draft: &TaskDraft,
    ) -> Result<Task, StoreError> {
        require_admin(user, "create tasks")?;
        self.mutate("create_task", |data| {
            data.dropdown_row(dropdown_id)?;
            let id = data.insert_task(user, dropdown_id, draft, &mut Vec::new())?;
            Ok(data.build_task(data.task_row(&id)?, Some(user)))
        })
    }

    /// Admins rewrite the task itself (title, content, default completion).
    /// Anyone else only records their own completion; the returned task
    /// reflects what's actually stored.
    fn update_task(&self, user: &User, task: &Task) -> Result<Task, StoreError> {
        if user.is_admin() {
            require_title("task", &task.title)?;
        }
        self.mutate("update_task", |data| {
            let row = data
                .tasks
                .get_mut(&task.id)
                .ok_or_else(|| StoreError::not_found("task", &task.id))?;
            if user.is_admin() {
                row.title = task.title.clone();
                row.default_completed = task.completed;
                row.content_subheader = task.content.subheader.clone();
                row.content_text = task.content.body.clone();
            }
            data.set_completion(&user.id, &task.id, task.completed);
            Ok(data.build_task(data.task_row(&task.id)?, Some(user)))
        })
    }

    fn delete_task(&self, user: &User, id: &str) -> Result<(), StoreError> {
        require_admin(user, "delete tasks")?;
        let snapshot = self.mutate("delete_task", |data| {
            let snapshot = data.build_task(data.task_row(id)?, Some(user));
            data.remove_task(id);
            Ok(snapshot)
        })?;
        self.log_deleted("task", id, 1, snapshot);
        Ok(())
    }

    fn toggle_completion(
        &self,
        user: &User,
        task_id: &str,
        completed: bool,
    ) -> Result<(), StoreError> {
        self.mutate("toggle_completion", |data| {
            data.task_row(task_id)?;
            data.set_completion(&user.id, task_id, completed);
            Ok(())
        })
    }

    fn toggle_expanded(
        &self,
        _user: &User,
        dropdown_id: &str,
        expanded: bool,
    ) -> Result<(), StoreError> {
        self.mutate("toggle_expanded", |data| {
            let row = data
                .dropdowns
                .get_mut(dropdown_id)
                .ok_or_else(|| StoreError::not_found("dropdown", dropdown_id))?;
            row.expanded = expanded;
            Ok(())
        })
    }

    /// Set positions for one sibling group. Every ID must exist and share a
    /// parent; otherwise nothing is written.
    fn update_positions(
        &self,
        user: &User,
        kind: ItemKind,
        updates: &[PositionUpdate],
    ) -> Result<(), StoreError> {
        require_admin(user, "reorder items")?;
        self.mutate("update_positions", |data| {
            let mut parents = HashSet::new();
            for update in updates {
                let parent = match kind {
                    ItemKind::Dropdown => {
                        let row = data.dropdown_row(&update.id)?;
                        (row.checklist_id.clone(), row.parent_dropdown_id.clone())
                    }
                    ItemKind::Task => (data.task_row(&update.id)?.dropdown_id.clone(), None),
                };
                parents.insert(parent);
            }
            if parents.len() > 1 {
                return Err(StoreError::Invalid(
                    "position updates span more than one parent".to_string(),
                ));
            }
            for update in updates {
                match kind {
                    ItemKind::Dropdown => {
                        if let Some(row) = data.dropdowns.get_mut(&update.id) {
                            row.position = Some(update.position);
                        }
                    }
                    ItemKind::Task => {
                        if let Some(row) = data.tasks.get_mut(&update.id) {
                            row.position = Some(update.position);
                        }
                    }
                }
            }
            Ok(())
        })
    }

    fn list_pages(&self) -> Result<Vec<LearningPage>, StoreError> {
        let data = self.load()?;
        Ok(data.learning_pages.values().map(|p| data.build_page(p)).collect())
    }

    fn get_page(&self, id: &str) -> Result<LearningPage, StoreError> {
        let data = self.load()?;
        data.learning_pages
            .get(id)
            .map(|p| data.build_page(p))
            .ok_or_else(|| StoreError::not_found("page", id))
    }

    fn create_page(
        &self,
        user: &User,
        draft: &LearningPageDraft,
    ) -> Result<LearningPage, StoreError> {
        require_admin(user, "write learning pages")?;
        require_title("page", &draft.title)?;
        self.mutate("create_page", |data| {
            for task_id in &draft.task_ids {
                data.task_row(task_id)?;
            }
            let id = data.allocate_id("P");
            let now = Utc::now();
            let row = PageRow {
                id: id.clone(),
                title: draft.title.clone(),
                body: draft.body.clone(),
                author_id: user.id.clone(),
                created_at: now,
                updated_at: now,
            };
            data.learning_pages.insert(id.clone(), row.clone());
            for task_id in &draft.task_ids {
                data.task_learning_pages.push(PageLinkRow {
                    task_id: task_id.clone(),
                    learning_page_id: id.clone(),
                });
            }
            Ok(data.build_page(&row))
        })
    }

    /// Replace title, body and the full set of task links.
    fn update_page(
        &self,
        user: &User,
        id: &str,
        draft: &LearningPageDraft,
    ) -> Result<LearningPage, StoreError> {
        require_admin(user, "edit learning pages")?;
        require_title("page", &draft.title)?;
        self.mutate("update_page", |data| {
            for task_id in &draft.task_ids {
                data.task_row(task_id)?;
            }
            let row = data
                .learning_pages
                .get_mut(id)
                .ok_or_else(|| StoreError::not_found("page", id))?;
            row.title = draft.title.clone();
            row.body = draft.body.clone();
            row.updated_at = Utc::now();
            let row = row.clone();
            data.task_learning_pages.retain(|l| l.learning_page_id != id);
            for task_id in &draft.task_ids {
                data.task_learning_pages.push(PageLinkRow {
                    task_id: task_id.clone(),
                    learning_page_id: id.to_string(),
                });
            }
            Ok(data.build_page(&row))
        })
    }

    fn delete_page(&self, user: &User, id: &str) -> Result<(), StoreError> {
        require_admin(user, "delete learning pages")?;
        self.mutate("delete_page", |data| {
            data.learning_pages
                .shift_remove(id)
                .ok_or_else(|| StoreError::not_found("page", id))?;
            data.task_learning_pages.retain(|l| l.learning_page_id != id);
            Ok(())
        })
    }

    fn link_page(&self, user: &User, page_id: &str, task_id: &str) -> Result<(), StoreError> {
        require_admin(user, "link learning pages")?;
        self.mutate("link_page", |data| {
            if !data.learning_pages.contains_key(page_id) {
                return Err(StoreError::not_found("page", page_id));
            }
            data.task_row(task_id)?;
            let exists = data
                .task_learning_pages
                .iter()
                .any(|l| l.learning_page_id == page_id && l.task_id == task_id);
            if !exists {
                data.task_learning_pages.push(PageLinkRow {
                    task_id: task_id.to_string(),
                    learning_page_id: page_id.to_string(),
                });
            }
            Ok(())
        })
    }

    fn unlink_page(&self, user: &User, page_id: &str, task_id: &str) -> Result<bool, StoreError> {
        require_admin(user, "unlink learning pages")?;
        self.mutate("unlink_page", |data| {
            let before = data.task_learning_pages.len();
            data.task_learning_pages
                .retain(|l| !(l.learning_page_id == page_id && l.task_id == task_id));
            Ok(data.task_learning_pages.len() < before)
        })
    }

    fn pages_for_task(&self, task_id: &str) -> Result<Vec<LearningPage>, StoreError> {
        let data = self.load()?;
        Ok(data
            .task_learning_pages
            .iter()
            .filter(|l| l.task_id == task_id)
            .filter_map(|l| data.learning_pages.get(&l.learning_page_id))
            .map(|p| data.build_page(p))
            .collect())
    }

    fn sign_up(&self, email: &str, role: UserRole) -> Result<User, StoreError> {
        let email = email.trim();
        if !email.contains('@') {
            return Err(StoreError::Invalid(format!("\"{}\" is not an email address", email)));
        }
        self.mutate("sign_up", |data| {
            if data.users.values().any(|u| u.email.eq_ignore_ascii_case(email)) {
                return Err(StoreError::EmailTaken(email.to_string()));
            }
            let user = User {
                id: data.allocate_id("U"),
                email: email.to_string(),
                role,
            };
            data.users.insert(user.id.clone(), user.clone());
            info!(email, %role, "user registered");
            Ok(user)
        })
    }

    fn find_user(&self, email: &str) -> Result<Option<User>, StoreError> {
        let email = email.trim();
        Ok(self
            .load()?
            .users
            .into_values()
            .find(|u| u.email.eq_ignore_ascii_case(email)))
    }

    fn list_users(&self) -> Result<Vec<User>, StoreError> {
        Ok(self.load()?.users.into_values().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::recovery::read_recovery_entries;
    use crate::ops::check::{CheckError, check_tree};
    use crate::ops::tree_ops::find_dropdown;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    fn setup() -> (TempDir, FileStore, User, User) {
        let tmp = TempDir::new().unwrap();
        let store = FileStore::open(tmp.path(), 1000);
        let admin = store.sign_up("admin@example.com", UserRole::Admin).unwrap();
        let user = store.sign_up("ann@example.com", UserRole::User).unwrap();
        (tmp, store, admin, user)
    }

    fn draft() -> ChecklistDraft {
        let mut first = DropdownDraft::new("First days");
        first.tasks = vec![TaskDraft::new("Register the death"), TaskDraft::new("Tell family")];
        let mut money = DropdownDraft::new("Money");
        let mut banks = DropdownDraft::new("Banks");
        banks.tasks = vec![TaskDraft::new("Freeze accounts")];
        money.dropdowns = vec![banks];
        let mut checklist = ChecklistDraft::new("After a death");
        checklist.dropdowns = vec![first, money];
        checklist
    }

    #[test]
    fn ids_and_positions_are_assigned() {
        let (_tmp, store, admin, _) = setup();
        assert_eq!(admin.id, "U-001");
        let checklist = store.create_checklist(&admin, &draft()).unwrap();
        assert_eq!(checklist.id, "C-001");
        let ids: Vec<&str> = checklist.dropdowns.iter().map(|d| d.id.as_str()).collect();
        assert_eq!(ids, vec!["D-001", "D-002"]);
        assert_eq!(checklist.dropdowns[1].position, Some(1));
        let banks = &checklist.dropdowns[1].dropdowns[0];
        assert_eq!(banks.id, "D-003");
        assert_eq!(banks.position, Some(0));
        assert_eq!(banks.tasks[0].id, "T-003");
        assert_eq!(checklist.dropdowns[0].tasks[1].position, Some(1));
    }

    #[test]
    fn non_admin_cannot_author() {
        let (_tmp, store, admin, user) = setup();
        let err = store.create_checklist(&user, &draft()).unwrap_err();
        assert!(err.is_permission_denied());
        let c = store.create_checklist(&admin, &draft()).unwrap();
        assert!(store.delete_checklist(&user, &c.id).unwrap_err().is_permission_denied());
        assert!(
            store
                .create_task(&user, "D-001", &TaskDraft::new("x"))
                .unwrap_err()
                .is_permission_denied()
        );
        assert!(
            store
                .update_positions(&user, ItemKind::Dropdown, &[])
                .unwrap_err()
                .is_permission_denied()
        );
    }

    #[test]
    fn completion_is_per_user() {
        let (_tmp, store, admin, user) = setup();
        store.create_checklist(&admin, &draft()).unwrap();
        store.toggle_completion(&user, "T-001", true).unwrap();

        let mine = store.fetch_tree(Some(&user)).unwrap();
        assert!(mine[0].dropdowns[0].tasks[0].completed);
        let theirs = store.fetch_tree(Some(&admin)).unwrap();
        assert!(!theirs[0].dropdowns[0].tasks[0].completed);
        let anon = store.fetch_tree(None).unwrap();
        assert!(!anon[0].dropdowns[0].tasks[0].completed);
    }

    #[test]
    fn default_completed_applies_without_record() {
        let (_tmp, store, admin, user) = setup();
        store.create_checklist(&admin, &draft()).unwrap();
        let mut task = TaskDraft::new("Already done");
        task.completed = true;
        store.create_task(&admin, "D-001", &task).unwrap();
        let tree = store.fetch_tree(Some(&user)).unwrap();
        assert!(tree[0].dropdowns[0].tasks[2].completed);
    }

    #[test]
    fn non_admin_update_task_only_records_completion() {
        let (_tmp, store, admin, user) = setup();
        store.create_checklist(&admin, &draft()).unwrap();
        let mut edited = Task::new("T-001", "Hijacked");
        edited.completed = true;
        let stored = store.update_task(&user, &edited).unwrap();
        assert_eq!(stored.title, "Register the death");
        assert!(stored.completed);
        let admin_view = store.fetch_tree(Some(&admin)).unwrap();
        assert_eq!(admin_view[0].dropdowns[0].tasks[0].title, "Register the death");
        assert!(!admin_view[0].dropdowns[0].tasks[0].completed);
    }

    #[test]
    fn admin_update_task_rewrites_content() {
        let (_tmp, store, admin, _) = setup();
        store.create_checklist(&admin, &draft()).unwrap();
        let task = Task::new("T-002", "Tell close family")
            .with_content(TaskContent::new("Who first", "Start with [[task:T-001|the register]]"));
        let stored = store.update_task(&admin, &task).unwrap();
        assert_eq!(stored.content.subheader, "Who first");
        assert_eq!(stored.position, Some(1));
    }

    #[test]
    fn delete_dropdown_cascades() {
        let (tmp, store, admin, user) = setup();
        store.create_checklist(&admin, &draft()).unwrap();
        store.toggle_completion(&user, "T-003", true).unwrap();
        store.delete_dropdown(&admin, "D-002").unwrap();

        let data = store.load().unwrap();
        assert!(!data.dropdowns.contains_key("D-003"));
        assert!(!data.tasks.contains_key("T-003"));
        assert!(data.user_task_completions.values().all(|c| c.task_id != "T-003"));

        let entries = read_recovery_entries(tmp.path(), None);
        assert_eq!(entries[0].category, RecoveryCategory::Delete);
        assert!(entries[0].body.contains("Freeze accounts"));
    }

    #[test]
    fn delete_checklist_cascades() {
        let (_tmp, store, admin, _) = setup();
        let c = store.create_checklist(&admin, &draft()).unwrap();
        store.delete_checklist(&admin, &c.id).unwrap();
        let data = store.load().unwrap();
        assert!(data.checklists.is_empty());
        assert!(data.dropdowns.is_empty());
        assert!(data.tasks.is_empty());
        assert!(data.user_task_completions.is_empty());
    }

    #[test]
    fn fetch_all_ignores_per_user_completion() {
        let (_tmp, store, admin, user) = setup();
        let c = store.create_checklist(&admin, &draft()).unwrap();
        let task_id = c.dropdowns[0].tasks[0].id.clone();
        store.toggle_completion(&user, &task_id, true).unwrap();
        let all = store.fetch_all().unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].completion().0, 0);
        assert_eq!(store.fetch_tree(Some(&user)).unwrap()[0].completion().0, 1);
    }

    #[test]
    fn partial_create_is_rolled_back_and_logged() {
        let (tmp, store, admin, _) = setup();
        let mut bad = draft();
        bad.dropdowns[1].dropdowns[0].tasks.push(TaskDraft::new("  "));
        let before = store.load().unwrap();

        match store.create_checklist(&admin, &bad) {
            Err(StoreError::PartialCreate { created, source, .. }) => {
                assert_eq!(created, 7);
                assert!(matches!(*source, StoreError::Invalid(_)));
            }
            other => panic!("expected PartialCreate, got {:?}", other),
        }
        assert_eq!(store.load().unwrap(), before);
        let entries = read_recovery_entries(tmp.path(), None);
        assert_eq!(entries[0].category, RecoveryCategory::PartialCreate);
    }

    #[test]
    fn invalid_first_row_is_plain_error() {
        let (_tmp, store, admin, _) = setup();
        let err = store
            .create_checklist(&admin, &ChecklistDraft::new(""))
            .unwrap_err();
        assert!(matches!(err, StoreError::Invalid(_)));
    }

    #[test]
    fn nested_create_with_parent() {
        let (_tmp, store, admin, _) = setup();
        store.create_checklist(&admin, &draft()).unwrap();
        let nested = store
            .create_dropdown(&admin, "C-001", &DropdownDraft::new("Pensions"), Some("D-003"))
            .unwrap();
        assert_eq!(nested.position, Some(0));
        let tree = store.fetch_tree(Some(&admin)).unwrap();
        let banks = find_dropdown(&tree[0].dropdowns, "D-003").unwrap();
        assert_eq!(banks.dropdowns[0].id, nested.id);

        let err = store
            .create_dropdown(&admin, "C-001", &DropdownDraft::new("x"), Some("D-404"))
            .unwrap_err();
        assert!(matches!(err, StoreError::NotFound { .. }));
    }

    #[test]
    fn positions_reorder_fetch() {
        let (_tmp, store, admin, _) = setup();
        store.create_checklist(&admin, &draft()).unwrap();
        store
            .update_positions(
                &admin,
                ItemKind::Task,
                &[
                    PositionUpdate { id: "T-002".into(), position: 0 },
                    PositionUpdate { id: "T-001".into(), position: 1 },
                ],
            )
            .unwrap();
        let tree = store.fetch_tree(Some(&admin)).unwrap();
        let ids: Vec<&str> = tree[0].dropdowns[0].tasks.iter().map(|t| t.id.as_str()).collect();
        assert_eq!(ids, vec!["T-002", "T-001"]);
    }

    #[test]
    fn positions_across_parents_rejected() {
        let (_tmp, store, admin, _) = setup();
        store.create_checklist(&admin, &draft()).unwrap();
        let err = store
            .update_positions(
                &admin,
                ItemKind::Dropdown,
                &[
                    PositionUpdate { id: "D-001".into(), position: 1 },
                    PositionUpdate { id: "D-003".into(), position: 0 },
                ],
            )
            .unwrap_err();
        assert!(matches!(err, StoreError::Invalid(_)));
    }

    #[test]
    fn expanded_flag_is_shared() {
        let (_tmp, store, admin, user) = setup();
        store.create_checklist(&admin, &draft()).unwrap();
        store.toggle_expanded(&user, "D-001", true).unwrap();
        assert!(store.fetch_tree(Some(&admin)).unwrap()[0].dropdowns[0].expanded);
        assert!(matches!(
            store.toggle_expanded(&user, "D-999", true),
            Err(StoreError::NotFound { .. })
        ));
    }

    #[test]
    fn learning_pages_and_links() {
        let (_tmp, store, admin, user) = setup();
        store.create_checklist(&admin, &draft()).unwrap();
        let page = store
            .create_page(
                &admin,
                &LearningPageDraft {
                    title: "Probate explained".into(),
                    body: "Read [[task:T-001|this]] first".into(),
                    task_ids: vec!["T-001".into()],
                },
            )
            .unwrap();
        assert_eq!(page.id, "P-001");
        assert_eq!(page.author_id, admin.id);

        store.link_page(&admin, "P-001", "T-003").unwrap();
        store.link_page(&admin, "P-001", "T-003").unwrap();
        assert_eq!(store.get_page("P-001").unwrap().task_ids, vec!["T-001", "T-003"]);
        assert_eq!(store.pages_for_task("T-003").unwrap().len(), 1);

        assert!(store.unlink_page(&admin, "P-001", "T-001").unwrap());
        assert!(!store.unlink_page(&admin, "P-001", "T-001").unwrap());

        assert!(
            store
                .create_page(&user, &LearningPageDraft::default())
                .unwrap_err()
                .is_permission_denied()
        );

        store.delete_task(&admin, "T-003").unwrap();
        assert!(store.get_page("P-001").unwrap().task_ids.is_empty());

        store.delete_page(&admin, "P-001").unwrap();
        assert!(store.list_pages().unwrap().is_empty());
    }

    #[test]
    fn sign_up_rejects_duplicates_and_bad_email() {
        let (_tmp, store, _, _) = setup();
        assert!(matches!(
            store.sign_up("ANN@example.com", UserRole::User),
            Err(StoreError::EmailTaken(_))
        ));
        assert!(matches!(
            store.sign_up("nope", UserRole::User),
            Err(StoreError::Invalid(_))
        ));
        assert_eq!(store.find_user("Ann@Example.com").unwrap().unwrap().id, "U-002");
        assert_eq!(store.list_users().unwrap().len(), 2);
    }

    #[test]
    fn lock_contention_surfaces_as_error() {
        let (tmp, _, admin, _) = setup();
        let store = FileStore::open(tmp.path(), 20);
        let _held = FileLock::acquire_ms(tmp.path(), 1000).unwrap();
        assert!(matches!(
            store.create_checklist(&admin, &draft()),
            Err(StoreError::Lock(LockError::Timeout { .. }))
        ));
    }

    #[test]
    fn highest_id_skips_foreign_keys() {
        let keys = vec!["T-009".to_string(), "T-010".to_string(), "X-500".to_string()];
        assert_eq!(highest_id(keys.iter(), "T"), 10);
        assert_eq!(highest_id(std::iter::empty(), "P"), 0);
    }

    #[test]
    fn deleted_ids_are_not_reissued() {
        let (_tmp, store, admin, _) = setup();
        let checklist = store.create_checklist(&admin, &draft()).unwrap();
        let section = &checklist.dropdowns[0].id;

        let last = store
            .create_task(&admin, section, &TaskDraft::new("Call the bank"))
            .unwrap();
        let mut linking = TaskDraft::new("Notify accounts");
        linking.content.body = format!("[[task:{}|Call the bank]]", last.id);
        store.create_task(&admin, section, &linking).unwrap();
        store.delete_task(&admin, &last.id).unwrap();

        let next = store
            .create_task(&admin, section, &TaskDraft::new("Cancel subscriptions"))
            .unwrap();
        assert_ne!(next.id, last.id);

        let tree = store.fetch_all().unwrap();
        let result = check_tree(&tree);
        assert!(!result.valid);
        assert!(result.errors.iter().any(|e| matches!(
            e,
            CheckError::DanglingTaskLink { target, .. } if *target == last.id
        )));
    }

    #[test]
    fn id_counter_seeds_from_existing_rows() {
        let mut data = StoreData::default();
        data.tasks.insert(
            "T-007".to_string(),
            TaskRow {
                id: "T-007".to_string(),
                title: "Old".to_string(),
                default_completed: false,
                content_subheader: String::new(),
                content_text: String::new(),
                dropdown_id: "D-001".to_string(),
                position: None,
            },
        );
        assert_eq!(data.allocate_id("T"), "T-008");
        data.tasks.clear();
        assert_eq!(data.allocate_id("T"), "T-009");
        assert_eq!(data.allocate_id("P"), "P-001");
    }
}
