use tracing::{debug, warn};

use crate::io::store::{StoreError, SyncAdapter};
use crate::model::checklist::{Checklist, ChecklistDraft};
use crate::model::config::SyncStrategy;
use crate::model::dropdown::{Dropdown, DropdownDraft};
use crate::model::learning_page::{LearningPage, LearningPageDraft};
use crate::model::task::{Task, TaskDraft};
use crate::model::user::User;
use crate::ops::reorder::{DragItem, DragSession, DropOutcome, apply_positions};
use crate::ops::task_links::extract_task_links;
use crate::ops::tree_ops::{self, dropdown_siblings, find_checklist, find_task_anywhere, task_owner};
use crate::session::detail::TaskDetail;

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("not signed in (run `ac login <email>`)")]
    NotSignedIn,
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Application state: the checklist tree as the signed-in user sees it, plus
/// drag and detail-view state.
///
/// Every persisted change goes through the adapter first. The local tree is
/// touched only after the adapter succeeds, either by re-fetching or by
/// patching with the tree engine, per [`SyncStrategy`]. Completion and
/// expansion toggles always patch.
///
/// Mutators return `Ok(false)` / `Ok(None)` without calling the adapter when
/// an ID can't be resolved in the local tree.
pub struct AppStore<A: SyncAdapter> {
    adapter: A,
    user: Option<User>,
    strategy: SyncStrategy,
    tree: Vec<Checklist>,
    drag: DragSession,
    detail: TaskDetail,
    last_error: Option<String>,
}

impl<A: SyncAdapter> AppStore<A> {
    pub fn load(
        adapter: A,
        user: Option<User>,
        strategy: SyncStrategy,
    ) -> Result<Self, SessionError> {
        let tree = adapter.fetch_tree(user.as_ref())?;
        debug!(checklists = tree.len(), %strategy, "store loaded");
        Ok(AppStore {
            adapter,
            user,
            strategy,
            tree,
            drag: DragSession::default(),
            detail: TaskDetail::default(),
            last_error: None,
        })
    }

    pub fn refresh(&mut self) -> Result<(), SessionError> {
        self.tree = self.adapter.fetch_tree(self.user.as_ref())?;
        let tree = &self.tree;
        self.detail
            .retain_existing(|id| find_task_anywhere(tree, id).is_some());
        Ok(())
    }

    pub fn tree(&self) -> &[Checklist] {
        &self.tree
    }

    pub fn user(&self) -> Option<&User> {
        self.user.as_ref()
    }

    pub fn adapter(&self) -> &A {
        &self.adapter
    }

    pub fn strategy(&self) -> SyncStrategy {
        self.strategy
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub fn detail(&self) -> &TaskDetail {
        &self.detail
    }

    pub fn drag(&self) -> &DragSession {
        &self.drag
    }

    /// Replace detail-view state (e.g. restored from disk), dropping stale IDs.
    pub fn restore_detail(&mut self, detail: TaskDetail) {
        let tree = &self.tree;
        self.detail = detail;
        self.detail
            .retain_existing(|id| find_task_anywhere(tree, id).is_some());
    }

    // -----------------------------------------------------------------------
    // Sync plumbing
    // -----------------------------------------------------------------------

    fn signed_in(&mut self) -> Result<User, SessionError> {
        match &self.user {
            Some(u) => Ok(u.clone()),
            None => {
                self.last_error = Some(SessionError::NotSignedIn.to_string());
                Err(SessionError::NotSignedIn)
            }
        }
    }

    fn admin(&mut self, action: &'static str) -> Result<User, SessionError> {
        let user = self.signed_in()?;
        if !user.is_admin() {
            let err = StoreError::PermissionDenied { action };
            self.last_error = Some(err.to_string());
            return Err(err.into());
        }
        Ok(user)
    }

    /// Record a failed adapter call. A permission failure means our view of
    /// the tree may be wrong, so re-sync.
    fn failed(&mut self, op: &'static str, err: StoreError) -> SessionError {
        warn!(op, error = %err, "store call failed");
        self.last_error = Some(err.to_string());
        if err.is_permission_denied()
            && let Err(e) = self.refresh()
        {
            warn!(op, error = %e, "re-sync after permission failure failed");
        }
        SessionError::Store(err)
    }

    /// Bring the local tree up to date after a successful write.
    fn synced(&mut self, staged: Vec<Checklist>) -> Result<(), SessionError> {
        self.last_error = None;
        match self.strategy {
            SyncStrategy::Refetch => self.refresh(),
            SyncStrategy::Patch => {
                self.tree = staged;
                Ok(())
            }
        }
    }

    /// Run `patch` on a copy of the tree. `None` means the IDs didn't resolve.
    fn stage(&self, patch: impl FnOnce(&mut Vec<Checklist>) -> bool) -> Option<Vec<Checklist>> {
        let mut staged = self.tree.clone();
        patch(&mut staged).then_some(staged)
    }

    // -----------------------------------------------------------------------
    // Toggles (any signed-in user)
    // -----------------------------------------------------------------------

    pub fn toggle_task_completion(
        &mut self,
        checklist_id: &str,
        dropdown_id: &str,
        task_id: &str,
    ) -> Result<bool, SessionError> {
        let user = self.signed_in()?;
        let Some(staged) = self.stage(|t| {
            tree_ops::toggle_task_completion(t, checklist_id, dropdown_id, task_id)
        }) else {
            return Ok(false);
        };
        let completed = find_task_anywhere(&staged, task_id).is_some_and(|(_, _, t)| t.completed);
        match self.adapter.toggle_completion(&user, task_id, completed) {
            Ok(()) => {
                self.tree = staged;
                self.last_error = None;
                Ok(true)
            }
            Err(e) => Err(self.failed("toggle_completion", e)),
        }
    }

    pub fn toggle_dropdown_expanded(
        &mut self,
        checklist_id: &str,
        dropdown_id: &str,
    ) -> Result<bool, SessionError> {
        let user = self.signed_in()?;
        let Some(staged) =
            self.stage(|t| tree_ops::toggle_dropdown_expanded(t, checklist_id, dropdown_id))
        else {
            return Ok(false);
        };
        let expanded = find_checklist(&staged, checklist_id)
            .and_then(|c| tree_ops::find_dropdown(&c.dropdowns, dropdown_id))
            .is_some_and(|d| d.expanded);
        match self.adapter.toggle_expanded(&user, dropdown_id, expanded) {
            Ok(()) => {
                self.tree = staged;
                self.last_error = None;
                Ok(true)
            }
            Err(e) => Err(self.failed("toggle_expanded", e)),
        }
    }

    // -----------------------------------------------------------------------
    // Checklists (admin)
    // -----------------------------------------------------------------------

    pub fn add_checklist(&mut self, draft: &ChecklistDraft) -> Result<Checklist, SessionError> {
        let user = self.admin("create checklists")?;
        match self.adapter.create_checklist(&user, draft) {
            Ok(created) => {
                let mut staged = self.tree.clone();
                tree_ops::add_checklist(&mut staged, created.clone());
                self.synced(staged)?;
                Ok(created)
            }
            Err(e) => Err(self.failed("create_checklist", e)),
        }
    }

    pub fn rename_checklist(
        &mut self,
        checklist_id: &str,
        title: &str,
    ) -> Result<bool, SessionError> {
        let user = self.admin("rename checklists")?;
        let Some(staged) =
            self.stage(|t| tree_ops::update_checklist_title(t, checklist_id, title))
        else {
            return Ok(false);
        };
        match self.adapter.update_checklist(&user, checklist_id, title) {
            Ok(_) => self.synced(staged).map(|_| true),
            Err(e) => Err(self.failed("update_checklist", e)),
        }
    }

    pub fn delete_checklist(&mut self, checklist_id: &str) -> Result<bool, SessionError> {
        let user = self.admin("delete checklists")?;
        let Some(staged) = self.stage(|t| tree_ops::delete_checklist(t, checklist_id).is_some())
        else {
            return Ok(false);
        };
        match self.adapter.delete_checklist(&user, checklist_id) {
            Ok(()) => self.synced(staged).map(|_| true),
            Err(e) => Err(self.failed("delete_checklist", e)),
        }
    }

    // -----------------------------------------------------------------------
    // Dropdowns (admin)
    // -----------------------------------------------------------------------

    pub fn add_dropdown(
        &mut self,
        checklist_id: &str,
        draft: &DropdownDraft,
        parent: Option<&str>,
    ) -> Result<Option<Dropdown>, SessionError> {
        let user = self.admin("create sections")?;
        let resolved = find_checklist(&self.tree, checklist_id)
            .and_then(|c| dropdown_siblings(c, parent))
            .is_some();
        if !resolved {
            return Ok(None);
        }
        match self.adapter.create_dropdown(&user, checklist_id, draft, parent) {
            Ok(created) => {
                let staged = self
                    .stage(|t| tree_ops::add_dropdown(t, checklist_id, created.clone(), parent))
                    .unwrap_or_else(|| self.tree.clone());
                self.synced(staged)?;
                Ok(Some(created))
            }
            Err(e) => Err(self.failed("create_dropdown", e)),
        }
    }

    /// Title and expanded flag only; children are untouched.
    pub fn update_dropdown(
        &mut self,
        checklist_id: &str,
        dropdown: &Dropdown,
        parent: Option<&str>,
    ) -> Result<bool, SessionError> {
        let user = self.admin("edit sections")?;
        let Some(staged) =
            self.stage(|t| tree_ops::update_dropdown(t, checklist_id, dropdown, parent))
        else {
            return Ok(false);
        };
        match self.adapter.update_dropdown(&user, dropdown) {
            Ok(_) => self.synced(staged).map(|_| true),
            Err(e) => Err(self.failed("update_dropdown", e)),
        }
    }

    pub fn delete_dropdown(
        &mut self,
        checklist_id: &str,
        dropdown_id: &str,
        parent: Option<&str>,
    ) -> Result<bool, SessionError> {
        let user = self.admin("delete sections")?;
        let Some(staged) = self.stage(|t| {
            tree_ops::delete_dropdown(t, checklist_id, dropdown_id, parent).is_some()
        }) else {
            return Ok(false);
        };
        match self.adapter.delete_dropdown(&user, dropdown_id) {
            Ok(()) => {
                self.synced(staged)?;
                let tree = &self.tree;
                self.detail
                    .retain_existing(|id| find_task_anywhere(tree, id).is_some());
                Ok(true)
            }
            Err(e) => Err(self.failed("delete_dropdown", e)),
        }
    }

    // -----------------------------------------------------------------------
    // Tasks (admin)
    // -----------------------------------------------------------------------

    pub fn add_task(
        &mut self,
        checklist_id: &str,
        dropdown_id: &str,
        draft: &TaskDraft,
        parent: Option<&str>,
    ) -> Result<Option<Task>, SessionError> {
        let user = self.admin("create tasks")?;
        let resolved = find_checklist(&self.tree, checklist_id)
            .and_then(|c| task_owner(c, dropdown_id, parent))
            .is_some();
        if !resolved {
            return Ok(None);
        }
        match self.adapter.create_task(&user, dropdown_id, draft) {
            Ok(created) => {
                let staged = self
                    .stage(|t| {
                        tree_ops::add_task(t, checklist_id, dropdown_id, created.clone(), parent)
                    })
                    .unwrap_or_else(|| self.tree.clone());
                self.synced(staged)?;
                Ok(Some(created))
            }
            Err(e) => Err(self.failed("create_task", e)),
        }
    }

    pub fn update_task(
        &mut self,
        checklist_id: &str,
        dropdown_id: &str,
        task: &Task,
        parent: Option<&str>,
    ) -> Result<bool, SessionError> {
        let user = self.admin("edit tasks")?;
        let Some(staged) =
            self.stage(|t| tree_ops::update_task(t, checklist_id, dropdown_id, task, parent))
        else {
            return Ok(false);
        };
        match self.adapter.update_task(&user, task) {
            Ok(_) => self.synced(staged).map(|_| true),
            Err(e) => Err(self.failed("update_task", e)),
        }
    }

    pub fn delete_task(
        &mut self,
        checklist_id: &str,
        dropdown_id: &str,
        task_id: &str,
        parent: Option<&str>,
    ) -> Result<bool, SessionError> {
        let user = self.admin("delete tasks")?;
        let Some(staged) = self.stage(|t| {
            tree_ops::delete_task(t, checklist_id, dropdown_id, task_id, parent).is_some()
        }) else {
            return Ok(false);
        };
        match self.adapter.delete_task(&user, task_id) {
            Ok(()) => {
                self.synced(staged)?;
                let tree = &self.tree;
                self.detail
                    .retain_existing(|id| find_task_anywhere(tree, id).is_some());
                Ok(true)
            }
            Err(e) => Err(self.failed("delete_task", e)),
        }
    }

    // -----------------------------------------------------------------------
    // Drag and drop
    // -----------------------------------------------------------------------

    /// Pick up the dropdown or task with this ID. Returns false if unknown.
    pub fn drag_start(&mut self, id: &str) -> bool {
        match DragItem::resolve(&self.tree, id) {
            Some(item) => {
                self.drag.start(item);
                true
            }
            None => false,
        }
    }

    pub fn drag_cancel(&mut self) {
        self.drag.cancel();
    }

    /// Drop the held item on `target_id`. Only a `Reorder` outcome reaches
    /// the adapter; positions are applied locally after it succeeds.
    pub fn drop_on(&mut self, target_id: &str) -> Result<DropOutcome, SessionError> {
        let Some(target) = DragItem::resolve(&self.tree, target_id) else {
            self.drag.cancel();
            return Ok(DropOutcome::Stale);
        };
        let plan = match self.drag.drop_on(&target, &self.tree) {
            DropOutcome::Reorder(plan) => plan,
            other => return Ok(other),
        };
        let user = self.admin("reorder items")?;
        let positions = plan.positions();
        match self.adapter.update_positions(&user, plan.kind, &positions) {
            Ok(()) => {
                let staged = self
                    .stage(|t| apply_positions(t, &plan.group, &positions))
                    .unwrap_or_else(|| self.tree.clone());
                self.synced(staged)?;
                Ok(DropOutcome::Reorder(plan))
            }
            Err(e) => Err(self.failed("update_positions", e)),
        }
    }

    // -----------------------------------------------------------------------
    // Task detail
    // -----------------------------------------------------------------------

    pub fn open_task(&mut self, task_id: &str) -> bool {
        if find_task_anywhere(&self.tree, task_id).is_none() {
            return false;
        }
        self.detail.open(task_id);
        true
    }

    /// Follow a `[[task:…]]` link. Links to tasks this user can't see are ignored.
    pub fn follow_link(&mut self, task_id: &str) -> bool {
        if find_task_anywhere(&self.tree, task_id).is_none() {
            return false;
        }
        self.detail.follow_link(task_id);
        true
    }

    pub fn back(&mut self) -> Option<String> {
        self.detail.back().map(str::to_string)
    }

    pub fn close_task(&mut self) {
        self.detail.close();
    }

    /// The open task with its checklist and dropdown.
    pub fn open_task_detail(&self) -> Option<(&Checklist, &Dropdown, &Task)> {
        find_task_anywhere(&self.tree, self.detail.open_task()?)
    }

    /// IDs of tasks the open task's body links to.
    pub fn open_task_links(&self) -> Vec<String> {
        self.open_task_detail()
            .map(|(_, _, t)| {
                extract_task_links(&t.content.body)
                    .into_iter()
                    .map(|l| l.id)
                    .collect()
            })
            .unwrap_or_default()
    }

    // -----------------------------------------------------------------------
    // Learning pages
    // -----------------------------------------------------------------------

    pub fn pages(&mut self) -> Result<Vec<LearningPage>, SessionError> {
        self.adapter
            .list_pages()
            .map_err(|e| self.failed("list_pages", e))
    }

    pub fn page(&mut self, id: &str) -> Result<LearningPage, SessionError> {
        self.adapter.get_page(id).map_err(|e| self.failed("get_page", e))
    }

    pub fn pages_for_task(&mut self, task_id: &str) -> Result<Vec<LearningPage>, SessionError> {
        self.adapter
            .pages_for_task(task_id)
            .map_err(|e| self.failed("pages_for_task", e))
    }

    pub fn create_page(&mut self, draft: &LearningPageDraft) -> Result<LearningPage, SessionError> {
        let user = self.admin("write learning pages")?;
        self.adapter
            .create_page(&user, draft)
            .map_err(|e| self.failed("create_page", e))
    }

    pub fn update_page(
        &mut self,
        id: &str,
        draft: &LearningPageDraft,
    ) -> Result<LearningPage, SessionError> {
        let user = self.admin("edit learning pages")?;
        self.adapter
            .update_page(&user, id, draft)
            .map_err(|e| self.failed("update_page", e))
    }

    pub fn delete_page(&mut self, id: &str) -> Result<(), SessionError> {
        let user = self.admin("delete learning pages")?;
        self.adapter
            .delete_page(&user, id)
            .map_err(|e| self.failed("delete_page", e))
    }

    pub fn link_page(&mut self, page_id: &str, task_id: &str) -> Result<(), SessionError> {
        let user = self.admin("link learning pages")?;
        self.adapter
            .link_page(&user, page_id, task_id)
            .map_err(|e| self.failed("link_page", e))
    }

    pub fn unlink_page(&mut self, page_id: &str, task_id: &str) -> Result<bool, SessionError> {
        let user = self.admin("unlink learning pages")?;
        self.adapter
            .unlink_page(&user, page_id, task_id)
            .map_err(|e| self.failed("unlink_page", e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::store::FileStore;
    use crate::model::user::UserRole;
    use crate::ops::reorder::ItemKind;
    use crate::ops::reorder::PositionUpdate;
    use pretty_assertions::assert_eq;
    use std::cell::Cell;
    use tempfile::TempDir;

    /// FileStore that can be told to fail its next write.
    struct Flaky {
        inner: FileStore,
        fail: Cell<Option<fn() -> StoreError>>,
    }

    impl Flaky {
        fn check(&self) -> Result<(), StoreError> {
            match self.fail.take() {
                Some(make) => Err(make()),
                None => Ok(()),
            }
        }
    }

    fn io_error() -> StoreError {
        StoreError::Io {
            path: "store.json".into(),
            source: std::io::Error::other("disk full"),
        }
    }

    fn denied() -> StoreError {
        StoreError::PermissionDenied { action: "test" }
    }

    impl SyncAdapter for Flaky {
        fn fetch_tree(&self, user: Option<&User>) -> Result<Vec<Checklist>, StoreError> {
            self.inner.fetch_tree(user)
        }
        fn create_checklist(&self, u: &User, d: &ChecklistDraft) -> Result<Checklist, StoreError> {
            self.check()?;
            self.inner.create_checklist(u, d)
        }
        fn update_checklist(&self, u: &User, id: &str, t: &str) -> Result<Checklist, StoreError> {
            self.check()?;
            self.inner.update_checklist(u, id, t)
        }
        fn delete_checklist(&self, u: &User, id: &str) -> Result<(), StoreError> {
            self.check()?;
            self.inner.delete_checklist(u, id)
        }
        fn create_dropdown(
            &self,
            u: &User,
            c: &str,
            d: &DropdownDraft,
            p: Option<&str>,
        ) -> Result<Dropdown, StoreError> {
            self.check()?;
            self.inner.create_dropdown(u, c, d, p)
        }
        fn update_dropdown(&self, u: &User, d: &Dropdown) -> Result<Dropdown, StoreError> {
            self.check()?;
            self.inner.update_dropdown(u, d)
        }
        fn delete_dropdown(&self, u: &User, id: &str) -> Result<(), StoreError> {
            self.check()?;
            self.inner.delete_dropdown(u, id)
        }
        fn create_task(&self, u: &User, d: &str, t: &TaskDraft) -> Result<Task, StoreError> {
            self.check()?;
            self.inner.create_task(u, d, t)
        }
        fn update_task(&self, u: &User, t: &Task) -> Result<Task, StoreError> {
            self.check()?;
            self.inner.update_task(u, t)
        }
        fn delete_task(&self, u: &User, id: &str) -> Result<(), StoreError> {
            self.check()?;
            self.inner.delete_task(u, id)
        }
        fn toggle_completion(&self, u: &User, id: &str, c: bool) -> Result<(), StoreError> {
            self.check()?;
            self.inner.toggle_completion(u, id, c)
        }
        fn toggle_expanded(&self, u: &User, id: &str, e: bool) -> Result<(), StoreError> {
            self.check()?;
            self.inner.toggle_expanded(u, id, e)
        }
        fn update_positions(
            &self,
            u: &User,
            k: ItemKind,
            p: &[PositionUpdate],
        ) -> Result<(), StoreError> {
            self.check()?;
            self.inner.update_positions(u, k, p)
        }
        fn list_pages(&self) -> Result<Vec<LearningPage>, StoreError> {
            self.inner.list_pages()
        }
        fn get_page(&self, id: &str) -> Result<LearningPage, StoreError> {
            self.inner.get_page(id)
        }
        fn create_page(&self, u: &User, d: &LearningPageDraft) -> Result<LearningPage, StoreError> {
            self.check()?;
            self.inner.create_page(u, d)
        }
        fn update_page(
            &self,
            u: &User,
            id: &str,
            d: &LearningPageDraft,
        ) -> Result<LearningPage, StoreError> {
            self.check()?;
            self.inner.update_page(u, id, d)
        }
        fn delete_page(&self, u: &User, id: &str) -> Result<(), StoreError> {
            self.check()?;
            self.inner.delete_page(u, id)
        }
        fn link_page(&self, u: &User, p: &str, t: &str) -> Result<(), StoreError> {
            self.check()?;
            self.inner.link_page(u, p, t)
        }
        fn unlink_page(&self, u: &User, p: &str, t: &str) -> Result<bool, StoreError> {
            self.check()?;
            self.inner.unlink_page(u, p, t)
        }
        fn pages_for_task(&self, id: &str) -> Result<Vec<LearningPage>, StoreError> {
            self.inner.pages_for_task(id)
        }
        fn sign_up(&self, e: &str, r: UserRole) -> Result<User, StoreError> {
            self.inner.sign_up(e, r)
        }
        fn find_user(&self, e: &str) -> Result<Option<User>, StoreError> {
            self.inner.find_user(e)
        }
        fn list_users(&self) -> Result<Vec<User>, StoreError> {
            self.inner.list_users()
        }
    }

    fn seed(tmp: &TempDir) -> (FileStore, User, User) {
        let store = FileStore::open(tmp.path(), 1000);
        let admin = store.sign_up("admin@example.com", UserRole::Admin).unwrap();
        let user = store.sign_up("ann@example.com", UserRole::User).unwrap();
        let mut first = DropdownDraft::new("First days");
        first.tasks = vec![
            TaskDraft::new("Register the death"),
            TaskDraft::new("Tell family"),
            TaskDraft::new("Find the will"),
        ];
        let mut banks = DropdownDraft::new("Banks");
        banks.tasks = vec![TaskDraft::new("Freeze accounts")];
        let mut pensions = DropdownDraft::new("Pensions");
        pensions.dropdowns = vec![DropdownDraft::new("State pension")];
        let mut money = DropdownDraft::new("Money");
        money.dropdowns = vec![banks, pensions];
        let mut draft = ChecklistDraft::new("After a death");
        draft.dropdowns = vec![first, money];
        store.create_checklist(&admin, &draft).unwrap();
        // C-001: D-001 [T-001..T-003], D-002 -> D-003 [T-004], D-004 -> D-005
        (store, admin, user)
    }

    fn app(tmp: &TempDir, as_admin: bool, strategy: SyncStrategy) -> AppStore<Flaky> {
        let (store, admin, user) = seed(tmp);
        let who = if as_admin { admin } else { user };
        let flaky = Flaky {
            inner: store,
            fail: Cell::new(None),
        };
        AppStore::load(flaky, Some(who), strategy).unwrap()
    }

    fn task_order(app: &AppStore<Flaky>, dropdown_id: &str) -> Vec<String> {
        tree_ops::find_dropdown(&app.tree()[0].dropdowns, dropdown_id)
            .unwrap()
            .tasks
            .iter()
            .map(|t| t.id.clone())
            .collect()
    }

    #[test]
    fn toggle_completion_persists_for_user() {
        let tmp = TempDir::new().unwrap();
        let mut app = app(&tmp, false, SyncStrategy::Refetch);
        assert!(app.toggle_task_completion("C-001", "D-001", "T-002").unwrap());
        assert!(app.tree()[0].dropdowns[0].tasks[1].completed);
        app.refresh().unwrap();
        assert!(app.tree()[0].dropdowns[0].tasks[1].completed);
    }

    #[test]
    fn failed_toggle_leaves_tree_untouched() {
        let tmp = TempDir::new().unwrap();
        let mut app = app(&tmp, false, SyncStrategy::Patch);
        let before = app.tree().to_vec();
        app.adapter().fail.set(Some(io_error));
        assert!(app.toggle_task_completion("C-001", "D-001", "T-001").is_err());
        assert_eq!(app.tree(), &before[..]);
        assert!(app.last_error().unwrap().contains("disk full"));
    }

    #[test]
    fn unknown_ids_are_silent_noops() {
        let tmp = TempDir::new().unwrap();
        let mut app = app(&tmp, true, SyncStrategy::Patch);
        // an injected failure would surface if the adapter were called
        app.adapter().fail.set(Some(io_error));
        assert!(!app.toggle_task_completion("C-001", "D-001", "T-404").unwrap());
        assert!(!app.toggle_dropdown_expanded("C-404", "D-001").unwrap());
        assert!(!app.delete_dropdown("C-001", "D-003", Some("D-001")).unwrap());
        assert!(app.add_task("C-001", "D-404", &TaskDraft::new("x"), None).unwrap().is_none());
        assert!(app.last_error().is_none());
    }

    #[test]
    fn non_admin_is_gated_before_adapter() {
        let tmp = TempDir::new().unwrap();
        let mut app = app(&tmp, false, SyncStrategy::Refetch);
        let err = app.add_checklist(&ChecklistDraft::new("Mine")).unwrap_err();
        assert!(matches!(err, SessionError::Store(StoreError::PermissionDenied { .. })));
        assert!(app.adapter().inner.fetch_tree(None).unwrap().len() == 1);
        assert!(app.last_error().is_some());
    }

    #[test]
    fn permission_failure_from_adapter_resyncs() {
        let tmp = TempDir::new().unwrap();
        let mut app = app(&tmp, true, SyncStrategy::Patch);
        // Another session renames the checklist behind our back
        let admin = app.user().unwrap().clone();
        app.adapter().inner.update_checklist(&admin, "C-001", "Renamed").unwrap();
        app.adapter().fail.set(Some(denied));
        assert!(app.rename_checklist("C-001", "Mine").is_err());
        assert_eq!(app.tree()[0].title, "Renamed");
    }

    #[test]
    fn patch_and_refetch_agree_on_depth_three_edit() {
        for strategy in [SyncStrategy::Patch, SyncStrategy::Refetch] {
            let tmp = TempDir::new().unwrap();
            let mut app = app(&tmp, true, strategy);
            let mut deep = Dropdown::new("D-005", "State pension (UK)");
            deep.expanded = true;
            assert!(app.update_dropdown("C-001", &deep, Some("D-004")).unwrap());
            let local = app.tree().to_vec();
            app.refresh().unwrap();
            assert_eq!(app.tree(), &local[..], "{strategy}");
        }
    }

    #[test]
    fn add_and_delete_task_with_patch() {
        let tmp = TempDir::new().unwrap();
        let mut app = app(&tmp, true, SyncStrategy::Patch);
        let created = app
            .add_task("C-001", "D-003", &TaskDraft::new("Close cards"), Some("D-002"))
            .unwrap()
            .unwrap();
        assert_eq!(created.id, "T-005");
        assert_eq!(task_order(&app, "D-003"), vec!["T-004", "T-005"]);
        assert!(app.delete_task("C-001", "D-003", "T-004", Some("D-002")).unwrap());
        assert_eq!(task_order(&app, "D-003"), vec!["T-005"]);
        let local = app.tree().to_vec();
        app.refresh().unwrap();
        assert_eq!(app.tree(), &local[..]);
    }

    #[test]
    fn drop_reorders_and_persists() {
        let tmp = TempDir::new().unwrap();
        let mut app = app(&tmp, true, SyncStrategy::Patch);
        assert!(app.drag_start("T-001"));
        let outcome = app.drop_on("T-003").unwrap();
        assert!(matches!(outcome, DropOutcome::Reorder(_)));
        assert_eq!(task_order(&app, "D-001"), vec!["T-002", "T-003", "T-001"]);
        app.refresh().unwrap();
        assert_eq!(task_order(&app, "D-001"), vec!["T-002", "T-003", "T-001"]);
        assert!(!app.drag().is_dragging());
    }

    #[test]
    fn cross_parent_drop_never_reaches_adapter() {
        let tmp = TempDir::new().unwrap();
        let mut app = app(&tmp, true, SyncStrategy::Patch);
        app.adapter().fail.set(Some(io_error));
        assert!(app.drag_start("T-001"));
        assert_eq!(app.drop_on("T-004").unwrap(), DropOutcome::CrossParent);
        assert!(app.drag_start("D-003"));
        assert_eq!(app.drop_on("D-003").unwrap(), DropOutcome::SameItem);
        assert!(app.adapter().fail.take().is_some());
    }

    #[test]
    fn failed_drop_keeps_order() {
        let tmp = TempDir::new().unwrap();
        let mut app = app(&tmp, true, SyncStrategy::Patch);
        app.adapter().fail.set(Some(io_error));
        app.drag_start("T-001");
        assert!(app.drop_on("T-002").is_err());
        assert_eq!(task_order(&app, "D-001"), vec!["T-001", "T-002", "T-003"]);
        assert!(!app.drag().is_dragging());
    }

    #[test]
    fn detail_follow_back_and_delete() {
        let tmp = TempDir::new().unwrap();
        let mut app = app(&tmp, true, SyncStrategy::Refetch);
        assert!(app.open_task("T-001"));
        assert!(!app.follow_link("T-404"));
        assert!(app.follow_link("T-004"));
        assert_eq!(app.detail().referrer(), Some("T-001"));
        assert_eq!(app.back().as_deref(), Some("T-001"));
        assert!(app.follow_link("T-004"));
        assert!(app.delete_task("C-001", "D-003", "T-004", None).unwrap());
        assert_eq!(app.detail().open_task(), None);
    }

    #[test]
    fn anonymous_session_is_read_only() {
        let tmp = TempDir::new().unwrap();
        let (store, _, _) = seed(&tmp);
        let mut app = AppStore::load(store, None, SyncStrategy::Refetch).unwrap();
        assert_eq!(app.tree().len(), 1);
        assert!(matches!(
            app.toggle_task_completion("C-001", "D-001", "T-001"),
            Err(SessionError::NotSignedIn)
        ));
    }
}
