/// Which task the detail view shows, plus where a followed link came from.
///
/// The referrer is single-depth: following a second link replaces it, so
/// `back` only ever returns one step.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaskDetail {
    open: Option<String>,
    referrer: Option<String>,
}

impl TaskDetail {
    pub fn restore(open: Option<String>, referrer: Option<String>) -> Self {
        // A referrer without an open task is meaningless
        let referrer = if open.is_some() { referrer } else { None };
        TaskDetail { open, referrer }
    }

    pub fn open_task(&self) -> Option<&str> {
        self.open.as_deref()
    }

    pub fn referrer(&self) -> Option<&str> {
        self.referrer.as_deref()
    }

    /// Open a task directly. Clears the referrer.
    pub fn open(&mut self, task_id: &str) {
        self.open = Some(task_id.to_string());
        self.referrer = None;
    }

    /// Follow a task link from the open task. Following a link to the task
    /// already open changes nothing.
    pub fn follow_link(&mut self, task_id: &str) {
        if self.open.as_deref() == Some(task_id) {
            return;
        }
        self.referrer = self.open.take();
        self.open = Some(task_id.to_string());
    }

    /// Return to the referrer, if any. Returns the task now open.
    pub fn back(&mut self) -> Option<&str> {
        let referrer = self.referrer.take()?;
        self.open = Some(referrer);
        self.open.as_deref()
    }

    pub fn close(&mut self) {
        self.open = None;
        self.referrer = None;
    }

    /// Drop references to tasks that no longer exist.
    pub fn retain_existing(&mut self, exists: impl Fn(&str) -> bool) {
        if self.referrer.as_deref().is_some_and(|id| !exists(id)) {
            self.referrer = None;
        }
        if self.open.as_deref().is_some_and(|id| !exists(id)) {
            self.close();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn open_clears_referrer() {
        let mut d = TaskDetail::default();
        d.open("T-001");
        d.follow_link("T-002");
        d.open("T-003");
        assert_eq!(d.open_task(), Some("T-003"));
        assert_eq!(d.referrer(), None);
    }

    #[test]
    fn follow_then_back() {
        let mut d = TaskDetail::default();
        d.open("T-001");
        d.follow_link("T-002");
        assert_eq!(d.referrer(), Some("T-001"));
        assert_eq!(d.back(), Some("T-001"));
        assert_eq!(d.referrer(), None);
        assert_eq!(d.back(), None);
        assert_eq!(d.open_task(), Some("T-001"));
    }

    #[test]
    fn referrer_is_single_depth() {
        let mut d = TaskDetail::default();
        d.open("A");
        d.follow_link("B");
        d.follow_link("C");
        assert_eq!(d.referrer(), Some("B"));
        assert_eq!(d.back(), Some("B"));
        assert_eq!(d.back(), None);
    }

    #[test]
    fn follow_to_self_is_noop() {
        let mut d = TaskDetail::default();
        d.open("A");
        d.follow_link("B");
        d.follow_link("B");
        assert_eq!(d.referrer(), Some("A"));
    }

    #[test]
    fn follow_with_nothing_open_has_no_referrer() {
        let mut d = TaskDetail::default();
        d.follow_link("B");
        assert_eq!(d.open_task(), Some("B"));
        assert_eq!(d.referrer(), None);
    }

    #[test]
    fn close_and_prune() {
        let mut d = TaskDetail::restore(Some("A".into()), Some("B".into()));
        d.retain_existing(|id| id == "A");
        assert_eq!(d.referrer(), None);
        assert_eq!(d.open_task(), Some("A"));
        d.retain_existing(|_| false);
        assert_eq!(d, TaskDetail::default());
        assert_eq!(TaskDetail::restore(None, Some("B".into())), TaskDetail::default());
    }
}
