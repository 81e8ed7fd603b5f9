use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::model::checklist::{Checklist, Positioned, sort_by_position};
use crate::ops::tree_ops::{
    SiblingGroup, find_checklist, find_checklist_mut, find_dropdown, find_dropdown_mut,
    locate_dropdown_anywhere, locate_task,
};

/// What kind of node is being dragged
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemKind {
    Dropdown,
    Task,
}

impl std::fmt::Display for ItemKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ItemKind::Dropdown => write!(f, "dropdown"),
            ItemKind::Task => write!(f, "task"),
        }
    }
}

/// A draggable node plus the sibling group it was picked up from
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DragItem {
    pub kind: ItemKind,
    pub id: String,
    pub group: SiblingGroup,
}

impl DragItem {
    /// Resolve a dropdown anywhere in the tree.
    pub fn dropdown(tree: &[Checklist], id: &str) -> Option<Self> {
        locate_dropdown_anywhere(tree, id).map(|group| DragItem {
            kind: ItemKind::Dropdown,
            id: id.to_string(),
            group,
        })
    }

    /// Resolve a task anywhere in the tree.
    pub fn task(tree: &[Checklist], id: &str) -> Option<Self> {
        tree.iter()
            .find_map(|c| locate_task(&c.dropdowns, id))
            .map(|dropdown_id| DragItem {
                kind: ItemKind::Task,
                id: id.to_string(),
                group: SiblingGroup::Tasks { dropdown_id },
            })
    }

    /// Resolve an ID of either kind (dropdowns are tried first).
    pub fn resolve(tree: &[Checklist], id: &str) -> Option<Self> {
        Self::dropdown(tree, id).or_else(|| Self::task(tree, id))
    }
}

/// New dense position for one sibling
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PositionUpdate {
    pub id: String,
    pub position: i64,
}

/// A computed reorder of one sibling group, ready to persist
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReorderPlan {
    pub kind: ItemKind,
    pub group: SiblingGroup,
    /// Sibling IDs in their new order
    pub order: Vec<String>,
}

impl ReorderPlan {
    pub fn positions(&self) -> Vec<PositionUpdate> {
        assign_positions(&self.order)
    }
}

/// Result of dropping the held item on a target
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DropOutcome {
    /// Nothing was being dragged
    NoDrag,
    /// Dropped on itself
    SameItem,
    /// Dropdown onto task or task onto dropdown
    KindMismatch,
    /// Source and target have different parents
    CrossParent,
    /// The sibling group no longer contains both items
    Stale,
    Reorder(ReorderPlan),
}

/// Drag session state: idle, or holding one item
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum DragSession {
    #[default]
    Idle,
    Dragging(DragItem),
}

impl DragSession {
    /// Pick up an item, replacing anything already held.
    pub fn start(&mut self, item: DragItem) {
        debug!(kind = %item.kind, id = %item.id, "drag start");
        *self = DragSession::Dragging(item);
    }

    /// Abandon the drag without dropping. Returns the item that was held.
    pub fn cancel(&mut self) -> Option<DragItem> {
        match std::mem::take(self) {
            DragSession::Dragging(item) => Some(item),
            DragSession::Idle => None,
        }
    }

    pub fn dragged(&self) -> Option<&DragItem> {
        match self {
            DragSession::Dragging(item) => Some(item),
            DragSession::Idle => None,
        }
    }

    pub fn is_dragging(&self) -> bool {
        matches!(self, DragSession::Dragging(_))
    }

    /// Drop the held item on `target`, computing the new sibling order.
    ///
    /// Only same-kind, same-parent drops reorder. The session is always idle
    /// afterwards, including after dropping an item on itself: an `ac mv`
    /// is a single drag, so there is no later drag-end to release it.
    pub fn drop_on(&mut self, target: &DragItem, tree: &[Checklist]) -> DropOutcome {
        let Some(dragged) = self.cancel() else {
            return DropOutcome::NoDrag;
        };
        let outcome = plan_drop(&dragged, target, tree);
        debug!(dragged = %dragged.id, target = %target.id, ?outcome, "drop");
        outcome
    }
}

/// Decide what dropping `dragged` on `target` does.
pub fn plan_drop(dragged: &DragItem, target: &DragItem, tree: &[Checklist]) -> DropOutcome {
    if dragged.kind == target.kind && dragged.id == target.id {
        return DropOutcome::SameItem;
    }
    if dragged.kind != target.kind {
        return DropOutcome::KindMismatch;
    }
    if dragged.group != target.group {
        return DropOutcome::CrossParent;
    }
    let Some(siblings) = sibling_ids(tree, &dragged.group) else {
        return DropOutcome::Stale;
    };
    match reorder_after(&siblings, &dragged.id, &target.id) {
        Some(order) => DropOutcome::Reorder(ReorderPlan {
            kind: dragged.kind,
            group: dragged.group.clone(),
            order,
        }),
        None => DropOutcome::Stale,
    }
}

/// IDs of the siblings in `group`, in their current order.
pub fn sibling_ids(tree: &[Checklist], group: &SiblingGroup) -> Option<Vec<String>> {
    match group {
        SiblingGroup::Root { checklist_id } => find_checklist(tree, checklist_id)
            .map(|c| c.dropdowns.iter().map(|d| d.id.clone()).collect()),
        SiblingGroup::Nested {
            checklist_id,
            parent_id,
        } => find_checklist(tree, checklist_id)
            .and_then(|c| find_dropdown(&c.dropdowns, parent_id))
            .map(|p| p.dropdowns.iter().map(|d| d.id.clone()).collect()),
        SiblingGroup::Tasks { dropdown_id } => tree
            .iter()
            .find_map(|c| find_dropdown(&c.dropdowns, dropdown_id))
            .map(|d| d.tasks.iter().map(|t| t.id.clone()).collect()),
    }
}

/// Move `dragged` to sit immediately after `target`.
///
/// The dragged item is removed first and the target's index is taken from
/// the remaining sequence, so dropping always lands after the target. Returns
/// `None` if either ID is missing or they are equal.
pub fn reorder_after(siblings: &[String], dragged: &str, target: &str) -> Option<Vec<String>> {
    if dragged == target {
        return None;
    }
    let from = siblings.iter().position(|id| id == dragged)?;
    let mut order = siblings.to_vec();
    let item = order.remove(from);
    let target_idx = order.iter().position(|id| id == target)?;
    order.insert(target_idx + 1, item);
    Some(order)
}

/// Dense 0-based positions for a sibling order.
pub fn assign_positions(order: &[String]) -> Vec<PositionUpdate> {
    order
        .iter()
        .enumerate()
        .map(|(i, id)| PositionUpdate {
            id: id.clone(),
            position: i as i64,
        })
        .collect()
}

/// Write positions into the local tree and re-sort the sibling group.
/// Returns false if the group can't be found.
pub fn apply_positions(
    tree: &mut [Checklist],
    group: &SiblingGroup,
    updates: &[PositionUpdate],
) -> bool {
    match group {
        SiblingGroup::Root { checklist_id } => match find_checklist_mut(tree, checklist_id) {
            Some(c) => {
                set_positions(&mut c.dropdowns, updates, |d| &d.id);
                true
            }
            None => false,
        },
        SiblingGroup::Nested {
            checklist_id,
            parent_id,
        } => match find_checklist_mut(tree, checklist_id)
            .and_then(|c| find_dropdown_mut(&mut c.dropdowns, parent_id))
        {
            Some(parent) => {
                set_positions(&mut parent.dropdowns, updates, |d| &d.id);
                true
            }
            None => false,
        },
        SiblingGroup::Tasks { dropdown_id } => {
            for checklist in tree.iter_mut() {
                if let Some(d) = find_dropdown_mut(&mut checklist.dropdowns, dropdown_id) {
                    set_positions(&mut d.tasks, updates, |t| &t.id);
                    return true;
                }
            }
            false
        }
    }
}

fn set_positions<T: Positioned>(
    items: &mut [T],
    updates: &[PositionUpdate],
    id_of: impl Fn(&T) -> &String,
) {
    let by_id: HashMap<&str, i64> = updates
        .iter()
        .map(|u| (u.id.as_str(), u.position))
        .collect();
    for item in items.iter_mut() {
        if let Some(&pos) = by_id.get(id_of(item).as_str()) {
            item.set_position(Some(pos));
        }
    }
    sort_by_position(items);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::dropdown::Dropdown;
    use crate::model::task::Task;
    use pretty_assertions::assert_eq;

    fn ids(v: &[&str]) -> Vec<String> {
        v.iter().map(|s| s.to_string()).collect()
    }

    fn tree() -> Vec<Checklist> {
        vec![
            Checklist::new("C-001", "One").with_dropdowns(vec![
                Dropdown::new("D-001", "a").with_tasks(vec![
                    Task::new("T-001", "t1"),
                    Task::new("T-002", "t2"),
                    Task::new("T-003", "t3"),
                ]),
                Dropdown::new("D-002", "b").with_dropdowns(vec![
                    Dropdown::new("D-004", "nested a").with_dropdowns(vec![
                        Dropdown::new("D-006", "deep a")
                            .with_tasks(vec![Task::new("T-010", "x"), Task::new("T-011", "y")]),
                        Dropdown::new("D-007", "deep b"),
                    ]),
                    Dropdown::new("D-005", "nested b").with_tasks(vec![Task::new("T-004", "t4")]),
                ]),
                Dropdown::new("D-003", "c"),
            ]),
            Checklist::new("C-002", "Two").with_dropdowns(vec![Dropdown::new("D-008", "other")]),
        ]
    }

    // --- reorder_after ---

    #[test]
    fn drop_forward_lands_after_target() {
        let order = reorder_after(&ids(&["a", "b", "c", "d"]), "a", "c").unwrap();
        assert_eq!(order, ids(&["b", "c", "a", "d"]));
    }

    #[test]
    fn drop_backward_lands_after_target() {
        // Dropping on the first item never places the dragged item before it
        let order = reorder_after(&ids(&["a", "b", "c", "d"]), "d", "a").unwrap();
        assert_eq!(order, ids(&["a", "d", "b", "c"]));
    }

    #[test]
    fn drop_on_immediate_predecessor_is_identity() {
        let order = reorder_after(&ids(&["a", "b", "c"]), "b", "a").unwrap();
        assert_eq!(order, ids(&["a", "b", "c"]));
    }

    #[test]
    fn reorder_is_a_permutation_for_every_pair() {
        let siblings = ids(&["a", "b", "c", "d", "e"]);
        for dragged in &siblings {
            for target in &siblings {
                if dragged == target {
                    assert!(reorder_after(&siblings, dragged, target).is_none());
                    continue;
                }
                let order = reorder_after(&siblings, dragged, target).unwrap();
                assert_eq!(order.len(), siblings.len());
                let mut sorted = order.clone();
                sorted.sort();
                assert_eq!(sorted, siblings);
                let t = order.iter().position(|x| x == target).unwrap();
                assert_eq!(&order[t + 1], dragged);

                let positions = assign_positions(&order);
                let expected: Vec<i64> = (0..siblings.len() as i64).collect();
                assert_eq!(positions.iter().map(|p| p.position).collect::<Vec<_>>(), expected);
                assert_eq!(positions.iter().map(|p| p.id.clone()).collect::<Vec<_>>(), order);
            }
        }
    }

    #[test]
    fn reorder_missing_ids_is_none() {
        assert!(reorder_after(&ids(&["a", "b"]), "z", "a").is_none());
        assert!(reorder_after(&ids(&["a", "b"]), "a", "z").is_none());
    }

    // --- session state machine ---

    #[test]
    fn cancel_returns_to_idle_without_change() {
        let t = tree();
        let mut session = DragSession::default();
        session.start(DragItem::task(&t, "T-001").unwrap());
        assert!(session.is_dragging());
        assert_eq!(session.cancel().unwrap().id, "T-001");
        assert_eq!(session, DragSession::Idle);
        assert!(session.cancel().is_none());
    }

    #[test]
    fn drop_without_drag_is_nodrag() {
        let t = tree();
        let mut session = DragSession::Idle;
        let target = DragItem::task(&t, "T-002").unwrap();
        assert_eq!(session.drop_on(&target, &t), DropOutcome::NoDrag);
    }

    #[test]
    fn drop_on_self_is_noop() {
        let t = tree();
        let mut session = DragSession::Idle;
        let item = DragItem::task(&t, "T-002").unwrap();
        session.start(item.clone());
        assert_eq!(session.drop_on(&item, &t), DropOutcome::SameItem);
        assert!(!session.is_dragging());
    }

    #[test]
    fn task_reorder_in_same_dropdown() {
        let t = tree();
        let mut session = DragSession::Idle;
        session.start(DragItem::task(&t, "T-001").unwrap());
        let outcome = session.drop_on(&DragItem::task(&t, "T-002").unwrap(), &t);
        let DropOutcome::Reorder(plan) = outcome else {
            panic!("expected reorder, got {:?}", outcome);
        };
        assert_eq!(plan.kind, ItemKind::Task);
        assert_eq!(plan.order, ids(&["T-002", "T-001", "T-003"]));
        assert_eq!(
            plan.group,
            SiblingGroup::Tasks {
                dropdown_id: "D-001".into()
            }
        );
    }

    #[test]
    fn task_reorder_in_deep_dropdown() {
        let t = tree();
        let plan = match plan_drop(
            &DragItem::task(&t, "T-010").unwrap(),
            &DragItem::task(&t, "T-011").unwrap(),
            &t,
        ) {
            DropOutcome::Reorder(plan) => plan,
            other => panic!("expected reorder, got {:?}", other),
        };
        assert_eq!(plan.order, ids(&["T-011", "T-010"]));
    }

    #[test]
    fn nested_dropdown_reorder_uses_full_depth_parent() {
        let t = tree();
        let dragged = DragItem::dropdown(&t, "D-006").unwrap();
        let target = DragItem::dropdown(&t, "D-007").unwrap();
        assert_eq!(
            dragged.group,
            SiblingGroup::Nested {
                checklist_id: "C-001".into(),
                parent_id: "D-004".into()
            }
        );
        match plan_drop(&dragged, &target, &t) {
            DropOutcome::Reorder(plan) => assert_eq!(plan.order, ids(&["D-007", "D-006"])),
            other => panic!("expected reorder, got {:?}", other),
        }
    }

    #[test]
    fn cross_parent_drops_do_nothing() {
        let t = tree();
        // task into a different dropdown
        assert_eq!(
            plan_drop(
                &DragItem::task(&t, "T-001").unwrap(),
                &DragItem::task(&t, "T-004").unwrap(),
                &t
            ),
            DropOutcome::CrossParent
        );
        // root dropdown onto nested dropdown
        assert_eq!(
            plan_drop(
                &DragItem::dropdown(&t, "D-001").unwrap(),
                &DragItem::dropdown(&t, "D-005").unwrap(),
                &t
            ),
            DropOutcome::CrossParent
        );
        // root dropdowns of different checklists
        assert_eq!(
            plan_drop(
                &DragItem::dropdown(&t, "D-001").unwrap(),
                &DragItem::dropdown(&t, "D-008").unwrap(),
                &t
            ),
            DropOutcome::CrossParent
        );
    }

    #[test]
    fn kind_mismatch_does_nothing() {
        let t = tree();
        assert_eq!(
            plan_drop(
                &DragItem::task(&t, "T-001").unwrap(),
                &DragItem::dropdown(&t, "D-001").unwrap(),
                &t
            ),
            DropOutcome::KindMismatch
        );
    }

    #[test]
    fn stale_group_is_reported() {
        let t = tree();
        let dragged = DragItem {
            kind: ItemKind::Task,
            id: "T-999".into(),
            group: SiblingGroup::Tasks {
                dropdown_id: "D-001".into(),
            },
        };
        let target = DragItem::task(&t, "T-001").unwrap();
        assert_eq!(plan_drop(&dragged, &target, &t), DropOutcome::Stale);
    }

    #[test]
    fn resolve_prefers_dropdowns() {
        let t = tree();
        assert_eq!(DragItem::resolve(&t, "D-003").unwrap().kind, ItemKind::Dropdown);
        assert_eq!(DragItem::resolve(&t, "T-004").unwrap().kind, ItemKind::Task);
        assert!(DragItem::resolve(&t, "X-1").is_none());
    }

    // --- apply ---

    #[test]
    fn apply_positions_reorders_root_dropdowns() {
        let mut t = tree();
        let updates = assign_positions(&ids(&["D-003", "D-001", "D-002"]));
        let group = SiblingGroup::Root {
            checklist_id: "C-001".into(),
        };
        assert!(apply_positions(&mut t, &group, &updates));
        let order: Vec<&str> = t[0].dropdowns.iter().map(|d| d.id.as_str()).collect();
        assert_eq!(order, vec!["D-003", "D-001", "D-002"]);
        assert_eq!(t[0].dropdowns[0].position, Some(0));
        assert_eq!(t[0].dropdowns[2].position, Some(2));
    }

    #[test]
    fn apply_positions_to_tasks_and_missing_group() {
        let mut t = tree();
        let group = SiblingGroup::Tasks {
            dropdown_id: "D-006".into(),
        };
        assert!(apply_positions(&mut t, &group, &assign_positions(&ids(&["T-011", "T-010"]))));
        let d = find_dropdown(&t[0].dropdowns, "D-006").unwrap();
        assert_eq!(d.tasks[0].id, "T-011");

        let missing = SiblingGroup::Tasks {
            dropdown_id: "D-404".into(),
        };
        assert!(!apply_positions(&mut t, &missing, &[]));
    }
}
