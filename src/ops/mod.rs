pub mod check;
pub mod reorder;
pub mod task_links;
pub mod tree_ops;
