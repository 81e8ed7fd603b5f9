pub mod task;
pub mod dropdown;
pub mod checklist;
pub mod learning_page;
pub mod user;
pub mod workspace;
pub mod config;

pub use task::*;
pub use dropdown::*;
pub use checklist::*;
pub use learning_page::*;
pub use user::*;
pub use workspace::*;
pub use config::*;
