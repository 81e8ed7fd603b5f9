pub mod detail;
pub mod store;
