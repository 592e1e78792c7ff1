pub mod error;
pub mod feed;
pub mod ordering;
pub mod store;
pub mod task;
