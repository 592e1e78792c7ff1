pub mod notice;
pub mod reconcile;
pub mod task_list;
