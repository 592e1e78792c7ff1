pub mod broadcast_feed;
pub mod sqlite_store;
