use serde::Serialize;

use super::task::OwnerId;

pub const TASKS_TABLE: &str = "tasks";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeKind { Insert, Update, Delete }

/// "Something changed" signal; subscribers refetch rather than read the payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChangeEvent {
    pub table: String,
    pub owner: OwnerId,
    pub kind: ChangeKind,
}

#[derive(Debug, PartialEq, Eq)]
pub enum Received {
    Event(ChangeEvent),
    /// The subscriber fell behind and `n` events were dropped.
    Lagged(u64),
    Closed,
}

/// Live subscription to a change channel. Dropping it unsubscribes.
#[async_trait::async_trait]
pub trait Subscription: Send {
    async fn recv(&mut self) -> Received;
}

pub trait ChangeFeed: Send + Sync + 'static {
    fn subscribe(&self, table: &str, owner: OwnerId) -> Box<dyn Subscription>;
}
