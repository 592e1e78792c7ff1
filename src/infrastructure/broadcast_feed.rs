use async_trait::async_trait;
use tokio::sync::broadcast::{self, error::RecvError};

use crate::domain::{
    feed::{ChangeEvent, ChangeFeed, ChangeKind, Received, Subscription},
    task::OwnerId,
};

/// In-process change channel backed by a tokio broadcast.
#[derive(Clone)]
pub struct BroadcastChangeFeed {
    tx: broadcast::Sender<ChangeEvent>,
}

impl BroadcastChangeFeed {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    pub fn publish(&self, table: &str, owner: OwnerId, kind: ChangeKind) {
        // No subscribers is not an error.
        let _ = self.tx.send(ChangeEvent { table: table.to_string(), owner, kind });
    }
}

impl Default for BroadcastChangeFeed {
    fn default() -> Self { Self::new(64) }
}

impl ChangeFeed for BroadcastChangeFeed {
    fn subscribe(&self, table: &str, owner: OwnerId) -> Box<dyn Subscription> {
        Box::new(BroadcastSubscription { rx: self.tx.subscribe(), table: table.to_string(), owner })
    }
}

struct BroadcastSubscription {
    rx: broadcast::Receiver<ChangeEvent>,
    table: String,
    owner: OwnerId,
}

#[async_trait]
impl Subscription for BroadcastSubscription {
    async fn recv(&mut self) -> Received {
        loop {
            match self.rx.recv().await {
                Ok(event) if event.table == self.table && event.owner == self.owner => return Received::Event(event),
                Ok(_) => continue,
                Err(RecvError::Lagged(n)) => return Received::Lagged(n),
                Err(RecvError::Closed) => return Received::Closed,
            }
        }
    }
}
