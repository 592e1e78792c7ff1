//! Keeps the manager in line with the store by reloading on every change
//! notification.

use std::collections::{HashMap, HashSet};

use serde::Serialize;
use tokio::{sync::broadcast, task::JoinHandle};
use tracing::{debug, info, warn};

use super::task_list::TaskListManager;
use crate::domain::{
    feed::{ChangeFeed, Received, TASKS_TABLE},
    store::TaskStore,
    task::{Task, TaskId},
};

/// Keyed difference between the local list and a freshly fetched one.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReloadDiff {
    pub added: Vec<TaskId>,
    pub removed: Vec<TaskId>,
    /// Same id, different label or completion.
    pub changed: Vec<TaskId>,
    /// Same id, different position.
    pub moved: Vec<TaskId>,
}

impl ReloadDiff {
    pub fn between(local: &[Task], remote: &[Task]) -> Self {
        let known: HashMap<TaskId, &Task> = local.iter().map(|t| (t.id, t)).collect();
        let mut diff = Self::default();
        for task in remote {
            match known.get(&task.id) {
                None => diff.added.push(task.id),
                Some(old) => {
                    if old.label != task.label || old.completed != task.completed {
                        diff.changed.push(task.id);
                    }
                    if old.position != task.position {
                        diff.moved.push(task.id);
                    }
                }
            }
        }
        let fresh: HashSet<TaskId> = remote.iter().map(|t| t.id).collect();
        diff.removed = local.iter().filter(|t| !fresh.contains(&t.id)).map(|t| t.id).collect();
        diff
    }

    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty() && self.changed.is_empty() && self.moved.is_empty()
    }
}

/// Subscribes to the owner's task table and reloads the manager on every event.
///
/// The subscription is taken before this returns, so no event published after
/// the call is missed. Missed events from a lagging receiver collapse into a
/// single reload. The loop ends when `shutdown` fires or the feed closes.
pub fn spawn_reconciler<S: TaskStore>(
    manager: TaskListManager<S>,
    feed: &dyn ChangeFeed,
    mut shutdown: broadcast::Receiver<()>,
) -> JoinHandle<()> {
    let mut subscription = feed.subscribe(TASKS_TABLE, manager.owner());
    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = shutdown.recv() => break,
                received = subscription.recv() => match received {
                    Received::Event(event) => debug!(kind = ?event.kind, "task table changed"),
                    Received::Lagged(missed) => warn!(missed, "change feed lagged, reloading once"),
                    Received::Closed => break,
                },
            }
            // Failures are already reported by the manager.
            if let Ok(diff) = manager.on_change().await {
                if !diff.is_empty() {
                    debug!(?diff, "reconciled task list");
                }
            }
        }
        info!("reconciler stopped");
    })
}
