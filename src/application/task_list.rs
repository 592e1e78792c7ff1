use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use tokio::sync::{RwLock, broadcast};
use tracing::{error, info, instrument, warn};

use super::{notice::Notice, reconcile::ReloadDiff};
use crate::domain::{
    error::{TaskListError, TaskListResult},
    ordering::{is_dense, next_position, renumber, renumber_all, reorder, restore_order},
    store::TaskStore,
    task::{Label, NewTask, OwnerId, PositionUpdate, Summary, Task, TaskFields, TaskId},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    #[default]
    Uninitialized,
    Loading,
    Ready,
}

/// Point-in-time copy of what a render surface needs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ListView {
    pub phase: Phase,
    pub tasks: Vec<Task>,
    pub summary: Summary,
    pub inserting: bool,
    /// Tasks whose delete is in flight.
    pub deleting: Vec<TaskId>,
    /// No load has finished yet, so there is nothing to show but a skeleton.
    pub skeleton: bool,
}

/// Proof that the user was asked before a task is deleted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemovalTicket {
    pub id: TaskId,
    pub label: String,
}

impl RemovalTicket {
    pub fn prompt(&self) -> String {
        format!("Delete \"{}\"?", self.label)
    }
}

#[derive(Debug, Default)]
struct ListState {
    phase: Phase,
    settled: bool,
    tasks: Vec<Task>,
    /// Last sequence the store acknowledged; restored when an optimistic change fails.
    confirmed: Vec<Task>,
    inserting: bool,
    deleting: Vec<TaskId>,
}

impl ListState {
    fn find_mut(&mut self, id: TaskId) -> Option<&mut Task> {
        self.tasks.iter_mut().find(|t| t.id == id)
    }

    fn finish_delete(&mut self, id: TaskId) {
        self.deleting.retain(|pending| *pending != id);
    }
}

/// Applies persisted positions to the matching rows; other rows are untouched.
fn apply_positions(tasks: &mut [Task], updates: &[PositionUpdate]) {
    for update in updates {
        if let Some(task) = tasks.iter_mut().find(|t| t.id == update.id) {
            task.position = update.position;
            task.updated_at = update.updated_at;
        }
    }
}

/// Ordered task list of one owner, kept dense (positions `1..=N`) across
/// insert, toggle, delete and reorder.
///
/// Inserts and deletes are applied locally only after the store confirms them.
/// Toggles and reorders are applied first and rolled back on failure. Every
/// outcome is also published as a [`Notice`].
pub struct TaskListManager<S: TaskStore> {
    store: Arc<S>,
    owner: OwnerId,
    state: Arc<RwLock<ListState>>,
    notices: broadcast::Sender<Notice>,
}

impl<S: TaskStore> Clone for TaskListManager<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            owner: self.owner,
            state: Arc::clone(&self.state),
            notices: self.notices.clone(),
        }
    }
}

impl<S: TaskStore> TaskListManager<S> {
    pub fn new(store: S, owner: OwnerId) -> Self {
        Self::with_shared_store(Arc::new(store), owner)
    }

    pub fn with_shared_store(store: Arc<S>, owner: OwnerId) -> Self {
        let (notices, _) = broadcast::channel(32);
        Self { store, owner, state: Arc::new(RwLock::new(ListState::default())), notices }
    }

    pub fn owner(&self) -> OwnerId { self.owner }

    pub fn subscribe_notices(&self) -> broadcast::Receiver<Notice> { self.notices.subscribe() }

    pub async fn view(&self) -> ListView {
        let state = self.state.read().await;
        ListView {
            phase: state.phase,
            tasks: state.tasks.clone(),
            summary: Summary::of(&state.tasks),
            inserting: state.inserting,
            deleting: state.deleting.clone(),
            skeleton: !state.settled,
        }
    }

    /// Replaces the list with the store's view of the owner's tasks.
    ///
    /// On failure the previous list stays in place.
    #[instrument(skip(self), fields(owner = %self.owner))]
    pub async fn load(&self) -> TaskListResult<ReloadDiff> {
        self.state.write().await.phase = Phase::Loading;
        let fetched = self.store.list_by_owner(self.owner).await;

        let mut state = self.state.write().await;
        state.phase = Phase::Ready;
        state.settled = true;
        match fetched {
            Ok(tasks) => {
                if !is_dense(tasks.iter().map(|t| t.position)) {
                    warn!(count = tasks.len(), "store returned non-dense positions");
                }
                let diff = ReloadDiff::between(&state.tasks, &tasks);
                state.confirmed = tasks.clone();
                state.tasks = tasks;
                Ok(diff)
            }
            Err(err) => {
                drop(state);
                Err(self.report(TaskListError::Load(err)))
            }
        }
    }

    /// Reaction to a change notification: always a full reload.
    pub async fn on_change(&self) -> TaskListResult<ReloadDiff> {
        self.load().await
    }

    /// Appends a task at position `N + 1` once the store has assigned its id.
    #[instrument(skip(self, raw_label), fields(owner = %self.owner))]
    pub async fn insert(&self, raw_label: &str) -> TaskListResult<Task> {
        let label = Label::parse(raw_label).map_err(|e| self.report(e.into()))?;

        let position = {
            let mut state = self.state.write().await;
            if state.inserting {
                drop(state);
                return Err(self.report(TaskListError::Busy("insert")));
            }
            state.inserting = true;
            next_position(state.tasks.len())
        };

        let inserted = self.store.insert(NewTask { owner: self.owner, label, position }).await;

        let mut state = self.state.write().await;
        state.inserting = false;
        match inserted {
            Ok(task) => {
                // A reload may already have brought it in.
                if !state.tasks.iter().any(|t| t.id == task.id) {
                    state.tasks.push(task.clone());
                }
                if !state.confirmed.iter().any(|t| t.id == task.id) {
                    state.confirmed.push(task.clone());
                }
                drop(state);
                info!(task_id = %task.id, position = task.position, "task added");
                self.announce("Task added");
                Ok(task)
            }
            Err(err) => {
                drop(state);
                Err(self.report(TaskListError::Insert(err)))
            }
        }
    }

    /// Flips completion locally, then persists it. Returns the new value.
    #[instrument(skip(self), fields(owner = %self.owner))]
    pub async fn toggle_completion(&self, id: TaskId) -> TaskListResult<bool> {
        let completed = {
            let mut state = self.state.write().await;
            let Some(index) = state.tasks.iter().position(|t| t.id == id) else {
                drop(state);
                return Err(self.report(TaskListError::NotFound(id)));
            };
            let task = &mut state.tasks[index];
            task.completed = !task.completed;
            task.completed
        };

        let persisted = self
            .store
            .update_fields(id, TaskFields { completed: Some(completed), ..Default::default() })
            .await;

        let mut state = self.state.write().await;
        match persisted {
            Ok(()) => {
                if let Some(task) = state.confirmed.iter_mut().find(|t| t.id == id) {
                    task.completed = completed;
                }
                Ok(completed)
            }
            Err(err) => {
                // Only undo our own flip; a reload may have replaced the row meanwhile.
                if let Some(task) = state.find_mut(id) {
                    if task.completed == completed {
                        task.completed = !completed;
                    }
                }
                drop(state);
                Err(self.report(TaskListError::Toggle(err)))
            }
        }
    }

    /// First half of confirm-then-delete: checks the task exists and hands back
    /// what the confirmation prompt needs.
    pub async fn request_removal(&self, id: TaskId) -> TaskListResult<RemovalTicket> {
        let state = self.state.read().await;
        match state.tasks.iter().find(|t| t.id == id) {
            Some(task) => Ok(RemovalTicket { id, label: task.label.clone() }),
            None => {
                drop(state);
                Err(self.report(TaskListError::NotFound(id)))
            }
        }
    }

    /// Deletes a confirmed task and closes the gap it leaves.
    ///
    /// Deletes of different tasks may overlap; each renumbers the rows that are
    /// not themselves being deleted. If the delete itself fails the task stays,
    /// and positions are repaired if an overlapping delete shifted its
    /// neighbours. If renumbering fails afterwards the local list can no longer
    /// be trusted and is reloaded.
    #[instrument(skip(self, ticket), fields(owner = %self.owner, task_id = %ticket.id))]
    pub async fn remove(&self, ticket: RemovalTicket) -> TaskListResult<()> {
        let id = ticket.id;
        {
            let mut state = self.state.write().await;
            if state.deleting.contains(&id) {
                drop(state);
                return Err(self.report(TaskListError::Busy("delete")));
            }
            if !state.tasks.iter().any(|t| t.id == id) {
                drop(state);
                return Err(self.report(TaskListError::NotFound(id)));
            }
            state.deleting.push(id);
        }

        if let Err(err) = self.store.delete(id).await {
            self.state.write().await.finish_delete(id);
            self.close_gaps().await;
            return Err(self.report(TaskListError::Delete(err)));
        }

        let updates = {
            let state = self.state.read().await;
            let mut remaining: Vec<Task> = state
                .tasks
                .iter()
                .filter(|t| t.id != id && !state.deleting.contains(&t.id))
                .cloned()
                .collect();
            renumber(&mut remaining, Utc::now())
        };

        let persisted = self.store.batch_upsert(&updates).await;

        let mut state = self.state.write().await;
        state.finish_delete(id);
        match persisted {
            Ok(()) => {
                // Rows with a delete still in flight keep their old position
                // until that delete renumbers.
                state.tasks.retain(|t| t.id != id);
                state.confirmed.retain(|t| t.id != id);
                apply_positions(&mut state.tasks, &updates);
                apply_positions(&mut state.confirmed, &updates);
                drop(state);
                info!(renumbered = updates.len(), "task deleted");
                self.close_gaps().await;
                self.announce("Task deleted");
                Ok(())
            }
            Err(err) => {
                drop(state);
                error!(error = %err, "renumbering after delete failed, reloading");
                // A failed reload reports itself.
                let _ = self.load().await;
                Err(self.report(TaskListError::Renumber(err)))
            }
        }
    }

    /// Moves the task at `from` to `to` and persists the whole renumbered
    /// sequence as one batch.
    ///
    /// The new order is shown immediately; if the batch fails the list goes
    /// back to the last order the store confirmed.
    #[instrument(skip(self), fields(owner = %self.owner))]
    pub async fn reorder(&self, id: TaskId, from: usize, to: usize) -> TaskListResult<Vec<Task>> {
        let (next, updates) = {
            let mut state = self.state.write().await;
            if state.tasks.get(from).is_some_and(|t| t.id != id) {
                drop(state);
                return Err(self.report(TaskListError::Stale { id, index: from }));
            }
            let mut next = match reorder(&state.tasks, from, to) {
                Ok(next) => next,
                Err(err) => {
                    drop(state);
                    return Err(self.report(err.into()));
                }
            };
            let updates = renumber_all(&mut next, Utc::now());
            state.tasks = next.clone();
            (next, updates)
        };

        let persisted = self.store.batch_upsert(&updates).await;

        let mut state = self.state.write().await;
        match persisted {
            Ok(()) => {
                state.confirmed = next.clone();
                Ok(next)
            }
            Err(err) => {
                // Back to the confirmed order, keeping any flags changed since.
                state.tasks = restore_order(&state.tasks, &state.confirmed);
                drop(state);
                Err(self.report(TaskListError::Reorder(err)))
            }
        }
    }

    /// Renumbers the rows with no delete in flight when overlapping deletes
    /// left gaps or duplicate positions, e.g. one delete failed after another
    /// already renumbered around it.
    async fn close_gaps(&self) {
        let updates = {
            let state = self.state.read().await;
            if is_dense(state.tasks.iter().map(|t| t.position)) {
                return;
            }
            let mut settled: Vec<Task> = state.tasks.iter().filter(|t| !state.deleting.contains(&t.id)).cloned().collect();
            renumber(&mut settled, Utc::now())
        };
        if updates.is_empty() {
            return;
        }
        match self.store.batch_upsert(&updates).await {
            Ok(()) => {
                let mut state = self.state.write().await;
                apply_positions(&mut state.tasks, &updates);
                apply_positions(&mut state.confirmed, &updates);
            }
            Err(err) => {
                warn!(error = %err, "closing gaps after failed delete failed, reloading");
                let _ = self.load().await;
            }
        }
    }

    fn announce(&self, message: &str) {
        let _ = self.notices.send(Notice::success(message));
    }

    fn report(&self, err: TaskListError) -> TaskListError {
        if err.is_remote() {
            error!(error = ?err, "task list operation failed");
        } else {
            warn!(error = %err, "task list operation rejected");
        }
        let _ = self.notices.send(Notice::error(err.to_string()));
        err
    }
}
