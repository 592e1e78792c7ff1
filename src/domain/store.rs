use async_trait::async_trait;

use super::task::{NewTask, OwnerId, PositionUpdate, Task, TaskFields, TaskId};

/// Remote record store holding every owner's tasks.
///
/// Implementations are passed into the manager at construction; nothing in the
/// crate reaches for a shared global connection.
#[async_trait]
pub trait TaskStore: Send + Sync + 'static {
    async fn init(&self) -> anyhow::Result<()>;

    /// All tasks of `owner`, ascending by position.
    async fn list_by_owner(&self, owner: OwnerId) -> anyhow::Result<Vec<Task>>;

    /// Inserts a row and returns it with the store-assigned id.
    async fn insert(&self, input: NewTask) -> anyhow::Result<Task>;

    async fn update_fields(&self, id: TaskId, fields: TaskFields) -> anyhow::Result<()>;

    async fn delete(&self, id: TaskId) -> anyhow::Result<()>;

    /// Writes every position in `updates` or none of them.
    async fn batch_upsert(&self, updates: &[PositionUpdate]) -> anyhow::Result<()>;
}
