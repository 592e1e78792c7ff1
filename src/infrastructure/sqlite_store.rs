use std::{collections::BTreeSet, str::FromStr, sync::Arc};

use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{
    Pool, Row, Sqlite,
    sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteRow},
};
use uuid::Uuid;

use super::broadcast_feed::BroadcastChangeFeed;
use crate::domain::{
    feed::{ChangeKind, TASKS_TABLE},
    store::TaskStore,
    task::{NewTask, OwnerId, PositionUpdate, Task, TaskFields, TaskId},
};

const TASK_COLUMNS: &str = "id, owner_id, label, completed, position, created_at, updated_at";

/// SQLite-backed task store. Every successful write is announced on the
/// change feed it was built with.
#[derive(Clone)]
pub struct SqliteTaskStore {
    pool: Arc<Pool<Sqlite>>,
    feed: BroadcastChangeFeed,
}

impl SqliteTaskStore {
    pub async fn connect(database_url: &str, feed: BroadcastChangeFeed) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(database_url)
            .with_context(|| format!("invalid database url {database_url}"))?
            .create_if_missing(true);
        let pool = pool_options(database_url).connect_with(options).await?;
        Ok(Self { pool: Arc::new(pool), feed })
    }

    pub fn feed(&self) -> &BroadcastChangeFeed { &self.feed }
}

#[async_trait]
impl TaskStore for SqliteTaskStore {
    async fn init(&self) -> Result<()> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS tasks (
                id TEXT PRIMARY KEY,
                owner_id TEXT NOT NULL,
                label TEXT NOT NULL CHECK (length(label) BETWEEN 1 AND 255),
                completed INTEGER NOT NULL DEFAULT 0,
                position INTEGER NOT NULL CHECK (position >= 1),
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )",
        )
        .execute(&*self.pool)
        .await?;
        sqlx::query("CREATE INDEX IF NOT EXISTS tasks_owner_position ON tasks (owner_id, position)")
            .execute(&*self.pool)
            .await?;
        Ok(())
    }

    async fn list_by_owner(&self, owner: OwnerId) -> Result<Vec<Task>> {
        let rows = sqlx::query(&format!("SELECT {TASK_COLUMNS} FROM tasks WHERE owner_id = ?1 ORDER BY position ASC"))
            .bind(owner.0.to_string())
            .fetch_all(&*self.pool)
            .await?;
        rows.into_iter().map(row_to_task).collect()
    }

    async fn insert(&self, input: NewTask) -> Result<Task> {
        let now = Utc::now();
        let task = Task {
            id: TaskId(Uuid::new_v4()),
            owner: input.owner,
            label: input.label.into_inner(),
            completed: false,
            position: input.position,
            created_at: now,
            updated_at: now,
        };
        sqlx::query(&format!("INSERT INTO tasks ({TASK_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)"))
            .bind(task.id.0.to_string())
            .bind(task.owner.0.to_string())
            .bind(&task.label)
            .bind(task.completed)
            .bind(i64::from(task.position))
            .bind(now.to_rfc3339())
            .bind(now.to_rfc3339())
            .execute(&*self.pool)
            .await?;
        self.feed.publish(TASKS_TABLE, task.owner, ChangeKind::Insert);
        Ok(task)
    }

    async fn update_fields(&self, id: TaskId, fields: TaskFields) -> Result<()> {
        let row = sqlx::query(
            "UPDATE tasks SET label = COALESCE(?2, label), completed = COALESCE(?3, completed), updated_at = ?4
             WHERE id = ?1 RETURNING owner_id",
        )
        .bind(id.0.to_string())
        .bind(fields.label.map(|l| l.into_inner()))
        .bind(fields.completed)
        .bind(Utc::now().to_rfc3339())
        .fetch_optional(&*self.pool)
        .await?;
        let Some(row) = row else { bail!("task {id} not found") };
        self.feed.publish(TASKS_TABLE, owner_of(&row)?, ChangeKind::Update);
        Ok(())
    }

    async fn delete(&self, id: TaskId) -> Result<()> {
        let row = sqlx::query("DELETE FROM tasks WHERE id = ?1 RETURNING owner_id")
            .bind(id.0.to_string())
            .fetch_optional(&*self.pool)
            .await?;
        let Some(row) = row else { bail!("task {id} not found") };
        self.feed.publish(TASKS_TABLE, owner_of(&row)?, ChangeKind::Delete);
        Ok(())
    }

    async fn batch_upsert(&self, updates: &[PositionUpdate]) -> Result<()> {
        if updates.is_empty() {
            return Ok(());
        }
        let mut owners = BTreeSet::new();
        let mut tx = self.pool.begin().await?;
        for update in updates {
            let row = sqlx::query("UPDATE tasks SET position = ?2, updated_at = ?3 WHERE id = ?1 RETURNING owner_id")
                .bind(update.id.0.to_string())
                .bind(i64::from(update.position))
                .bind(update.updated_at.to_rfc3339())
                .fetch_optional(&mut *tx)
                .await?;
            // Returning early drops `tx`, which rolls the whole batch back.
            let Some(row) = row else { bail!("task {} not found", update.id) };
            owners.insert(owner_of(&row)?.0);
        }
        tx.commit().await?;
        for owner in owners {
            self.feed.publish(TASKS_TABLE, OwnerId(owner), ChangeKind::Update);
        }
        Ok(())
    }
}

/// Each connection to an in-memory database is its own database, so those
/// get exactly one connection that is never reaped.
fn pool_options(database_url: &str) -> SqlitePoolOptions {
    if database_url.contains(":memory:") {
        SqlitePoolOptions::new().max_connections(1).idle_timeout(None).max_lifetime(None)
    } else {
        SqlitePoolOptions::new().max_connections(5)
    }
}

fn owner_of(row: &SqliteRow) -> Result<OwnerId> {
    let raw: String = row.try_get("owner_id")?;
    Ok(OwnerId(Uuid::parse_str(&raw)?))
}

fn row_to_task(row: SqliteRow) -> Result<Task> {
    let id: String = row.try_get("id")?;
    let position: i64 = row.try_get("position")?;
    let created_at: String = row.try_get("created_at")?;
    let updated_at: String = row.try_get("updated_at")?;

    Ok(Task {
        id: TaskId(Uuid::parse_str(&id).with_context(|| format!("bad task id {id}"))?),
        owner: owner_of(&row)?,
        label: row.try_get("label")?,
        completed: row.try_get("completed")?,
        position: u32::try_from(position).with_context(|| format!("bad position {position} for task {id}"))?,
        created_at: parse_timestamp(&created_at)?,
        updated_at: parse_timestamp(&updated_at)?,
    })
}

fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>> {
    Ok(DateTime::parse_from_rfc3339(raw).with_context(|| format!("bad timestamp {raw}"))?.with_timezone(&Utc))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{
        feed::{ChangeFeed, Received},
        ordering::is_dense,
        task::Label,
    };

    async fn store() -> SqliteTaskStore {
        let store = SqliteTaskStore::connect("sqlite::memory:", BroadcastChangeFeed::default()).await.unwrap();
        store.init().await.unwrap();
        store
    }

    async fn add(store: &SqliteTaskStore, owner: OwnerId, label: &str, position: u32) -> Task {
        store.insert(NewTask { owner, label: Label::parse(label).unwrap(), position }).await.unwrap()
    }

    #[tokio::test]
    async fn lists_only_the_owner_in_position_order() {
        let store = store().await;
        let me = OwnerId(Uuid::new_v4());
        let other = OwnerId(Uuid::new_v4());
        add(&store, me, "second", 2).await;
        add(&store, other, "theirs", 1).await;
        add(&store, me, "first", 1).await;

        let listed = store.list_by_owner(me).await.unwrap();
        let labels: Vec<_> = listed.iter().map(|t| t.label.as_str()).collect();
        assert_eq!(labels, ["first", "second"]);
        assert!(is_dense(listed.iter().map(|t| t.position)));
    }

    #[tokio::test]
    async fn update_fields_touches_only_given_fields() {
        let store = store().await;
        let me = OwnerId::default();
        let task = add(&store, me, "read", 1).await;
        store.update_fields(task.id, TaskFields { completed: Some(true), ..Default::default() }).await.unwrap();

        let got = &store.list_by_owner(me).await.unwrap()[0];
        assert!(got.completed);
        assert_eq!(got.label, "read");
        assert_eq!(got.position, 1);
    }

    #[tokio::test]
    async fn batch_upsert_is_all_or_nothing() {
        let store = store().await;
        let me = OwnerId::default();
        let a = add(&store, me, "a", 1).await;
        let now = Utc::now();
        let updates = [
            PositionUpdate { id: a.id, position: 2, updated_at: now },
            PositionUpdate { id: TaskId(Uuid::new_v4()), position: 1, updated_at: now },
        ];
        assert!(store.batch_upsert(&updates).await.is_err());
        assert_eq!(store.list_by_owner(me).await.unwrap()[0].position, 1);
    }

    #[test]
    fn in_memory_pool_keeps_its_only_connection() {
        let memory = pool_options("sqlite::memory:");
        assert_eq!(memory.get_max_connections(), 1);
        assert_eq!(memory.get_idle_timeout(), None);
        assert_eq!(memory.get_max_lifetime(), None);

        let file = pool_options("sqlite://lifeos.db");
        assert_eq!(file.get_max_connections(), 5);
        assert!(file.get_idle_timeout().is_some());
    }

    #[tokio::test]
    async fn deleting_a_missing_task_fails() {
        let store = store().await;
        assert!(store.delete(TaskId(Uuid::new_v4())).await.is_err());
    }

    #[tokio::test]
    async fn writes_are_announced_on_the_feed() {
        let store = store().await;
        let me = OwnerId(Uuid::new_v4());
        let mut sub = store.feed().subscribe(TASKS_TABLE, me);
        let task = add(&store, me, "ping", 1).await;
        store.delete(task.id).await.unwrap();

        assert!(matches!(sub.recv().await, Received::Event(e) if e.kind == ChangeKind::Insert));
        assert!(matches!(sub.recv().await, Received::Event(e) if e.kind == ChangeKind::Delete));
    }
}
