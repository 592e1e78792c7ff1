use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::error::LabelError;

pub const MAX_LABEL_CHARS: usize = 255;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(transparent)]
pub struct TaskId(pub Uuid);

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { self.0.fmt(f) }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(transparent)]
pub struct OwnerId(pub Uuid);

impl fmt::Display for OwnerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { self.0.fmt(f) }
}

/// Task label, trimmed and between 1 and 255 characters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct Label(String);

impl Label {
    pub fn parse(raw: &str) -> Result<Self, LabelError> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(LabelError::Empty);
        }
        let chars = trimmed.chars().count();
        if chars > MAX_LABEL_CHARS {
            return Err(LabelError::TooLong { chars, max: MAX_LABEL_CHARS });
        }
        Ok(Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str { &self.0 }

    pub fn into_inner(self) -> String { self.0 }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Task {
    pub id: TaskId,
    pub owner: OwnerId,
    pub label: String,
    pub completed: bool,
    pub position: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Row handed to the store on insert; the store assigns id and timestamps.
#[derive(Debug, Clone)]
pub struct NewTask {
    pub owner: OwnerId,
    pub label: Label,
    pub position: u32,
}

/// Partial update of the non-ordering fields of a task.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaskFields {
    pub label: Option<Label>,
    pub completed: Option<bool>,
}

/// One row of a batch position upsert, keyed by task id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PositionUpdate {
    pub id: TaskId,
    pub position: u32,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Default)]
pub struct Summary {
    pub completed: usize,
    pub total: usize,
}

impl Summary {
    pub fn of(tasks: &[Task]) -> Self {
        Self { completed: tasks.iter().filter(|t| t.completed).count(), total: tasks.len() }
    }
}

impl fmt::Display for Summary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} of {} completed", self.completed, self.total)
    }
}
