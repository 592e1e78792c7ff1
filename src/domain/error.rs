use thiserror::Error;

use super::task::TaskId;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LabelError {
    #[error("task label must not be empty")]
    Empty,

    #[error("task label is {chars} characters, at most {max} allowed")]
    TooLong { chars: usize, max: usize },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OrderingError {
    #[error("source and target index are both {0}")]
    SameIndex(usize),

    #[error("index {index} is out of range for a list of {len}")]
    OutOfRange { index: usize, len: usize },
}

/// Failures reported by the task list manager.
///
/// Remote failures carry the store's error as their source; the message names
/// the action that failed so it can be shown to the user as is.
#[derive(Debug, Error)]
pub enum TaskListError {
    #[error(transparent)]
    Validation(#[from] LabelError),

    #[error(transparent)]
    Ordering(#[from] OrderingError),

    #[error("task {0} not found")]
    NotFound(TaskId),

    #[error("task {id} is no longer at index {index}")]
    Stale { id: TaskId, index: usize },

    #[error("another {0} is already in progress")]
    Busy(&'static str),

    #[error("failed to load tasks")]
    Load(#[source] anyhow::Error),

    #[error("failed to add task")]
    Insert(#[source] anyhow::Error),

    #[error("failed to update task")]
    Toggle(#[source] anyhow::Error),

    #[error("failed to delete task")]
    Delete(#[source] anyhow::Error),

    #[error("task deleted but renumbering failed; reloading")]
    Renumber(#[source] anyhow::Error),

    #[error("failed to save new order")]
    Reorder(#[source] anyhow::Error),
}

impl TaskListError {
    /// True for failures raised by the remote store rather than by input checks.
    pub fn is_remote(&self) -> bool {
        matches!(
            self,
            Self::Load(_) | Self::Insert(_) | Self::Toggle(_) | Self::Delete(_) | Self::Renumber(_) | Self::Reorder(_)
        )
    }
}

pub type TaskListResult<T> = Result<T, TaskListError>;
