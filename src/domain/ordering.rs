//! Position bookkeeping for an owner's task list.
//!
//! Positions are 1-based and dense: a list of N tasks holds exactly the
//! positions `1..=N`. Everything here is pure so the manager can compute the
//! next sequence before anything is sent to the store.

use chrono::{DateTime, Utc};

use super::error::OrderingError;
use super::task::{PositionUpdate, Task};

/// Moves the element at `from` to `to` with list-splice semantics.
///
/// Elements strictly between the two indices shift one slot towards the gap.
pub fn reorder<T: Clone>(sequence: &[T], from: usize, to: usize) -> Result<Vec<T>, OrderingError> {
    let len = sequence.len();
    if from >= len {
        return Err(OrderingError::OutOfRange { index: from, len });
    }
    if to >= len {
        return Err(OrderingError::OutOfRange { index: to, len });
    }
    if from == to {
        return Err(OrderingError::SameIndex(from));
    }
    let mut next = sequence.to_vec();
    let moved = next.remove(from);
    next.insert(to, moved);
    Ok(next)
}

/// Reassigns `position = index + 1` and returns only the rows that changed.
pub fn renumber(tasks: &mut [Task], now: DateTime<Utc>) -> Vec<PositionUpdate> {
    assign_positions(tasks, now, false)
}

/// Reassigns `position = index + 1` and returns every row.
pub fn renumber_all(tasks: &mut [Task], now: DateTime<Utc>) -> Vec<PositionUpdate> {
    assign_positions(tasks, now, true)
}

fn assign_positions(tasks: &mut [Task], now: DateTime<Utc>, include_unchanged: bool) -> Vec<PositionUpdate> {
    let mut updates = Vec::new();
    for (index, task) in tasks.iter_mut().enumerate() {
        let position = index as u32 + 1;
        let changed = task.position != position;
        if changed {
            task.position = position;
            task.updated_at = now;
        }
        if changed || include_unchanged {
            updates.push(PositionUpdate { id: task.id, position, updated_at: now });
        }
    }
    updates
}

/// Puts the rows of `current` back into the order of `confirmed`.
///
/// Only order and positions come from `confirmed`; every other field is kept
/// from `current`. Rows `confirmed` doesn't know go last.
pub fn restore_order(current: &[Task], confirmed: &[Task]) -> Vec<Task> {
    let mut restored = current.to_vec();
    restored.sort_by_key(|t| confirmed.iter().position(|c| c.id == t.id).unwrap_or(usize::MAX));
    for task in &mut restored {
        if let Some(known) = confirmed.iter().find(|c| c.id == task.id) {
            task.position = known.position;
        }
    }
    restored
}

/// Position to give a task appended to a list of `len` tasks.
pub fn next_position(len: usize) -> u32 {
    len as u32 + 1
}

/// True when `positions` is exactly `{1..=N}` with no duplicates.
pub fn is_dense<I: IntoIterator<Item = u32>>(positions: I) -> bool {
    let mut sorted: Vec<u32> = positions.into_iter().collect();
    sorted.sort_unstable();
    sorted.iter().enumerate().all(|(i, &p)| p == i as u32 + 1)
}
