//! Dense ordering of tasks within a partition.
//!
//! Every live task in a [`Partition`] holds a distinct position in
//! `0..n`. The functions here are planners: they take the loaded sibling
//! lists and return the [`PositionUpdate`]s that restore density after an
//! insert, delete, swap, or move. `db::tasks` applies a plan inside a single
//! transaction, so a failed plan never leaves a half-written order.

use chrono::NaiveDate;

use super::calendar::Partition;
use super::types::{ScopeKind, Task};
use crate::errors::{HabitError, HabitResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PositionUpdate {
    pub id: i64,
    pub position: i32,
    /// Set when the task also changes scope/date (cross-scope move).
    pub moved_to: Option<(ScopeKind, NaiveDate)>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Up,
    Down,
}

/// New tasks are appended.
pub fn append_position(live_siblings: usize) -> i32 {
    live_siblings as i32
}

pub fn is_dense<I>(positions: I) -> bool
where
    I: IntoIterator<Item = i32>,
{
    let mut sorted: Vec<i32> = positions.into_iter().collect();
    sorted.sort_unstable();
    sorted.iter().enumerate().all(|(i, &p)| p == i as i32)
}

/// Whether `source` and `target` share a partition.
///
/// Windows are compared by calendar value, not by raw timestamp.
pub fn within_scope(source: &Task, target: &Task) -> bool {
    source.scope == target.scope
        && Partition::of(source.scope, source.date) == Partition::of(target.scope, target.date)
}

/// Assign `0..n` in list order, emitting updates only for rows that change.
pub fn renumber(list: &mut [Task]) -> Vec<PositionUpdate> {
    let mut updates = Vec::new();
    for (i, task) in list.iter_mut().enumerate() {
        let position = i as i32;
        if task.position != position {
            task.position = position;
            updates.push(PositionUpdate {
                id: task.id,
                position,
                moved_to: None,
            });
        }
    }
    updates
}

/// Updates that close the gap left by a deleted task.
///
/// `siblings` may or may not still contain the removed task; it is skipped.
pub fn close_gap(siblings: &[Task], removed_id: i64, removed_position: i32) -> Vec<PositionUpdate> {
    siblings
        .iter()
        .filter(|t| t.id != removed_id && t.position > removed_position)
        .map(|t| PositionUpdate {
            id: t.id,
            position: t.position - 1,
            moved_to: None,
        })
        .collect()
}

/// Swap a task with its neighbour. `None` at the edges of the list.
pub fn plan_swap(list: &[Task], id: i64, direction: Direction) -> HabitResult<Option<Vec<PositionUpdate>>> {
    let mut ordered = list.to_vec();
    ordered.sort_by_key(|t| (t.position, t.id));
    let idx = ordered
        .iter()
        .position(|t| t.id == id)
        .ok_or_else(|| HabitError::not_found(format!("task {} not in its scope", id)))?;
    let other = match direction {
        Direction::Up if idx > 0 => idx - 1,
        Direction::Down if idx + 1 < ordered.len() => idx + 1,
        _ => return Ok(None),
    };
    ordered.swap(idx, other);
    Ok(Some(renumber(&mut ordered)))
}

/// Result of [`plan_reorder`]: the final lists and the rows to write.
#[derive(Debug, Clone)]
pub struct ReorderPlan {
    pub within_scope: bool,
    pub source_list: Vec<Task>,
    /// Only populated for cross-scope moves.
    pub target_list: Vec<Task>,
    pub updates: Vec<PositionUpdate>,
}

impl ReorderPlan {
    /// Partitions that must be re-broadcast after the plan commits.
    pub fn touched_partitions(&self, source: &Task, target: &Task) -> Vec<Partition> {
        let mut partitions = Vec::with_capacity(2);
        if !self.within_scope {
            partitions.push(Partition::of(target.scope, target.date));
        }
        partitions.push(Partition::of(source.scope, source.date));
        partitions
    }
}

/// Place `source` immediately after `target`.
///
/// `source_list` is the ordered partition of the source; `target_list` the
/// ordered partition of the target, required only when the two differ.
/// Fails with `NotFound`, before producing any update, if either task is
/// missing from the list it should be in.
pub fn plan_reorder(
    source: &Task,
    target: &Task,
    mut source_list: Vec<Task>,
    target_list: Option<Vec<Task>>,
) -> HabitResult<ReorderPlan> {
    let within = within_scope(source, target);

    let src_idx = source_list
        .iter()
        .position(|t| t.id == source.id)
        .ok_or_else(|| HabitError::not_found(format!("task {} not in its scope", source.id)))?;

    if source.id == target.id {
        return Ok(ReorderPlan {
            within_scope: true,
            source_list,
            target_list: Vec::new(),
            updates: Vec::new(),
        });
    }

    if within {
        let moving = source_list.remove(src_idx);
        let tgt_idx = source_list
            .iter()
            .position(|t| t.id == target.id)
            .ok_or_else(|| HabitError::not_found(format!("task {} not in its scope", target.id)))?;
        source_list.insert(tgt_idx + 1, moving);
        let updates = renumber(&mut source_list);
        return Ok(ReorderPlan {
            within_scope: true,
            source_list,
            target_list: Vec::new(),
            updates,
        });
    }

    let mut target_list = target_list.ok_or_else(|| {
        HabitError::not_found(format!("scope of task {} was not loaded", target.id))
    })?;
    let tgt_idx = target_list
        .iter()
        .position(|t| t.id == target.id)
        .ok_or_else(|| HabitError::not_found(format!("task {} not in its scope", target.id)))?;

    let mut moving = source_list.remove(src_idx);
    moving.scope = target.scope;
    moving.date = target.date;
    target_list.insert(tgt_idx + 1, moving);

    let mut updates = renumber(&mut source_list);
    for (i, task) in target_list.iter_mut().enumerate() {
        let position = i as i32;
        let moved = task.id == source.id;
        if task.position != position || moved {
            task.position = position;
            updates.push(PositionUpdate {
                id: task.id,
                position,
                moved_to: moved.then_some((target.scope, target.date)),
            });
        }
    }

    Ok(ReorderPlan {
        within_scope: false,
        source_list,
        target_list,
        updates,
    })
}
