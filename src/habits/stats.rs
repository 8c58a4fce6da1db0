//! Month/year statistics aggregated from same-named day tasks.
//!
//! [`aggregate`] is the pure half: it takes the live day tasks of one window
//! (ascending by date) and derives completion, time, and streaks.
//! [`StatsCache`] memoizes the result per `(scope, period, name)` until a day
//! task with that name changes.

use chrono::NaiveDate;
use std::collections::HashMap;
use std::sync::Mutex;

use super::calendar::period_key;
use super::types::{Task, TaskStats, TaskStatus, TimeScope};
use crate::lock_or_recover;

/// Completion percentage, truncated toward zero.
///
/// `-1` means there is nothing to aggregate.
pub fn completion_rate(completed: i64, total: i64) -> i64 {
    if total == 0 {
        -1
    } else if completed == total {
        100
    } else {
        (completed * 100) / total
    }
}

/// Current and best streak over statuses ordered oldest to newest.
///
/// Unset days are skipped so that a day not yet marked neither breaks nor
/// extends a streak.
pub fn streaks<I>(statuses: I) -> (i64, i64)
where
    I: IntoIterator<Item = TaskStatus>,
{
    let (mut streak, mut best) = (0i64, 0i64);
    for status in statuses {
        match status {
            TaskStatus::Complete => streak += 1,
            TaskStatus::Incomplete => {
                best = best.max(streak);
                streak = 0;
            }
            TaskStatus::Unset => {}
        }
    }
    (streak, best.max(streak))
}

/// Aggregate day tasks (oldest first) into the stats of a `scope` task.
pub fn aggregate(scope: TimeScope, children: &[Task]) -> TaskStats {
    let total = children.len() as i64;
    let completed = children
        .iter()
        .filter(|t| t.status == TaskStatus::Complete)
        .count() as i64;
    let minutes = children
        .iter()
        .filter_map(|t| t.minutes)
        .map(i64::from)
        .sum();
    let total_with_time = children.iter().filter(|t| t.minutes.is_some()).count() as i64;

    let (streak, best_streak) = if scope == TimeScope::Year {
        let (s, b) = streaks(children.iter().map(|t| t.status));
        (Some(s), Some(b))
    } else {
        (None, None)
    };

    TaskStats {
        minutes,
        completed,
        total,
        total_with_time,
        completion_rate: completion_rate(completed, total),
        streak,
        best_streak,
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StatsKey {
    pub scope: TimeScope,
    pub period: String,
    pub name: String,
}

impl StatsKey {
    pub fn new(scope: TimeScope, date: NaiveDate, name: &str) -> Self {
        StatsKey {
            scope,
            period: period_key(date, scope),
            name: name.to_string(),
        }
    }
}

/// Memoized month/year statistics.
///
/// A disabled cache never stores anything, which turns every read into an
/// eager recomputation.
///
/// Every invalidation bumps a generation counter. A reader takes the
/// generation before querying the day tasks and stores its result with
/// [`StatsCache::insert_if_current`], so a result computed from rows that an
/// update has since replaced is discarded instead of cached.
pub struct StatsCache {
    enabled: bool,
    inner: Mutex<CacheInner>,
}

#[derive(Default)]
struct CacheInner {
    entries: HashMap<StatsKey, TaskStats>,
    generation: u64,
}

impl StatsCache {
    pub fn new(enabled: bool) -> Self {
        StatsCache {
            enabled,
            inner: Mutex::new(CacheInner::default()),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn get(&self, key: &StatsKey) -> Option<TaskStats> {
        if !self.enabled {
            return None;
        }
        lock_or_recover(&self.inner).entries.get(key).copied()
    }

    /// Current invalidation generation.
    pub fn generation(&self) -> u64 {
        lock_or_recover(&self.inner).generation
    }

    pub fn insert(&self, key: StatsKey, stats: TaskStats) {
        if self.enabled {
            lock_or_recover(&self.inner).entries.insert(key, stats);
        }
    }

    /// Store `stats` only if nothing was invalidated since `generation` was
    /// read. Returns whether the entry was stored.
    pub fn insert_if_current(&self, key: StatsKey, stats: TaskStats, generation: u64) -> bool {
        if !self.enabled {
            return false;
        }
        let mut inner = lock_or_recover(&self.inner);
        if inner.generation != generation {
            return false;
        }
        inner.entries.insert(key, stats);
        true
    }

    /// Drop the month and year entries a day task named `name` on `date` feeds.
    pub fn invalidate_day(&self, name: &str, date: NaiveDate) {
        let mut inner = lock_or_recover(&self.inner);
        inner.generation += 1;
        inner.entries.remove(&StatsKey::new(TimeScope::Month, date, name));
        inner.entries.remove(&StatsKey::new(TimeScope::Year, date, name));
    }

    pub fn clear(&self) {
        let mut inner = lock_or_recover(&self.inner);
        inner.generation += 1;
        inner.entries.clear();
    }

    pub fn len(&self) -> usize {
        lock_or_recover(&self.inner).entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for StatsCache {
    fn default() -> Self {
        Self::new(true)
    }
}
