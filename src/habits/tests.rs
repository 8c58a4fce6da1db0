//! Unit tests for aggregation, ordering planners, project windows, and repair.

use super::calendar::Partition;
use super::ordering::*;
use super::project_stats::*;
use super::repair::plan_repair;
use super::stats::*;
use super::*;
use crate::db::PositionRow;
use chrono::{NaiveDate, TimeZone, Utc};

fn d(y: i32, m: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, day).unwrap()
}

fn task(id: i64, scope: ScopeKind, date: NaiveDate, position: i32) -> Task {
    let ts = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
    Task {
        id,
        name: format!("task-{}", id),
        date,
        scope,
        status: TaskStatus::Unset,
        position,
        minutes: None,
        comment: None,
        stats: None,
        created_at: ts,
        updated_at: ts,
        deleted_at: None,
    }
}

fn day_with(status: TaskStatus, minutes: Option<i32>, day: u32) -> Task {
    let mut t = task(i64::from(day), ScopeKind::Day, d(2024, 7, day), 0);
    t.name = "run".into();
    t.status = status;
    t.minutes = minutes;
    t
}

fn apply(list: &mut [Task], updates: &[PositionUpdate]) {
    for u in updates {
        if let Some(t) = list.iter_mut().find(|t| t.id == u.id) {
            t.position = u.position;
        }
    }
}

// ── Completion and streaks ──────────────────────────────────────

#[test]
fn completion_rate_truncates() {
    assert_eq!(completion_rate(3, 7), 42);
    assert_eq!(completion_rate(1, 3), 33);
}

#[test]
fn completion_rate_sentinels() {
    assert_eq!(completion_rate(0, 0), -1);
    assert_eq!(completion_rate(5, 5), 100);
    assert_eq!(completion_rate(0, 4), 0);
}

#[test]
fn streak_skips_unset_days() {
    use TaskStatus::*;
    assert_eq!(
        streaks([Complete, Complete, Incomplete, Complete, Unset, Complete]),
        (2, 2)
    );
}

#[test]
fn best_streak_survives_a_break() {
    use TaskStatus::*;
    assert_eq!(
        streaks([Complete, Complete, Complete, Incomplete, Complete]),
        (1, 3)
    );
    assert_eq!(streaks(Vec::<TaskStatus>::new()), (0, 0));
    assert_eq!(streaks([Unset, Unset]), (0, 0));
}

#[test]
fn month_aggregate_counts_all_live_children() {
    let children = vec![
        day_with(TaskStatus::Complete, Some(30), 1),
        day_with(TaskStatus::Complete, None, 2),
        day_with(TaskStatus::Incomplete, Some(10), 3),
        day_with(TaskStatus::Unset, None, 4),
        day_with(TaskStatus::Complete, Some(0), 5),
        day_with(TaskStatus::Incomplete, None, 6),
        day_with(TaskStatus::Unset, None, 7),
    ];
    let stats = aggregate(TimeScope::Month, &children);
    assert_eq!(stats.total, 7);
    assert_eq!(stats.completed, 3);
    assert_eq!(stats.completion_rate, 42);
    assert_eq!(stats.minutes, 40);
    assert_eq!(stats.total_with_time, 3);
    assert_eq!(stats.streak, None);
    assert_eq!(stats.best_streak, None);
}

#[test]
fn year_aggregate_includes_streaks() {
    let children = vec![
        day_with(TaskStatus::Complete, None, 1),
        day_with(TaskStatus::Complete, None, 2),
        day_with(TaskStatus::Incomplete, None, 3),
        day_with(TaskStatus::Complete, None, 4),
    ];
    let stats = aggregate(TimeScope::Year, &children);
    assert_eq!(stats.streak, Some(1));
    assert_eq!(stats.best_streak, Some(2));
}

#[test]
fn empty_aggregate_reports_no_data() {
    let stats = aggregate(TimeScope::Month, &[]);
    assert_eq!(stats.total, 0);
    assert_eq!(stats.completion_rate, -1);
}

// ── Stats cache ─────────────────────────────────────────────────

#[test]
fn cache_invalidates_month_and_year_of_a_day() {
    let cache = StatsCache::new(true);
    let stats = TaskStats::default();
    cache.insert(StatsKey::new(TimeScope::Month, d(2024, 7, 1), "run"), stats);
    cache.insert(StatsKey::new(TimeScope::Year, d(2024, 1, 1), "run"), stats);
    cache.insert(StatsKey::new(TimeScope::Month, d(2024, 6, 1), "run"), stats);
    cache.insert(StatsKey::new(TimeScope::Month, d(2024, 7, 1), "read"), stats);
    assert_eq!(cache.len(), 4);

    cache.invalidate_day("run", d(2024, 7, 15));
    assert_eq!(cache.len(), 2);
    assert!(cache
        .get(&StatsKey::new(TimeScope::Month, d(2024, 6, 30), "run"))
        .is_some());
    assert!(cache
        .get(&StatsKey::new(TimeScope::Month, d(2024, 7, 9), "read"))
        .is_some());
    assert!(cache
        .get(&StatsKey::new(TimeScope::Year, d(2024, 3, 3), "run"))
        .is_none());
}

#[test]
fn cache_rejects_result_computed_before_invalidation() {
    let cache = StatsCache::new(true);
    let key = || StatsKey::new(TimeScope::Month, d(2024, 7, 1), "run");

    // Reader takes the generation, an update invalidates, then the reader
    // tries to store what it computed from the old rows.
    let before = cache.generation();
    cache.invalidate_day("run", d(2024, 7, 3));
    assert!(!cache.insert_if_current(key(), TaskStats::default(), before));
    assert!(cache.get(&key()).is_none());

    let now = cache.generation();
    assert!(cache.insert_if_current(key(), TaskStats::default(), now));
    assert!(cache.get(&key()).is_some());

    // Clearing counts as an invalidation too.
    let before = cache.generation();
    cache.clear();
    assert!(!cache.insert_if_current(key(), TaskStats::default(), before));
}

#[test]
fn disabled_cache_stores_nothing() {
    let cache = StatsCache::new(false);
    cache.insert(
        StatsKey::new(TimeScope::Month, d(2024, 7, 1), "run"),
        TaskStats::default(),
    );
    assert!(cache.is_empty());
    assert!(!cache.is_enabled());
}

// ── Ordering ────────────────────────────────────────────────────

#[test]
fn append_goes_to_the_end() {
    assert_eq!(append_position(0), 0);
    assert_eq!(append_position(5), 5);
}

#[test]
fn density_check() {
    assert!(is_dense(vec![2, 0, 1]));
    assert!(is_dense(Vec::new()));
    assert!(!is_dense(vec![0, 2]));
    assert!(!is_dense(vec![0, 0, 1]));
}

#[test]
fn close_gap_shifts_later_siblings() {
    let date = d(2024, 7, 1);
    let mut list: Vec<Task> = (0..4).map(|i| task(i + 1, ScopeKind::Day, date, i as i32)).collect();
    let removed = list.remove(1);
    let updates = close_gap(&list, removed.id, removed.position);
    assert_eq!(updates.len(), 2);
    apply(&mut list, &updates);
    assert!(is_dense(list.iter().map(|t| t.position)));
}

#[test]
fn swap_moves_neighbours() {
    let date = d(2024, 7, 1);
    let list: Vec<Task> = (0..3).map(|i| task(i + 1, ScopeKind::Day, date, i as i32)).collect();
    let updates = plan_swap(&list, 2, Direction::Up).unwrap().unwrap();
    assert_eq!(updates.len(), 2);
    assert!(updates.contains(&PositionUpdate {
        id: 2,
        position: 0,
        moved_to: None
    }));
    assert!(updates.contains(&PositionUpdate {
        id: 1,
        position: 1,
        moved_to: None
    }));
}

#[test]
fn swap_at_edges_is_a_no_op() {
    let date = d(2024, 7, 1);
    let list: Vec<Task> = (0..3).map(|i| task(i + 1, ScopeKind::Day, date, i as i32)).collect();
    assert!(plan_swap(&list, 1, Direction::Up).unwrap().is_none());
    assert!(plan_swap(&list, 3, Direction::Down).unwrap().is_none());
    assert!(plan_swap(&list, 99, Direction::Down).is_err());
}

#[test]
fn within_scope_compares_windows() {
    let a = task(1, ScopeKind::Month, d(2024, 7, 1), 0);
    let b = task(2, ScopeKind::Month, d(2024, 7, 20), 1);
    let c = task(3, ScopeKind::Month, d(2024, 8, 1), 0);
    let p = task(4, ScopeKind::Project(5), d(2023, 1, 1), 0);
    let q = task(5, ScopeKind::Project(5), d(2024, 9, 9), 1);
    assert!(within_scope(&a, &b));
    assert!(!within_scope(&a, &c));
    assert!(within_scope(&p, &q));
}

#[test]
fn reorder_within_scope_places_after_target() {
    let date = d(2024, 7, 1);
    let list: Vec<Task> = (0..4).map(|i| task(i + 1, ScopeKind::Day, date, i as i32)).collect();
    let source = list[0].clone();
    let target = list[2].clone();
    let plan = plan_reorder(&source, &target, list, None).unwrap();
    assert!(plan.within_scope);
    let ids: Vec<i64> = plan.source_list.iter().map(|t| t.id).collect();
    assert_eq!(ids, vec![2, 3, 1, 4]);
    assert!(is_dense(plan.source_list.iter().map(|t| t.position)));
    // Task 4 keeps its slot.
    assert!(plan.updates.iter().all(|u| u.id != 4));
}

#[test]
fn reorder_across_scopes() {
    // A (day 2024-07-01) holds P, Q, R, S at 0..3; B (day 2024-07-02)
    // holds T, U, V at 0..2. Moving R after T.
    let a_date = d(2024, 7, 1);
    let b_date = d(2024, 7, 2);
    let a: Vec<Task> = (0..4).map(|i| task(10 + i, ScopeKind::Day, a_date, i as i32)).collect();
    let b: Vec<Task> = (0..3).map(|i| task(20 + i, ScopeKind::Day, b_date, i as i32)).collect();
    let r = a[2].clone();
    let t = b[0].clone();

    let plan = plan_reorder(&r, &t, a, Some(b)).unwrap();
    assert!(!plan.within_scope);
    assert_eq!(plan.source_list.len(), 3);
    assert_eq!(plan.target_list.len(), 4);
    assert!(is_dense(plan.source_list.iter().map(|t| t.position)));
    assert!(is_dense(plan.target_list.iter().map(|t| t.position)));

    let moved = plan.updates.iter().find(|u| u.id == r.id).unwrap();
    assert_eq!(moved.position, 1);
    assert_eq!(moved.moved_to, Some((ScopeKind::Day, b_date)));
    // U and V shift down by one.
    assert!(plan.updates.contains(&PositionUpdate {
        id: 21,
        position: 2,
        moved_to: None
    }));
    assert!(plan.updates.contains(&PositionUpdate {
        id: 22,
        position: 3,
        moved_to: None
    }));
    // S closes the gap in A.
    assert!(plan.updates.contains(&PositionUpdate {
        id: 13,
        position: 2,
        moved_to: None
    }));

    let touched = plan.touched_partitions(&r, &t);
    assert_eq!(touched[0], Partition::of(ScopeKind::Day, b_date));
    assert_eq!(touched[1], Partition::of(ScopeKind::Day, a_date));
}

#[test]
fn reorder_fails_without_target_in_list() {
    let date = d(2024, 7, 1);
    let list: Vec<Task> = (0..2).map(|i| task(i + 1, ScopeKind::Day, date, i as i32)).collect();
    let source = list[0].clone();
    let stray = task(9, ScopeKind::Day, date, 5);
    let err = plan_reorder(&source, &stray, list, None).unwrap_err();
    assert!(matches!(err, crate::errors::HabitError::NotFound(_)));
}

#[test]
fn reorder_onto_itself_changes_nothing() {
    let date = d(2024, 7, 1);
    let list: Vec<Task> = (0..3).map(|i| task(i + 1, ScopeKind::Day, date, i as i32)).collect();
    let source = list[1].clone();
    let plan = plan_reorder(&source, &source, list, None).unwrap();
    assert!(plan.updates.is_empty());
}

// ── Project windows ─────────────────────────────────────────────

#[test]
fn pinned_project_window_and_comparison() {
    let today = d(2024, 7, 31);
    let windows = project_windows(today, DEFAULT_WINDOW_DAYS, ProjectVisibility::Pinned);
    assert_eq!(windows.recent.to, d(2024, 8, 1));
    assert_eq!((windows.recent.to - windows.recent.from).num_days(), 72);
    let comparison = windows.comparison.unwrap();
    assert_eq!(comparison.to, windows.recent.from);
    assert_eq!((comparison.to - comparison.from).num_days(), 8);
    assert!(windows.recent.contains(today));
}

#[test]
fn unpinned_projects_use_long_lookback() {
    let windows = project_windows(d(2024, 7, 31), 72, ProjectVisibility::Unpinned);
    assert!(windows.comparison.is_none());
    assert_eq!(
        (windows.recent.to - windows.recent.from).num_days(),
        i64::from(UNPINNED_LOOKBACK_DAYS)
    );
}

#[test]
fn progress_direction_is_difference_of_completions() {
    let recent = ProjectActivity {
        completed: 9,
        minutes: 300,
    };
    let earlier = ProjectActivity {
        completed: 4,
        minutes: 50,
    };
    let stats = project_stats(recent, Some(earlier));
    assert_eq!(stats.completed, 9);
    assert_eq!(stats.minutes, 300);
    assert_eq!(stats.progress_direction, Some(5));
    assert_eq!(project_stats(recent, None).progress_direction, None);
}

#[test]
fn comparison_days_rounds_up() {
    assert_eq!(comparison_days(72), 8);
    assert_eq!(comparison_days(10), 1);
    assert_eq!(comparison_days(1), 1);
}

// ── Repair planning ─────────────────────────────────────────────

fn row(id: i64, scope: i32, date: NaiveDate, position: i32) -> PositionRow {
    PositionRow {
        id,
        scope,
        date,
        position,
    }
}

#[test]
fn repair_renumbers_only_broken_partitions() {
    let rows = vec![
        row(1, 1, d(2024, 7, 1), 0),
        row(2, 1, d(2024, 7, 1), 1),
        row(3, 2, d(2024, 7, 1), 0),
        row(4, 2, d(2024, 7, 15), 3),
        row(5, 2, d(2024, 7, 20), 3),
    ];
    let plan = plan_repair(&rows).unwrap();
    assert_eq!(plan.partitions, vec![Partition::of(ScopeKind::Month, d(2024, 7, 1))]);
    assert_eq!(
        plan.updates,
        vec![
            PositionUpdate {
                id: 4,
                position: 1,
                moved_to: None
            },
            PositionUpdate {
                id: 5,
                position: 2,
                moved_to: None
            },
        ]
    );
}

#[test]
fn repair_is_idempotent() {
    let mut rows = vec![
        row(1, 4, d(2024, 1, 1), 5),
        row(2, 4, d(2024, 3, 1), 5),
        row(3, 3, d(2024, 2, 1), 1),
    ];
    let plan = plan_repair(&rows).unwrap();
    assert_eq!(plan.partitions.len(), 2);
    for update in &plan.updates {
        if let Some(r) = rows.iter_mut().find(|r| r.id == update.id) {
            r.position = update.position;
        }
    }
    let again = plan_repair(&rows).unwrap();
    assert!(again.partitions.is_empty());
    assert!(again.updates.is_empty());
}

#[test]
fn repair_rejects_invalid_scope_codes() {
    assert!(plan_repair(&[row(1, 0, d(2024, 1, 1), 0)]).is_err());
}

// --- Export ---

#[test]
fn export_line_formats_date_per_scope() {
    let mut day = task(1, ScopeKind::Day, d(2017, 7, 2), 0);
    day.name = "squats".into();
    assert_eq!(export::export_line(&day), "squats Sunday, July  2, 2017\r\n");

    let mut month = task(2, ScopeKind::Month, d(2017, 7, 1), 0);
    month.name = "squats".into();
    assert_eq!(export::export_line(&month), "squats 2017-07\r\n");

    let mut year = task(3, ScopeKind::Year, d(2017, 1, 1), 0);
    year.name = "squats".into();
    assert_eq!(export::export_line(&year), "squats 2017\r\n");
}

#[test]
fn export_line_appends_comment() {
    let mut t = task(4, ScopeKind::Day, d(2017, 7, 12), 0);
    t.name = "bench".into();
    t.comment = Some(Comment {
        id: 1,
        task_id: 4,
        body: "3x5 at 80kg ".into(),
    });
    assert_eq!(
        export::export_line(&t),
        "bench Wednesday, July 12, 2017 3x5 at 80kg\r\n"
    );
}

#[test]
fn export_end_date_is_inclusive_and_defaults_to_today() {
    let filter = export::ExportFilter {
        name: " run ".into(),
        begin: Some(d(2017, 7, 1)),
        end: Some(d(2017, 7, 2)),
        day: true,
    };
    let q = filter.resolve(d(2020, 1, 1)).unwrap();
    assert_eq!(q.name, "run");
    assert_eq!(q.from, Some(d(2017, 7, 1)));
    assert_eq!(q.to, d(2017, 7, 3));
    assert!(q.day_only);

    let open = export::ExportFilter::default().resolve(d(2020, 1, 1)).unwrap();
    assert_eq!(open.from, None);
    assert_eq!(open.to, d(2020, 1, 2));
}

#[test]
fn export_rejects_inverted_range() {
    let filter = export::ExportFilter {
        begin: Some(d(2017, 7, 3)),
        end: Some(d(2017, 7, 2)),
        ..Default::default()
    };
    assert!(filter.resolve(d(2020, 1, 1)).is_err());
}
