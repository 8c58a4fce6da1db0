//! Ordering repair: find partitions whose positions are not `0..n` and
//! tag links that point at deleted tasks.
//!
//! `check` runs [`repair_ordering`] with `apply = false`; `repair` writes the
//! corrections. Running it twice in a row reports nothing the second time.

use std::collections::BTreeMap;

use serde::Serialize;
use tracing::{info, warn};

use super::calendar::Partition;
use super::ordering::PositionUpdate;
use super::types::ScopeKind;
use crate::db::{Database, PositionRow};
use crate::errors::HabitResult;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RepairPlan {
    /// Partitions that are not densely ordered, in partition order.
    pub partitions: Vec<Partition>,
    pub updates: Vec<PositionUpdate>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RepairReport {
    pub scopes_out_of_order: usize,
    pub tasks_corrected: usize,
    pub dangling_links_found: usize,
    pub dangling_links_removed: u64,
}

impl RepairReport {
    pub fn is_clean(&self) -> bool {
        self.scopes_out_of_order == 0 && self.dangling_links_found == 0
    }
}

impl std::fmt::Display for RepairReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} scope(s) out of order, {} task(s) corrected, {} dangling tag link(s) found, {} removed",
            self.scopes_out_of_order,
            self.tasks_corrected,
            self.dangling_links_found,
            self.dangling_links_removed
        )
    }
}

/// Renumber every partition to `0..n`, keeping the current relative order
/// (position, then id as tie-break).
pub fn plan_repair(rows: &[PositionRow]) -> HabitResult<RepairPlan> {
    let mut groups: BTreeMap<Partition, Vec<&PositionRow>> = BTreeMap::new();
    for row in rows {
        let scope = ScopeKind::try_from(row.scope)?;
        groups
            .entry(Partition::of(scope, row.date))
            .or_default()
            .push(row);
    }

    let mut plan = RepairPlan::default();
    for (partition, mut members) in groups {
        members.sort_by_key(|r| (r.position, r.id));
        let before = plan.updates.len();
        for (i, row) in members.iter().enumerate() {
            let position = i as i32;
            if row.position != position {
                plan.updates.push(PositionUpdate {
                    id: row.id,
                    position,
                    moved_to: None,
                });
            }
        }
        if plan.updates.len() > before {
            plan.partitions.push(partition);
        }
    }
    Ok(plan)
}

/// Scan the store for ordering drift and dangling tag links.
///
/// With `apply` the corrections are written; without it the report only
/// describes what would change.
pub async fn repair_ordering(db: &Database, apply: bool) -> HabitResult<RepairReport> {
    let rows = db.live_positions().await?;
    let plan = plan_repair(&rows)?;
    let dangling = db.dangling_tag_links().await?;

    for partition in &plan.partitions {
        warn!(partition = %partition, "partition out of order");
    }

    let mut report = RepairReport {
        scopes_out_of_order: plan.partitions.len(),
        tasks_corrected: 0,
        dangling_links_found: dangling.len(),
        dangling_links_removed: 0,
    };

    if apply {
        // The scan is only a hint; each partition is re-read under its lock.
        for partition in &plan.partitions {
            report.tasks_corrected += db.renumber_partition(partition).await?;
        }
        report.dangling_links_removed = db.delete_tag_links(&dangling).await?;
    }

    info!(
        apply,
        scopes = report.scopes_out_of_order,
        corrected = report.tasks_corrected,
        dangling = report.dangling_links_found,
        "ordering repair finished"
    );
    Ok(report)
}
