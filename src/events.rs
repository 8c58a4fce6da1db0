//! # Events: Sync Message Taxonomy
//!
//! Every change pushed to connected browsers is one [`SyncEvent`]. The set is
//! closed: adding a message kind means adding a variant here, and every
//! variant knows which [`Topic`] it is broadcast on.
//!
//! ## Wire Format
//!
//! One JSON envelope per websocket text frame:
//!
//! ```text
//! {"Type": "UPDATE_SCOPE", "Datum": {"date": "2024-07-01", "scope": 2, "name": "", "tasks": [...]}}
//! ```
//!
//! | Variant | `Type` | Topic |
//! |---------|--------|-------|
//! | `TasksUpdated` | `UPDATE_TASKS` | habits |
//! | `ScopeResynced` | `UPDATE_SCOPE` | habits |
//! | `ProjectListChanged` | `PROJECTS` | habits |
//! | `TasksAndProjectUpdated` | `UPDATE_TASKS_AND_PROJECT` | habits |
//! | `EntryCreated` | `CREATE_ENTRY` | journal |
//! | `EntryUpdated` | `UPDATE_ENTRY` | journal |
//! | `EntryDeleted` | `DELETE_ENTRY` | journal |
//! | `SidebarChanged` | `SIDEBAR` | journal |

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::errors::HabitResult;
use crate::habits::types::{Project, ProjectList, ScopeKind, Task};
use crate::sync::Topic;

/// Full replacement of one scope window on the client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScopeSnapshot {
    pub date: NaiveDate,
    pub scope: ScopeKind,
    /// Project name for project scopes, empty otherwise.
    pub name: String,
    pub tasks: Vec<Task>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntrySnapshot {
    pub id: i64,
    pub date: NaiveDate,
    #[serde(default)]
    pub name: Option<String>,
    pub body: String,
    #[serde(default)]
    pub tags: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SidebarLink {
    pub label: String,
    pub href: String,
    pub count: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SidebarSection {
    pub section: String,
    pub links: Vec<SidebarLink>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "Type", content = "Datum")]
pub enum SyncEvent {
    #[serde(rename = "UPDATE_TASKS")]
    TasksUpdated { tasks: Vec<Task> },
    #[serde(rename = "UPDATE_SCOPE")]
    ScopeResynced(ScopeSnapshot),
    #[serde(rename = "PROJECTS")]
    ProjectListChanged(ProjectList),
    #[serde(rename = "UPDATE_TASKS_AND_PROJECT")]
    TasksAndProjectUpdated { tasks: Vec<Task>, project: Project },
    #[serde(rename = "CREATE_ENTRY")]
    EntryCreated(EntrySnapshot),
    #[serde(rename = "UPDATE_ENTRY")]
    EntryUpdated(EntrySnapshot),
    #[serde(rename = "DELETE_ENTRY")]
    EntryDeleted(i64),
    #[serde(rename = "SIDEBAR")]
    SidebarChanged(SidebarSection),
}

impl SyncEvent {
    pub fn topic(&self) -> Topic {
        match self {
            SyncEvent::TasksUpdated { .. }
            | SyncEvent::ScopeResynced(_)
            | SyncEvent::ProjectListChanged(_)
            | SyncEvent::TasksAndProjectUpdated { .. } => Topic::Habits,
            SyncEvent::EntryCreated(_)
            | SyncEvent::EntryUpdated(_)
            | SyncEvent::EntryDeleted(_)
            | SyncEvent::SidebarChanged(_) => Topic::Journal,
        }
    }

    /// The `Type` tag this event carries on the wire.
    pub fn kind(&self) -> &'static str {
        match self {
            SyncEvent::TasksUpdated { .. } => "UPDATE_TASKS",
            SyncEvent::ScopeResynced(_) => "UPDATE_SCOPE",
            SyncEvent::ProjectListChanged(_) => "PROJECTS",
            SyncEvent::TasksAndProjectUpdated { .. } => "UPDATE_TASKS_AND_PROJECT",
            SyncEvent::EntryCreated(_) => "CREATE_ENTRY",
            SyncEvent::EntryUpdated(_) => "UPDATE_ENTRY",
            SyncEvent::EntryDeleted(_) => "DELETE_ENTRY",
            SyncEvent::SidebarChanged(_) => "SIDEBAR",
        }
    }

    /// Serialize to one websocket text frame.
    pub fn to_frame(&self) -> HabitResult<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_frame(frame: &str) -> HabitResult<Self> {
        Ok(serde_json::from_str(frame)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::habits::types::{ProjectVisibility, TaskStatus};
    use chrono::{TimeZone, Utc};

    fn task(id: i64, name: &str) -> Task {
        let ts = Utc.with_ymd_and_hms(2024, 7, 1, 8, 0, 0).unwrap();
        Task {
            id,
            name: name.to_string(),
            date: NaiveDate::from_ymd_opt(2024, 7, 1).unwrap(),
            scope: ScopeKind::Day,
            status: TaskStatus::Complete,
            position: 0,
            minutes: Some(30),
            comment: None,
            stats: None,
            created_at: ts,
            updated_at: ts,
            deleted_at: None,
        }
    }

    #[test]
    fn envelope_uses_type_and_datum() {
        let event = SyncEvent::TasksUpdated {
            tasks: vec![task(1, "run")],
        };
        let value: serde_json::Value = serde_json::from_str(&event.to_frame().unwrap()).unwrap();
        assert_eq!(value["Type"], "UPDATE_TASKS");
        assert_eq!(value["Datum"]["tasks"][0]["name"], "run");
        assert_eq!(value["Datum"]["tasks"][0]["scope"], 1);
        assert_eq!(value["Datum"]["tasks"][0]["date"], "2024-07-01");
    }

    #[test]
    fn scope_snapshot_carries_window_fields() {
        let event = SyncEvent::ScopeResynced(ScopeSnapshot {
            date: NaiveDate::from_ymd_opt(2024, 7, 1).unwrap(),
            scope: ScopeKind::Month,
            name: String::new(),
            tasks: vec![],
        });
        let value: serde_json::Value = serde_json::from_str(&event.to_frame().unwrap()).unwrap();
        assert_eq!(value["Type"], "UPDATE_SCOPE");
        assert_eq!(value["Datum"]["scope"], 2);
        assert_eq!(value["Datum"]["tasks"], serde_json::json!([]));
    }

    #[test]
    fn delete_entry_datum_is_bare_id() {
        let frame = SyncEvent::EntryDeleted(17).to_frame().unwrap();
        assert_eq!(frame, r#"{"Type":"DELETE_ENTRY","Datum":17}"#);
        assert_eq!(
            SyncEvent::from_frame(&frame).unwrap(),
            SyncEvent::EntryDeleted(17)
        );
    }

    #[test]
    fn kind_matches_serialized_tag() {
        let ts = Utc.with_ymd_and_hms(2024, 7, 1, 8, 0, 0).unwrap();
        let project = Project {
            id: 4,
            name: "thesis".into(),
            visibility: ProjectVisibility::Pinned,
            stats: None,
            created_at: ts,
            updated_at: ts,
        };
        let events = vec![
            SyncEvent::TasksUpdated { tasks: vec![] },
            SyncEvent::ProjectListChanged(ProjectList::default()),
            SyncEvent::TasksAndProjectUpdated {
                tasks: vec![task(2, "draft")],
                project,
            },
            SyncEvent::SidebarChanged(SidebarSection {
                section: "tags".into(),
                links: vec![],
            }),
        ];
        for event in events {
            let value: serde_json::Value =
                serde_json::from_str(&event.to_frame().unwrap()).unwrap();
            assert_eq!(value["Type"], event.kind());
        }
    }

    #[test]
    fn topics_never_mix() {
        assert_eq!(SyncEvent::TasksUpdated { tasks: vec![] }.topic(), Topic::Habits);
        assert_eq!(
            SyncEvent::ProjectListChanged(ProjectList::default()).topic(),
            Topic::Habits
        );
        assert_eq!(SyncEvent::EntryDeleted(1).topic(), Topic::Journal);
    }

    #[test]
    fn unknown_type_is_rejected() {
        assert!(SyncEvent::from_frame(r#"{"Type":"NOPE","Datum":1}"#).is_err());
    }
}
