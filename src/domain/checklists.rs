//! Checklist templates and per-project production-readiness checklists

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::double_option;

pub const DEFAULT_OWNER: &str = "grizzle";
pub const UNKNOWN_ACTOR: &str = "Unknown";
pub const DEFAULT_WAIVED_REASON: &str = "No reason provided";

/// Checklist item status
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum ChecklistStatus {
    #[default]
    Missing,
    InProgress,
    Done,
    Waived,
}

impl ChecklistStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Missing => "missing",
            Self::InProgress => "in_progress",
            Self::Done => "done",
            Self::Waived => "waived",
        }
    }

    pub fn from_db(value: &str) -> Self {
        match value {
            "in_progress" => Self::InProgress,
            "done" => Self::Done,
            "waived" => Self::Waived,
            _ => Self::Missing,
        }
    }

    /// Done and waived items count towards production readiness
    pub fn is_complete(&self) -> bool {
        matches!(self, Self::Done | Self::Waived)
    }
}

// =============================================================================
// Templates
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct ChecklistTemplateItem {
    pub id: Uuid,
    pub template_id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub required: bool,
    pub default_owner: String,
    pub sort_order: i32,
}

pub const TEMPLATE_ITEM_COLUMNS: &str =
    "id, template_id, title, description, required, default_owner, sort_order";

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct ChecklistTemplateRow {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub is_default: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

pub const TEMPLATE_COLUMNS: &str = "id, name, description, is_default, created_at, updated_at";

/// Template with its items in sort order
#[derive(Debug, Clone, Serialize)]
pub struct ChecklistTemplate {
    #[serde(flatten)]
    pub template: ChecklistTemplateRow,
    pub items: Vec<ChecklistTemplateItem>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateTemplateRequest {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub is_default: bool,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateTemplateRequest {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default, deserialize_with = "double_option")]
    pub description: Option<Option<String>>,
    #[serde(default)]
    pub is_default: Option<bool>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateTemplateItemRequest {
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub required: Option<bool>,
    #[serde(default)]
    pub default_owner: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateTemplateItemRequest {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default, deserialize_with = "double_option")]
    pub description: Option<Option<String>>,
    #[serde(default)]
    pub required: Option<bool>,
    #[serde(default)]
    pub default_owner: Option<String>,
    #[serde(default)]
    pub sort_order: Option<i32>,
}

// =============================================================================
// Project checklist
// =============================================================================

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ChecklistItemRow {
    pub id: Uuid,
    pub project_id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub required: bool,
    pub owner: String,
    pub sort_order: i32,
    pub status: String,
    pub due_date: Option<DateTime<Utc>>,
    pub evidence_url: Option<String>,
    pub completed_at: Option<DateTime<Utc>>,
    pub completed_by: Option<String>,
    pub waived_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

pub const CHECKLIST_ITEM_COLUMNS: &str = "id, project_id, title, description, required, owner, \
     sort_order, status, due_date, evidence_url, completed_at, completed_by, waived_reason, \
     created_at, updated_at";

#[derive(Debug, Clone, Serialize)]
pub struct ChecklistItem {
    pub id: Uuid,
    pub project_id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub required: bool,
    pub owner: String,
    pub sort_order: i32,
    pub status: ChecklistStatus,
    pub due_date: Option<DateTime<Utc>>,
    pub evidence_url: Option<String>,
    pub completed_at: Option<DateTime<Utc>>,
    pub completed_by: Option<String>,
    pub waived_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<ChecklistItemRow> for ChecklistItem {
    fn from(row: ChecklistItemRow) -> Self {
        Self {
            id: row.id,
            project_id: row.project_id,
            title: row.title,
            description: row.description,
            required: row.required,
            owner: row.owner,
            sort_order: row.sort_order,
            status: ChecklistStatus::from_db(&row.status),
            due_date: row.due_date,
            evidence_url: row.evidence_url,
            completed_at: row.completed_at,
            completed_by: row.completed_by,
            waived_reason: row.waived_reason,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct InitializeChecklistRequest {
    #[serde(default)]
    pub template_id: Option<Uuid>,
}

#[derive(Debug, Clone, Serialize)]
pub struct InitializeChecklistResponse {
    pub template_id: Uuid,
    pub items: Vec<ChecklistItem>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UpdateItemStatusRequest {
    pub status: ChecklistStatus,
    #[serde(default)]
    pub completed_by: Option<String>,
    #[serde(default)]
    pub waived_reason: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateChecklistItemRequest {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default, deserialize_with = "double_option")]
    pub description: Option<Option<String>>,
    #[serde(default)]
    pub owner: Option<String>,
    #[serde(default, deserialize_with = "double_option")]
    pub due_date: Option<Option<DateTime<Utc>>>,
    #[serde(default, deserialize_with = "double_option")]
    pub evidence_url: Option<Option<String>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AddChecklistItemRequest {
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub required: Option<bool>,
    #[serde(default)]
    pub owner: Option<String>,
}

/// Completion columns written alongside a status change
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusChange {
    pub status: ChecklistStatus,
    pub completed_at: Option<DateTime<Utc>>,
    pub completed_by: Option<String>,
    pub waived_reason: Option<String>,
}

impl StatusChange {
    /// Done and waived stamp completion; anything else clears it.
    ///
    /// `actor` is the authenticated user, used when `completed_by` is blank.
    pub fn new(
        status: ChecklistStatus,
        completed_by: Option<String>,
        waived_reason: Option<String>,
        actor: Option<&str>,
        now: DateTime<Utc>,
    ) -> Self {
        let completer = || {
            super::non_blank(completed_by.clone())
                .or_else(|| actor.map(str::to_string).filter(|a| !a.trim().is_empty()))
                .unwrap_or_else(|| UNKNOWN_ACTOR.to_string())
        };

        match status {
            ChecklistStatus::Done => Self {
                status,
                completed_at: Some(now),
                completed_by: Some(completer()),
                waived_reason: None,
            },
            ChecklistStatus::Waived => Self {
                status,
                completed_at: Some(now),
                completed_by: Some(completer()),
                waived_reason: Some(
                    super::non_blank(waived_reason)
                        .unwrap_or_else(|| DEFAULT_WAIVED_REASON.to_string()),
                ),
            },
            ChecklistStatus::Missing | ChecklistStatus::InProgress => Self {
                status,
                completed_at: None,
                completed_by: None,
                waived_reason: None,
            },
        }
    }
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct PendingItem {
    pub id: Uuid,
    pub title: String,
    pub status: ChecklistStatus,
}

/// Whether a project's required checklist items allow production to start
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ProductionReadiness {
    pub can_start: bool,
    pub required_items: usize,
    pub completed_items: usize,
    pub pending_items: Vec<PendingItem>,
}

impl ProductionReadiness {
    pub fn evaluate<'a>(items: impl IntoIterator<Item = &'a ChecklistItem>) -> Self {
        let required: Vec<&ChecklistItem> = items.into_iter().filter(|i| i.required).collect();
        let pending_items: Vec<PendingItem> = required
            .iter()
            .filter(|i| !i.status.is_complete())
            .map(|i| PendingItem {
                id: i.id,
                title: i.title.clone(),
                status: i.status,
            })
            .collect();

        Self {
            can_start: pending_items.is_empty(),
            required_items: required.len(),
            completed_items: required.len() - pending_items.len(),
            pending_items,
        }
    }

    /// Conflict message listing what still blocks production
    pub fn blocking_message(&self) -> String {
        let titles: Vec<&str> = self.pending_items.iter().map(|p| p.title.as_str()).collect();
        format!(
            "Cannot start production: {} required checklist item(s) pending ({})",
            self.pending_items.len(),
            titles.join(", ")
        )
    }
}

/// Next sort order after the current maximum (1 for an empty list)
pub fn next_sort_order(current_max: Option<i32>) -> i32 {
    current_max.unwrap_or(0) + 1
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(title: &str, required: bool, status: ChecklistStatus) -> ChecklistItem {
        let now = Utc::now();
        ChecklistItem {
            id: Uuid::new_v4(),
            project_id: Uuid::nil(),
            title: title.to_string(),
            description: None,
            required,
            owner: DEFAULT_OWNER.to_string(),
            sort_order: 0,
            status,
            due_date: None,
            evidence_url: None,
            completed_at: None,
            completed_by: None,
            waived_reason: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn done_stamps_completion_with_actor_fallbacks() {
        let now = Utc::now();

        let change = StatusChange::new(ChecklistStatus::Done, Some("Tom".into()), None, Some("Ann"), now);
        assert_eq!(change.completed_by.as_deref(), Some("Tom"));
        assert_eq!(change.completed_at, Some(now));

        let change = StatusChange::new(ChecklistStatus::Done, Some(" ".into()), None, Some("Ann"), now);
        assert_eq!(change.completed_by.as_deref(), Some("Ann"));

        let change = StatusChange::new(ChecklistStatus::Done, None, None, None, now);
        assert_eq!(change.completed_by.as_deref(), Some(UNKNOWN_ACTOR));
        assert_eq!(change.waived_reason, None);
    }

    #[test]
    fn waived_gets_default_reason() {
        let change = StatusChange::new(ChecklistStatus::Waived, None, None, None, Utc::now());
        assert_eq!(change.waived_reason.as_deref(), Some(DEFAULT_WAIVED_REASON));
        assert!(change.completed_at.is_some());

        let change = StatusChange::new(
            ChecklistStatus::Waived,
            None,
            Some("Client supplied NDA verbally".into()),
            Some("Ann"),
            Utc::now(),
        );
        assert_eq!(change.waived_reason.as_deref(), Some("Client supplied NDA verbally"));
    }

    #[test]
    fn other_statuses_clear_completion() {
        for status in [ChecklistStatus::Missing, ChecklistStatus::InProgress] {
            let change = StatusChange::new(status, Some("Tom".into()), Some("x".into()), None, Utc::now());
            assert_eq!(change.completed_at, None);
            assert_eq!(change.completed_by, None);
            assert_eq!(change.waived_reason, None);
        }
    }

    #[test]
    fn readiness_counts_required_items_only() {
        let items = vec![
            item("Contract signed", true, ChecklistStatus::Done),
            item("NDA signed", true, ChecklistStatus::Waived),
            item("Deposit received", true, ChecklistStatus::InProgress),
            item("Reference materials", false, ChecklistStatus::Missing),
        ];

        let readiness = ProductionReadiness::evaluate(&items);
        assert!(!readiness.can_start);
        assert_eq!(readiness.required_items, 3);
        assert_eq!(readiness.completed_items, 2);
        assert_eq!(readiness.pending_items.len(), 1);
        assert_eq!(readiness.pending_items[0].title, "Deposit received");
        assert!(readiness.blocking_message().contains("Deposit received"));

        let ready = ProductionReadiness::evaluate(&items[..2]);
        assert!(ready.can_start);

        let empty = ProductionReadiness::evaluate(&[]);
        assert!(empty.can_start);
        assert_eq!(empty.required_items, 0);
    }

    #[test]
    fn sort_order_continues_after_max() {
        assert_eq!(next_sort_order(None), 1);
        assert_eq!(next_sort_order(Some(6)), 7);
    }
}
