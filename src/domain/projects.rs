//! Project domain types
//!
//! Projects are created from enquiries and move through
//! PROPOSED -> APPROVED -> (ACTIVE) -> IN_PRODUCTION.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::checklists::{ChecklistItem, ProductionReadiness};
use super::companies::Company;
use super::contacts::Contact;
use super::deliverables::{Deliverable, DeliverableInput};
use super::enquiries::Enquiry;

/// Project status enum
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProjectStatus {
    #[default]
    Proposed,
    Approved,
    Active,
    InProduction,
}

impl ProjectStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Proposed => "PROPOSED",
            Self::Approved => "APPROVED",
            Self::Active => "ACTIVE",
            Self::InProduction => "IN_PRODUCTION",
        }
    }

    pub fn from_db(value: &str) -> Self {
        match value {
            "APPROVED" => Self::Approved,
            "ACTIVE" => Self::Active,
            "IN_PRODUCTION" => Self::InProduction,
            _ => Self::Proposed,
        }
    }

    /// Production may only start from an approved or active project
    pub fn can_enter_production(&self) -> bool {
        matches!(self, Self::Approved | Self::Active)
    }
}

/// Database row for a project
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ProjectRow {
    pub id: Uuid,
    pub title: String,
    pub status: String,
    pub company_id: Uuid,
    pub contact_id: Option<Uuid>,
    pub enquiry_id: Option<Uuid>,
    pub dropbox_path: Option<String>,
    pub budget: Option<String>,
    pub budget_min: Option<String>,
    pub budget_max: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

pub const PROJECT_COLUMNS: &str = "id, title, status, company_id, contact_id, enquiry_id, \
     dropbox_path, budget, budget_min, budget_max, created_at, updated_at";

/// Project entity
#[derive(Debug, Clone, Serialize)]
pub struct Project {
    pub id: Uuid,
    pub title: String,
    pub status: ProjectStatus,
    pub company_id: Uuid,
    pub contact_id: Option<Uuid>,
    pub enquiry_id: Option<Uuid>,
    pub dropbox_path: Option<String>,
    pub budget: Option<String>,
    pub budget_min: Option<String>,
    pub budget_max: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<ProjectRow> for Project {
    fn from(row: ProjectRow) -> Self {
        Self {
            id: row.id,
            title: row.title,
            status: ProjectStatus::from_db(&row.status),
            company_id: row.company_id,
            contact_id: row.contact_id,
            enquiry_id: row.enquiry_id,
            dropbox_path: row.dropbox_path,
            budget: row.budget,
            budget_min: row.budget_min,
            budget_max: row.budget_max,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

/// Short project reference embedded in company, contact and enquiry views
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct ProjectSummary {
    pub id: Uuid,
    pub title: String,
    pub status: String,
    pub company_id: Uuid,
    pub enquiry_id: Option<Uuid>,
    pub dropbox_path: Option<String>,
    pub created_at: DateTime<Utc>,
}

pub const PROJECT_SUMMARY_COLUMNS: &str =
    "id, title, status, company_id, enquiry_id, dropbox_path, created_at";

/// Project in the projects list
#[derive(Debug, Clone, Serialize)]
pub struct ProjectListItem {
    #[serde(flatten)]
    pub project: Project,
    pub company_name: String,
    pub deliverable_count: i64,
}

/// Project detail page
#[derive(Debug, Clone, Serialize)]
pub struct ProjectDetail {
    #[serde(flatten)]
    pub project: Project,
    pub company: Company,
    pub contact: Option<Contact>,
    pub enquiry: Option<Enquiry>,
    pub deliverables: Vec<Deliverable>,
    pub checklist: Vec<ChecklistItem>,
    pub readiness: ProductionReadiness,
}

/// Request DTO for converting an enquiry into a project
#[derive(Debug, Clone, Deserialize)]
pub struct ConvertEnquiryRequest {
    pub company_id: Uuid,
    pub project_title: String,
    #[serde(default)]
    pub contact_id: Option<Uuid>,
    #[serde(default)]
    pub deliverables: Vec<DeliverableInput>,
}

/// Outcome of an enquiry conversion.
///
/// `warnings` lists every side effect that failed without aborting the
/// conversion (Dropbox, checklist, attachment migration).
#[derive(Debug, Clone, Serialize)]
pub struct ConversionResult {
    pub project_id: Uuid,
    pub dropbox_path: Option<String>,
    pub deliverables_created: usize,
    pub checklist_items: usize,
    pub attachments_moved: usize,
    pub warnings: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UpdateProjectCompanyRequest {
    pub company_id: Uuid,
}

#[derive(Debug, Clone, Serialize)]
pub struct ApproveProjectResponse {
    pub project: Project,
    pub dropbox_path: Option<String>,
    pub folder_created: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub folder_error: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_db_text_round_trips() {
        for status in [
            ProjectStatus::Proposed,
            ProjectStatus::Approved,
            ProjectStatus::Active,
            ProjectStatus::InProduction,
        ] {
            assert_eq!(ProjectStatus::from_db(status.as_str()), status);
        }
        assert_eq!(
            serde_json::to_value(ProjectStatus::InProduction).unwrap(),
            "IN_PRODUCTION"
        );
    }

    #[test]
    fn only_approved_or_active_projects_enter_production() {
        assert!(!ProjectStatus::Proposed.can_enter_production());
        assert!(ProjectStatus::Approved.can_enter_production());
        assert!(ProjectStatus::Active.can_enter_production());
        assert!(!ProjectStatus::InProduction.can_enter_production());
    }

    #[test]
    fn convert_request_defaults_deliverables() {
        let req: ConvertEnquiryRequest = serde_json::from_str(&format!(
            r#"{{"company_id": "{}", "project_title": "Launch"}}"#,
            Uuid::nil()
        ))
        .unwrap();
        assert!(req.deliverables.is_empty());
        assert!(req.contact_id.is_none());
    }
}
