//! Enquiry domain types
//!
//! Inbound client requests, captured as free text and optionally parsed into
//! structured fields before being converted into a project.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use uuid::Uuid;

use super::activities::Activity;
use super::attachments::Attachment;
use super::companies::{Company, CompanyCandidate};
use super::contacts::Contact;
use super::deliverables::{Deliverable, DeliverableInput};
use super::double_option;
use super::llm::ParsedEnquiry;
use super::projects::ProjectSummary;

/// Enquiry lifecycle
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EnquiryStatus {
    #[default]
    Pending,
    Converted,
    Archived,
}

impl EnquiryStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Converted => "CONVERTED",
            Self::Archived => "ARCHIVED",
        }
    }

    pub fn from_db(value: &str) -> Self {
        match value {
            "CONVERTED" => Self::Converted,
            "ARCHIVED" => Self::Archived,
            _ => Self::Pending,
        }
    }
}

/// Database row for an enquiry
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct EnquiryRow {
    pub id: Uuid,
    pub raw_content: String,
    pub status: String,
    pub received_at: DateTime<Utc>,
    pub company_id: Option<Uuid>,
    pub contact_id: Option<Uuid>,
    pub project_title: Option<String>,
    pub project_summary: Option<String>,
    pub project_description: Option<String>,
    pub budget: Option<String>,
    pub budget_min: Option<String>,
    pub budget_max: Option<String>,
    pub timeline: Option<String>,
    pub framerate: Option<String>,
    pub aspect_ratio: Option<String>,
    pub tone: Option<String>,
    pub reference_links: Json<Vec<String>>,
    pub number_of_deliverables: Option<i32>,
    pub updated_at: DateTime<Utc>,
}

/// Columns selected into [`EnquiryRow`]
pub const ENQUIRY_COLUMNS: &str = "id, raw_content, status, received_at, company_id, contact_id, \
     project_title, project_summary, project_description, budget, budget_min, budget_max, \
     timeline, framerate, aspect_ratio, tone, reference_links, number_of_deliverables, updated_at";

/// Enquiry entity
#[derive(Debug, Clone, Serialize)]
pub struct Enquiry {
    pub id: Uuid,
    pub raw_content: String,
    pub status: EnquiryStatus,
    pub received_at: DateTime<Utc>,
    pub company_id: Option<Uuid>,
    pub contact_id: Option<Uuid>,
    pub project_title: Option<String>,
    pub project_summary: Option<String>,
    pub project_description: Option<String>,
    pub budget: Option<String>,
    pub budget_min: Option<String>,
    pub budget_max: Option<String>,
    pub timeline: Option<String>,
    pub framerate: Option<String>,
    pub aspect_ratio: Option<String>,
    pub tone: Option<String>,
    pub reference_links: Vec<String>,
    pub number_of_deliverables: Option<i32>,
    pub updated_at: DateTime<Utc>,
}

impl From<EnquiryRow> for Enquiry {
    fn from(row: EnquiryRow) -> Self {
        Self {
            id: row.id,
            raw_content: row.raw_content,
            status: EnquiryStatus::from_db(&row.status),
            received_at: row.received_at,
            company_id: row.company_id,
            contact_id: row.contact_id,
            project_title: row.project_title,
            project_summary: row.project_summary,
            project_description: row.project_description,
            budget: row.budget,
            budget_min: row.budget_min,
            budget_max: row.budget_max,
            timeline: row.timeline,
            framerate: row.framerate,
            aspect_ratio: row.aspect_ratio,
            tone: row.tone,
            reference_links: row.reference_links.0,
            number_of_deliverables: row.number_of_deliverables,
            updated_at: row.updated_at,
        }
    }
}

/// Short enquiry reference used on contact pages
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct EnquirySummary {
    pub id: Uuid,
    pub project_title: Option<String>,
    pub status: String,
    pub received_at: DateTime<Utc>,
}

/// Enquiry in the inbox list
#[derive(Debug, Clone, Serialize)]
pub struct EnquiryListItem {
    #[serde(flatten)]
    pub enquiry: Enquiry,
    pub title: Option<String>,
    pub description: String,
    pub company: Option<Company>,
    pub contact: Option<Contact>,
    pub project: Option<ProjectSummary>,
    pub deliverables: Vec<Deliverable>,
}

/// Enquiry detail page
#[derive(Debug, Clone, Serialize)]
pub struct EnquiryDetail {
    #[serde(flatten)]
    pub enquiry: Enquiry,
    pub company: Option<Company>,
    pub contact: Option<Contact>,
    pub project: Option<ProjectSummary>,
    pub attachments: Vec<Attachment>,
    pub activities: Vec<Activity>,
    pub deliverables: Vec<Deliverable>,
}

/// Characters of raw content used when an enquiry has no description
pub const DESCRIPTION_PREVIEW_CHARS: usize = 200;

/// List description: the project description, else the start of the raw text
pub fn list_description(project_description: Option<&str>, raw_content: &str) -> String {
    match project_description {
        Some(d) if !d.is_empty() => d.to_string(),
        _ => raw_content.chars().take(DESCRIPTION_PREVIEW_CHARS).collect(),
    }
}

/// Request DTO for creating an enquiry
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct CreateEnquiryRequest {
    pub raw_content: String,
    pub company_id: Option<Uuid>,
    pub contact_id: Option<Uuid>,
    pub project_title: Option<String>,
    pub project_summary: Option<String>,
    pub project_description: Option<String>,
    pub budget: Option<String>,
    pub budget_min: Option<String>,
    pub budget_max: Option<String>,
    pub timeline: Option<String>,
    /// Used to find or create the company when `company_id` is absent
    pub company_name: Option<String>,
    pub company_website: Option<String>,
    pub framerate: Option<String>,
    pub aspect_ratio: Option<String>,
    pub tone: Option<String>,
    pub reference_links: Vec<String>,
    pub number_of_deliverables: Option<i32>,
    pub deliverables: Vec<DeliverableInput>,
}

impl CreateEnquiryRequest {
    /// Explicit positive count, else the number of deliverables given
    pub fn deliverable_count(&self) -> Option<i32> {
        self.number_of_deliverables
            .filter(|n| *n > 0)
            .or_else(|| i32::try_from(self.deliverables.len()).ok().filter(|n| *n > 0))
    }
}

/// Request DTO for updating an enquiry
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateEnquiryRequest {
    #[serde(default)]
    pub raw_content: Option<String>,
    /// `null` clears the company, absent leaves it unchanged
    #[serde(default, deserialize_with = "double_option")]
    pub company_id: Option<Option<Uuid>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ParseEnquiryRequest {
    pub raw_content: String,
}

/// LLM extraction plus the companies it might refer to
#[derive(Debug, Clone, Serialize)]
pub struct ParseEnquiryResponse {
    pub parsed: ParsedEnquiry,
    pub company_candidates: Vec<CompanyCandidate>,
    pub suggested_company: Option<CompanyCandidate>,
}

impl ParseEnquiryResponse {
    pub fn new(parsed: ParsedEnquiry, company_candidates: Vec<CompanyCandidate>) -> Self {
        let suggested_company = company_candidates.first().cloned();
        Self {
            parsed,
            company_candidates,
            suggested_company,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_round_trips_through_db_text() {
        for status in [
            EnquiryStatus::Pending,
            EnquiryStatus::Converted,
            EnquiryStatus::Archived,
        ] {
            assert_eq!(EnquiryStatus::from_db(status.as_str()), status);
        }
        assert_eq!(
            serde_json::to_value(EnquiryStatus::Converted).unwrap(),
            "CONVERTED"
        );
    }

    #[test]
    fn description_falls_back_to_raw_preview() {
        assert_eq!(list_description(Some("Brand film"), "raw"), "Brand film");
        assert_eq!(list_description(Some(""), "raw"), "raw");

        let long = "é".repeat(300);
        assert_eq!(list_description(None, &long).chars().count(), 200);
    }

    #[test]
    fn deliverable_count_prefers_explicit_value() {
        let mut req = CreateEnquiryRequest {
            raw_content: "x".into(),
            deliverables: vec![DeliverableInput::default(), DeliverableInput::default()],
            ..Default::default()
        };
        assert_eq!(req.deliverable_count(), Some(2));

        req.number_of_deliverables = Some(5);
        assert_eq!(req.deliverable_count(), Some(5));

        req.number_of_deliverables = Some(0);
        req.deliverables.clear();
        assert_eq!(req.deliverable_count(), None);
    }

    #[test]
    fn update_distinguishes_null_company() {
        let req: UpdateEnquiryRequest = serde_json::from_str(r#"{"company_id": null}"#).unwrap();
        assert_eq!(req.company_id, Some(None));

        let req: UpdateEnquiryRequest = serde_json::from_str(r#"{"raw_content": "new"}"#).unwrap();
        assert_eq!(req.company_id, None);
    }
}
