//! Enquiry activity log (meetings, emails, calls, notes)

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ActivityType {
    Meeting,
    Email,
    Call,
    Note,
}

impl ActivityType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Meeting => "MEETING",
            Self::Email => "EMAIL",
            Self::Call => "CALL",
            Self::Note => "NOTE",
        }
    }

    pub fn from_db(value: &str) -> Self {
        match value {
            "MEETING" => Self::Meeting,
            "EMAIL" => Self::Email,
            "CALL" => Self::Call,
            _ => Self::Note,
        }
    }
}

/// Database row for an activity
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ActivityRow {
    pub id: Uuid,
    pub enquiry_id: Uuid,
    #[sqlx(rename = "type")]
    pub activity_type: String,
    pub title: Option<String>,
    pub content: String,
    pub meeting_date: Option<DateTime<Utc>>,
    pub attendees: Option<Json<Vec<String>>>,
    pub created_at: DateTime<Utc>,
}

pub const ACTIVITY_COLUMNS: &str =
    "id, enquiry_id, type, title, content, meeting_date, attendees, created_at";

/// Activity entity
#[derive(Debug, Clone, Serialize)]
pub struct Activity {
    pub id: Uuid,
    pub enquiry_id: Uuid,
    #[serde(rename = "type")]
    pub activity_type: ActivityType,
    pub title: Option<String>,
    pub content: String,
    pub meeting_date: Option<DateTime<Utc>>,
    pub attendees: Vec<String>,
    pub created_at: DateTime<Utc>,
}

impl From<ActivityRow> for Activity {
    fn from(row: ActivityRow) -> Self {
        Self {
            id: row.id,
            enquiry_id: row.enquiry_id,
            activity_type: ActivityType::from_db(&row.activity_type),
            title: row.title,
            content: row.content,
            meeting_date: row.meeting_date,
            attendees: row.attendees.map(|a| a.0).unwrap_or_default(),
            created_at: row.created_at,
        }
    }
}

/// Request DTO for logging an activity
#[derive(Debug, Clone, Deserialize)]
pub struct CreateActivityRequest {
    #[serde(rename = "type")]
    pub activity_type: ActivityType,
    pub content: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub meeting_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub attendees: Option<Vec<String>>,
}
