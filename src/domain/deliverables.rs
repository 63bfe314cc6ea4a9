//! Deliverable domain types
//!
//! A deliverable is one video output (e.g. "Hero 16:9, 30s") attached either
//! to an enquiry or, after conversion, to a project.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use uuid::Uuid;

use super::non_blank;

pub const UNTITLED_DELIVERABLE: &str = "Untitled Deliverable";

/// Deliverable entity
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Deliverable {
    pub id: Uuid,
    pub enquiry_id: Option<Uuid>,
    pub project_id: Option<Uuid>,
    pub name: Option<String>,
    pub frame_rate: Option<String>,
    pub aspect_ratio: Option<String>,
    pub width: Option<i32>,
    pub height: Option<i32>,
    pub duration: Option<String>,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Columns selected into [`Deliverable`]
pub const DELIVERABLE_COLUMNS: &str = "id, enquiry_id, project_id, name, frame_rate, aspect_ratio, \
     width, height, duration, description, created_at";

/// Accept a pixel dimension as a JSON number or a numeric string.
/// Blank or unparsable strings become `None`.
fn lenient_dimension<'de, D>(deserializer: D) -> Result<Option<i32>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Int(i64),
        Float(f64),
        Text(String),
    }

    let raw = Option::<Raw>::deserialize(deserializer)?;
    Ok(match raw {
        Some(Raw::Int(n)) => i32::try_from(n).ok(),
        Some(Raw::Float(f)) => Some(f.trunc() as i32),
        Some(Raw::Text(s)) => s.trim().parse::<i32>().ok(),
        None => None,
    }
    .filter(|n| *n > 0))
}

/// Deliverable fields as submitted by the client
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct DeliverableInput {
    pub name: Option<String>,
    pub frame_rate: Option<String>,
    pub aspect_ratio: Option<String>,
    #[serde(deserialize_with = "lenient_dimension")]
    pub width: Option<i32>,
    #[serde(deserialize_with = "lenient_dimension")]
    pub height: Option<i32>,
    pub duration: Option<String>,
    pub description: Option<String>,
}

/// Deliverable ready to insert: blanks dropped, name and aspect ratio filled
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewDeliverable {
    pub name: String,
    pub frame_rate: Option<String>,
    pub aspect_ratio: Option<String>,
    pub width: Option<i32>,
    pub height: Option<i32>,
    pub duration: Option<String>,
    pub description: Option<String>,
}

impl DeliverableInput {
    pub fn normalize(self) -> NewDeliverable {
        let aspect_ratio = non_blank(self.aspect_ratio).or_else(|| match (self.width, self.height) {
            (Some(w), Some(h)) => aspect_ratio_from(w, h),
            _ => None,
        });

        NewDeliverable {
            name: non_blank(self.name).unwrap_or_else(|| UNTITLED_DELIVERABLE.to_string()),
            frame_rate: non_blank(self.frame_rate),
            aspect_ratio,
            width: self.width,
            height: self.height,
            duration: non_blank(self.duration),
            description: non_blank(self.description),
        }
    }
}

impl From<&Deliverable> for NewDeliverable {
    /// Copy of an enquiry deliverable for a new project
    fn from(d: &Deliverable) -> Self {
        Self {
            name: d
                .name
                .clone()
                .filter(|n| !n.trim().is_empty())
                .unwrap_or_else(|| UNTITLED_DELIVERABLE.to_string()),
            frame_rate: d.frame_rate.clone(),
            aspect_ratio: d.aspect_ratio.clone(),
            width: d.width,
            height: d.height,
            duration: d.duration.clone(),
            description: d.description.clone(),
        }
    }
}

/// Partial update; absent fields are left untouched
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct UpdateDeliverableRequest {
    pub name: Option<String>,
    pub frame_rate: Option<String>,
    pub aspect_ratio: Option<String>,
    #[serde(deserialize_with = "lenient_dimension")]
    pub width: Option<i32>,
    #[serde(deserialize_with = "lenient_dimension")]
    pub height: Option<i32>,
    pub duration: Option<String>,
    pub description: Option<String>,
}

impl UpdateDeliverableRequest {
    /// Aspect ratio to store: the submitted one, else derived from a new size
    pub fn effective_aspect_ratio(&self) -> Option<String> {
        non_blank(self.aspect_ratio.clone()).or_else(|| match (self.width, self.height) {
            (Some(w), Some(h)) => aspect_ratio_from(w, h),
            _ => None,
        })
    }
}

fn gcd(a: u32, b: u32) -> u32 {
    if b == 0 {
        a
    } else {
        gcd(b, a % b)
    }
}

/// Reduced `W:H` ratio for a pixel size (1920x1080 gives `16:9`)
pub fn aspect_ratio_from(width: i32, height: i32) -> Option<String> {
    if width <= 0 || height <= 0 {
        return None;
    }
    let (w, h) = (width as u32, height as u32);
    let divisor = gcd(w, h);
    Some(format!("{}:{}", w / divisor, h / divisor))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn aspect_ratio_is_reduced() {
        assert_eq!(aspect_ratio_from(1920, 1080).as_deref(), Some("16:9"));
        assert_eq!(aspect_ratio_from(1080, 1920).as_deref(), Some("9:16"));
        assert_eq!(aspect_ratio_from(1080, 1080).as_deref(), Some("1:1"));
        assert_eq!(aspect_ratio_from(0, 1080), None);
    }

    #[test]
    fn dimensions_accept_numbers_and_strings() {
        let input: DeliverableInput =
            serde_json::from_str(r#"{"width": "1920", "height": 1080, "name": "  "}"#).unwrap();
        assert_eq!(input.width, Some(1920));
        assert_eq!(input.height, Some(1080));

        let new = input.normalize();
        assert_eq!(new.name, UNTITLED_DELIVERABLE);
        assert_eq!(new.aspect_ratio.as_deref(), Some("16:9"));

        let input: DeliverableInput =
            serde_json::from_str(r#"{"width": "", "height": null}"#).unwrap();
        assert_eq!(input.width, None);
        assert_eq!(input.height, None);
    }

    #[test]
    fn explicit_aspect_ratio_wins() {
        let input = DeliverableInput {
            aspect_ratio: Some("4:5".into()),
            width: Some(1920),
            height: Some(1080),
            ..Default::default()
        };
        assert_eq!(input.normalize().aspect_ratio.as_deref(), Some("4:5"));

        let update = UpdateDeliverableRequest {
            width: Some(1280),
            height: Some(720),
            ..Default::default()
        };
        assert_eq!(update.effective_aspect_ratio().as_deref(), Some("16:9"));
    }
}
