//! Structured data extracted from a free-text enquiry by the LLM
//!
//! The model is asked for one JSON object. Depending on the model it comes
//! back flat or grouped under section headings, sometimes wrapped in prose,
//! so parsing is deliberately lenient.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

/// A single deliverable as described by the client
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ParsedDeliverable {
    pub name: Option<String>,
    pub aspect_ratio: Option<String>,
    pub duration: Option<String>,
    pub description: Option<String>,
}

/// Enquiry fields extracted by the LLM
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ParsedEnquiry {
    // Company
    pub client_name: String,
    pub company_website: Option<String>,

    // Contact
    pub contact_first_name: Option<String>,
    pub contact_last_name: Option<String>,
    pub contact_email: Option<String>,
    pub contact_phone: Option<String>,
    pub contact_job_title: Option<String>,

    // Project
    pub project_title: String,
    pub project_summary: String,
    pub project_description: String,
    pub budget: Option<String>,
    pub timeline: Option<String>,

    // Technical
    pub framerate: Option<String>,
    pub tone: Option<String>,
    pub reference_links: Vec<String>,
    pub deliverables: Vec<ParsedDeliverable>,

    pub aspect_ratio: Option<String>,
    pub number_of_deliverables: Option<i32>,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum LlmParseError {
    #[error("No content in LLM response")]
    EmptyContent,

    #[error("LLM response is not valid JSON: {0}")]
    InvalidJson(String),

    #[error("LLM response missing company name")]
    MissingClientName,
}

pub const SYSTEM_PROMPT: &str = r#"You are an assistant that extracts structured information from project enquiry emails.
Extract the following information and return ONLY valid JSON with these exact fields:

Company Information:
- clientName: The company or organization name
- companyWebsite: Infer the company website URL. Use these strategies in order:
  1. If a website URL is explicitly mentioned in the content, use that
  2. If an email domain is present (e.g. sarah@acme.com), convert to www.acme.com
  3. If only company name is known, make a reasonable guess (e.g. "Acme Corp" -> www.acmecorp.com)
  Return the URL with www. prefix (e.g. "www.example.com"), or null if cannot be reasonably inferred.

Individual Contact (if a person is mentioned):
- contactFirstName: Person's first name (null if not mentioned)
- contactLastName: Person's last name (null if not mentioned)
- contactEmail: Email address (null if not mentioned)
- contactPhone: Phone number (null if not mentioned)
- contactJobTitle: Their job title or role (null if not mentioned)

Project Information:
- projectTitle: A professional project title (max 50 characters)
- projectSummary: A brief 1-2 sentence overview of what they want
- projectDescription: A detailed description capturing all salient project details, requirements and context.
- budget: Budget amount with currency (null if not mentioned, keep original format)
- timeline: Deadline or timeframe (null if not mentioned)

Job Details - Technical Specifications:
- framerate: Default video framerate if mentioned (e.g. "24fps", "30fps", null if not mentioned)
- tone: Creative tone or style (e.g. "Corporate", "Energetic", "Minimal", null if not mentioned)
- deliverables: An array with one object per video or output mentioned:
  - name: Descriptive name (e.g. "Hero Video", "Social Portrait Cut")
  - aspectRatio: Format like "16:9", "9:16", "1:1"
  - duration: Length like "30s", "60s", "2min"
  - description: Brief description of what this deliverable is for

  If the client mentions several videos with DIFFERENT specs (e.g. "one 16:9 and one 9:16"),
  create SEPARATE deliverable objects for each. Don't combine aspect ratios.

Return ONLY the JSON object, no other text or explanation."#;

pub fn user_prompt(raw_content: &str) -> String {
    format!("Extract information from this enquiry:\n\n{}", raw_content)
}

static URL_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"https?://\S+").expect("valid regex"));

/// Every http(s) URL in the text, in order of appearance
pub fn extract_reference_links(text: &str) -> Vec<String> {
    URL_RE
        .find_iter(text)
        .map(|m| m.as_str().to_string())
        .collect()
}

/// The span from the first `{` to the last `}`, or the whole content
fn json_span(content: &str) -> &str {
    match (content.find('{'), content.rfind('}')) {
        (Some(start), Some(end)) if end > start => &content[start..=end],
        _ => content,
    }
}

const COMPANY_SECTION: &str = "Company Information";
const CONTACT_SECTION: &str = "Individual Contact";
const PROJECT_SECTION: &str = "Project Information";
const JOB_SECTION: &str = "Job Details - Technical Specifications";

/// Field lookup over a section object with the flat root as fallback
struct Fields<'a> {
    section: Option<&'a Map<String, Value>>,
    root: &'a Map<String, Value>,
}

impl<'a> Fields<'a> {
    fn new(root: &'a Map<String, Value>, section: &str) -> Self {
        Self {
            section: root.get(section).and_then(Value::as_object),
            root,
        }
    }

    fn raw(&self, key: &str) -> Option<&'a Value> {
        self.section
            .and_then(|s| truthy(s.get(key)))
            .or_else(|| truthy(self.root.get(key)))
    }

    fn text(&self, key: &str) -> Option<String> {
        self.raw(key).and_then(value_text)
    }
}

/// Treat `null`, `false`, `0` and `""` as absent
fn truthy(value: Option<&Value>) -> Option<&Value> {
    value.filter(|v| match v {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::String(s) => !s.trim().is_empty(),
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        _ => true,
    })
}

fn value_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn parse_deliverable(value: &Value) -> Option<ParsedDeliverable> {
    let obj = value.as_object()?;
    let get = |key: &str| truthy(obj.get(key)).and_then(value_text);

    Some(ParsedDeliverable {
        name: get("name"),
        aspect_ratio: get("aspectRatio").or_else(|| get("aspect_ratio")),
        duration: get("duration"),
        description: get("description"),
    })
}

/// Turn the model's message content into a [`ParsedEnquiry`].
///
/// `raw_content` is the original enquiry text; reference links are taken from
/// it rather than from the model output.
pub fn parse_llm_content(content: &str, raw_content: &str) -> Result<ParsedEnquiry, LlmParseError> {
    if content.trim().is_empty() {
        return Err(LlmParseError::EmptyContent);
    }

    let value: Value = serde_json::from_str(json_span(content))
        .map_err(|e| LlmParseError::InvalidJson(e.to_string()))?;
    let root = value
        .as_object()
        .ok_or_else(|| LlmParseError::InvalidJson("expected a JSON object".to_string()))?;

    let company = Fields::new(root, COMPANY_SECTION);
    let contact = Fields::new(root, CONTACT_SECTION);
    let project = Fields::new(root, PROJECT_SECTION);
    let job = Fields::new(root, JOB_SECTION);

    let deliverables = job
        .raw("deliverables")
        .and_then(Value::as_array)
        .map(|items| items.iter().filter_map(parse_deliverable).collect())
        .unwrap_or_default();

    let number_of_deliverables = job
        .raw("numberOfDeliverables")
        .and_then(|v| match v {
            Value::Number(n) => n.as_i64(),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        })
        .and_then(|n| i32::try_from(n).ok());

    let parsed = ParsedEnquiry {
        client_name: company.text("clientName").unwrap_or_default(),
        company_website: company.text("companyWebsite"),

        contact_first_name: contact.text("contactFirstName"),
        contact_last_name: contact.text("contactLastName"),
        contact_email: contact.text("contactEmail"),
        contact_phone: contact.text("contactPhone"),
        contact_job_title: contact.text("contactJobTitle"),

        project_title: project
            .text("projectTitle")
            .or_else(|| project.text("suggestedTitle"))
            .unwrap_or_default(),
        project_summary: project.text("projectSummary").unwrap_or_default(),
        project_description: project
            .text("projectDescription")
            .or_else(|| project.text("projectType"))
            .unwrap_or_default(),
        budget: project.text("budget"),
        timeline: project.text("timeline"),

        framerate: job.text("framerate"),
        tone: job.text("tone"),
        reference_links: extract_reference_links(raw_content),
        deliverables,

        aspect_ratio: job.text("aspectRatio"),
        number_of_deliverables,
    };

    if parsed.client_name.is_empty() {
        return Err(LlmParseError::MissingClientName);
    }

    Ok(parsed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flat_json_wrapped_in_prose() {
        let content = r#"Sure! Here you go:
{"clientName": "Acme", "projectTitle": "Launch Film", "budget": 15000,
 "deliverables": [{"name": "Hero", "aspectRatio": "16:9", "duration": "30s"}]}
Let me know if you need anything else."#;

        let parsed = parse_llm_content(content, "see https://vimeo.com/123 and http://a.io/x").unwrap();
        assert_eq!(parsed.client_name, "Acme");
        assert_eq!(parsed.project_title, "Launch Film");
        assert_eq!(parsed.budget.as_deref(), Some("15000"));
        assert_eq!(parsed.deliverables.len(), 1);
        assert_eq!(parsed.deliverables[0].aspect_ratio.as_deref(), Some("16:9"));
        assert_eq!(
            parsed.reference_links,
            vec!["https://vimeo.com/123", "http://a.io/x"]
        );
    }

    #[test]
    fn sectioned_layout_is_understood() {
        let content = r#"{
            "Company Information": {"clientName": "Red Bull", "companyWebsite": "www.redbull.com"},
            "Individual Contact": {"contactFirstName": "Sam", "contactEmail": "sam@redbull.com"},
            "Project Information": {"projectTitle": "Air Race", "timeline": "March"},
            "Job Details - Technical Specifications": {"framerate": "25fps", "deliverables": []}
        }"#;

        let parsed = parse_llm_content(content, "").unwrap();
        assert_eq!(parsed.client_name, "Red Bull");
        assert_eq!(parsed.company_website.as_deref(), Some("www.redbull.com"));
        assert_eq!(parsed.contact_first_name.as_deref(), Some("Sam"));
        assert_eq!(parsed.timeline.as_deref(), Some("March"));
        assert_eq!(parsed.framerate.as_deref(), Some("25fps"));
        assert!(parsed.deliverables.is_empty());
    }

    #[test]
    fn legacy_keys_fill_title_and_description() {
        let content = r#"{"clientName": "Globex", "suggestedTitle": "Promo", "projectType": "Explainer", "numberOfDeliverables": "3"}"#;
        let parsed = parse_llm_content(content, "").unwrap();
        assert_eq!(parsed.project_title, "Promo");
        assert_eq!(parsed.project_description, "Explainer");
        assert_eq!(parsed.number_of_deliverables, Some(3));
    }

    #[test]
    fn missing_client_name_is_an_error() {
        assert_eq!(
            parse_llm_content(r#"{"clientName": "", "projectTitle": "x"}"#, ""),
            Err(LlmParseError::MissingClientName)
        );
        assert_eq!(parse_llm_content("  ", ""), Err(LlmParseError::EmptyContent));
        assert!(matches!(
            parse_llm_content("no json here", ""),
            Err(LlmParseError::InvalidJson(_))
        ));
    }
}
