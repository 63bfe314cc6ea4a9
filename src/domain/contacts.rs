//! Contact domain types
//!
//! People at client companies, plus the spreadsheet import rules.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

use super::companies::Company;
use super::enquiries::EnquirySummary;
use super::non_blank;
use super::projects::ProjectSummary;

/// Contact entity
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Contact {
    pub id: Uuid,
    pub company_id: Uuid,
    pub first_name: String,
    pub last_name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub job_title: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

pub const CONTACT_COLUMNS: &str =
    "id, company_id, first_name, last_name, email, phone, job_title, created_at, updated_at";

impl Contact {
    pub fn full_name(&self) -> String {
        match self.last_name.as_deref() {
            Some(last) if !last.is_empty() => format!("{} {}", self.first_name, last),
            _ => self.first_name.clone(),
        }
    }
}

/// Request DTO for creating a contact
#[derive(Debug, Clone, Deserialize)]
pub struct CreateContactRequest {
    pub company_id: Uuid,
    pub first_name: String,
    #[serde(default)]
    pub last_name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub job_title: Option<String>,
}

impl CreateContactRequest {
    /// Blank optional fields are stored as NULL
    pub fn normalized(self) -> Self {
        Self {
            company_id: self.company_id,
            first_name: self.first_name.trim().to_string(),
            last_name: non_blank(self.last_name),
            email: non_blank(self.email),
            phone: non_blank(self.phone),
            job_title: non_blank(self.job_title),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct FindOrCreateContactResponse {
    pub contact: Contact,
    pub created: bool,
}

/// Contact as shown in the grouped contacts list
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct ContactListItem {
    #[sqlx(flatten)]
    #[serde(flatten)]
    pub contact: Contact,
    pub latest_enquiry_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ContactGroupCompany {
    pub id: Uuid,
    pub name: String,
    pub xero_contact_id: Option<String>,
}

/// One company with its contacts
#[derive(Debug, Clone, Serialize)]
pub struct ContactGroup {
    pub company: ContactGroupCompany,
    pub contacts: Vec<ContactListItem>,
}

/// Contact detail page
#[derive(Debug, Clone, Serialize)]
pub struct ContactDetail {
    #[serde(flatten)]
    pub contact: Contact,
    pub company: Company,
    pub enquiries: Vec<EnquirySummary>,
    pub projects: Vec<ProjectSummary>,
}

/// Target field for an imported spreadsheet column
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum ContactField {
    FirstName,
    LastName,
    Email,
    Phone,
    JobTitle,
    CompanyName,
    Ignore,
}

/// Guess the contact field for a column header
pub fn detect_field(header: &str) -> ContactField {
    let lower = header.trim().to_lowercase();
    let has = |needle: &str| lower.contains(needle);

    if has("first") && has("name") {
        ContactField::FirstName
    } else if matches!(lower.as_str(), "name" | "full name" | "contact name") {
        ContactField::FirstName
    } else if has("last") && has("name") {
        ContactField::LastName
    } else if has("email") || has("e-mail") {
        ContactField::Email
    } else if has("phone") || has("mobile") || has("tel") {
        ContactField::Phone
    } else if has("job") || has("title") || has("position") || has("role") {
        ContactField::JobTitle
    } else if has("company") || has("organization") || has("business") {
        ContactField::CompanyName
    } else {
        ContactField::Ignore
    }
}

pub type ColumnMapping = BTreeMap<String, ContactField>;

/// Auto-detect a column mapping for a set of headers
pub fn detect_column_mapping<S: AsRef<str>>(headers: &[S]) -> ColumnMapping {
    headers
        .iter()
        .map(|h| (h.as_ref().to_string(), detect_field(h.as_ref())))
        .collect()
}

#[derive(Debug, Clone, Deserialize)]
pub struct DetectMappingRequest {
    pub headers: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ImportContactsRequest {
    pub records: Vec<BTreeMap<String, String>>,
    #[serde(default)]
    pub mapping: Option<ColumnMapping>,
    /// Spreadsheet header row, in sheet order
    #[serde(default)]
    pub headers: Vec<String>,
}

impl ImportContactsRequest {
    /// Mapped columns in the order they are applied to a record: sheet
    /// order first, then any mapped column the header row lacks by name.
    pub fn column_order<'a>(&'a self, mapping: &'a ColumnMapping) -> Vec<&'a str> {
        let mut columns: Vec<&str> = Vec::with_capacity(mapping.len());
        let by_sheet = self.headers.iter().map(String::as_str);
        let by_name = mapping.keys().map(String::as_str);

        for column in by_sheet.chain(by_name) {
            if mapping.contains_key(column) && !columns.contains(&column) {
                columns.push(column);
            }
        }
        columns
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ImportContactsResult {
    pub success: bool,
    pub imported: usize,
    pub skipped: usize,
    pub errors: Vec<String>,
}

/// One spreadsheet row after applying the column mapping
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImportRow {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub job_title: Option<String>,
    pub company_name: Option<String>,
}

impl ImportRow {
    /// Apply `mapping` to a raw record, visiting `columns` in order. Values
    /// are trimmed and blanks dropped; when two columns map to the same
    /// field the one visited last wins.
    pub fn from_record(
        record: &BTreeMap<String, String>,
        mapping: &ColumnMapping,
        columns: &[&str],
    ) -> Self {
        let mut row = Self::default();

        for column in columns {
            let Some(field) = mapping.get(*column) else {
                continue;
            };
            let Some(value) = non_blank(record.get(*column).cloned()) else {
                continue;
            };
            let slot = match field {
                ContactField::FirstName => &mut row.first_name,
                ContactField::LastName => &mut row.last_name,
                ContactField::Email => &mut row.email,
                ContactField::Phone => &mut row.phone,
                ContactField::JobTitle => &mut row.job_title,
                ContactField::CompanyName => &mut row.company_name,
                ContactField::Ignore => continue,
            };
            *slot = Some(value);
        }

        row
    }

    /// Required fields present: `(first_name, company_name)`
    pub fn required(&self) -> Option<(&str, &str)> {
        Some((self.first_name.as_deref()?, self.company_name.as_deref()?))
    }

    pub fn display_name(&self) -> String {
        format!(
            "{} {}",
            self.first_name.as_deref().unwrap_or_default(),
            self.last_name.as_deref().unwrap_or_default()
        )
        .trim()
        .to_string()
    }
}

/// Import error line for a 0-based record index
pub fn row_error(index: usize, message: impl std::fmt::Display) -> String {
    format!("Row {}: {}", index + 1, message)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn headers_map_to_fields() {
        assert_eq!(detect_field("First Name"), ContactField::FirstName);
        assert_eq!(detect_field("  Full Name "), ContactField::FirstName);
        assert_eq!(detect_field("Surname Last Name"), ContactField::LastName);
        assert_eq!(detect_field("E-mail"), ContactField::Email);
        assert_eq!(detect_field("Mobile"), ContactField::Phone);
        assert_eq!(detect_field("Telephone"), ContactField::Phone);
        assert_eq!(detect_field("Job Title"), ContactField::JobTitle);
        assert_eq!(detect_field("Role"), ContactField::JobTitle);
        assert_eq!(detect_field("Company Name"), ContactField::CompanyName);
        assert_eq!(detect_field("Organization"), ContactField::CompanyName);
        assert_eq!(detect_field("Notes"), ContactField::Ignore);
    }

    #[test]
    fn mapping_serializes_in_camel_case() {
        let mapping = detect_column_mapping(&["First Name", "Company"]);
        let json = serde_json::to_value(&mapping).unwrap();
        assert_eq!(json["First Name"], "firstName");
        assert_eq!(json["Company"], "companyName");
    }

    fn request(headers: &[&str]) -> ImportContactsRequest {
        ImportContactsRequest {
            records: Vec::new(),
            mapping: None,
            headers: headers.iter().map(|h| h.to_string()).collect(),
        }
    }

    fn record(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn later_sheet_column_wins_for_the_same_field() {
        // "Name" sorts before "Contact" is false; sheet order must decide, not the alphabet
        let headers = ["Name", "Contact Name", "Company"];
        let req = request(&headers);
        let mapping = detect_column_mapping(&headers);
        let columns = req.column_order(&mapping);
        assert_eq!(columns, vec!["Name", "Contact Name", "Company"]);

        let row = ImportRow::from_record(
            &record(&[("Name", "Ada"), ("Contact Name", "Grace"), ("Company", "Acme")]),
            &mapping,
            &columns,
        );
        assert_eq!(row.first_name.as_deref(), Some("Grace"));

        let reversed = request(&["Contact Name", "Name", "Company"]);
        let row = ImportRow::from_record(
            &record(&[("Name", "Ada"), ("Contact Name", "Grace"), ("Company", "Acme")]),
            &mapping,
            &reversed.column_order(&mapping),
        );
        assert_eq!(row.first_name.as_deref(), Some("Ada"));
    }

    #[test]
    fn mapped_columns_missing_from_headers_follow_by_name() {
        let mapping = detect_column_mapping(&["Email", "Company", "First Name"]);
        let req = request(&["First Name", "Unmapped"]);
        assert_eq!(
            req.column_order(&mapping),
            vec!["First Name", "Company", "Email"]
        );
    }

    #[test]
    fn full_name_skips_missing_last_name() {
        let now = Utc::now();
        let mut contact = Contact {
            id: Uuid::new_v4(),
            company_id: Uuid::new_v4(),
            first_name: "Ada".into(),
            last_name: Some("Lovelace".into()),
            email: None,
            phone: None,
            job_title: None,
            created_at: now,
            updated_at: now,
        };
        assert_eq!(contact.full_name(), "Ada Lovelace");

        contact.last_name = Some(String::new());
        assert_eq!(contact.full_name(), "Ada");
    }

    #[test]
    fn record_is_mapped_and_trimmed() {
        let mapping = detect_column_mapping(&["First Name", "Last Name", "Company", "Notes"]);
        let record: BTreeMap<String, String> = [
            ("First Name", "  Ada "),
            ("Last Name", ""),
            ("Company", "Acme"),
            ("Notes", "ignored"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();

        let req = request(&[]);
        let columns = req.column_order(&mapping);
        let row = ImportRow::from_record(&record, &mapping, &columns);
        assert_eq!(row.first_name.as_deref(), Some("Ada"));
        assert_eq!(row.last_name, None);
        assert_eq!(row.required(), Some(("Ada", "Acme")));
        assert_eq!(row.display_name(), "Ada");
    }

    #[test]
    fn missing_company_fails_required_check() {
        let mapping = detect_column_mapping(&["First Name"]);
        let record = BTreeMap::from([("First Name".to_string(), "Ada".to_string())]);
        let req = request(&["First Name"]);
        let columns = req.column_order(&mapping);
        assert_eq!(ImportRow::from_record(&record, &mapping, &columns).required(), None);
        assert_eq!(row_error(0, "Company \"X\" not found"), "Row 1: Company \"X\" not found");
    }
}
