//! Domain types and DTOs
//!
//! Request/response shapes for every entity plus the pure rules that go with
//! them (company matching, checklist transitions, folder routing, ...).

pub mod activities;
pub mod attachments;
pub mod checklists;
pub mod companies;
pub mod contacts;
pub mod deliverables;
pub mod enquiries;
pub mod link_preview;
pub mod llm;
pub mod projects;
pub mod xero;

use serde::{Deserialize, Deserializer};

/// Distinguish an absent field (`None`) from an explicit `null` (`Some(None)`).
///
/// Use together with `#[serde(default)]`.
pub fn double_option<'de, T, D>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    T: Deserialize<'de>,
    D: Deserializer<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

/// Trim a string and drop it when nothing is left
pub fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Deserialize)]
    struct Patch {
        #[serde(default, deserialize_with = "double_option")]
        company_id: Option<Option<String>>,
    }

    #[test]
    fn double_option_tells_null_from_missing() {
        let missing: Patch = serde_json::from_str("{}").unwrap();
        assert_eq!(missing.company_id, None);

        let cleared: Patch = serde_json::from_str(r#"{"company_id": null}"#).unwrap();
        assert_eq!(cleared.company_id, Some(None));

        let set: Patch = serde_json::from_str(r#"{"company_id": "abc"}"#).unwrap();
        assert_eq!(set.company_id, Some(Some("abc".to_string())));
    }

    #[test]
    fn non_blank_trims() {
        assert_eq!(non_blank(Some("  x ".into())), Some("x".into()));
        assert_eq!(non_blank(Some("   ".into())), None);
        assert_eq!(non_blank(None), None);
    }
}
