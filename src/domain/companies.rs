//! Company domain types and the client-name matching heuristic.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::contacts::Contact;
use super::projects::ProjectSummary;

/// Company entity
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Company {
    pub id: Uuid,
    pub name: String,
    pub company_email: Option<String>,
    pub company_phone: Option<String>,
    pub street: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub postcode: Option<String>,
    pub abn: Option<String>,
    pub website: Option<String>,
    pub logo_url: Option<String>,
    pub xero_contact_id: Option<String>,
    pub xero_synced_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

pub const COMPANY_COLUMNS: &str = "id, name, company_email, company_phone, street, city, state, \
     postcode, abn, website, logo_url, xero_contact_id, xero_synced_at, created_at, updated_at";

/// Company row in the companies list
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct CompanyWithCounts {
    #[sqlx(flatten)]
    #[serde(flatten)]
    pub company: Company,
    pub project_count: i64,
    pub contact_count: i64,
}

/// Company detail page
#[derive(Debug, Clone, Serialize)]
pub struct CompanyDetail {
    #[serde(flatten)]
    pub company: Company,
    pub projects: Vec<ProjectSummary>,
    pub contacts: Vec<Contact>,
}

/// Request DTO for creating a company
#[derive(Debug, Clone, Deserialize)]
pub struct CreateCompanyRequest {
    pub name: String,
    #[serde(default)]
    pub company_email: Option<String>,
    #[serde(default)]
    pub company_phone: Option<String>,
    #[serde(default)]
    pub street: Option<String>,
    #[serde(default)]
    pub city: Option<String>,
    #[serde(default)]
    pub state: Option<String>,
    #[serde(default)]
    pub postcode: Option<String>,
    #[serde(default)]
    pub abn: Option<String>,
    #[serde(default)]
    pub website: Option<String>,
}

/// Request DTO for updating a company; absent fields are left untouched
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateCompanyRequest {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub company_email: Option<String>,
    #[serde(default)]
    pub company_phone: Option<String>,
    #[serde(default)]
    pub street: Option<String>,
    #[serde(default)]
    pub city: Option<String>,
    #[serde(default)]
    pub state: Option<String>,
    #[serde(default)]
    pub postcode: Option<String>,
    #[serde(default)]
    pub abn: Option<String>,
    #[serde(default)]
    pub website: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CompanySearchQuery {
    #[serde(default)]
    pub q: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct LogoResponse {
    pub logo_url: String,
    pub company: Company,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct LogoBatchResponse {
    pub total_processed: usize,
    pub updated: usize,
    pub failed: usize,
}

/// A company that may be the client named in a parsed enquiry
#[derive(Debug, Clone, Serialize)]
pub struct CompanyCandidate {
    pub id: Uuid,
    pub name: String,
    pub company_email: Option<String>,
    pub match_score: f64,
    pub existing_contacts: i64,
}

/// Raw company row considered for candidate ranking
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct CandidateRow {
    pub id: Uuid,
    pub name: String,
    pub company_email: Option<String>,
    pub contact_count: i64,
}

/// Candidates scoring at or below this are dropped
pub const MIN_CANDIDATE_SCORE: f64 = 0.4;

/// At most this many candidates are offered
pub const MAX_CANDIDATES: usize = 5;

/// Favicon URL for a company website, via Google's favicon service.
///
/// Accepts bare domains (`www.example.com`) as well as full URLs.
pub fn favicon_url(website: &str) -> String {
    let trimmed = website.trim();
    let without_scheme = trimmed
        .strip_prefix("https://")
        .or_else(|| trimmed.strip_prefix("http://"))
        .unwrap_or(trimmed);
    let without_www = without_scheme.strip_prefix("www.").unwrap_or(without_scheme);
    let domain = without_www.split('/').next().unwrap_or(without_www);

    format!("https://www.google.com/s2/favicons?domain={}&sz=128", domain)
}

/// Name fragments used to pull candidate companies from the database:
/// the full client name, its first word, and its first two words.
pub fn candidate_search_terms(client_name: &str) -> Vec<String> {
    let words: Vec<&str> = client_name.split_whitespace().collect();
    let mut terms = vec![client_name.trim().to_string()];

    if let Some(first) = words.first() {
        terms.push(first.to_string());
    }
    if words.len() >= 2 {
        terms.push(words[..2].join(" "));
    }

    terms.retain(|t| !t.is_empty());
    terms.dedup();
    let mut unique = Vec::with_capacity(terms.len());
    for term in terms {
        if !unique.contains(&term) {
            unique.push(term);
        }
    }
    unique
}

fn keywords(s: &str) -> Vec<&str> {
    s.split_whitespace()
        .filter(|w| w.chars().count() > 2)
        .collect()
}

/// Score how well a stored company name matches a client name, in `[0, 1]`.
///
/// Exact (case-insensitive) match scores 1.0, the company name containing
/// the search 0.9, the search containing the company name 0.85. Otherwise
/// shared keywords (longer than two characters) score in 0.5..=0.8 by overlap
/// ratio, and no shared keyword scores 0.
pub fn match_score(company_name: &str, search_name: &str) -> f64 {
    let company = company_name.to_lowercase();
    let search = search_name.to_lowercase();

    if company == search {
        return 1.0;
    }
    if company.contains(&search) {
        return 0.9;
    }
    if search.contains(&company) {
        return 0.85;
    }

    let company_words = keywords(&company);
    let search_words = keywords(&search);
    let common = company_words
        .iter()
        .filter(|w| search_words.contains(w))
        .count();

    if common == 0 {
        return 0.0;
    }

    let overlap = common as f64 / company_words.len().max(search_words.len()) as f64;
    0.5 + overlap * 0.3
}

/// Score, filter and order candidate rows, best first.
pub fn rank_candidates(rows: Vec<CandidateRow>, client_name: &str) -> Vec<CompanyCandidate> {
    let mut candidates: Vec<CompanyCandidate> = rows
        .into_iter()
        .map(|row| CompanyCandidate {
            match_score: match_score(&row.name, client_name),
            id: row.id,
            name: row.name,
            company_email: row.company_email,
            existing_contacts: row.contact_count,
        })
        .filter(|c| c.match_score > MIN_CANDIDATE_SCORE)
        .collect();

    candidates.sort_by(|a, b| b.match_score.total_cmp(&a.match_score));
    candidates.truncate(MAX_CANDIDATES);
    candidates
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(name: &str) -> CandidateRow {
        CandidateRow {
            id: Uuid::new_v4(),
            name: name.to_string(),
            company_email: None,
            contact_count: 0,
        }
    }

    #[test]
    fn favicon_url_strips_scheme_www_and_path() {
        let expected = "https://www.google.com/s2/favicons?domain=acme.com&sz=128";
        assert_eq!(favicon_url("https://www.acme.com/about"), expected);
        assert_eq!(favicon_url("www.acme.com"), expected);
        assert_eq!(favicon_url("http://acme.com"), expected);
        assert_eq!(favicon_url("acme.com/"), expected);
    }

    #[test]
    fn search_terms_cover_full_name_and_leading_words() {
        assert_eq!(
            candidate_search_terms("Red Bull Media House"),
            vec!["Red Bull Media House", "Red", "Red Bull"]
        );
        assert_eq!(candidate_search_terms("Acme"), vec!["Acme"]);
        assert_eq!(candidate_search_terms("Red Bull"), vec!["Red Bull", "Red"]);
    }

    #[test]
    fn exact_and_containment_scores() {
        assert_eq!(match_score("Red Bull", "red bull"), 1.0);
        assert_eq!(match_score("Red Bull Creative", "Red Bull"), 0.9);
        assert_eq!(match_score("Red Bull", "Red Bull Creative"), 0.85);
    }

    #[test]
    fn keyword_overlap_scores_between_half_and_point_eight() {
        // "media" and "house" shared out of three words each
        let score = match_score("Media House Group", "Media House Studios");
        assert!((score - (0.5 + 0.3 * 2.0 / 3.0)).abs() < 1e-9);

        // Short words are ignored
        assert_eq!(match_score("AB Films", "AB Studios"), 0.0);
        assert_eq!(match_score("Acme", "Globex"), 0.0);
    }

    #[test]
    fn ranking_filters_sorts_and_truncates() {
        let rows = vec![
            row("Globex"),
            row("Red Bull Creative"),
            row("Red Bull"),
            row("Bull Studios"),
        ];
        let ranked = rank_candidates(rows, "Red Bull");

        let names: Vec<&str> = ranked.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["Red Bull", "Red Bull Creative", "Bull Studios"]);
        assert!(ranked.iter().all(|c| c.match_score > MIN_CANDIDATE_SCORE));

        let many: Vec<CandidateRow> = (0..8).map(|i| row(&format!("Acme {}", i))).collect();
        assert_eq!(rank_candidates(many, "Acme").len(), MAX_CANDIDATES);
    }
}
