//! Xero accounting integration types
//!
//! Wire shapes for the Xero identity and accounting APIs (PascalCase JSON)
//! plus the stored OAuth connection.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

pub const AUTHORIZE_URL: &str = "https://login.xero.com/identity/connect/authorize";
pub const SCOPES: &str =
    "openid profile email accounting.contacts accounting.contacts.read offline_access";

/// Xero returns at most this many contacts per page
pub const CONTACTS_PAGE_SIZE: usize = 100;

/// Tokens this close to expiry are refreshed before use
const EXPIRY_SKEW_SECONDS: i64 = 60;

/// Stored OAuth connection (single row)
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct XeroConnection {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub tenant_id: Option<String>,
    pub expires_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl XeroConnection {
    pub fn needs_refresh(&self, now: DateTime<Utc>) -> bool {
        self.expires_at - Duration::seconds(EXPIRY_SKEW_SECONDS) <= now
    }
}

/// Token endpoint response
#[derive(Debug, Clone, Deserialize)]
pub struct TokenSet {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default = "default_expires_in")]
    pub expires_in: i64,
}

fn default_expires_in() -> i64 {
    1800
}

impl TokenSet {
    pub fn expires_at(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        now + Duration::seconds(self.expires_in)
    }
}

/// Entry from `GET /connections`
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct XeroTenant {
    pub tenant_id: String,
    #[serde(default)]
    pub tenant_name: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct XeroPhone {
    #[serde(default)]
    pub phone_number: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct XeroAddress {
    #[serde(default)]
    pub address_line1: Option<String>,
    #[serde(default)]
    pub city: Option<String>,
    #[serde(default)]
    pub region: Option<String>,
    #[serde(default)]
    pub postal_code: Option<String>,
}

/// Contact from the accounting API
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct XeroContact {
    #[serde(rename = "ContactID")]
    pub contact_id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub email_address: Option<String>,
    #[serde(default)]
    pub is_customer: bool,
    #[serde(default)]
    pub tax_number: Option<String>,
    #[serde(default)]
    pub phones: Vec<XeroPhone>,
    #[serde(default)]
    pub addresses: Vec<XeroAddress>,
}

fn filled(value: &Option<String>) -> Option<String> {
    value.as_ref().map(|v| v.trim()).filter(|v| !v.is_empty()).map(str::to_string)
}

impl XeroContact {
    pub fn display_name(&self) -> Option<String> {
        filled(&self.name)
    }

    pub fn email(&self) -> Option<String> {
        filled(&self.email_address)
    }

    pub fn phone(&self) -> Option<String> {
        self.phones.first().and_then(|p| filled(&p.phone_number))
    }

    pub fn address(&self) -> XeroAddress {
        self.addresses.first().cloned().unwrap_or_default()
    }

    pub fn abn(&self) -> Option<String> {
        filled(&self.tax_number)
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ContactsPage {
    #[serde(default)]
    pub contacts: Vec<XeroContact>,
}

/// Customers only; suppliers are skipped
pub fn customers(contacts: Vec<XeroContact>) -> Vec<XeroContact> {
    contacts.into_iter().filter(|c| c.is_customer).collect()
}

/// Consent URL the user is sent to when connecting
pub fn authorize_url(client_id: &str, redirect_uri: &str, state: &str) -> String {
    let query = url::form_urlencoded::Serializer::new(String::new())
        .append_pair("response_type", "code")
        .append_pair("client_id", client_id)
        .append_pair("redirect_uri", redirect_uri)
        .append_pair("scope", SCOPES)
        .append_pair("state", state)
        .finish();
    format!("{}?{}", AUTHORIZE_URL, query)
}

/// Where the browser lands after the OAuth callback
pub fn settings_redirect(app_base_url: &str, outcome: Result<(), &str>) -> String {
    let base = app_base_url.trim_end_matches('/');
    match outcome {
        Ok(()) => format!("{}/settings?xero=connected", base),
        Err(message) => {
            let encoded: String = url::form_urlencoded::byte_serialize(message.as_bytes()).collect();
            format!("{}/settings?error={}", base, encoded)
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct XeroStatus {
    pub connected: bool,
    pub configured: bool,
    pub tenant_id: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
    /// Last time tokens or tenant were written
    pub updated_at: Option<DateTime<Utc>>,
}

impl XeroStatus {
    pub fn new(configured: bool, connection: Option<&XeroConnection>) -> Self {
        Self {
            connected: connection.is_some(),
            configured,
            tenant_id: connection.and_then(|c| c.tenant_id.clone()),
            expires_at: connection.map(|c| c.expires_at),
            updated_at: connection.map(|c| c.updated_at),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ConnectResponse {
    pub url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CallbackQuery {
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub state: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}

/// Counts from one sync run
#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
pub struct SyncResult {
    pub created: usize,
    pub updated: usize,
    pub matched: usize,
    pub total: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct ClearSyncedResponse {
    pub deleted: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use url::Url;

    #[test]
    fn contacts_page_parses_pascal_case() {
        let body = r#"{
            "Contacts": [
                {"ContactID": "c1", "Name": "Acme", "EmailAddress": "hi@acme.com", "IsCustomer": true,
                 "TaxNumber": "12 345", "Phones": [{"PhoneNumber": ""}, {"PhoneNumber": "555"}],
                 "Addresses": [{"AddressLine1": "1 Main St", "City": "Sydney", "Region": "NSW", "PostalCode": "2000"}]},
                {"ContactID": "c2", "Name": "Paper Supplier", "IsSupplier": true}
            ]
        }"#;

        let page: ContactsPage = serde_json::from_str(body).unwrap();
        assert_eq!(page.contacts.len(), 2);

        let customers = customers(page.contacts);
        assert_eq!(customers.len(), 1);
        let acme = &customers[0];
        assert_eq!(acme.display_name().as_deref(), Some("Acme"));
        // Only the first phone is considered
        assert_eq!(acme.phone(), None);
        assert_eq!(acme.address().city.as_deref(), Some("Sydney"));
        assert_eq!(acme.abn().as_deref(), Some("12 345"));
    }

    #[test]
    fn authorize_url_carries_scopes_and_state() {
        let url = authorize_url("client", "http://localhost:8080/xero/callback", "s1");
        let parsed = Url::parse(&url).unwrap();
        let pairs: std::collections::HashMap<_, _> = parsed.query_pairs().into_owned().collect();

        assert_eq!(parsed.host_str(), Some("login.xero.com"));
        assert_eq!(pairs["scope"], SCOPES);
        assert_eq!(pairs["state"], "s1");
        assert_eq!(pairs["redirect_uri"], "http://localhost:8080/xero/callback");
    }

    #[test]
    fn redirects_back_to_settings() {
        assert_eq!(
            settings_redirect("http://localhost:3000/", Ok(())),
            "http://localhost:3000/settings?xero=connected"
        );
        assert_eq!(
            settings_redirect("http://localhost:3000", Err("Invalid state")),
            "http://localhost:3000/settings?error=Invalid+state"
        );
    }

    #[test]
    fn connection_refreshes_shortly_before_expiry() {
        let now = Utc::now();
        let conn = XeroConnection {
            access_token: "a".into(),
            refresh_token: None,
            tenant_id: None,
            expires_at: now + Duration::seconds(30),
            updated_at: now,
        };
        assert!(conn.needs_refresh(now));

        let fresh = XeroConnection {
            expires_at: now + Duration::minutes(20),
            ..conn
        };
        assert!(!fresh.needs_refresh(now));
    }

    #[test]
    fn status_reports_the_stored_connection() {
        let now = Utc::now();
        let conn = XeroConnection {
            access_token: "a".into(),
            refresh_token: Some("r".into()),
            tenant_id: Some("tenant-1".into()),
            expires_at: now + Duration::minutes(30),
            updated_at: now,
        };

        let status = XeroStatus::new(true, Some(&conn));
        assert!(status.connected);
        assert_eq!(status.tenant_id.as_deref(), Some("tenant-1"));
        assert_eq!(status.updated_at, Some(now));

        let status = XeroStatus::new(false, None);
        assert!(!status.connected && !status.configured);
        assert!(status.updated_at.is_none());
    }

    #[test]
    fn tenant_name_is_optional() {
        let tenants: Vec<XeroTenant> = serde_json::from_str(
            r#"[{"tenantId": "t1", "tenantName": "Grizzle"}, {"tenantId": "t2"}]"#,
        )
        .unwrap();
        assert_eq!(tenants[0].tenant_name.as_deref(), Some("Grizzle"));
        assert!(tenants[1].tenant_name.is_none());
    }
}
