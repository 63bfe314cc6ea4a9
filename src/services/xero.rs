//! Xero identity and accounting API client.

use anyhow::{Context, Result};
use reqwest::{Client, Response};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, instrument};

use crate::config::XeroSettings;
use crate::domain::xero::{self, ContactsPage, TokenSet, XeroContact, XeroTenant, CONTACTS_PAGE_SIZE};

const TOKEN_URL: &str = "https://identity.xero.com/connect/token";
const CONNECTIONS_URL: &str = "https://api.xero.com/connections";
const CONTACTS_URL: &str = "https://api.xero.com/api.xro/2.0/Contacts";

/// Stop paging after this many pages even if Xero keeps returning full ones
const MAX_CONTACT_PAGES: u32 = 200;

#[derive(Debug, Error)]
pub enum XeroError {
    #[error("Xero API error {status}: {body}")]
    Api { status: u16, body: String },

    #[error("Xero request failed: {0}")]
    Http(#[from] reqwest::Error),
}

impl XeroError {
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, Self::Api { status: 401, .. })
    }
}

#[derive(Clone)]
pub struct XeroClient {
    http: Client,
    settings: XeroSettings,
}

impl XeroClient {
    pub fn new(settings: XeroSettings) -> Result<Self> {
        let http = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .context("Failed to create Xero HTTP client")?;

        info!(redirect_uri = %settings.redirect_uri, "Xero client initialized");

        Ok(Self { http, settings })
    }

    pub fn authorize_url(&self, state: &str) -> String {
        xero::authorize_url(&self.settings.client_id, &self.settings.redirect_uri, state)
    }

    /// Tenant to use when the stored connection has none
    pub fn fallback_tenant_id(&self) -> Option<&str> {
        self.settings.tenant_id.as_deref()
    }

    async fn token_request(&self, form: &[(&str, &str)]) -> Result<TokenSet, XeroError> {
        let response = self
            .http
            .post(TOKEN_URL)
            .basic_auth(&self.settings.client_id, Some(&self.settings.client_secret))
            .form(form)
            .send()
            .await?;

        Ok(checked(response).await?.json().await?)
    }

    /// Exchange an authorization code for tokens
    #[instrument(skip_all)]
    pub async fn exchange_code(&self, code: &str) -> Result<TokenSet, XeroError> {
        self.token_request(&[
            ("grant_type", "authorization_code"),
            ("code", code),
            ("redirect_uri", self.settings.redirect_uri.as_str()),
        ])
        .await
    }

    #[instrument(skip_all)]
    pub async fn refresh(&self, refresh_token: &str) -> Result<TokenSet, XeroError> {
        debug!("Refreshing Xero access token");
        self.token_request(&[
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token),
        ])
        .await
    }

    /// First organisation the token has access to
    #[instrument(skip_all)]
    pub async fn first_tenant(&self, access_token: &str) -> Result<Option<XeroTenant>, XeroError> {
        let response = self
            .http
            .get(CONNECTIONS_URL)
            .bearer_auth(access_token)
            .header(reqwest::header::ACCEPT, "application/json")
            .send()
            .await?;

        let tenants: Vec<XeroTenant> = checked(response).await?.json().await?;
        Ok(tenants.into_iter().next())
    }

    /// All contacts flagged as customers, following pagination
    #[instrument(skip(self, access_token))]
    pub async fn fetch_customers(
        &self,
        access_token: &str,
        tenant_id: &str,
    ) -> Result<Vec<XeroContact>, XeroError> {
        let mut contacts = Vec::new();

        for page in 1..=MAX_CONTACT_PAGES {
            let response = self
                .http
                .get(CONTACTS_URL)
                .query(&[("page", page)])
                .bearer_auth(access_token)
                .header("xero-tenant-id", tenant_id)
                .header(reqwest::header::ACCEPT, "application/json")
                .send()
                .await?;

            let batch: ContactsPage = checked(response).await?.json().await?;
            let fetched = batch.contacts.len();
            contacts.extend(batch.contacts);

            debug!(page = page, fetched = fetched, "Fetched Xero contacts page");
            if fetched < CONTACTS_PAGE_SIZE {
                break;
            }
        }

        let total = contacts.len();
        let customers = xero::customers(contacts);
        info!(total = total, customers = customers.len(), "Fetched Xero contacts");
        Ok(customers)
    }
}

async fn checked(response: Response) -> Result<Response, XeroError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    Err(XeroError::Api {
        status: status.as_u16(),
        body,
    })
}
