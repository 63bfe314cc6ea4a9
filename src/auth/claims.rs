use serde::{Deserialize, Serialize};

/// JWT claims issued to studio staff by the front end's identity provider
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Subject (staff member ID)
    pub sub: String,

    /// Audience
    pub aud: String,

    /// Expiration (Unix timestamp)
    pub exp: i64,

    /// Issued at (Unix timestamp) - optional
    #[serde(default)]
    pub iat: Option<i64>,

    /// Issuer - optional
    #[serde(default)]
    pub iss: Option<String>,

    /// Display name - optional
    #[serde(default)]
    pub name: Option<String>,

    /// Email - optional
    #[serde(default)]
    pub email: Option<String>,
}
