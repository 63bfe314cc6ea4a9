use anyhow::{Context, Result};
use std::env;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Environment {
    Dev,
    Staging,
    Prod,
}

impl Environment {
    pub fn from_str(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "prod" | "production" => Self::Prod,
            "staging" => Self::Staging,
            _ => Self::Dev,
        }
    }

    pub fn is_dev(&self) -> bool {
        matches!(self, Self::Dev)
    }

    pub fn is_prod(&self) -> bool {
        matches!(self, Self::Prod)
    }
}

/// Dropbox app credentials.
///
/// Either the refresh-token triple (preferred, long lived) or a static
/// access token must be present for Dropbox calls to be made at all.
#[derive(Debug, Clone, Default)]
pub struct DropboxSettings {
    pub app_key: Option<String>,
    pub app_secret: Option<String>,
    pub refresh_token: Option<String>,
    pub access_token: Option<String>,
    pub projects_root: String,
}

impl DropboxSettings {
    pub fn has_credentials(&self) -> bool {
        self.refresh_token.is_some() || self.access_token.is_some()
    }
}

#[derive(Debug, Clone)]
pub struct XeroSettings {
    pub client_id: String,
    pub client_secret: String,
    pub redirect_uri: String,
    /// Fallback tenant when the connections endpoint could not be read
    pub tenant_id: Option<String>,
}

#[derive(Debug, Clone)]
pub struct Settings {
    pub env: Environment,
    pub server_addr: String,

    // Database
    pub database_url: String,
    pub database_max_connections: u32,

    // Redis
    pub redis_url: String,
    pub redis_cache_ttl_seconds: u64,

    // CORS
    pub cors_allow_origins: Vec<String>,

    // API auth (HS256 bearer tokens)
    pub auth_jwt_secret: String,
    pub auth_jwt_audience: String,
    pub auth_jwt_issuer: Option<String>,

    // LLM (OpenAI-compatible chat completions)
    pub llm_api_url: String,
    pub llm_model: String,
    pub llm_api_key: Option<String>,
    pub llm_timeout_seconds: u64,
    pub llm_max_tokens: u32,

    // Integrations
    pub dropbox: DropboxSettings,
    pub xero: Option<XeroSettings>,

    // Front end, used for OAuth redirects
    pub app_base_url: String,

    // Attachments
    pub attachments_dir: String,
    pub max_attachment_bytes: usize,
}

impl Settings {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build settings from an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        // Treat blank values the same as unset ones
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let parsed = |key: &str| var(key).and_then(|s| s.trim().parse::<u64>().ok());

        let env = Environment::from_str(&var("ENV").unwrap_or_else(|| "dev".to_string()));
        let server_addr = var("SERVER_ADDR").unwrap_or_else(|| "0.0.0.0:8080".to_string());

        // Database
        let database_url = var("DATABASE_URL").context("DATABASE_URL must be set")?;
        let database_max_connections = parsed("DATABASE_MAX_CONNECTIONS").unwrap_or(10) as u32;

        // Redis
        let redis_url = var("REDIS_URL").unwrap_or_else(|| "redis://127.0.0.1:6379/0".to_string());
        let redis_cache_ttl_seconds = parsed("REDIS_CACHE_TTL_SECONDS").unwrap_or(86400); // 1 day default

        // CORS
        let cors_allow_origins = var("CORS_ALLOW_ORIGINS")
            .unwrap_or_else(|| "http://localhost:3000".to_string())
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        // API auth
        let auth_jwt_secret = var("AUTH_JWT_SECRET").context("AUTH_JWT_SECRET must be set")?;
        let auth_jwt_audience =
            var("AUTH_JWT_AUDIENCE").unwrap_or_else(|| "authenticated".to_string());
        let auth_jwt_issuer = var("AUTH_JWT_ISSUER");

        // LLM, defaults target a local LM Studio instance
        let llm_api_url = var("LLM_API_URL").unwrap_or_else(|| "http://localhost:1234/v1".to_string());
        let llm_model = var("LLM_MODEL").unwrap_or_else(|| "qwen/qwen2.5-32b-instruct".to_string());
        let llm_api_key = var("LLM_API_KEY");
        let llm_timeout_seconds = parsed("LLM_TIMEOUT_SECONDS").unwrap_or(120); // local models are slow
        let llm_max_tokens = parsed("LLM_MAX_TOKENS").unwrap_or(700) as u32;

        // Dropbox
        let dropbox = DropboxSettings {
            app_key: var("DROPBOX_APP_KEY"),
            app_secret: var("DROPBOX_APP_SECRET"),
            refresh_token: var("DROPBOX_REFRESH_TOKEN"),
            access_token: var("DROPBOX_ACCESS_TOKEN"),
            projects_root: var("DROPBOX_PROJECTS_ROOT")
                .unwrap_or_else(|| "/clients - grizzle".to_string()),
        };

        // Xero is enabled only when the whole app registration is present
        let xero = match (
            var("XERO_CLIENT_ID"),
            var("XERO_CLIENT_SECRET"),
            var("XERO_REDIRECT_URI"),
        ) {
            (Some(client_id), Some(client_secret), Some(redirect_uri)) => Some(XeroSettings {
                client_id,
                client_secret,
                redirect_uri,
                tenant_id: var("XERO_TENANT_ID"),
            }),
            _ => None,
        };

        let app_base_url = var("APP_BASE_URL")
            .unwrap_or_else(|| "http://localhost:3000".to_string())
            .trim_end_matches('/')
            .to_string();

        let attachments_dir =
            var("ATTACHMENTS_DIR").unwrap_or_else(|| "uploads/enquiries".to_string());
        let max_attachment_bytes =
            parsed("MAX_ATTACHMENT_BYTES").unwrap_or(50 * 1024 * 1024) as usize;

        Ok(Settings {
            env,
            server_addr,
            database_url,
            database_max_connections,
            redis_url,
            redis_cache_ttl_seconds,
            cors_allow_origins,
            auth_jwt_secret,
            auth_jwt_audience,
            auth_jwt_issuer,
            llm_api_url,
            llm_model,
            llm_api_key,
            llm_timeout_seconds,
            llm_max_tokens,
            dropbox,
            xero,
            app_base_url,
            attachments_dir,
            max_attachment_bytes,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn settings_from(pairs: &[(&str, &str)]) -> Result<Settings> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Settings::from_lookup(|key| vars.get(key).cloned())
    }

    const REQUIRED: [(&str, &str); 2] = [
        ("DATABASE_URL", "postgres://localhost/grizzle"),
        ("AUTH_JWT_SECRET", "secret"),
    ];

    #[test]
    fn defaults_apply_when_only_required_vars_are_set() {
        let settings = settings_from(&REQUIRED).unwrap();

        assert_eq!(settings.env, Environment::Dev);
        assert_eq!(settings.server_addr, "0.0.0.0:8080");
        assert_eq!(settings.database_max_connections, 10);
        assert_eq!(settings.redis_cache_ttl_seconds, 86400);
        assert_eq!(settings.llm_api_url, "http://localhost:1234/v1");
        assert_eq!(settings.llm_max_tokens, 700);
        assert_eq!(settings.dropbox.projects_root, "/clients - grizzle");
        assert!(!settings.dropbox.has_credentials());
        assert!(settings.xero.is_none());
        assert_eq!(settings.max_attachment_bytes, 50 * 1024 * 1024);
        assert_eq!(settings.cors_allow_origins, vec!["http://localhost:3000"]);
    }

    #[test]
    fn missing_database_url_is_an_error() {
        let err = settings_from(&[("AUTH_JWT_SECRET", "secret")]).unwrap_err();
        assert!(err.to_string().contains("DATABASE_URL"));
    }

    #[test]
    fn xero_requires_the_full_registration() {
        let mut vars = REQUIRED.to_vec();
        vars.push(("XERO_CLIENT_ID", "id"));
        vars.push(("XERO_CLIENT_SECRET", "secret"));
        assert!(settings_from(&vars).unwrap().xero.is_none());

        vars.push(("XERO_REDIRECT_URI", "http://localhost:8080/xero/callback"));
        let xero = settings_from(&vars).unwrap().xero.unwrap();
        assert_eq!(xero.client_id, "id");
        assert!(xero.tenant_id.is_none());
    }

    #[test]
    fn blank_values_count_as_unset() {
        let mut vars = REQUIRED.to_vec();
        vars.push(("DROPBOX_ACCESS_TOKEN", "  "));
        vars.push(("CORS_ALLOW_ORIGINS", "http://a.test, ,http://b.test"));
        vars.push(("ENV", "Production"));

        let settings = settings_from(&vars).unwrap();
        assert!(!settings.dropbox.has_credentials());
        assert_eq!(settings.cors_allow_origins, vec!["http://a.test", "http://b.test"]);
        assert!(settings.env.is_prod());
    }
}
