use super::Claims;

/// Authenticated caller extracted from the bearer token
#[derive(Debug, Clone)]
pub struct AuthContext {
    /// Staff member ID (JWT `sub`)
    pub user_id: String,

    pub name: Option<String>,

    pub email: Option<String>,
}

impl AuthContext {
    pub fn from_claims(claims: &Claims) -> Result<Self, &'static str> {
        if claims.sub.trim().is_empty() {
            return Err("Missing subject in token");
        }

        Ok(Self {
            user_id: claims.sub.clone(),
            name: claims.name.clone(),
            email: claims.email.clone(),
        })
    }

    /// Human-readable actor for audit fields such as "completed by"
    pub fn display_name(&self) -> &str {
        self.name
            .as_deref()
            .or(self.email.as_deref())
            .unwrap_or(&self.user_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn claims(sub: &str, name: Option<&str>, email: Option<&str>) -> Claims {
        Claims {
            sub: sub.to_string(),
            aud: "authenticated".to_string(),
            exp: 0,
            iat: None,
            iss: None,
            name: name.map(String::from),
            email: email.map(String::from),
        }
    }

    #[test]
    fn display_name_prefers_name_then_email_then_subject() {
        let ctx = AuthContext::from_claims(&claims("u1", Some("Tom"), Some("tom@grizzle.tv"))).unwrap();
        assert_eq!(ctx.display_name(), "Tom");

        let ctx = AuthContext::from_claims(&claims("u1", None, Some("tom@grizzle.tv"))).unwrap();
        assert_eq!(ctx.display_name(), "tom@grizzle.tv");

        let ctx = AuthContext::from_claims(&claims("u1", None, None)).unwrap();
        assert_eq!(ctx.display_name(), "u1");
    }

    #[test]
    fn empty_subject_is_rejected() {
        assert!(AuthContext::from_claims(&claims(" ", None, None)).is_err());
    }
}
