use crate::error::{AuthError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Reference to the account a user holds on one service.
///
/// # Examples
///
/// ```
/// use core_auth::UserServiceRef;
///
/// let reference = UserServiceRef::new("user-42", "spotify").unwrap();
/// assert_eq!(reference.to_string(), "user-42@spotify");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UserServiceRef {
    /// Identifier of the user inside this system
    pub user_id: String,
    /// Registry name of the service
    pub service: String,
}

impl UserServiceRef {
    /// Create a reference, rejecting empty components
    pub fn new(user_id: impl Into<String>, service: impl Into<String>) -> Result<Self> {
        let user_id = user_id.into();
        let service = service.into();

        if user_id.trim().is_empty() {
            return Err(AuthError::InvalidReference("user id is empty".to_string()));
        }
        if service.trim().is_empty() {
            return Err(AuthError::InvalidReference("service is empty".to_string()));
        }

        Ok(Self { user_id, service })
    }
}

impl fmt::Display for UserServiceRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.user_id, self.service)
    }
}

/// OAuth 2.0 token set.
///
/// # Security
///
/// Tokens should be stored securely and never logged. The `Debug` implementation
/// redacts sensitive information.
///
/// # Examples
///
/// ```
/// use core_auth::OAuthTokens;
/// use chrono::{Duration, Utc};
///
/// let tokens = OAuthTokens {
///     access_token: "ya29.a0...".to_string(),
///     refresh_token: Some("1//0g...".to_string()),
///     expires_at: Utc::now() + Duration::hours(1),
/// };
///
/// assert!(!tokens.is_expired());
/// ```
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OAuthTokens {
    /// The access token used for API requests
    pub access_token: String,
    /// The refresh token, when the provider issues one
    pub refresh_token: Option<String>,
    /// When the access token expires (UTC)
    pub expires_at: chrono::DateTime<chrono::Utc>,
}

impl OAuthTokens {
    /// Create a new token set expiring `expires_in` seconds from now
    pub fn new(access_token: String, refresh_token: Option<String>, expires_in: i64) -> Self {
        Self {
            access_token,
            refresh_token,
            expires_at: chrono::Utc::now() + chrono::Duration::seconds(expires_in),
        }
    }

    /// Check if the access token is expired or will expire within 5 minutes
    pub fn is_expired(&self) -> bool {
        self.is_expired_with_buffer(300)
    }

    /// Check if the access token is expired with a custom buffer
    pub fn is_expired_with_buffer(&self, buffer_seconds: i64) -> bool {
        let now = chrono::Utc::now();
        let buffer = chrono::Duration::seconds(buffer_seconds);
        now >= self.expires_at - buffer
    }

    /// Get the time remaining until token expiration
    ///
    /// Returns `None` if the token is already expired.
    pub fn time_until_expiry(&self) -> Option<chrono::Duration> {
        let now = chrono::Utc::now();
        if now >= self.expires_at {
            None
        } else {
            Some(self.expires_at - now)
        }
    }
}

// Custom Debug implementation to avoid logging tokens
impl fmt::Debug for OAuthTokens {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OAuthTokens")
            .field("access_token", &"[REDACTED]")
            .field(
                "refresh_token",
                &self.refresh_token.as_ref().map(|_| "[REDACTED]"),
            )
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};

    #[test]
    fn test_user_service_ref_rejects_empty() {
        assert!(UserServiceRef::new("", "spotify").is_err());
        assert!(UserServiceRef::new("user", "  ").is_err());
        assert!(UserServiceRef::new("user", "spotify").is_ok());
    }

    #[test]
    fn test_tokens_debug_redacts() {
        let tokens = OAuthTokens::new("secret-access".into(), Some("secret-refresh".into()), 3600);
        let debug = format!("{:?}", tokens);
        assert!(!debug.contains("secret-access"));
        assert!(!debug.contains("secret-refresh"));
        assert!(debug.contains("[REDACTED]"));
    }

    #[test]
    fn test_expiry_buffer() {
        let tokens = OAuthTokens {
            access_token: "a".into(),
            refresh_token: None,
            expires_at: Utc::now() + Duration::minutes(2),
        };
        assert!(tokens.is_expired());
        assert!(!tokens.is_expired_with_buffer(30));
        assert!(tokens.time_until_expiry().is_some());
    }

    #[test]
    fn test_expired_token_has_no_time_left() {
        let tokens = OAuthTokens {
            access_token: "a".into(),
            refresh_token: None,
            expires_at: Utc::now() - Duration::minutes(1),
        };
        assert!(tokens.time_until_expiry().is_none());
    }

    #[test]
    fn test_tokens_serde() {
        let tokens = OAuthTokens::new("a".into(), None, 60);
        let json = serde_json::to_string(&tokens).unwrap();
        let back: OAuthTokens = serde_json::from_str(&json).unwrap();
        assert_eq!(back, tokens);
    }
}
