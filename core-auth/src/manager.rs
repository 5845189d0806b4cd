//! # OAuth Capability
//!
//! [`OAuthManager`] is the seam between the sync engine and whatever owns
//! token exchange, refresh and encryption. [`TokenVault`] keeps tokens in
//! memory behind a `RwLock`.

use crate::error::{AuthError, Result};
use crate::types::{OAuthTokens, UserServiceRef};
use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

/// Resolves the tokens a user holds on a service.
#[async_trait]
pub trait OAuthManager: Send + Sync {
    /// Returns valid tokens for the referenced account.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::NotAuthenticated`] when no tokens exist and
    /// [`AuthError::TokenExpired`] when they can no longer be used.
    async fn get_user_tokens(&self, user_ref: &UserServiceRef) -> Result<OAuthTokens>;
}

/// In-memory token vault.
#[derive(Default)]
pub struct TokenVault {
    tokens: RwLock<HashMap<UserServiceRef, OAuthTokens>>,
}

impl TokenVault {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store tokens, replacing any previous set for the same account
    pub async fn store_tokens(&self, user_ref: UserServiceRef, tokens: OAuthTokens) {
        info!(account = %user_ref, expires_at = %tokens.expires_at, "Storing tokens");
        self.tokens.write().await.insert(user_ref, tokens);
    }

    /// Remove tokens, returning whether any were stored
    pub async fn remove_tokens(&self, user_ref: &UserServiceRef) -> bool {
        let removed = self.tokens.write().await.remove(user_ref).is_some();
        debug!(account = %user_ref, removed, "Removed tokens");
        removed
    }

    /// Number of accounts with stored tokens
    pub async fn len(&self) -> usize {
        self.tokens.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.tokens.read().await.is_empty()
    }
}

#[async_trait]
impl OAuthManager for TokenVault {
    async fn get_user_tokens(&self, user_ref: &UserServiceRef) -> Result<OAuthTokens> {
        let tokens = self.tokens.read().await.get(user_ref).cloned().ok_or_else(|| {
            AuthError::NotAuthenticated {
                user_id: user_ref.user_id.clone(),
                service: user_ref.service.clone(),
            }
        })?;

        // No refresh flow here, so only hard expiry matters
        if tokens.is_expired_with_buffer(0) {
            warn!(account = %user_ref, "Stored tokens are expired");
            return Err(AuthError::TokenExpired {
                user_id: user_ref.user_id.clone(),
                service: user_ref.service.clone(),
            });
        }

        Ok(tokens)
    }
}
