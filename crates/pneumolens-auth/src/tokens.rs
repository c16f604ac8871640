//! Opaque bearer tokens with server-side expiry.

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

use chrono::{DateTime, Duration, Utc};
use tracing::debug;

use crate::error::AuthError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    Access,
    Refresh,
}

#[derive(Debug, Clone)]
struct TokenInfo {
    username: String,
    kind: TokenKind,
    expires_at: DateTime<Utc>,
}

pub struct TokenIssuer {
    tokens: RwLock<HashMap<String, TokenInfo>>,
    access_ttl: Duration,
    refresh_ttl: Duration,
}

impl TokenIssuer {
    pub fn new(access_ttl: Duration, refresh_ttl: Duration) -> Self {
        Self {
            tokens: RwLock::new(HashMap::new()),
            access_ttl,
            refresh_ttl,
        }
    }

    pub fn issue(&self, username: &str, kind: TokenKind) -> String {
        let ttl = match kind {
            TokenKind::Access => self.access_ttl,
            TokenKind::Refresh => self.refresh_ttl,
        };
        let token = uuid::Uuid::new_v4().to_string();
        let now = Utc::now();
        let info = TokenInfo {
            username: username.to_string(),
            kind,
            expires_at: now + ttl,
        };

        let mut tokens = self.tokens.write().unwrap_or_else(PoisonError::into_inner);
        tokens.retain(|_, t| t.expires_at > now);
        tokens.insert(token.clone(), info);
        debug!(username, ?kind, "issued token");
        token
    }

    /// Owner of `token` if it exists, is of `kind`, and has not expired.
    pub fn validate(&self, token: &str, kind: TokenKind) -> Result<String, AuthError> {
        let tokens = self.tokens.read().unwrap_or_else(PoisonError::into_inner);
        match tokens.get(token) {
            Some(info) if info.kind == kind && Utc::now() < info.expires_at => {
                Ok(info.username.clone())
            }
            _ => Err(AuthError::InvalidToken),
        }
    }

    pub fn live_count(&self) -> usize {
        let now = Utc::now();
        self.tokens
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .filter(|t| t.expires_at > now)
            .count()
    }
}
