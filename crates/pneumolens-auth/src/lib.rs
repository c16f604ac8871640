//! Accounts and bearer tokens: PBKDF2 user store, access/refresh token pairs.

mod error;
pub mod password;
pub mod tokens;
pub mod users;

pub use error::AuthError;
pub use tokens::{TokenIssuer, TokenKind};
pub use users::UserStore;

use chrono::Duration;
use serde::Serialize;

#[derive(Debug, Clone)]
pub struct AuthConfig {
    pub access_ttl: Duration,
    pub refresh_ttl: Duration,
    pub pbkdf2_iterations: u32,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            access_ttl: Duration::minutes(5),
            refresh_ttl: Duration::days(1),
            pbkdf2_iterations: password::DEFAULT_ITERATIONS,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct TokenPair {
    pub access: String,
    pub refresh: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct AccessToken {
    pub access: String,
}

pub struct AuthService {
    users: UserStore,
    tokens: TokenIssuer,
}

impl AuthService {
    pub fn new(config: &AuthConfig) -> Self {
        Self {
            users: UserStore::new(config.pbkdf2_iterations),
            tokens: TokenIssuer::new(config.access_ttl, config.refresh_ttl),
        }
    }

    pub fn create_user(&self, username: &str, password: &str) -> Result<(), AuthError> {
        self.users.create(username, password)
    }

    pub fn issue_tokens(&self, username: &str, password: &str) -> Result<TokenPair, AuthError> {
        self.users.verify(username, password)?;
        Ok(TokenPair {
            access: self.tokens.issue(username, TokenKind::Access),
            refresh: self.tokens.issue(username, TokenKind::Refresh),
        })
    }

    pub fn refresh(&self, refresh_token: &str) -> Result<AccessToken, AuthError> {
        let username = self.tokens.validate(refresh_token, TokenKind::Refresh)?;
        Ok(AccessToken {
            access: self.tokens.issue(&username, TokenKind::Access),
        })
    }

    /// Username owning a live access token.
    pub fn authenticate(&self, access_token: &str) -> Result<String, AuthError> {
        self.tokens.validate(access_token, TokenKind::Access)
    }

    pub fn users(&self) -> &UserStore {
        &self.users
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn service() -> AuthService {
        AuthService::new(&AuthConfig {
            pbkdf2_iterations: 1_000,
            ..AuthConfig::default()
        })
    }

    #[test]
    fn default_config() {
        let c = AuthConfig::default();
        assert_eq!(c.access_ttl, Duration::minutes(5));
        assert_eq!(c.refresh_ttl, Duration::days(1));
        assert_eq!(c.pbkdf2_iterations, 100_000);
    }

    #[test]
    fn full_token_flow() {
        let auth = service();
        auth.create_user("alice", "pw").unwrap();
        let pair = auth.issue_tokens("alice", "pw").unwrap();
        assert_eq!(auth.authenticate(&pair.access).unwrap(), "alice");

        let fresh = auth.refresh(&pair.refresh).unwrap();
        assert_ne!(fresh.access, pair.access);
        assert_eq!(auth.authenticate(&fresh.access).unwrap(), "alice");
    }

    #[test]
    fn bad_password_rejected() {
        let auth = service();
        auth.create_user("alice", "pw").unwrap();
        assert_eq!(
            auth.issue_tokens("alice", "wrong").unwrap_err(),
            AuthError::InvalidCredentials
        );
    }

    #[test]
    fn access_token_cannot_refresh() {
        let auth = service();
        auth.create_user("alice", "pw").unwrap();
        let pair = auth.issue_tokens("alice", "pw").unwrap();
        assert_eq!(auth.refresh(&pair.access).unwrap_err(), AuthError::InvalidToken);
        assert_eq!(
            auth.authenticate(&pair.refresh).unwrap_err(),
            AuthError::InvalidToken
        );
    }

    #[test]
    fn token_pair_json_shape() {
        let pair = TokenPair {
            access: "a".into(),
            refresh: "r".into(),
        };
        assert_eq!(
            serde_json::to_string(&pair).unwrap(),
            r#"{"access":"a","refresh":"r"}"#
        );
    }
}
