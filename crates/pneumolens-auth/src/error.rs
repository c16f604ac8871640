use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum AuthError {
    #[error("{0}")]
    Validation(String),

    #[error("A user with that username already exists.")]
    DuplicateUser(String),

    #[error("No active account found with the given credentials.")]
    InvalidCredentials,

    #[error("Token is invalid or expired.")]
    InvalidToken,

    #[error("password hashing failed")]
    Hashing,
}
