//! In-memory user accounts.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use ring::rand::SystemRandom;
use tracing::info;

use crate::error::AuthError;
use crate::password::PasswordHash;

pub struct UserStore {
    users: RwLock<HashMap<String, Arc<PasswordHash>>>,
    iterations: u32,
    rng: SystemRandom,
}

impl UserStore {
    pub fn new(iterations: u32) -> Self {
        Self {
            users: RwLock::new(HashMap::new()),
            iterations,
            rng: SystemRandom::new(),
        }
    }

    /// Register a new account. Fails without touching the store when the
    /// name is taken.
    pub fn create(&self, username: &str, password: &str) -> Result<(), AuthError> {
        if username.trim().is_empty() {
            return Err(AuthError::Validation("username is required".into()));
        }
        if password.is_empty() {
            return Err(AuthError::Validation("password is required".into()));
        }
        if self.contains(username) {
            return Err(AuthError::DuplicateUser(username.to_string()));
        }

        // Hash outside the write lock.
        let hash = PasswordHash::derive(password, self.iterations, &self.rng)?;

        let mut users = self.users.write().unwrap_or_else(PoisonError::into_inner);
        if users.contains_key(username) {
            return Err(AuthError::DuplicateUser(username.to_string()));
        }
        users.insert(username.to_string(), Arc::new(hash));
        info!(username, "created user");
        Ok(())
    }

    /// The read lock is released before the PBKDF2 check runs.
    pub fn verify(&self, username: &str, password: &str) -> Result<(), AuthError> {
        match self.lookup(username) {
            Some(hash) if hash.verify(password) => Ok(()),
            _ => Err(AuthError::InvalidCredentials),
        }
    }

    fn lookup(&self, username: &str) -> Option<Arc<PasswordHash>> {
        self.users
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(username)
            .cloned()
    }

    pub fn contains(&self, username: &str) -> bool {
        self.users
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(username)
    }

    pub fn len(&self) -> usize {
        self.users
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
