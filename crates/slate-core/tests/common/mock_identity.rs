//! In-memory identity provider and ID token verifier

use std::sync::Arc;

use async_trait::async_trait;
use dashmap::{DashMap, DashSet};
use slate_core::{
    IdentityError, IdentityProvider, IdentityTokenVerifier, IdentityUser, VerifiedIdentity,
};

/// Identity provider keyed by UID
#[derive(Default, Clone)]
pub struct MockIdentityProvider {
    users: Arc<DashMap<String, IdentityUser>>,
    failing: Arc<DashSet<&'static str>>,
    /// UIDs whose deletion reports success but leaves the user in place
    sticky: Arc<DashSet<String>>,
}

impl MockIdentityProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_user(&self, uid: &str, email: &str) {
        self.users.insert(
            uid.to_string(),
            IdentityUser {
                uid: uid.to_string(),
                email: Some(email.to_string()),
                disabled: false,
            },
        );
    }

    pub fn contains(&self, uid: &str) -> bool {
        self.users.contains_key(uid)
    }

    /// Make `op` (`lookup` or `delete`) fail as if the provider were down
    pub fn fail(&self, op: &'static str) {
        self.failing.insert(op);
    }

    pub fn heal(&self, op: &'static str) {
        self.failing.remove(op);
    }

    /// Remove a user without going through the provider API
    #[allow(dead_code)]
    pub fn delete_user_for_test(&self, uid: &str) {
        self.users.remove(uid);
    }

    #[allow(dead_code)]
    pub fn make_sticky(&self, uid: &str) {
        self.sticky.insert(uid.to_string());
    }

    fn check(&self, op: &'static str) -> Result<(), IdentityError> {
        if self.failing.contains(op) {
            return Err(IdentityError::Unavailable("connection refused".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl IdentityProvider for MockIdentityProvider {
    async fn get_user_by_identifier(&self, uid: &str) -> Result<IdentityUser, IdentityError> {
        self.check("lookup")?;
        self.users
            .get(uid)
            .map(|u| u.value().clone())
            .ok_or(IdentityError::NotFound)
    }

    async fn get_user_by_contact(&self, email: &str) -> Result<IdentityUser, IdentityError> {
        self.check("lookup")?;
        self.users
            .iter()
            .find(|u| u.email.as_deref() == Some(email))
            .map(|u| u.value().clone())
            .ok_or(IdentityError::NotFound)
    }

    async fn delete_user(&self, uid: &str) -> Result<(), IdentityError> {
        self.check("delete")?;
        if self.sticky.contains(uid) {
            return Ok(());
        }
        self.users
            .remove(uid)
            .map(|_| ())
            .ok_or(IdentityError::NotFound)
    }
}

/// Verifier that accepts the tokens it was told about
#[derive(Default, Clone)]
pub struct MockTokenVerifier {
    tokens: Arc<DashMap<String, VerifiedIdentity>>,
}

impl MockTokenVerifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `token` as asserting `uid` / `email`
    pub fn accept(&self, token: &str, uid: &str, email: &str) {
        self.tokens.insert(
            token.to_string(),
            VerifiedIdentity {
                uid: uid.to_string(),
                email: email.to_string(),
                email_verified: true,
            },
        );
    }
}

#[async_trait]
impl IdentityTokenVerifier for MockTokenVerifier {
    async fn verify_id_token(&self, id_token: &str) -> Result<VerifiedIdentity, IdentityError> {
        match id_token {
            "expired" => Err(IdentityError::TokenExpired),
            other => self
                .tokens
                .get(other)
                .map(|v| v.value().clone())
                .ok_or(IdentityError::InvalidToken),
        }
    }
}
