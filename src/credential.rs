use std::fmt;

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::model::UserId;

/// Caller identity passed explicitly into every service call. Nothing in the
/// crate caches one.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential {
    pub user_id: UserId,
    token: String,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CredentialError {
    #[error("credential for user {user} expired at {expired_at}")]
    Expired {
        user: UserId,
        expired_at: DateTime<Utc>,
    },
}

impl Credential {
    pub fn new(
        user_id: UserId,
        token: impl Into<String>,
        issued_at: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    ) -> Self {
        Self {
            user_id,
            token: token.into(),
            issued_at,
            expires_at,
        }
    }

    /// Opaque bearer token, for the persistence collaborator.
    pub fn token(&self) -> &str {
        &self.token
    }

    pub fn validate(&self, now: DateTime<Utc>) -> Result<(), CredentialError> {
        if now >= self.expires_at {
            return Err(CredentialError::Expired {
                user: self.user_id,
                expired_at: self.expires_at,
            });
        }
        Ok(())
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("user_id", &self.user_id)
            .field("token", &"<redacted>")
            .field("issued_at", &self.issued_at)
            .field("expires_at", &self.expires_at)
            .finish()
    }
}
