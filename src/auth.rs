//! Caller identities and the bearer-token table that resolves them.
//!
//! The job manager only understands [`Identity`]: who is calling and whether
//! they may see every job. How a token maps to an identity is decided here,
//! at the edge, and injected into the HTTP layer at startup.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Sees only the jobs it started.
    User,
    /// Sees every job.
    Admin,
}

/// The authenticated caller of a manager operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub user_id: String,
    pub role: Role,
}

impl Identity {
    pub fn user(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            role: Role::User,
        }
    }

    pub fn admin(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            role: Role::Admin,
        }
    }

    /// Whether this caller may act on a job owned by `owner`.
    pub fn can_access(&self, owner: &str) -> bool {
        self.role == Role::Admin || self.user_id == owner
    }
}

#[derive(Debug, thiserror::Error)]
pub enum TokenStoreError {
    #[error("Failed to read token file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Invalid token file {path}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("Duplicate token for user {0}")]
    DuplicateToken(String),
}

/// One entry of the JSON token file.
#[derive(Debug, Clone, Deserialize)]
struct TokenEntry {
    token: String,
    user_id: String,
    role: Role,
}

/// Static mapping from opaque bearer token to [`Identity`].
#[derive(Debug, Clone, Default)]
pub struct TokenStore {
    tokens: HashMap<String, Identity>,
}

impl TokenStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Tokens for local development and tests.
    pub fn development() -> Self {
        Self::new()
            .with_token("user1_token", Identity::user("user1"))
            .with_token("user2_token", Identity::user("user2"))
            .with_token("admin1_token", Identity::admin("admin1"))
    }

    pub fn with_token(mut self, token: impl Into<String>, identity: Identity) -> Self {
        self.tokens.insert(token.into(), identity);
        self
    }

    /// Load a token table from a JSON array of
    /// `{"token": ..., "user_id": ..., "role": "user" | "admin"}` objects.
    pub async fn load(path: &Path) -> Result<Self, TokenStoreError> {
        let data = tokio::fs::read(path)
            .await
            .map_err(|source| TokenStoreError::Read {
                path: path.to_path_buf(),
                source,
            })?;
        Self::from_json(&data).map_err(|e| match e {
            TokenStoreError::Parse { source, .. } => TokenStoreError::Parse {
                path: path.to_path_buf(),
                source,
            },
            other => other,
        })
    }

    fn from_json(data: &[u8]) -> Result<Self, TokenStoreError> {
        let entries: Vec<TokenEntry> =
            serde_json::from_slice(data).map_err(|source| TokenStoreError::Parse {
                path: PathBuf::new(),
                source,
            })?;

        let mut tokens = HashMap::with_capacity(entries.len());
        for entry in entries {
            let identity = Identity {
                user_id: entry.user_id,
                role: entry.role,
            };
            if tokens.insert(entry.token, identity.clone()).is_some() {
                return Err(TokenStoreError::DuplicateToken(identity.user_id));
            }
        }
        Ok(Self { tokens })
    }

    pub fn lookup(&self, token: &str) -> Option<&Identity> {
        self.tokens.get(token)
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }
}
