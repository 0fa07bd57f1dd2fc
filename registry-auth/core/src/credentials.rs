use crate::SECRET_NAME_SUFFIX;
use std::{fmt, sync::Arc};
use thiserror::Error;

/// A tenant's registry login as stored in its credentials secret.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

/// Reads a tenant's credentials from the backing resource store.
///
/// Implementations perform a single read per call. Caching and deadlines are
/// applied by the [`Validator`](crate::Validator).
#[async_trait::async_trait]
pub trait CredentialStore: Send + Sync {
    /// Reads the secret named `secret_name` from the namespace named after
    /// `tenant`.
    async fn fetch(&self, tenant: &str, secret_name: &str) -> Result<Credentials, StoreError>;
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("secret {namespace}/{name} not found")]
    NotFound { namespace: String, name: String },

    #[error("secret {namespace}/{name} missing '{field}' key")]
    MissingField {
        namespace: String,
        name: String,
        field: &'static str,
    },

    #[error("timed out reading secret {namespace}/{name}")]
    Timeout { namespace: String, name: String },

    #[error("failed to read secret {namespace}/{name}: {source}")]
    Unavailable {
        namespace: String,
        name: String,
        #[source]
        source: anyhow::Error,
    },
}

/// Returns the name of the secret holding `tenant`'s credentials.
pub fn secret_name(tenant: &str) -> String {
    format!("{tenant}{SECRET_NAME_SUFFIX}")
}

// === impl Credentials ===

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

// === impl CredentialStore ===

#[async_trait::async_trait]
impl<S: CredentialStore + ?Sized> CredentialStore for Arc<S> {
    async fn fetch(&self, tenant: &str, secret_name: &str) -> Result<Credentials, StoreError> {
        (**self).fetch(tenant, secret_name).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn secret_name_appends_suffix() {
        assert_eq!(secret_name("team-a"), "team-a-registry-credentials");
    }

    #[test]
    fn debug_redacts_password() {
        let creds = Credentials::new("team-a", "hunter2");
        let out = format!("{creds:?}");
        assert!(out.contains("team-a"));
        assert!(!out.contains("hunter2"), "{out}");
    }
}
