#![deny(rust_2018_idioms)]
#![forbid(unsafe_code)]

pub use k8s_openapi::{api::core::v1::Secret, ByteString};
pub use kube::Client;

use kube::Api;
use registry_auth_core::{CredentialStore, Credentials, StoreError};
use tracing::trace;

pub const USERNAME_KEY: &str = "username";
pub const PASSWORD_KEY: &str = "password";

/// Reads tenant credentials from Kubernetes secrets.
///
/// A tenant's secret lives in the namespace named after the tenant.
#[derive(Clone)]
pub struct SecretStore {
    client: Client,
}

// === impl SecretStore ===

impl SecretStore {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait::async_trait]
impl CredentialStore for SecretStore {
    async fn fetch(&self, tenant: &str, secret_name: &str) -> Result<Credentials, StoreError> {
        let api = Api::<Secret>::namespaced(self.client.clone(), tenant);
        trace!(namespace = %tenant, name = %secret_name, "Reading credentials secret");
        let secret = api
            .get_opt(secret_name)
            .await
            .map_err(|error| StoreError::Unavailable {
                namespace: tenant.to_string(),
                name: secret_name.to_string(),
                source: error.into(),
            })?
            .ok_or_else(|| StoreError::NotFound {
                namespace: tenant.to_string(),
                name: secret_name.to_string(),
            })?;
        credentials_from_secret(tenant, secret_name, &secret)
    }
}

/// Extracts non-empty UTF-8 `username` and `password` fields from a
/// secret's data.
fn credentials_from_secret(
    namespace: &str,
    name: &str,
    secret: &Secret,
) -> Result<Credentials, StoreError> {
    let field = |key: &'static str| {
        secret
            .data
            .as_ref()
            .and_then(|data| data.get(key))
            .and_then(|ByteString(bytes)| std::str::from_utf8(bytes).ok())
            .filter(|value| !value.is_empty())
            .map(str::to_string)
            .ok_or_else(|| StoreError::MissingField {
                namespace: namespace.to_string(),
                name: name.to_string(),
                field: key,
            })
    };

    Ok(Credentials {
        username: field(USERNAME_KEY)?,
        password: field(PASSWORD_KEY)?,
    })
}
