use crate::{
    constant_time_eq, secret_name, CredentialCache, CredentialStore, Credentials, StoreError,
};
use std::sync::Arc;
use tokio::time::{self, Duration};
use tracing::{debug, info, warn};

/// Decides whether a tenant/username/password triple is valid.
///
/// Every failure, including an unreachable store, is reported as `false` so
/// that callers cannot distinguish a wrong password from a tenant without
/// credentials.
#[derive(Debug)]
pub struct Validator<S> {
    store: S,
    cache: Arc<CredentialCache>,
    fetch_timeout: Duration,
}

impl<S: CredentialStore> Validator<S> {
    pub fn new(store: S, cache: Arc<CredentialCache>, fetch_timeout: Duration) -> Self {
        Self {
            store,
            cache,
            fetch_timeout,
        }
    }

    pub fn cache(&self) -> &Arc<CredentialCache> {
        &self.cache
    }

    pub async fn validate(&self, tenant: &str, username: &str, password: &str) -> bool {
        if let Some(cached) = self.cache.get(tenant) {
            if credentials_match(&cached, username, password) {
                self.cache.metrics().hit();
                debug!(%tenant, "Credentials matched cache");
                return true;
            }
        }
        // A stale or mismatched entry counts as a miss, since the store is
        // consulted either way.
        self.cache.metrics().miss();

        let name = secret_name(tenant);
        let fetched = match time::timeout(self.fetch_timeout, self.store.fetch(tenant, &name)).await
        {
            Ok(res) => res,
            Err(_) => Err(StoreError::Timeout {
                namespace: tenant.to_string(),
                name: name.clone(),
            }),
        };
        let stored = match fetched {
            Ok(stored) => stored,
            Err(error @ (StoreError::NotFound { .. } | StoreError::MissingField { .. })) => {
                info!(%tenant, %error, "No usable credentials secret");
                return false;
            }
            Err(error) => {
                warn!(%tenant, %error, "Failed to fetch credentials secret");
                return false;
            }
        };

        if stored.username != username {
            info!(%tenant, "Username does not match credentials secret");
            return false;
        }
        if !constant_time_eq(stored.password.as_bytes(), password.as_bytes()) {
            info!(%tenant, "Password does not match credentials secret");
            return false;
        }

        // Cache what the store returned, never what the client sent.
        self.cache.set(tenant, stored);
        info!(%tenant, "Validated credentials");
        true
    }
}

fn credentials_match(expected: &Credentials, username: &str, password: &str) -> bool {
    // Both comparisons always run.
    let user_ok = expected.username == username;
    let pass_ok = constant_time_eq(expected.password.as_bytes(), password.as_bytes());
    user_ok & pass_ok
}
