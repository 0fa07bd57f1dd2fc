//! An in-memory [`CredentialStore`] for tests.

use crate::{CredentialStore, Credentials, StoreError};
use ahash::AHashMap as HashMap;
use parking_lot::Mutex;
use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc,
};

/// Serves credentials from a map keyed by `(namespace, secret name)` and
/// counts every fetch.
#[derive(Clone, Debug, Default)]
pub struct MemoryStore {
    inner: Arc<Inner>,
}

#[derive(Debug, Default)]
struct Inner {
    secrets: Mutex<HashMap<(String, String), Credentials>>,
    mode: Mutex<Mode>,
    fetches: AtomicUsize,
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
enum Mode {
    #[default]
    Serve,
    Fail,
    Stall,
}

impl MemoryStore {
    /// Stores credentials under the conventional secret name for `tenant`.
    pub fn insert(&self, tenant: &str, credentials: Credentials) {
        self.inner
            .secrets
            .lock()
            .insert((tenant.to_string(), crate::secret_name(tenant)), credentials);
    }

    /// Makes every subsequent fetch fail as if the API server were
    /// unreachable.
    pub fn fail(&self) {
        *self.inner.mode.lock() = Mode::Fail;
    }

    /// Makes every subsequent fetch hang forever.
    pub fn stall(&self) {
        *self.inner.mode.lock() = Mode::Stall;
    }

    pub fn fetches(&self) -> usize {
        self.inner.fetches.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl CredentialStore for MemoryStore {
    async fn fetch(&self, tenant: &str, secret_name: &str) -> Result<Credentials, StoreError> {
        self.inner.fetches.fetch_add(1, Ordering::SeqCst);
        let mode = *self.inner.mode.lock();
        match mode {
            Mode::Serve => {}
            Mode::Fail => {
                return Err(StoreError::Unavailable {
                    namespace: tenant.to_string(),
                    name: secret_name.to_string(),
                    source: anyhow::anyhow!("connection refused"),
                })
            }
            Mode::Stall => std::future::pending::<()>().await,
        }

        self.inner
            .secrets
            .lock()
            .get(&(tenant.to_string(), secret_name.to_string()))
            .cloned()
            .ok_or_else(|| StoreError::NotFound {
                namespace: tenant.to_string(),
                name: secret_name.to_string(),
            })
    }
}
