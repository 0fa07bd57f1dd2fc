#![deny(rust_2018_idioms)]
#![forbid(unsafe_code)]

pub mod cache;
mod compare;
pub mod credentials;
pub mod scope;
#[cfg(any(test, feature = "test-util"))]
pub mod testutil;
pub mod validator;

pub use self::{
    cache::{CacheMetrics, CredentialCache},
    compare::constant_time_eq,
    credentials::{secret_name, CredentialStore, Credentials, StoreError},
    scope::{AccessGrant, Scope, ScopeError},
    validator::Validator,
};

/// Suffix appended to a tenant name to form the name of its credentials
/// secret.
pub const SECRET_NAME_SUFFIX: &str = "-registry-credentials";

/// The only resource type this service grants access to.
pub const REPOSITORY: &str = "repository";
