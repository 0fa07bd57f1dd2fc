#![deny(rust_2018_idioms)]
#![forbid(unsafe_code)]

//! Issues RS256-signed registry access tokens.
//!
//! Tokens follow the Docker registry token authentication format: standard
//! registered claims plus an `access` array describing the repositories and
//! actions granted. The registry verifies them offline against a published
//! key set, looking the signing key up by the `kid` header, so every token
//! carries the configured key id.

mod key;
#[cfg(test)]
mod tests;

pub use self::key::KeyError;

use chrono::{DateTime, TimeDelta, Utc};
use jsonwebtoken::{Algorithm, Header};
use registry_auth_core::AccessGrant;
use serde::{Deserialize, Serialize};
use std::{path::Path, time::Duration};
use thiserror::Error;

pub const DEFAULT_KEY_ID: &str = "registry-auth-jwt-signer";

#[derive(Clone, Debug)]
pub struct Config {
    /// Value of the `iss` claim.
    pub issuer: String,

    /// Value of the `kid` header. Must match an entry in the key set the
    /// registry trusts.
    pub key_id: String,

    /// Lifetime of issued tokens.
    pub expiration: Duration,
}

pub struct TokenGenerator {
    key: key::SigningKey,
    header: Header,
    issuer: String,
    expiration: TimeDelta,
}

/// The payload of an issued token.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    pub iss: String,
    pub sub: String,
    pub aud: Vec<String>,
    pub exp: i64,
    pub iat: i64,
    pub jti: String,
    pub access: Vec<AccessGrant>,
}

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Key(#[from] KeyError),

    #[error("token expiration {0:?} is out of range")]
    Expiration(Duration),
}

#[derive(Debug, Error)]
#[error("failed to sign token: {0}")]
pub struct SigningError(#[from] jsonwebtoken::errors::Error);

// === impl TokenGenerator ===

impl TokenGenerator {
    /// Loads the signing key from a PEM file.
    pub fn from_file(path: impl AsRef<Path>, config: Config) -> Result<Self, Error> {
        let key = key::SigningKey::from_file(path.as_ref())?;
        Self::new(key, config)
    }

    pub fn from_pem(pem: &str, config: Config) -> Result<Self, Error> {
        let key = key::SigningKey::from_pem(pem)?;
        Self::new(key, config)
    }

    fn new(key: key::SigningKey, config: Config) -> Result<Self, Error> {
        let Config {
            issuer,
            key_id,
            expiration,
        } = config;
        let expiration = match TimeDelta::from_std(expiration) {
            Ok(exp) if exp > TimeDelta::zero() => exp,
            _ => return Err(Error::Expiration(expiration)),
        };

        let mut header = Header::new(Algorithm::RS256);
        header.kid = Some(key_id);

        Ok(Self {
            key,
            header,
            issuer,
            expiration,
        })
    }

    pub fn key_id(&self) -> Option<&str> {
        self.header.kid.as_deref()
    }

    /// The public half of the signing key as a SPKI PEM document.
    pub fn public_key_pem(&self) -> Result<String, KeyError> {
        self.key.public_key_pem()
    }

    /// Signs a token for `subject`, valid for `audience`, granting `access`.
    ///
    /// Returns the compact token and the instant it expires.
    pub fn issue(
        &self,
        subject: &str,
        audience: &str,
        access: Vec<AccessGrant>,
    ) -> Result<(String, DateTime<Utc>), SigningError> {
        let now = Utc::now();
        let expires_at = now + self.expiration;
        let claims = Claims {
            iss: self.issuer.clone(),
            sub: subject.to_string(),
            aud: vec![audience.to_string()],
            exp: expires_at.timestamp(),
            iat: now.timestamp(),
            jti: uuid::Uuid::new_v4().to_string(),
            access,
        };
        let token = jsonwebtoken::encode(&self.header, &claims, &self.key.encoding)?;
        tracing::trace!(jti = %claims.jti, sub = %claims.sub, "Signed token");
        Ok((token, expires_at))
    }
}
