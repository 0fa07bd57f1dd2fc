use rsa::{
    pkcs1::{DecodeRsaPrivateKey, EncodeRsaPrivateKey},
    pkcs8::{DecodePrivateKey, EncodePublicKey, LineEnding},
    RsaPrivateKey, RsaPublicKey,
};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// An RSA signing key in the forms needed to sign and to publish.
pub(crate) struct SigningKey {
    pub(crate) encoding: jsonwebtoken::EncodingKey,
    pub(crate) public: RsaPublicKey,
}

#[derive(Debug, Error)]
pub enum KeyError {
    #[error("failed to read private key {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("private key is neither a PKCS#8 nor a PKCS#1 PEM encoded RSA key: {0}")]
    Parse(#[source] rsa::pkcs8::Error),

    #[error("failed to re-encode private key: {0}")]
    Encode(#[source] rsa::pkcs1::Error),

    #[error("failed to encode public key: {0}")]
    Public(#[source] rsa::pkcs8::spki::Error),
}

impl SigningKey {
    pub(crate) fn from_file(path: &Path) -> Result<Self, KeyError> {
        let pem = std::fs::read_to_string(path).map_err(|source| KeyError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_pem(&pem)
    }

    /// Parses a PEM encoded RSA private key, trying PKCS#8 before PKCS#1.
    pub(crate) fn from_pem(pem: &str) -> Result<Self, KeyError> {
        let key = match RsaPrivateKey::from_pkcs8_pem(pem) {
            Ok(key) => key,
            Err(error) => RsaPrivateKey::from_pkcs1_pem(pem).map_err(|_| KeyError::Parse(error))?,
        };
        let der = key.to_pkcs1_der().map_err(KeyError::Encode)?;
        Ok(Self {
            encoding: jsonwebtoken::EncodingKey::from_rsa_der(der.as_bytes()),
            public: RsaPublicKey::from(&key),
        })
    }

    pub(crate) fn public_key_pem(&self) -> Result<String, KeyError> {
        self.public
            .to_public_key_pem(LineEnding::LF)
            .map_err(KeyError::Public)
    }
}
