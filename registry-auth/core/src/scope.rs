use crate::REPOSITORY;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// One entry of a token's `access` claim.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessGrant {
    #[serde(rename = "type")]
    pub kind: String,
    pub name: String,
    pub actions: Vec<String>,
}

/// A parsed `repository:<name>:<actions>` scope.
///
/// The repository name is always qualified by a tenant, i.e. its first path
/// segment is non-empty.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Scope {
    repository: String,
    tenant_len: usize,
    actions: Vec<String>,
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ScopeError {
    #[error("scope must have the form repository:<name>:<actions>")]
    Malformed,

    #[error("unsupported resource type {0:?}")]
    UnsupportedType(String),

    #[error("scope does not list any actions")]
    NoActions,

    #[error("repository {0:?} is not qualified by a tenant")]
    MissingTenant(String),
}

// === impl Scope ===

impl std::str::FromStr for Scope {
    type Err = ScopeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.split(':');
        let (Some(kind), Some(repository), Some(actions), None) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return Err(ScopeError::Malformed);
        };

        if kind != REPOSITORY {
            return Err(ScopeError::UnsupportedType(kind.to_string()));
        }

        let tenant_len = match repository.split_once('/') {
            Some((tenant, _)) if !tenant.is_empty() => tenant.len(),
            _ => return Err(ScopeError::MissingTenant(repository.to_string())),
        };

        let actions = actions
            .split(',')
            .filter(|a| !a.is_empty())
            .map(ToString::to_string)
            .collect::<Vec<_>>();
        if actions.is_empty() {
            return Err(ScopeError::NoActions);
        }

        Ok(Self {
            repository: repository.to_string(),
            tenant_len,
            actions,
        })
    }
}

impl Scope {
    pub fn repository(&self) -> &str {
        &self.repository
    }

    /// The first path segment of the repository name.
    pub fn tenant(&self) -> &str {
        &self.repository[..self.tenant_len]
    }

    pub fn actions(&self) -> &[String] {
        &self.actions
    }

    pub fn into_grant(self) -> AccessGrant {
        AccessGrant {
            kind: REPOSITORY.to_string(),
            name: self.repository,
            actions: self.actions,
        }
    }
}
