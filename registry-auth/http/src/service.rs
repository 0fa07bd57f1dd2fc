use crate::{basic, metrics::RequestMetrics, Body};
use chrono::{SecondsFormat, Utc};
use futures::future;
use http::{header, HeaderValue, Method, Request, Response, StatusCode};
use registry_auth_core::{AccessGrant, CredentialStore, Scope, ScopeError, Validator};
use registry_auth_token::{SigningError, TokenGenerator};
use serde::{Deserialize, Serialize};
use std::{
    convert::Infallible,
    sync::Arc,
    task::{Context, Poll},
};
use thiserror::Error;
use tokio::time;
use tracing::{debug, error, info, trace};

/// Serves `GET /auth` token requests and `GET /healthz` health checks.
pub struct TokenService<S> {
    inner: Arc<Inner<S>>,
}

struct Inner<S> {
    validator: Validator<S>,
    tokens: TokenGenerator,
    service: String,
    metrics: RequestMetrics,
}

/// The body of a successful token response.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenResponse {
    pub token: String,
    pub access_token: String,
    pub expires_in: i64,
    pub issued_at: String,
}

/// Why a token request was refused.
#[derive(Debug, Error)]
pub enum Error {
    #[error("missing or malformed basic credentials")]
    Unauthenticated,

    #[error("missing scope")]
    MissingScope,

    #[error("invalid scope: {0}")]
    Scope(#[from] ScopeError),

    #[error("invalid credentials for tenant {tenant}")]
    Unauthorized { tenant: String },

    #[error(transparent)]
    Signing(#[from] SigningError),

    #[error("failed to encode token response: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, Default)]
struct Query {
    service: Option<String>,
    account: Option<String>,
    scopes: Vec<String>,
}

// === impl TokenService ===

impl<S> Clone for TokenService<S> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<S: CredentialStore> TokenService<S> {
    /// Creates a service that issues tokens for the registry named `service`.
    pub fn new(
        validator: Validator<S>,
        tokens: TokenGenerator,
        service: impl Into<String>,
        metrics: RequestMetrics,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                validator,
                tokens,
                service: service.into(),
                metrics,
            }),
        }
    }

    async fn authorize(&self, req: &http::request::Parts) -> Result<TokenResponse, Error> {
        let query = Query::parse(req.uri.query());
        debug!(
            service = query.service.as_deref().unwrap_or_default(),
            account = query.account.as_deref().unwrap_or_default(),
            scope = ?query.scopes,
            "Token request",
        );

        let credentials = basic::credentials(&req.headers).ok_or(Error::Unauthenticated)?;
        let (tenant, grants) = grants(&query.scopes)?;

        if !self
            .inner
            .validator
            .validate(&tenant, &credentials.username, &credentials.password)
            .await
        {
            return Err(Error::Unauthorized { tenant });
        }

        let (token, expires_at) =
            self.inner
                .tokens
                .issue(&credentials.username, &self.inner.service, grants)?;
        info!(%tenant, username = %credentials.username, "Issued token");

        let now = Utc::now();
        Ok(TokenResponse {
            access_token: token.clone(),
            token,
            expires_in: (expires_at - now).num_seconds(),
            issued_at: now.to_rfc3339_opts(SecondsFormat::Secs, true),
        })
    }
}

impl<S, B> tower::Service<Request<B>> for TokenService<S>
where
    S: CredentialStore + 'static,
{
    type Response = Response<Body>;
    type Error = Infallible;
    type Future = future::BoxFuture<'static, Result<Response<Body>, Infallible>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Infallible>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: Request<B>) -> Self::Future {
        trace!(method = %req.method(), uri = %req.uri());
        let get = req.method() == Method::GET || req.method() == Method::HEAD;
        match req.uri().path() {
            "/healthz" if get => return Box::pin(future::ok(text(StatusCode::OK, "ok"))),
            "/auth" if req.method() == Method::GET => {}
            "/healthz" | "/auth" => {
                return Box::pin(future::ok(text(
                    StatusCode::METHOD_NOT_ALLOWED,
                    "method not allowed",
                )))
            }
            _ => return Box::pin(future::ok(text(StatusCode::NOT_FOUND, "not found"))),
        }

        // Token requests carry no body.
        let (parts, _) = req.into_parts();
        let svc = self.clone();
        Box::pin(async move {
            let start = time::Instant::now();
            let rsp = match svc.authorize(&parts).await.and_then(|t| json(&t)) {
                Ok(rsp) => {
                    svc.inner.metrics.observe("issued", start);
                    rsp
                }
                Err(error) => {
                    error.log();
                    svc.inner.metrics.observe(error.outcome(), start);
                    text(error.status(), error.body())
                }
            };
            Ok(rsp)
        })
    }
}

/// Parses every requested scope and returns the tenant named by the first
/// along with the grants on that tenant's repositories.
///
/// Scopes on other tenants are dropped; a single-scope request always yields
/// exactly one grant.
fn grants(scopes: &[String]) -> Result<(String, Vec<AccessGrant>), Error> {
    let (first, rest) = match scopes.split_first() {
        Some((first, rest)) if !first.is_empty() => (first, rest),
        _ => return Err(Error::MissingScope),
    };

    let first = first.parse::<Scope>()?;
    let tenant = first.tenant().to_string();
    let mut grants = vec![first.into_grant()];
    for scope in rest {
        let scope = scope.parse::<Scope>()?;
        if scope.tenant() == tenant {
            grants.push(scope.into_grant());
        } else {
            info!(%tenant, repository = %scope.repository(), "Dropping scope on another tenant");
        }
    }
    Ok((tenant, grants))
}

fn json(rsp: &TokenResponse) -> Result<Response<Body>, Error> {
    let body = serde_json::to_vec(rsp)?;
    let mut rsp = Response::new(Body::from(body));
    rsp.headers_mut().insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("application/json"),
    );
    Ok(rsp)
}

fn text(status: StatusCode, body: &'static str) -> Response<Body> {
    let mut rsp = Response::new(Body::from(body));
    *rsp.status_mut() = status;
    rsp.headers_mut().insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("text/plain; charset=utf-8"),
    );
    rsp
}

// === impl Query ===

impl Query {
    fn parse(query: Option<&str>) -> Self {
        let mut parsed = Self::default();
        let pairs = url::form_urlencoded::parse(query.unwrap_or_default().as_bytes());
        for (key, value) in pairs {
            match &*key {
                "scope" => parsed.scopes.push(value.into_owned()),
                "service" if parsed.service.is_none() => parsed.service = Some(value.into_owned()),
                "account" if parsed.account.is_none() => parsed.account = Some(value.into_owned()),
                _ => {}
            }
        }
        parsed
    }
}

// === impl Error ===

impl Error {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Unauthenticated | Self::Unauthorized { .. } => StatusCode::UNAUTHORIZED,
            Self::MissingScope | Self::Scope(_) => StatusCode::BAD_REQUEST,
            Self::Signing(_) | Self::Json(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn body(&self) -> &'static str {
        match self.status() {
            StatusCode::UNAUTHORIZED => "unauthorized",
            StatusCode::BAD_REQUEST => "bad request",
            _ => "internal server error",
        }
    }

    fn outcome(&self) -> &'static str {
        match self.status() {
            StatusCode::UNAUTHORIZED => "unauthorized",
            StatusCode::BAD_REQUEST => "bad_request",
            _ => "error",
        }
    }

    fn log(&self) {
        match self {
            Self::Signing(_) | Self::Json(_) => error!(error = %self, "Failed to issue token"),
            _ => info!(error = %self, "Refused token request"),
        }
    }
}
