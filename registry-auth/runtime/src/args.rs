use crate::{
    core::{CacheMetrics, CredentialCache, Validator},
    http::{self, RequestMetrics, Timeouts, TokenService},
    k8s::SecretStore,
    token::{self, TokenGenerator},
};
use anyhow::{bail, Context, Result};
use clap::Parser;
use prometheus_client::registry::Registry;
use std::{net::SocketAddr, path::PathBuf, sync::Arc};
use tokio::{net::TcpListener, time::Duration};
use tracing::{info, info_span, Instrument};

const SWEEP_INTERVAL: Duration = Duration::from_secs(2 * 60);

#[derive(Debug, Parser)]
#[clap(name = "registry-auth", about = "Issues registry access tokens to tenants")]
pub struct Args {
    #[clap(
        long,
        default_value = "registry_auth=info,warn",
        env = "REGISTRY_AUTH_LOG"
    )]
    log_level: kubert::LogFilter,

    #[clap(long, default_value = "plain", env = "REGISTRY_AUTH_LOG_FORMAT")]
    log_format: kubert::LogFormat,

    #[clap(flatten)]
    client: kubert::ClientArgs,

    #[clap(flatten)]
    admin: kubert::AdminArgs,

    #[clap(long, default_value = "0.0.0.0:5001", env = "REGISTRY_AUTH_LISTEN_ADDR")]
    listen_addr: SocketAddr,

    /// PEM encoded RSA private key used to sign tokens.
    #[clap(
        long,
        default_value = "/etc/registry-auth-keys/tls.key",
        env = "REGISTRY_AUTH_JWT_PRIVATE_KEY_PATH"
    )]
    jwt_private_key_path: PathBuf,

    #[clap(
        long,
        default_value = "registry-token-issuer",
        env = "REGISTRY_AUTH_JWT_ISSUER"
    )]
    jwt_issuer: String,

    #[clap(
        long,
        default_value = "300",
        env = "REGISTRY_AUTH_JWT_EXPIRATION_SECS",
        value_parser = clap::value_parser!(u64).range(1..)
    )]
    jwt_expiration_secs: u64,

    /// Identifies the signing key in the registry's key set.
    #[clap(
        long,
        default_value = token::DEFAULT_KEY_ID,
        env = "REGISTRY_AUTH_JWT_KEY_ID"
    )]
    jwt_key_id: String,

    /// Audience of issued tokens; must match the registry's configured
    /// service name.
    #[clap(
        long,
        default_value = "docker-registry",
        env = "REGISTRY_AUTH_REGISTRY_SERVICE"
    )]
    registry_service: String,

    #[clap(
        long,
        default_value = "300",
        env = "REGISTRY_AUTH_CACHE_TTL_SECS",
        value_parser = clap::value_parser!(u64).range(1..)
    )]
    cache_ttl_secs: u64,

    /// Deadline for reading a credentials secret from the API server.
    #[clap(long, default_value = "5000", env = "REGISTRY_AUTH_STORE_TIMEOUT_MS")]
    store_timeout_ms: u64,
}

impl Args {
    #[inline]
    pub async fn parse_and_run() -> Result<()> {
        Self::parse().run().await
    }

    pub async fn run(self) -> Result<()> {
        let Self {
            log_level,
            log_format,
            client,
            admin,
            listen_addr,
            jwt_private_key_path,
            jwt_issuer,
            jwt_expiration_secs,
            jwt_key_id,
            registry_service,
            cache_ttl_secs,
            store_timeout_ms,
        } = self;

        let mut prom = <Registry>::default();
        let reg = prom.sub_registry_with_prefix("registry_auth");
        let request_metrics = RequestMetrics::register(reg);
        let cache_metrics = CacheMetrics::register(reg.sub_registry_with_prefix("cache"));
        let rt_metrics = kubert::RuntimeMetrics::register(prom.sub_registry_with_prefix("kube"));

        let mut runtime = kubert::Runtime::builder()
            .with_log(log_level, log_format)
            .with_metrics(rt_metrics)
            .with_admin(admin.into_builder().with_prometheus(prom))
            .with_client(client)
            .build()
            .await?;

        // The service must not start without a usable signing key.
        let tokens = TokenGenerator::from_file(
            &jwt_private_key_path,
            token::Config {
                issuer: jwt_issuer,
                key_id: jwt_key_id,
                expiration: Duration::from_secs(jwt_expiration_secs),
            },
        )
        .with_context(|| {
            format!(
                "failed to load token signing key from {}",
                jwt_private_key_path.display()
            )
        })?;
        info!(
            path = %jwt_private_key_path.display(),
            key_id = tokens.key_id().unwrap_or_default(),
            "Loaded token signing key"
        );

        let cache = Arc::new(CredentialCache::with_metrics(
            Duration::from_secs(cache_ttl_secs),
            cache_metrics,
        ));
        tokio::spawn(
            cache
                .clone()
                .sweep_every(SWEEP_INTERVAL)
                .instrument(info_span!("cache_sweep")),
        );

        let validator = Validator::new(
            SecretStore::new(runtime.client()),
            cache,
            Duration::from_millis(store_timeout_ms),
        );
        let svc = TokenService::new(validator, tokens, registry_service, request_metrics);

        let listener = TcpListener::bind(listen_addr)
            .await
            .with_context(|| format!("failed to bind token server to {listen_addr}"))?;
        info!(addr = %listen_addr, "Token server listening");
        tokio::spawn(
            http::serve(listener, svc, Timeouts::default(), runtime.shutdown_handle())
                .instrument(info_span!("token_server", port = %listen_addr.port())),
        );

        // Block the main thread on the shutdown signal. Once it fires, wait
        // for the token server to release its shutdown handle.
        if runtime.run().await.is_err() {
            bail!("Aborted");
        }

        Ok(())
    }
}
