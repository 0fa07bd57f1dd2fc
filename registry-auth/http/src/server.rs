use crate::Body;
use http::{Request, Response};
use hyper::{body::Incoming, server::conn::http1};
use hyper_util::{
    rt::{TokioIo, TokioTimer},
    service::TowerToHyperService,
};
use std::{convert::Infallible, future::Future, io, net::SocketAddr};
use tokio::{
    net::{TcpListener, TcpStream},
    time::{self, Duration},
};
use tracing::{debug, debug_span, info, warn, Instrument};

/// Pause after a failed accept. Errors such as descriptor exhaustion leave the
/// pending connection queued, so retrying at once would spin.
const ACCEPT_ERROR_BACKOFF: Duration = Duration::from_secs(1);

/// Connection and shutdown bounds for [`serve`].
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Timeouts {
    /// Time allowed for a client to send a request's headers.
    pub read_header: Duration,

    /// Time allowed to handle a request once its headers are read.
    pub read: Duration,

    /// Time allowed to flush outstanding responses once a connection has been
    /// asked to close.
    pub write: Duration,

    /// Time after which a connection is asked to close.
    pub idle: Duration,

    /// Time open connections are given to finish once shutdown starts.
    pub shutdown_grace: Duration,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            read_header: Duration::from_secs(5),
            read: Duration::from_secs(10),
            write: Duration::from_secs(10),
            idle: Duration::from_secs(120),
            shutdown_grace: Duration::from_secs(10),
        }
    }
}

/// Serves HTTP/1 connections from `listener` until `drain` is signaled.
///
/// Once signaled the listener is closed and open connections are asked to
/// finish their in-flight requests. Connections still open after the grace
/// period are abandoned.
pub async fn serve<S>(listener: TcpListener, svc: S, timeouts: Timeouts, drain: drain::Watch)
where
    S: tower::Service<Request<Incoming>, Response = Response<Body>, Error = Infallible>
        + Clone
        + Send
        + 'static,
    S::Future: Send + 'static,
{
    let (conns_tx, conns_rx) = drain::channel();
    let shutdown = drain.signaled();
    tokio::pin!(shutdown);

    let release = loop {
        let (io, client) = tokio::select! {
            release = &mut shutdown => break release,
            conn = accept_next(|| listener.accept()) => conn,
        };
        tokio::spawn(
            serve_conn(io, svc.clone(), timeouts, conns_rx.clone())
                .instrument(debug_span!("conn", %client)),
        );
    };

    info!("Shutting down token server");
    drop(listener);
    drop(conns_rx);
    if time::timeout(timeouts.shutdown_grace, conns_tx.drain())
        .await
        .is_err()
    {
        warn!(
            grace = ?timeouts.shutdown_grace,
            "Connections did not complete before the shutdown grace period"
        );
    }
    drop(release);
}

/// Accepts the next connection, backing off after each failure.
async fn accept_next<T, A, F>(mut accept: A) -> (T, SocketAddr)
where
    A: FnMut() -> F,
    F: Future<Output = io::Result<(T, SocketAddr)>>,
{
    loop {
        match accept().await {
            Ok(conn) => return conn,
            Err(error) => {
                warn!(%error, "Failed to accept connection");
                time::sleep(ACCEPT_ERROR_BACKOFF).await;
            }
        }
    }
}

async fn serve_conn<S>(io: TcpStream, svc: S, timeouts: Timeouts, drain: drain::Watch)
where
    S: tower::Service<Request<Incoming>, Response = Response<Body>, Error = Infallible>
        + Clone
        + Send
        + 'static,
    S::Future: Send + 'static,
{
    let svc = TowerToHyperService::new(tower::timeout::Timeout::new(svc, timeouts.read));
    let conn = http1::Builder::new()
        .timer(TokioTimer::new())
        .header_read_timeout(timeouts.read_header)
        .serve_connection(TokioIo::new(io), svc);
    tokio::pin!(conn);

    let release = tokio::select! {
        res = conn.as_mut() => {
            if let Err(error) = res {
                debug!(%error, "Connection failed");
            }
            return;
        }
        _ = time::sleep(timeouts.idle) => {
            debug!("Closing connection after idle timeout");
            None
        }
        release = drain.signaled() => {
            debug!("Closing connection for shutdown");
            Some(release)
        }
    };

    conn.as_mut().graceful_shutdown();
    match time::timeout(timeouts.write, conn).await {
        Ok(Ok(())) => {}
        Ok(Err(error)) => debug!(%error, "Connection failed while closing"),
        Err(_) => debug!("Connection did not close before the write timeout"),
    }
    drop(release);
}
