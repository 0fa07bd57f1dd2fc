#![deny(rust_2018_idioms)]
#![forbid(unsafe_code)]

//! The HTTP surface of the registry auth service.
//!
//! [`TokenService`] answers the registry's token requests and liveness
//! checks; [`serve`] runs it on a TCP listener until the process is asked to
//! shut down.

mod basic;
mod metrics;
mod server;
mod service;

pub use self::{
    metrics::RequestMetrics,
    server::{serve, Timeouts},
    service::{Error, TokenResponse, TokenService},
};

pub type Body = http_body_util::Full<bytes::Bytes>;
