#![deny(rust_2018_idioms)]
#![forbid(unsafe_code)]

pub use registry_auth_core as core;
pub use registry_auth_http as http;
pub use registry_auth_k8s as k8s;
pub use registry_auth_token as token;

mod args;

pub use self::args::Args;
