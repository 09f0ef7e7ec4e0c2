//! A reverse proxy that signs graph database queries with AWS SigV4.
//!
//! The proxy sits between a graph exploration UI and a database endpoint
//! that only accepts IAM authenticated HTTP. For each inbound call it
//!
//! 1. reads the [`QueryHandle`] from the request headers,
//! 2. builds the upstream request and signs it when `aws-neptune-region` is
//!    present ([`IamSigner`]),
//! 3. sends it with bounded retries ([`Forwarder`]),
//! 4. streams the upstream response back without buffering it ([`relay`]),
//! 5. cancels the upstream query if the client leaves early
//!    ([`QueryLifecycle`]).
//!
//! ## Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use graphsign_aws_v4::DefaultCredentialProvider;
//! use graphsign_core::{Context, OsEnv};
//! use graphsign_proxy::{router, serve, Config, Proxy, ReqwestTransport};
//!
//! # async fn example() -> anyhow::Result<()> {
//! let ctx = Context::new().with_env(OsEnv);
//! let config = Config::from_env(&ctx)?;
//! let proxy = Proxy::new(
//!     ctx,
//!     DefaultCredentialProvider::new(),
//!     Arc::new(ReqwestTransport::new()?),
//!     &config,
//! );
//! serve(&config, router(proxy)).await
//! # }
//! ```

#![warn(missing_docs)]

mod config;
pub use config::Config;

mod error;
pub use error::{ProxyError, Result};

mod query;
pub use query::{parse_query, Endpoint, IamOptions, QueryHandle};

mod request;
pub use request::{cancel_request, upstream_request, OutboundRequest};

mod sign;
pub use sign::IamSigner;

mod forward;
pub use forward::{Forwarder, ReqwestTransport, RetryPolicy, Transport};

mod lifecycle;
pub use lifecycle::{QueryLifecycle, QueryState, RequestGuard};

mod stream;
pub use stream::{relay, RelayBody};

mod server;
pub use server::{router, serve, Proxy};

#[cfg(test)]
mod testing;
