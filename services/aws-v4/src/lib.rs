//! AWS SigV4 signing for graph database endpoints.
//!
//! This crate holds everything the proxy needs to produce
//! `AWS4-HMAC-SHA256` signatures:
//!
//! - [`Credential`] and the providers that resolve it from the hosting
//!   environment, chained by [`DefaultCredentialProvider`].
//! - [`SignableBody`], which fixes the exact bytes that are hashed and sent.
//! - [`RequestSigner`], which canonicalizes the request and writes the
//!   `Authorization`, `x-amz-date` and `x-amz-security-token` headers.
//!
//! ## Example
//!
//! ```no_run
//! use graphsign_aws_v4::{DefaultCredentialProvider, RequestSigner, SignableBody};
//! use graphsign_core::{Context, OsEnv, Result, Signer};
//!
//! # async fn example() -> Result<()> {
//! let ctx = Context::new().with_env(OsEnv);
//! let signer = Signer::new(
//!     ctx,
//!     DefaultCredentialProvider::new(),
//!     RequestSigner::new("neptune-db", "us-east-1"),
//! );
//!
//! let body = SignableBody::Form(vec![("query".into(), "SELECT * WHERE { ?s ?p ?o }".into())]);
//! let bytes = body.to_bytes()?;
//! let (mut parts, _) = http::Request::post("https://db.example.com:8182/sparql")
//!     .body(())?
//!     .into_parts();
//! signer.sign(&mut parts, &bytes).await?;
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]

mod constants;
pub use constants::{ALGORITHM, AWS_QUERY_ENCODE_SET, X_AMZ_DATE, X_AMZ_SECURITY_TOKEN};

mod body;
pub use body::{encode_form, SignableBody};

mod credential;
pub use credential::Credential;

mod sign_request;
pub use sign_request::{canonical_query_string, CanonicalRequest, RequestSigner};

mod provide_credential;
pub use provide_credential::*;
