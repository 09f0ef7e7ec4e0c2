//! Fakes shared by the unit tests of this crate.

use std::sync::Arc;

use async_trait::async_trait;
use axum::body::Body;
use bytes::Bytes;
use graphsign_aws_v4::StaticCredentialProvider;
use graphsign_core::Context;
use tokio::sync::mpsc;

use crate::forward::{Forwarder, RetryPolicy, Transport};
use crate::query::{Endpoint, IamOptions, QueryHandle};
use crate::sign::IamSigner;

/// Reports every request it receives on a channel and answers `200 ok`,
/// or fails when built with `failing`.
#[derive(Debug)]
pub struct RecordingTransport {
    tx: mpsc::UnboundedSender<http::Request<Bytes>>,
    fail: bool,
}

impl RecordingTransport {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<http::Request<Bytes>>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx, fail: false }, rx)
    }

    pub fn failing() -> (Self, mpsc::UnboundedReceiver<http::Request<Bytes>>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx, fail: true }, rx)
    }
}

#[async_trait]
impl Transport for RecordingTransport {
    async fn send(&self, req: http::Request<Bytes>) -> anyhow::Result<http::Response<Body>> {
        let _ = self.tx.send(req);
        if self.fail {
            anyhow::bail!("connection refused");
        }
        Ok(http::Response::new(Body::from("ok")))
    }
}

pub fn forwarder(transport: impl Transport) -> Forwarder {
    let signer = IamSigner::new(
        Context::new(),
        StaticCredentialProvider::new("AKIDEXAMPLE", "secret"),
        "neptune-db",
    );
    Forwarder::new(Arc::new(transport), signer, RetryPolicy::default())
}

pub fn handle(endpoint: Endpoint, query_id: Option<&str>, signed: bool) -> Arc<QueryHandle> {
    Arc::new(QueryHandle {
        endpoint,
        query_id: query_id.map(str::to_string),
        base_url: "http://db.example.com:8182".to_string(),
        service_type: "neptune-db".to_string(),
        iam: signed.then(|| IamOptions {
            service: "neptune-db".to_string(),
            region: "us-east-1".to_string(),
        }),
        log_query: false,
    })
}
