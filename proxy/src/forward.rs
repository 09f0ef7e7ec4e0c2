// Licensed to the Apache Software Foundation (ASF) under one
// or more contributor license agreements.  See the NOTICE file
// distributed with this work for additional information
// regarding copyright ownership.  The ASF licenses this file
// to you under the Apache License, Version 2.0 (the
// "License"); you may not use this file except in compliance
// with the License.  You may obtain a copy of the License at
//
//   http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing,
// software distributed under the License is distributed on an
// "AS IS" BASIS, WITHOUT WARRANTIES OR CONDITIONS OF ANY
// KIND, either express or implied.  See the License for the
// specific language governing permissions and limitations
// under the License.

use std::fmt::Debug;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::body::Body;
use bytes::Bytes;
use log::{debug, warn};

use crate::error::{ProxyError, Result};
use crate::query::IamOptions;
use crate::request::OutboundRequest;
use crate::sign::IamSigner;

/// Sends one request to the upstream and returns its still streaming response.
///
/// Implementations report only transport failures as errors. Any status,
/// including 4xx and 5xx, is a successful exchange.
#[async_trait]
pub trait Transport: Debug + Send + Sync + 'static {
    /// Send the request.
    async fn send(&self, req: http::Request<Bytes>) -> anyhow::Result<http::Response<Body>>;
}

/// Transport over a `reqwest::Client` with automatic decompression disabled,
/// so that encoded upstream bodies and their headers pass through as is.
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    /// Build the default client.
    pub fn new() -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .no_gzip()
            .no_brotli()
            .no_deflate()
            .build()?;
        Ok(Self { client })
    }

    /// Use a prepared client.
    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn send(&self, req: http::Request<Bytes>) -> anyhow::Result<http::Response<Body>> {
        let req = reqwest::Request::try_from(req)?;
        let resp: http::Response<reqwest::Body> = self.client.execute(req).await?.into();
        Ok(resp.map(Body::new))
    }
}

/// How often and how patiently transport failures are retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, at least 1.
    pub max_attempts: u32,
    /// Fixed pause between attempts.
    pub retry_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 1,
            retry_delay: Duration::from_secs(10),
        }
    }
}

/// Executes upstream requests, signing each attempt anew.
#[derive(Debug, Clone)]
pub struct Forwarder {
    transport: Arc<dyn Transport>,
    signer: IamSigner,
    retry: RetryPolicy,
}

impl Forwarder {
    /// Create a forwarder.
    pub fn new(transport: Arc<dyn Transport>, signer: IamSigner, retry: RetryPolicy) -> Self {
        Self {
            transport,
            signer,
            retry,
        }
    }

    /// Retry policy in use.
    pub fn retry_policy(&self) -> RetryPolicy {
        self.retry
    }

    /// Forward `req` with retries on transport failure.
    ///
    /// Signing errors are returned at once. Non-2xx responses are returned
    /// as they are.
    pub async fn forward(
        &self,
        req: &OutboundRequest,
        iam: Option<&IamOptions>,
    ) -> Result<http::Response<Body>> {
        let max_attempts = self.retry.max_attempts.max(1);
        let mut attempt = 1;

        loop {
            match self.send_once(req, iam).await {
                Ok(Ok(resp)) => return Ok(resp),
                Ok(Err(err)) if attempt < max_attempts => {
                    warn!(
                        "attempt {attempt}/{max_attempts} to {} failed, retrying in {:?}: {err:#}",
                        req.url, self.retry.retry_delay
                    );
                    tokio::time::sleep(self.retry.retry_delay).await;
                    attempt += 1;
                }
                Ok(Err(err)) if max_attempts == 1 => return Err(ProxyError::Transport(err)),
                Ok(Err(err)) => {
                    return Err(ProxyError::RetryExhausted {
                        attempts: attempt,
                        source: err,
                    })
                }
                Err(err) => return Err(err),
            }
        }
    }

    /// Sign and send `req` exactly once.
    ///
    /// The outer error is a local failure (body or signing), the inner one a
    /// transport failure.
    pub async fn send_once(
        &self,
        req: &OutboundRequest,
        iam: Option<&IamOptions>,
    ) -> Result<anyhow::Result<http::Response<Body>>> {
        let http_req = self.signer.sign(req.to_http()?, iam).await?;
        debug!("sending {} {}", http_req.method(), http_req.uri());

        Ok(self.transport.send(http_req).await)
    }
}
