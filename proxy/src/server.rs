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

use std::sync::Arc;

use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::Router;
use bytes::Bytes;
use graphsign_aws_v4::Credential;
use graphsign_core::{Context, ProvideCredential};
use log::{info, log, Level};

use crate::config::Config;
use crate::error::{ProxyError, Result};
use crate::forward::{Forwarder, Transport};
use crate::lifecycle::QueryLifecycle;
use crate::query::{parse_query, Endpoint, QueryHandle};
use crate::request::upstream_request;
use crate::sign::IamSigner;
use crate::stream::relay;

/// Shared state of the proxy, cheap to clone.
#[derive(Debug, Clone)]
pub struct Proxy {
    forwarder: Forwarder,
    default_service_type: Arc<str>,
}

impl Proxy {
    /// Assemble the proxy from its parts.
    pub fn new(
        ctx: Context,
        provider: impl ProvideCredential<Credential = Credential>,
        transport: Arc<dyn Transport>,
        config: &Config,
    ) -> Self {
        let signer = IamSigner::new(ctx, provider, &config.default_service_type);
        Self {
            forwarder: Forwarder::new(transport, signer, config.retry_policy()),
            default_service_type: config.default_service_type.as_str().into(),
        }
    }

    /// Handle one proxied call end to end.
    pub async fn handle(
        &self,
        endpoint: Endpoint,
        headers: &HeaderMap,
        body: Bytes,
    ) -> Result<Response> {
        let handle = Arc::new(QueryHandle::from_headers(
            endpoint,
            headers,
            &self.default_service_type,
        )?);

        let query = if endpoint.takes_query() {
            Some(parse_query(headers, &body)?)
        } else {
            None
        };
        info!(
            "{endpoint} -> {} (query id: {:?}, iam: {})",
            handle.base_url,
            handle.query_id,
            handle.is_iam_enabled()
        );
        if let (true, Some(q)) = (handle.log_query, &query) {
            info!("[{endpoint}] query: {q}");
        }

        let req = upstream_request(&handle, query.as_deref())?;
        let lifecycle = QueryLifecycle::new(handle.clone(), self.forwarder.clone());
        let guard = lifecycle.guard();

        let result = self.forwarder.forward(&req, handle.iam.as_ref()).await;
        guard.disarm();

        match result {
            Ok(upstream) => Ok(relay(upstream, lifecycle)),
            Err(err) => {
                lifecycle.fail();
                Err(err)
            }
        }
    }
}

/// Build the router with every route of the proxy.
pub fn router(proxy: Proxy) -> Router {
    Router::new()
        .route("/sparql", post(sparql))
        .route("/gremlin", post(gremlin))
        .route("/openCypher", post(open_cypher))
        .route("/summary", get(summary))
        .route("/pg/statistics/summary", get(pg_statistics_summary))
        .route("/rdf/statistics/summary", get(rdf_statistics_summary))
        .route("/status", get(status))
        .route("/logger", post(logger))
        .with_state(proxy)
}

/// Serve `router` on the configured address until ctrl-c.
pub async fn serve(config: &Config, router: Router) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(config.addr()).await?;
    info!("proxy listening on http://{}", listener.local_addr()?);

    axum::serve(listener, router)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("shutting down");
        })
        .await?;
    Ok(())
}

async fn sparql(State(proxy): State<Proxy>, headers: HeaderMap, body: Bytes) -> Result<Response> {
    proxy.handle(Endpoint::Sparql, &headers, body).await
}

async fn gremlin(State(proxy): State<Proxy>, headers: HeaderMap, body: Bytes) -> Result<Response> {
    proxy.handle(Endpoint::Gremlin, &headers, body).await
}

async fn open_cypher(
    State(proxy): State<Proxy>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response> {
    proxy.handle(Endpoint::OpenCypher, &headers, body).await
}

async fn summary(State(proxy): State<Proxy>, headers: HeaderMap) -> Result<Response> {
    proxy.handle(Endpoint::Summary, &headers, Bytes::new()).await
}

async fn pg_statistics_summary(
    State(proxy): State<Proxy>,
    headers: HeaderMap,
) -> Result<Response> {
    proxy
        .handle(Endpoint::PgStatisticsSummary, &headers, Bytes::new())
        .await
}

async fn rdf_statistics_summary(
    State(proxy): State<Proxy>,
    headers: HeaderMap,
) -> Result<Response> {
    proxy
        .handle(Endpoint::RdfStatisticsSummary, &headers, Bytes::new())
        .await
}

async fn status() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}

/// Write a line sent by the client into the proxy log.
async fn logger(headers: HeaderMap) -> Result<impl IntoResponse> {
    let value = |name: &'static str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .filter(|v| !v.is_empty())
            .ok_or(ProxyError::MissingHeader(name))
    };

    let message = value("message")?;
    let level = match value("level")?.to_ascii_lowercase().as_str() {
        "error" => Level::Error,
        "warn" => Level::Warn,
        "debug" => Level::Debug,
        "trace" => Level::Trace,
        _ => Level::Info,
    };
    log!(target: "client", level, "{message}");

    Ok((StatusCode::OK, "Log received"))
}
