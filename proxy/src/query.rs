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

use std::fmt::{self, Display};

use bytes::Bytes;
use http::header::CONTENT_TYPE;
use http::{HeaderMap, Uri};
use serde::Deserialize;

use crate::error::{ProxyError, Result};

/// Upstream connection url, e.g. `https://db.cluster.example.com:8182`.
pub const GRAPH_DB_CONNECTION_URL: &str = "graph-db-connection-url";
/// Client chosen id of the query, used to cancel it.
pub const QUERY_ID: &str = "queryid";
/// Region of the upstream. Its presence turns on signing.
pub const AWS_NEPTUNE_REGION: &str = "aws-neptune-region";
/// Service name used in the credential scope.
pub const SERVICE_TYPE: &str = "service-type";
/// When `true` the query text is written to the proxy log.
pub const DB_QUERY_LOGGING_ENABLED: &str = "db-query-logging-enabled";

/// Upstream endpoints the proxy knows how to call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endpoint {
    /// `POST /sparql`
    Sparql,
    /// `POST /gremlin`
    Gremlin,
    /// `POST /openCypher`
    OpenCypher,
    /// `GET /summary`
    Summary,
    /// `GET /pg/statistics/summary`
    PgStatisticsSummary,
    /// `GET /rdf/statistics/summary`
    RdfStatisticsSummary,
}

impl Endpoint {
    /// Path of the endpoint, identical on the proxy and on the upstream.
    pub fn path(&self) -> &'static str {
        match self {
            Endpoint::Sparql => "/sparql",
            Endpoint::Gremlin => "/gremlin",
            Endpoint::OpenCypher => "/openCypher",
            Endpoint::Summary => "/summary",
            Endpoint::PgStatisticsSummary => "/pg/statistics/summary",
            Endpoint::RdfStatisticsSummary => "/rdf/statistics/summary",
        }
    }

    /// Whether the endpoint carries a query in its body.
    pub fn takes_query(&self) -> bool {
        matches!(
            self,
            Endpoint::Sparql | Endpoint::Gremlin | Endpoint::OpenCypher
        )
    }
}

impl Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.path())
    }
}

/// Signing parameters for one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IamOptions {
    /// Service name in the credential scope, `neptune-db` unless overridden.
    pub service: String,
    /// Region in the credential scope.
    pub region: String,
}

/// Everything known about an inbound query before it is forwarded.
///
/// Built once per inbound request and shared, read only, by the forwarder and
/// the lifecycle controller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryHandle {
    /// Endpoint being called.
    pub endpoint: Endpoint,
    /// Client supplied query id.
    pub query_id: Option<String>,
    /// Upstream base url, without trailing slash.
    pub base_url: String,
    /// Service type from the request or the configured default.
    pub service_type: String,
    /// Present only when the caller asked for signing.
    pub iam: Option<IamOptions>,
    /// Whether the query text should be logged.
    pub log_query: bool,
}

impl QueryHandle {
    /// Read the handle from the inbound headers.
    pub fn from_headers(
        endpoint: Endpoint,
        headers: &HeaderMap,
        default_service_type: &str,
    ) -> Result<Self> {
        let base_url = header_str(headers, GRAPH_DB_CONNECTION_URL)
            .ok_or(ProxyError::MissingHeader(GRAPH_DB_CONNECTION_URL))?;
        let base_url = normalize_base_url(base_url)?;

        let service_type = header_str(headers, SERVICE_TYPE)
            .unwrap_or(default_service_type)
            .to_string();
        let iam = header_str(headers, AWS_NEPTUNE_REGION).map(|region| IamOptions {
            service: service_type.clone(),
            region: region.to_string(),
        });

        Ok(Self {
            endpoint,
            query_id: header_str(headers, QUERY_ID).map(str::to_string),
            base_url,
            service_type,
            iam,
            log_query: header_str(headers, DB_QUERY_LOGGING_ENABLED)
                .is_some_and(|v| v.eq_ignore_ascii_case("true")),
        })
    }

    /// Whether upstream requests for this query are signed.
    pub fn is_iam_enabled(&self) -> bool {
        self.iam.is_some()
    }

    /// Absolute upstream url for `path_and_query`.
    pub fn upstream_url(&self, path_and_query: &str) -> String {
        format!("{}{path_and_query}", self.base_url)
    }
}

/// Non-empty, trimmed value of a header.
fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
}

fn normalize_base_url(url: &str) -> Result<String> {
    let invalid = |reason: &str| ProxyError::InvalidUrl {
        url: url.to_string(),
        reason: reason.to_string(),
    };

    let uri: Uri = url.parse().map_err(|_| invalid("not a valid url"))?;
    match uri.scheme_str() {
        Some("http") | Some("https") => {}
        _ => return Err(invalid("scheme must be http or https")),
    }
    if uri.authority().is_none() {
        return Err(invalid("host is missing"));
    }
    if uri.query().is_some() {
        return Err(invalid("query is not allowed"));
    }

    Ok(url.trim_end_matches('/').to_string())
}

#[derive(Debug, Deserialize)]
struct QueryBody {
    query: String,
}

/// Extract the query text from an inbound body.
///
/// Accepts `{"query": "..."}` JSON and `query=...` form bodies. Multipart
/// bodies are refused.
pub fn parse_query(headers: &HeaderMap, body: &Bytes) -> Result<String> {
    let content_type = headers
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_ascii_lowercase();

    if content_type.starts_with("multipart/") {
        return Err(ProxyError::UnsupportedBodyType(content_type));
    }

    let query = if content_type.starts_with("application/x-www-form-urlencoded") {
        form_query(body)
    } else {
        serde_json::from_slice::<QueryBody>(body)
            .ok()
            .map(|b| b.query)
            .or_else(|| form_query(body))
    };

    query
        .filter(|q| !q.trim().is_empty())
        .ok_or(ProxyError::MissingQuery)
}

fn form_query(body: &Bytes) -> Option<String> {
    form_urlencoded::parse(body)
        .find(|(k, _)| k == "query")
        .map(|(_, v)| v.into_owned())
}
