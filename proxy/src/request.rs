use bytes::Bytes;
use graphsign_aws_v4::{SignableBody, AWS_QUERY_ENCODE_SET};
use http::header::{ACCEPT, CONTENT_TYPE};
use http::{HeaderMap, HeaderValue, Method};
use percent_encoding::utf8_percent_encode;
use serde_json::json;

use crate::error::{ProxyError, Result};
use crate::query::{Endpoint, QueryHandle};

const FORM_CONTENT_TYPE: &str = "application/x-www-form-urlencoded";
const JSON_CONTENT_TYPE: &str = "application/json";
const SPARQL_RESULTS_JSON: &str = "application/sparql-results+json";

/// A request to the upstream, before its body is fixed and signed.
///
/// Kept around so that every retry can rebuild and re-sign it.
#[derive(Debug, Clone)]
pub struct OutboundRequest {
    /// HTTP method.
    pub method: Method,
    /// Absolute url.
    pub url: String,
    /// Headers other than the signing ones.
    pub headers: HeaderMap,
    /// Body in its structured form.
    pub body: SignableBody,
}

impl OutboundRequest {
    /// Create a bodiless request.
    pub fn new(method: Method, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            headers: HeaderMap::new(),
            body: SignableBody::Empty,
        }
    }

    /// Set a header.
    pub fn with_header(mut self, name: http::HeaderName, value: &'static str) -> Self {
        self.headers.insert(name, HeaderValue::from_static(value));
        self
    }

    /// Set the body.
    pub fn with_body(mut self, body: SignableBody) -> Self {
        self.body = body;
        self
    }

    /// Fix the body bytes and build the http request.
    pub fn to_http(&self) -> Result<http::Request<Bytes>> {
        let body = self.body.to_bytes()?;

        let mut req = http::Request::builder()
            .method(self.method.clone())
            .uri(self.url.as_str())
            .body(body)
            .map_err(|e| ProxyError::InvalidUrl {
                url: self.url.clone(),
                reason: e.to_string(),
            })?;
        *req.headers_mut() = self.headers.clone();
        Ok(req)
    }
}

/// Build the upstream request for an inbound query.
///
/// `query` is ignored by summary endpoints.
pub fn upstream_request(handle: &QueryHandle, query: Option<&str>) -> Result<OutboundRequest> {
    let url = handle.upstream_url(handle.endpoint.path());
    let query = || query.map(str::to_string).ok_or(ProxyError::MissingQuery);

    let req = match handle.endpoint {
        Endpoint::Sparql => OutboundRequest::new(Method::POST, url)
            .with_header(CONTENT_TYPE, FORM_CONTENT_TYPE)
            .with_header(ACCEPT, SPARQL_RESULTS_JSON)
            .with_body(SignableBody::Form(vec![("query".to_string(), query()?)])),
        Endpoint::OpenCypher => OutboundRequest::new(Method::POST, url)
            .with_header(CONTENT_TYPE, FORM_CONTENT_TYPE)
            .with_body(SignableBody::Form(vec![("query".to_string(), query()?)])),
        Endpoint::Gremlin => {
            let mut body = json!({ "gremlin": query()? });
            if let Some(id) = &handle.query_id {
                body["queryId"] = json!(id);
            }
            OutboundRequest::new(Method::POST, url)
                .with_header(CONTENT_TYPE, JSON_CONTENT_TYPE)
                .with_body(SignableBody::Json(body))
        }
        Endpoint::Summary | Endpoint::PgStatisticsSummary | Endpoint::RdfStatisticsSummary => {
            OutboundRequest::new(Method::GET, format!("{url}?mode=detailed"))
        }
    };

    Ok(req)
}

/// Build the request that cancels the running query of `handle`.
///
/// Returns `None` when there is no query id or the endpoint has no way to
/// cancel queries.
pub fn cancel_request(handle: &QueryHandle) -> Option<OutboundRequest> {
    let id = handle.query_id.as_deref()?;
    let id = utf8_percent_encode(id, &AWS_QUERY_ENCODE_SET);

    match handle.endpoint {
        Endpoint::Sparql => Some(
            OutboundRequest::new(Method::POST, handle.upstream_url("/sparql/status"))
                .with_header(CONTENT_TYPE, FORM_CONTENT_TYPE)
                .with_body(SignableBody::Text(format!(
                    "cancelQuery&queryId={id}&silent=true"
                ))),
        ),
        Endpoint::Gremlin => Some(OutboundRequest::new(
            Method::GET,
            handle.upstream_url(&format!("/gremlin/status?cancelQuery&queryId={id}")),
        )),
        // openCypher and the summaries have no cancellation endpoint wired.
        _ => None,
    }
}
