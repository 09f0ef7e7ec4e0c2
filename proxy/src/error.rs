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

use axum::response::{IntoResponse, Response};
use axum::Json;
use graphsign_core::ErrorKind;
use http::StatusCode;
use log::{error, warn};
use serde_json::json;

/// Result that carries a [`ProxyError`].
pub type Result<T> = std::result::Result<T, ProxyError>;

/// Errors surfaced to the client before the response starts streaming.
///
/// Once the upstream status line has been relayed, failures can only
/// terminate the body stream and never reach this type.
#[derive(Debug, thiserror::Error)]
pub enum ProxyError {
    /// A required inbound header is absent or empty.
    #[error("missing required header: {0}")]
    MissingHeader(&'static str),
    /// The upstream connection url can't be used.
    #[error("invalid graph database url {url}: {reason}")]
    InvalidUrl {
        /// The url as received.
        url: String,
        /// Why it was rejected.
        reason: String,
    },
    /// The inbound body carries no query text.
    #[error("request body does not contain a query")]
    MissingQuery,
    /// The body can't be turned into signable bytes.
    #[error("unsupported body type: {0}")]
    UnsupportedBodyType(String),
    /// Credential resolution or signing failed.
    #[error("signing failed: {0}")]
    Signing(#[from] graphsign_core::Error),
    /// The single permitted attempt failed at transport level.
    #[error("upstream request failed: {0}")]
    Transport(#[source] anyhow::Error),
    /// Every attempt failed at transport level.
    #[error("upstream request failed after {attempts} attempts: {source}")]
    RetryExhausted {
        /// Number of attempts made.
        attempts: u32,
        /// Error of the last attempt.
        #[source]
        source: anyhow::Error,
    },
}

impl ProxyError {
    /// HTTP status the error is reported with.
    pub fn status(&self) -> StatusCode {
        match self {
            ProxyError::MissingHeader(_) | ProxyError::InvalidUrl { .. } | ProxyError::MissingQuery => {
                StatusCode::BAD_REQUEST
            }
            ProxyError::UnsupportedBodyType(_) => StatusCode::UNSUPPORTED_MEDIA_TYPE,
            ProxyError::Signing(err) => match err.kind() {
                ErrorKind::BodyUnsupported => StatusCode::UNSUPPORTED_MEDIA_TYPE,
                ErrorKind::RequestInvalid => StatusCode::BAD_REQUEST,
                _ => StatusCode::INTERNAL_SERVER_ERROR,
            },
            ProxyError::Transport(_) | ProxyError::RetryExhausted { .. } => StatusCode::BAD_GATEWAY,
        }
    }
}

impl IntoResponse for ProxyError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!("request failed: {self:?}");
        } else {
            warn!("request rejected: {self}");
        }

        let body = json!({
            "error": {
                "status": status.as_u16(),
                "message": self.to_string(),
            }
        });
        (status, Json(body)).into_response()
    }
}
