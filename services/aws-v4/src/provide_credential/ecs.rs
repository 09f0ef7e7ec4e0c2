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

use crate::{constants::*, Credential};
use async_trait::async_trait;
use bytes::Bytes;
use graphsign_core::time::parse_rfc3339;
use graphsign_core::{Context, Error, ProvideCredential, Result};
use http::header::AUTHORIZATION;
use http::Method;
use serde::Deserialize;

/// Link-local endpoint the container agent serves relative URIs from.
const ECS_CONTAINER_ENDPOINT: &str = "http://169.254.170.2";

/// EcsCredentialProvider loads credentials from the container credential
/// endpoint of ECS tasks and similar container runtimes.
///
/// It is enabled by `AWS_CONTAINER_CREDENTIALS_RELATIVE_URI` or
/// `AWS_CONTAINER_CREDENTIALS_FULL_URI`. When
/// `AWS_CONTAINER_AUTHORIZATION_TOKEN` is set it is sent as the
/// `Authorization` header.
///
/// References:
/// - [IAM roles for tasks](https://docs.aws.amazon.com/AmazonECS/latest/developerguide/task-iam-roles.html)
#[derive(Debug, Default, Clone)]
pub struct EcsCredentialProvider;

impl EcsCredentialProvider {
    /// Create a new `EcsCredentialProvider` instance.
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl ProvideCredential for EcsCredentialProvider {
    type Credential = Credential;

    async fn provide_credential(&self, ctx: &Context) -> Result<Option<Self::Credential>> {
        let url = match (
            ctx.env_var(AWS_CONTAINER_CREDENTIALS_RELATIVE_URI),
            ctx.env_var(AWS_CONTAINER_CREDENTIALS_FULL_URI),
        ) {
            (Some(relative), _) => format!("{ECS_CONTAINER_ENDPOINT}{relative}"),
            (None, Some(full)) => full,
            // Not running in a container that exposes credentials.
            (None, None) => return Ok(None),
        };

        let mut req = http::Request::builder().uri(&url).method(Method::GET);
        if let Some(token) = ctx.env_var(AWS_CONTAINER_AUTHORIZATION_TOKEN) {
            req = req.header(AUTHORIZATION, token);
        }
        let req = req.body(Bytes::new()).map_err(|e| {
            Error::request_invalid("failed to build container credentials request").with_source(e)
        })?;

        let resp = ctx.http_send_as_string(req).await?;
        if resp.status() != http::StatusCode::OK {
            return Err(Error::credential_unavailable(format!(
                "request to container credentials endpoint failed: status={}, body={}",
                resp.status(),
                resp.body()
            )));
        }

        let cred: ContainerCredentials = serde_json::from_str(resp.body()).map_err(|e| {
            Error::unexpected("failed to parse container credentials").with_source(e)
        })?;

        Ok(Some(Credential {
            access_key_id: cred.access_key_id,
            secret_access_key: cred.secret_access_key,
            session_token: Some(cred.token),
            expires_in: Some(parse_rfc3339(&cred.expiration)?),
        }))
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ContainerCredentials {
    access_key_id: String,
    secret_access_key: String,
    token: String,
    expiration: String,
}
