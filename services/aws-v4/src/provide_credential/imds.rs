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
use graphsign_core::time::{now, parse_rfc3339, DateTime};
use graphsign_core::{Context, Error, ProvideCredential, Result};
use http::header::CONTENT_LENGTH;
use http::Method;
use serde::Deserialize;
use std::sync::{Arc, Mutex};

const DEFAULT_ENDPOINT: &str = "http://169.254.169.254";
/// 21600s (6h) is recommended by AWS.
const TOKEN_TTL_SECONDS: i64 = 21600;

/// IMDSv2CredentialProvider loads the instance role credential from the EC2
/// instance metadata service, using the session token flow.
///
/// Set `AWS_EC2_METADATA_DISABLED=true` to skip it entirely.
#[derive(Debug, Clone)]
pub struct IMDSv2CredentialProvider {
    endpoint: Option<String>,
    token: Arc<Mutex<(String, DateTime)>>,
}

impl Default for IMDSv2CredentialProvider {
    fn default() -> Self {
        Self {
            endpoint: None,
            token: Arc::new(Mutex::new((String::new(), DateTime::default()))),
        }
    }
}

impl IMDSv2CredentialProvider {
    /// Create a new `IMDSv2CredentialProvider` instance.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the endpoint for the metadata service.
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = Some(endpoint.into());
        self
    }

    fn endpoint(&self, ctx: &Context) -> String {
        self.endpoint
            .clone()
            .or_else(|| ctx.env_var(AWS_EC2_METADATA_SERVICE_ENDPOINT))
            .unwrap_or_else(|| DEFAULT_ENDPOINT.to_string())
    }

    async fn load_token(&self, ctx: &Context) -> Result<String> {
        {
            let (token, expires_in) = self.token.lock().expect("lock poisoned").clone();
            if expires_in > now() {
                return Ok(token);
            }
        }

        let url = format!("{}/latest/api/token", self.endpoint(ctx));
        let req = http::Request::builder()
            .uri(&url)
            .method(Method::PUT)
            .header(CONTENT_LENGTH, "0")
            .header("x-aws-ec2-metadata-token-ttl-seconds", TOKEN_TTL_SECONDS.to_string())
            .body(Bytes::new())?;

        let resp = ctx.http_send_as_string(req).await?;
        if resp.status() != http::StatusCode::OK {
            return Err(Error::credential_unavailable(format!(
                "failed to fetch IMDS token: status={}, body={}",
                resp.status(),
                resp.body()
            )));
        }
        let token = resp.into_body();

        // Refresh ten minutes before the metadata service would expire it.
        let expires_in = now() + chrono::TimeDelta::try_seconds(TOKEN_TTL_SECONDS - 600).expect("in bounds");
        *self.token.lock().expect("lock poisoned") = (token.clone(), expires_in);

        Ok(token)
    }

    async fn get(&self, ctx: &Context, path: &str, token: &str) -> Result<String> {
        let url = format!("{}{path}", self.endpoint(ctx));
        let req = http::Request::builder()
            .uri(&url)
            .method(Method::GET)
            .header("x-aws-ec2-metadata-token", token)
            .body(Bytes::new())?;

        let resp = ctx.http_send_as_string(req).await?;
        if resp.status() != http::StatusCode::OK {
            return Err(Error::credential_unavailable(format!(
                "request to IMDS {path} failed: status={}, body={}",
                resp.status(),
                resp.body()
            )));
        }
        Ok(resp.into_body())
    }
}

#[async_trait]
impl ProvideCredential for IMDSv2CredentialProvider {
    type Credential = Credential;

    async fn provide_credential(&self, ctx: &Context) -> Result<Option<Self::Credential>> {
        if ctx
            .env_var(AWS_EC2_METADATA_DISABLED)
            .is_some_and(|v| v.eq_ignore_ascii_case("true"))
        {
            return Ok(None);
        }

        let token = self.load_token(ctx).await?;

        let role = self
            .get(ctx, "/latest/meta-data/iam/security-credentials/", &token)
            .await?;
        let role = role.lines().next().unwrap_or_default().trim().to_string();
        if role.is_empty() {
            return Err(Error::credential_unavailable(
                "no IAM role attached to EC2 instance",
            ));
        }

        let content = self
            .get(
                ctx,
                &format!("/latest/meta-data/iam/security-credentials/{role}"),
                &token,
            )
            .await?;
        let resp: InstanceCredentials = serde_json::from_str(&content).map_err(|e| {
            Error::unexpected("failed to parse IMDS credentials response").with_source(e)
        })?;

        match resp.code.as_str() {
            "Success" => {}
            "AssumeRoleUnauthorizedAccess" => {
                return Err(Error::credential_denied(format!(
                    "EC2 instance not authorized to assume role {role}: {}",
                    resp.message
                )))
            }
            code if code.contains("Expired") => {
                return Err(Error::credential_expired(format!(
                    "IMDS credentials expired: {}",
                    resp.message
                )))
            }
            code => {
                return Err(Error::unexpected(format!(
                    "IMDS returned error: [{code}] {}",
                    resp.message
                )))
            }
        }

        Ok(Some(Credential {
            access_key_id: resp.access_key_id,
            secret_access_key: resp.secret_access_key,
            session_token: Some(resp.token),
            expires_in: Some(parse_rfc3339(&resp.expiration)?),
        }))
    }
}

#[derive(Default, Debug, Deserialize)]
#[serde(default, rename_all = "PascalCase")]
struct InstanceCredentials {
    access_key_id: String,
    secret_access_key: String,
    token: String,
    expiration: String,

    code: String,
    message: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provide_credential::test_utils::MockHttpSend;
    use graphsign_core::{ErrorKind, StaticEnv};
    use pretty_assertions::assert_eq;
    use std::collections::HashMap;

    fn ctx(http: MockHttpSend, envs: &[(&str, &str)]) -> Context {
        Context::new().with_http_send(http).with_env(StaticEnv {
            home_dir: None,
            envs: envs
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect::<HashMap<_, _>>(),
        })
    }

    fn metadata(code: &str) -> MockHttpSend {
        MockHttpSend::default()
            .route(Method::PUT, "/latest/api/token", 200, "imds-token")
            .route(
                Method::GET,
                "/latest/meta-data/iam/security-credentials/",
                200,
                "graph-role\n",
            )
            .route(
                Method::GET,
                "/latest/meta-data/iam/security-credentials/graph-role",
                200,
                &format!(
                    r#"{{
                        "Code": "{code}",
                        "AccessKeyId": "instance_ak",
                        "SecretAccessKey": "instance_sk",
                        "Token": "instance_token",
                        "Expiration": "2124-05-01T00:00:00Z"
                    }}"#
                ),
            )
    }

    #[tokio::test]
    async fn test_imds_disabled() -> anyhow::Result<()> {
        let http = metadata("Success");
        let seen = http.seen.clone();

        let cred = IMDSv2CredentialProvider::new()
            .provide_credential(&ctx(http, &[(AWS_EC2_METADATA_DISABLED, "true")]))
            .await?;
        assert!(cred.is_none());
        assert!(seen.lock().unwrap().is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn test_imds_loads_role_credential() -> anyhow::Result<()> {
        let _ = env_logger::builder().is_test(true).try_init();

        let http = metadata("Success");
        let seen = http.seen.clone();
        let ctx = ctx(http, &[]);
        let provider = IMDSv2CredentialProvider::new();

        let cred = provider
            .provide_credential(&ctx)
            .await?
            .expect("credential must be loaded");
        assert_eq!(cred.access_key_id, "instance_ak");
        assert_eq!(cred.secret_access_key, "instance_sk");
        assert_eq!(cred.session_token, Some("instance_token".to_string()));

        {
            let seen = seen.lock().unwrap();
            assert_eq!(seen.len(), 3);
            assert_eq!(seen[0].uri().to_string(), "http://169.254.169.254/latest/api/token");
            assert_eq!(seen[1].headers()["x-aws-ec2-metadata-token"], "imds-token");
        }

        // The session token is reused on the second load.
        provider.provide_credential(&ctx).await?;
        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 5);
        assert_eq!(seen[3].method(), Method::GET);
        Ok(())
    }

    #[tokio::test]
    async fn test_imds_denied() {
        let err = IMDSv2CredentialProvider::new()
            .provide_credential(&ctx(metadata("AssumeRoleUnauthorizedAccess"), &[]))
            .await
            .expect_err("unauthorized must fail");
        assert_eq!(err.kind(), ErrorKind::CredentialDenied);
    }

    #[tokio::test]
    async fn test_imds_expired() {
        let err = IMDSv2CredentialProvider::new()
            .provide_credential(&ctx(metadata("InstanceProfileExpired"), &[]))
            .await
            .expect_err("expired profile must fail");
        assert_eq!(err.kind(), ErrorKind::CredentialExpired);
    }

    #[tokio::test]
    async fn test_imds_unreachable() {
        let err = IMDSv2CredentialProvider::new()
            .with_endpoint("http://127.0.0.1:1")
            .provide_credential(&ctx(MockHttpSend::default(), &[]))
            .await
            .expect_err("unreachable endpoint must fail");
        assert_eq!(err.kind(), ErrorKind::Unexpected);
    }
}
