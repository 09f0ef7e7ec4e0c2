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
use graphsign_core::{Context, Error, ProvideCredential, Result};
use ini::Ini;
use log::debug;

/// ProfileCredentialProvider loads credentials from the shared AWS files.
///
/// - `~/.aws/credentials` (or the path specified by `AWS_SHARED_CREDENTIALS_FILE`)
/// - `~/.aws/config` (or the path specified by `AWS_CONFIG_FILE`)
///
/// The credentials file wins over the config file. The profile is taken from
/// `AWS_PROFILE`, then `with_profile()`, then `default`.
#[derive(Debug)]
pub struct ProfileCredentialProvider {
    profile: Option<String>,
    config_file: Option<String>,
    credentials_file: Option<String>,
}

impl Default for ProfileCredentialProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl ProfileCredentialProvider {
    /// Create a new ProfileCredentialProvider with default settings.
    pub fn new() -> Self {
        Self {
            profile: None,
            config_file: None,
            credentials_file: None,
        }
    }

    /// Set the profile name to use when `AWS_PROFILE` is not set.
    pub fn with_profile(mut self, profile: impl Into<String>) -> Self {
        self.profile = Some(profile.into());
        self
    }

    /// Set the path to the config file.
    pub fn with_config_file(mut self, path: impl Into<String>) -> Self {
        self.config_file = Some(path.into());
        self
    }

    /// Set the path to the credentials file.
    pub fn with_credentials_file(mut self, path: impl Into<String>) -> Self {
        self.credentials_file = Some(path.into());
        self
    }

    fn profile(&self, ctx: &Context) -> String {
        ctx.env_var(AWS_PROFILE)
            .filter(|v| !v.is_empty())
            .or_else(|| self.profile.clone())
            .unwrap_or_else(|| "default".to_string())
    }

    /// Read and parse an ini file. A missing file is not an error.
    async fn load_ini(ctx: &Context, path: &str) -> Result<Option<Ini>> {
        let Some(path) = ctx.expand_home_dir(path) else {
            debug!("failed to expand homedir for path: {path}");
            return Ok(None);
        };

        let content = match ctx.file_read_as_string(&path).await {
            Ok(content) => content,
            Err(err) => {
                debug!("failed to read profile file {path}: {err}");
                return Ok(None);
            }
        };

        Ini::load_from_str(&content)
            .map(Some)
            .map_err(|e| Error::config_invalid(format!("failed to parse {path}")).with_source(e))
    }

    async fn load_section(
        ctx: &Context,
        path: &str,
        section: &str,
    ) -> Result<Option<Credential>> {
        let Some(conf) = Self::load_ini(ctx, path).await? else {
            return Ok(None);
        };
        let Some(props) = conf.section(Some(section)) else {
            debug!("section {section} not found in {path}");
            return Ok(None);
        };

        match (
            props.get("aws_access_key_id"),
            props.get("aws_secret_access_key"),
        ) {
            (Some(ak), Some(sk)) => Ok(Some(Credential {
                access_key_id: ak.to_string(),
                secret_access_key: sk.to_string(),
                session_token: props.get("aws_session_token").map(|s| s.to_string()),
                expires_in: None,
            })),
            _ => Ok(None),
        }
    }
}

#[async_trait]
impl ProvideCredential for ProfileCredentialProvider {
    type Credential = Credential;

    async fn provide_credential(&self, ctx: &Context) -> Result<Option<Self::Credential>> {
        let profile = self.profile(ctx);

        let credentials_file = self
            .credentials_file
            .clone()
            .or_else(|| ctx.env_var(AWS_SHARED_CREDENTIALS_FILE))
            .unwrap_or_else(|| "~/.aws/credentials".to_string());
        if let Some(cred) = Self::load_section(ctx, &credentials_file, &profile).await? {
            return Ok(Some(cred));
        }

        let config_file = self
            .config_file
            .clone()
            .or_else(|| ctx.env_var(AWS_CONFIG_FILE))
            .unwrap_or_else(|| "~/.aws/config".to_string());
        // The config file names non-default sections `profile <name>`.
        let section = match profile.as_str() {
            "default" => "default".to_string(),
            x => format!("profile {x}"),
        };
        Self::load_section(ctx, &config_file, &section).await
    }
}
