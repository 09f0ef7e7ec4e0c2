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

use crate::{Error, Result};
use bytes::Bytes;
use std::collections::HashMap;
use std::fmt::Debug;
use std::path::PathBuf;
use std::sync::Arc;

/// Outside world as seen by credential providers and configuration loading.
///
/// Every seam starts out unconfigured: file reads and http sends fail, and
/// the environment is empty. Install real implementations with the `with_*`
/// methods.
///
/// ```
/// use graphsign_core::{Context, OsEnv};
///
/// let ctx = Context::new().with_env(OsEnv);
/// assert!(ctx.env_var("GRAPHSIGN_SURELY_UNSET").is_none());
/// ```
#[derive(Debug, Clone)]
pub struct Context {
    fs: Arc<dyn FileRead>,
    http: Arc<dyn HttpSend>,
    env: Arc<dyn Env>,
}

impl Default for Context {
    fn default() -> Self {
        Self::new()
    }
}

impl Context {
    /// A context with nothing configured.
    pub fn new() -> Self {
        let unconfigured = Arc::new(Unconfigured);
        Self {
            fs: unconfigured.clone(),
            http: unconfigured.clone(),
            env: unconfigured,
        }
    }

    /// Use `fs` for file reads.
    pub fn with_file_read(mut self, fs: impl FileRead) -> Self {
        self.fs = Arc::new(fs);
        self
    }

    /// Use `http` for credential endpoint calls.
    pub fn with_http_send(mut self, http: impl HttpSend) -> Self {
        self.http = Arc::new(http);
        self
    }

    /// Use `env` for environment lookups.
    pub fn with_env(mut self, env: impl Env) -> Self {
        self.env = Arc::new(env);
        self
    }

    /// Read a whole file.
    pub async fn file_read(&self, path: &str) -> Result<Vec<u8>> {
        self.fs.file_read(path).await
    }

    /// Read a whole file as text. Invalid utf-8 is replaced, not rejected.
    pub async fn file_read_as_string(&self, path: &str) -> Result<String> {
        let bytes = self.file_read(path).await?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    /// Send a small, fully buffered request.
    pub async fn http_send(&self, req: http::Request<Bytes>) -> Result<http::Response<Bytes>> {
        self.http.http_send(req).await
    }

    /// Like [`Context::http_send`], with the body decoded as text.
    pub async fn http_send_as_string(
        &self,
        req: http::Request<Bytes>,
    ) -> Result<http::Response<String>> {
        let resp = self.http_send(req).await?;
        Ok(resp.map(|body| String::from_utf8_lossy(&body).into_owned()))
    }

    /// Value of the environment variable `key`, if set and valid utf-8.
    pub fn env_var(&self, key: &str) -> Option<String> {
        self.env.var(key)
    }

    /// Replace a leading `~` with the home directory.
    ///
    /// Paths without a leading `~/` (or `~\`) come back unchanged. Returns
    /// `None` when expansion is needed but no home directory is known.
    pub fn expand_home_dir(&self, path: &str) -> Option<String> {
        let Some(rest) = path.strip_prefix("~/").or_else(|| path.strip_prefix("~\\")) else {
            return Some(path.to_string());
        };
        let home = self.env.home_dir()?;
        Some(home.join(rest).to_string_lossy().into_owned())
    }
}

/// Reads whole files, such as shared credential and config files.
#[async_trait::async_trait]
pub trait FileRead: Debug + Send + Sync + 'static {
    /// Read the file at `path` entirely.
    async fn file_read(&self, path: &str) -> Result<Vec<u8>>;
}

/// Sends the small requests credential providers make to metadata and
/// container endpoints.
///
/// Proxied upstream traffic does not go through this seam.
#[async_trait::async_trait]
pub trait HttpSend: Debug + Send + Sync + 'static {
    /// Send `req` and buffer the whole response.
    async fn http_send(&self, req: http::Request<Bytes>) -> Result<http::Response<Bytes>>;
}

/// Environment lookups.
pub trait Env: Debug + Send + Sync + 'static {
    /// Value of `key`, `None` when unset or not utf-8.
    fn var(&self, key: &str) -> Option<String>;

    /// Home directory of the current user, if it can be found.
    fn home_dir(&self) -> Option<PathBuf>;
}

/// The process environment.
#[derive(Debug, Copy, Clone)]
pub struct OsEnv;

impl Env for OsEnv {
    fn var(&self, key: &str) -> Option<String> {
        std::env::var_os(key)?.into_string().ok()
    }

    #[cfg(unix)]
    fn home_dir(&self) -> Option<PathBuf> {
        std::env::var_os("HOME")
            .filter(|s| !s.is_empty())
            .map(PathBuf::from)
    }

    #[cfg(not(unix))]
    fn home_dir(&self) -> Option<PathBuf> {
        std::env::var_os("USERPROFILE")
            .filter(|s| !s.is_empty())
            .map(PathBuf::from)
    }
}

/// A fixed environment, for tests and embedding.
#[derive(Debug, Clone, Default)]
pub struct StaticEnv {
    /// Home directory to report.
    pub home_dir: Option<PathBuf>,
    /// Variables to report.
    pub envs: HashMap<String, String>,
}

impl Env for StaticEnv {
    fn var(&self, key: &str) -> Option<String> {
        self.envs.get(key).cloned()
    }

    fn home_dir(&self) -> Option<PathBuf> {
        self.home_dir.clone()
    }
}

/// Stand-in for every seam a [`Context`] was not given.
#[derive(Debug, Clone, Copy)]
struct Unconfigured;

#[async_trait::async_trait]
impl FileRead for Unconfigured {
    async fn file_read(&self, path: &str) -> Result<Vec<u8>> {
        Err(Error::unexpected(format!(
            "cannot read {path}: no file reader configured"
        )))
    }
}

#[async_trait::async_trait]
impl HttpSend for Unconfigured {
    async fn http_send(&self, req: http::Request<Bytes>) -> Result<http::Response<Bytes>> {
        Err(Error::unexpected(format!(
            "cannot send request to {}: no http client configured",
            req.uri()
        )))
    }
}

impl Env for Unconfigured {
    fn var(&self, _: &str) -> Option<String> {
        None
    }

    fn home_dir(&self) -> Option<PathBuf> {
        None
    }
}
