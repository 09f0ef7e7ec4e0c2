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

//! Tokio-based file reading implementation for graphsign.
//!
//! `TokioFileRead` implements the `FileRead` trait from `graphsign_core` on
//! top of `tokio::fs`, so shared credential files can be loaded without
//! blocking the proxy's runtime.
//!
//! ## Example
//!
//! ```no_run
//! use graphsign_core::{Context, OsEnv};
//! use graphsign_file_read_tokio::TokioFileRead;
//!
//! #[tokio::main]
//! async fn main() {
//!     let ctx = Context::new()
//!         .with_file_read(TokioFileRead)
//!         .with_env(OsEnv);
//!
//!     match ctx.file_read("/home/graph/.aws/credentials").await {
//!         Ok(content) => println!("Read {} bytes", content.len()),
//!         Err(e) => eprintln!("Failed to read file: {}", e),
//!     }
//! }
//! ```

use async_trait::async_trait;
use graphsign_core::{Error, FileRead, Result};

/// Tokio-based implementation of the `FileRead` trait.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioFileRead;

#[async_trait]
impl FileRead for TokioFileRead {
    async fn file_read(&self, path: &str) -> Result<Vec<u8>> {
        tokio::fs::read(path)
            .await
            .map_err(|e| Error::unexpected(format!("failed to read file {path}")).with_source(e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[tokio::test]
    async fn test_file_read() -> Result<()> {
        let mut f = tempfile::NamedTempFile::new()?;
        f.write_all(b"[default]\naws_access_key_id = test\n")?;

        let path = f.path().to_string_lossy().to_string();
        let content = TokioFileRead.file_read(&path).await?;
        assert_eq!(content, b"[default]\naws_access_key_id = test\n");

        Ok(())
    }

    #[tokio::test]
    async fn test_file_read_not_exist() {
        let err = TokioFileRead
            .file_read("/this/path/does/not/exist")
            .await
            .expect_err("missing file must fail");
        assert!(err.to_string().contains("/this/path/does/not/exist"));
    }
}
