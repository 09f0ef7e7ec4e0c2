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

use std::fmt;
use thiserror::Error;

/// Error raised while loading credentials, signing, or reading configuration.
///
/// Callers branch on [`Error::kind`]; the message is for humans and the
/// source, when present, keeps the underlying failure for `{:#}` output.
#[derive(Error, Debug)]
#[error("{kind}: {message}")]
pub struct Error {
    kind: ErrorKind,
    message: String,
    #[source]
    source: Option<anyhow::Error>,
}

/// What went wrong, coarse enough to pick an HTTP status from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// A provider found a credential but could not make sense of it.
    CredentialInvalid,
    /// The credential source reported the credential as expired.
    CredentialExpired,
    /// The credential source refused to hand out a credential.
    CredentialDenied,
    /// No provider could supply a credential.
    CredentialUnavailable,
    /// The request cannot be turned into a signable form.
    RequestInvalid,
    /// The request body cannot be signed deterministically.
    BodyUnsupported,
    /// A configuration value is malformed or out of range.
    ConfigInvalid,
    /// Anything else: I/O, network, malformed service replies.
    Unexpected,
}

impl ErrorKind {
    /// Short human readable label used as the message prefix.
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::CredentialInvalid => "invalid credentials",
            ErrorKind::CredentialExpired => "expired credentials",
            ErrorKind::CredentialDenied => "credential access denied",
            ErrorKind::CredentialUnavailable => "credentials unavailable",
            ErrorKind::RequestInvalid => "invalid request",
            ErrorKind::BodyUnsupported => "unsupported body type",
            ErrorKind::ConfigInvalid => "invalid configuration",
            ErrorKind::Unexpected => "unexpected error",
        }
    }

    /// Whether this kind comes from credential resolution.
    pub fn is_credential(&self) -> bool {
        matches!(
            self,
            ErrorKind::CredentialInvalid
                | ErrorKind::CredentialExpired
                | ErrorKind::CredentialDenied
                | ErrorKind::CredentialUnavailable
        )
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Error {
    /// Build an error of `kind`.
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            source: None,
        }
    }

    /// Attach the underlying failure.
    pub fn with_source(mut self, source: impl Into<anyhow::Error>) -> Self {
        self.source = Some(source.into());
        self
    }

    /// Kind of this error.
    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// Message without the kind prefix.
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Shorthand for an [`ErrorKind::CredentialInvalid`] error.
    pub fn credential_invalid(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::CredentialInvalid, message)
    }

    /// Shorthand for an [`ErrorKind::CredentialExpired`] error.
    pub fn credential_expired(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::CredentialExpired, message)
    }

    /// Shorthand for an [`ErrorKind::CredentialDenied`] error.
    pub fn credential_denied(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::CredentialDenied, message)
    }

    /// Shorthand for an [`ErrorKind::CredentialUnavailable`] error.
    pub fn credential_unavailable(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::CredentialUnavailable, message)
    }

    /// Shorthand for an [`ErrorKind::RequestInvalid`] error.
    pub fn request_invalid(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::RequestInvalid, message)
    }

    /// Shorthand for an [`ErrorKind::BodyUnsupported`] error.
    pub fn body_unsupported(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::BodyUnsupported, message)
    }

    /// Shorthand for an [`ErrorKind::ConfigInvalid`] error.
    pub fn config_invalid(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::ConfigInvalid, message)
    }

    /// Shorthand for an [`ErrorKind::Unexpected`] error.
    pub fn unexpected(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Unexpected, message)
    }

    /// Wrap a foreign error, keeping its text as the message.
    fn wrap<E>(kind: ErrorKind, err: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::new(kind, err.to_string()).with_source(err)
    }
}

/// Result alias used across the workspace.
pub type Result<T> = std::result::Result<T, Error>;

impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        Self::unexpected(format!("{err:#}")).with_source(err)
    }
}

// Failures while building or editing a request are the caller's fault.
impl From<http::Error> for Error {
    fn from(err: http::Error) -> Self {
        Self::wrap(ErrorKind::RequestInvalid, err)
    }
}

impl From<http::header::InvalidHeaderValue> for Error {
    fn from(err: http::header::InvalidHeaderValue) -> Self {
        Self::wrap(ErrorKind::RequestInvalid, err)
    }
}

impl From<http::header::InvalidHeaderName> for Error {
    fn from(err: http::header::InvalidHeaderName) -> Self {
        Self::wrap(ErrorKind::RequestInvalid, err)
    }
}

impl From<http::header::ToStrError> for Error {
    fn from(err: http::header::ToStrError) -> Self {
        Self::wrap(ErrorKind::RequestInvalid, err)
    }
}

impl From<http::uri::InvalidUri> for Error {
    fn from(err: http::uri::InvalidUri) -> Self {
        Self::wrap(ErrorKind::RequestInvalid, err)
    }
}

impl From<http::uri::InvalidUriParts> for Error {
    fn from(err: http::uri::InvalidUriParts) -> Self {
        Self::wrap(ErrorKind::RequestInvalid, err)
    }
}

// Everything local that is not about the request itself.
impl From<fmt::Error> for Error {
    fn from(err: fmt::Error) -> Self {
        Self::wrap(ErrorKind::Unexpected, err)
    }
}

impl From<std::string::FromUtf8Error> for Error {
    fn from(err: std::string::FromUtf8Error) -> Self {
        Self::wrap(ErrorKind::Unexpected, err)
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Self::wrap(ErrorKind::Unexpected, err)
    }
}
