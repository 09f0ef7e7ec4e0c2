//! Helpers for keeping secrets out of logs.

use http::HeaderValue;
use std::fmt::{Debug, Display, Formatter};

/// Masks a secret when formatted.
///
/// Values of 12 bytes or more keep their first and last three characters so
/// that two different keys can still be told apart in a log line. Anything
/// shorter is fully masked.
#[derive(Clone, Copy)]
pub struct Redact<'a>(&'a str);

impl<'a> From<&'a str> for Redact<'a> {
    fn from(value: &'a str) -> Self {
        Redact(value)
    }
}

impl<'a> From<&'a String> for Redact<'a> {
    fn from(value: &'a String) -> Self {
        Redact(value.as_str())
    }
}

impl<'a> From<&'a Option<String>> for Redact<'a> {
    fn from(value: &'a Option<String>) -> Self {
        Redact(value.as_deref().unwrap_or_default())
    }
}

impl<'a> From<&'a HeaderValue> for Redact<'a> {
    /// Non visible-ascii header values are masked as a whole.
    fn from(value: &'a HeaderValue) -> Self {
        match value.to_str() {
            Ok(v) => Redact(v),
            Err(_) => Redact("<opaque>"),
        }
    }
}

impl Redact<'_> {
    fn edges(&self) -> Option<(&str, &str)> {
        let n = self.0.len();
        if n < 12 {
            return None;
        }
        let head = self.0.get(..3)?;
        let tail = self.0.get(n - 3..)?;
        Some((head, tail))
    }
}

impl Display for Redact<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        if self.0.is_empty() {
            return f.write_str("EMPTY");
        }
        match self.edges() {
            Some((head, tail)) => write!(f, "{head}***{tail}"),
            None => f.write_str("***"),
        }
    }
}

impl Debug for Redact<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        Display::fmt(self, f)
    }
}
