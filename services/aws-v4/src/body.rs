use bytes::Bytes;
use graphsign_core::{Error, Result};
use percent_encoding::utf8_percent_encode;

use crate::constants::AWS_QUERY_ENCODE_SET;

/// Body of an outbound request, before it is turned into the bytes that are
/// both hashed for the signature and written on the wire.
///
/// Variants are listed in the order they take precedence when a caller has
/// more than one way to describe the same payload: text, form pairs, binary,
/// then the JSON fallback.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum SignableBody {
    /// No body, signed as the empty payload.
    #[default]
    Empty,
    /// Text used verbatim.
    Text(String),
    /// URL-encoded form pairs, serialized as `k=v&k=v`.
    Form(Vec<(String, String)>),
    /// Raw bytes used verbatim.
    Binary(Bytes),
    /// Structured value with no more specific representation.
    ///
    /// NOTE: a value intended to be form-encoded but handed over as JSON is
    /// serialized as JSON here, and the upstream will see (and verify) JSON.
    Json(serde_json::Value),
    /// File-bearing multipart payload. It cannot be signed deterministically.
    Multipart,
}

impl SignableBody {
    /// Normalize the body into its signable byte form.
    pub fn to_bytes(&self) -> Result<Bytes> {
        match self {
            SignableBody::Empty => Ok(Bytes::new()),
            SignableBody::Text(s) => Ok(Bytes::from(s.clone())),
            SignableBody::Form(pairs) => Ok(Bytes::from(encode_form(pairs))),
            SignableBody::Binary(bs) => Ok(bs.clone()),
            SignableBody::Json(v) => serde_json::to_vec(v).map(Bytes::from).map_err(|e| {
                Error::unexpected("failed to serialize json body").with_source(e)
            }),
            SignableBody::Multipart => Err(Error::body_unsupported(
                "multipart bodies cannot be signed",
            )),
        }
    }

    /// Whether this body carries no payload.
    pub fn is_empty(&self) -> bool {
        match self {
            SignableBody::Empty => true,
            SignableBody::Text(s) => s.is_empty(),
            SignableBody::Form(pairs) => pairs.is_empty(),
            SignableBody::Binary(bs) => bs.is_empty(),
            SignableBody::Json(_) | SignableBody::Multipart => false,
        }
    }
}

impl From<String> for SignableBody {
    fn from(value: String) -> Self {
        SignableBody::Text(value)
    }
}

impl From<&str> for SignableBody {
    fn from(value: &str) -> Self {
        SignableBody::Text(value.to_string())
    }
}

impl From<Bytes> for SignableBody {
    fn from(value: Bytes) -> Self {
        SignableBody::Binary(value)
    }
}

impl From<serde_json::Value> for SignableBody {
    fn from(value: serde_json::Value) -> Self {
        SignableBody::Json(value)
    }
}

/// Serialize form pairs with the same encoding the canonical query uses.
pub fn encode_form(pairs: &[(String, String)]) -> String {
    pairs
        .iter()
        .map(|(k, v)| {
            format!(
                "{}={}",
                utf8_percent_encode(k, &AWS_QUERY_ENCODE_SET),
                utf8_percent_encode(v, &AWS_QUERY_ENCODE_SET)
            )
        })
        .collect::<Vec<_>>()
        .join("&")
}
