use crate::constants::{
    ALGORITHM, AWS4_REQUEST, AWS_QUERY_ENCODE_SET, X_AMZ_DATE, X_AMZ_SECURITY_TOKEN,
};
use crate::Credential;
use async_trait::async_trait;
use graphsign_core::hash::{hex_hmac_sha256, hex_sha256, hmac_sha256};
use graphsign_core::time::{format_date, format_iso8601, now, DateTime};
use graphsign_core::{Context, Error, Result, SignRequest, SigningRequest};
use http::request::Parts;
use http::{header, HeaderValue};
use log::debug;
use percent_encoding::utf8_percent_encode;
use std::fmt::{self, Display, Write};

/// RequestSigner that implement AWS SigV4.
///
/// Only `host`, `x-amz-date` and, with a session token,
/// `x-amz-security-token` are signed. The payload is always hashed; there is
/// no unsigned-payload mode.
///
/// - [Signature Version 4 signing process](https://docs.aws.amazon.com/general/latest/gr/signature-version-4.html)
#[derive(Debug, Clone)]
pub struct RequestSigner {
    service: String,
    region: String,

    time: Option<DateTime>,
}

impl RequestSigner {
    /// Create a new builder for AWS V4 signer.
    pub fn new(service: &str, region: &str) -> Self {
        Self {
            service: service.into(),
            region: region.into(),

            time: None,
        }
    }

    /// Specify the signing time.
    ///
    /// # Note
    ///
    /// We should always take current time to sign requests.
    /// Only use this function for testing.
    pub fn with_time(mut self, time: DateTime) -> Self {
        self.time = Some(time);
        self
    }

    /// Service this signer signs for.
    pub fn service(&self) -> &str {
        &self.service
    }

    /// Region this signer signs for.
    pub fn region(&self) -> &str {
        &self.region
    }
}

#[async_trait]
impl SignRequest for RequestSigner {
    type Credential = Credential;

    async fn sign_request(
        &self,
        _: &Context,
        req: &mut Parts,
        body: &[u8],
        cred: &Self::Credential,
    ) -> Result<()> {
        let now = self.time.unwrap_or_else(now);
        let mut signed_req = SigningRequest::build(req)?;

        // canonicalize context
        canonicalize_header(&mut signed_req, cred, now)?;
        let creq = CanonicalRequest::new(&signed_req, cred.session_token.is_some(), body)?;
        debug!("calculated canonical request: {creq}");

        // Scope: "20220313/<region>/<service>/aws4_request"
        let scope = format!(
            "{}/{}/{}/{AWS4_REQUEST}",
            format_date(now),
            self.region,
            self.service
        );
        debug!("calculated scope: {scope}");

        // StringToSign:
        //
        // AWS4-HMAC-SHA256
        // 20220313T072004Z
        // 20220313/<region>/<service>/aws4_request
        // <hashed_canonical_request>
        let string_to_sign = {
            let mut f = String::new();
            writeln!(f, "{ALGORITHM}")?;
            writeln!(f, "{}", format_iso8601(now))?;
            writeln!(f, "{}", &scope)?;
            write!(f, "{}", hex_sha256(creq.to_string().as_bytes()))?;
            f
        };
        debug!("calculated string to sign: {string_to_sign}");

        let signing_key =
            generate_signing_key(&cred.secret_access_key, now, &self.region, &self.service);
        let signature = hex_hmac_sha256(&signing_key, string_to_sign.as_bytes());

        let mut authorization = HeaderValue::from_str(&format!(
            "{ALGORITHM} Credential={}/{}, SignedHeaders={}, Signature={}",
            cred.access_key_id,
            scope,
            creq.signed_headers.join(";"),
            signature
        ))
        .map_err(|e| {
            Error::request_invalid("failed to create authorization header").with_source(e)
        })?;
        authorization.set_sensitive(true);

        signed_req
            .headers
            .insert(header::AUTHORIZATION, authorization);

        // Apply to the request.
        signed_req.apply(req)
    }
}

/// Canonical form of a request, as hashed into the string to sign.
///
/// `Display` renders the exact canonical request string:
///
/// ```text
/// METHOD
/// /path
/// canonical_query
/// host:example.com
/// x-amz-date:20150830T123600Z
///
/// host;x-amz-date
/// body_hash
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CanonicalRequest {
    /// Upper case HTTP method.
    pub method: String,
    /// Path as given by the URI parser.
    pub path: String,
    /// Sorted, AWS-encoded query string. Empty when there is no query.
    pub query: String,
    /// `name:value` lines of signed headers, sorted by name.
    pub headers: Vec<(String, String)>,
    /// Sorted lower-case signed header names.
    pub signed_headers: Vec<String>,
    /// Hex encoded sha256 of the payload.
    pub body_hash: String,
}

impl CanonicalRequest {
    /// Build the canonical request from an already canonicalized signing request.
    ///
    /// `host` and `x-amz-date` must already be present in the headers, and
    /// `x-amz-security-token` too when `with_token` is set.
    pub fn new(req: &SigningRequest, with_token: bool, body: &[u8]) -> Result<Self> {
        let mut names = vec![header::HOST.as_str(), X_AMZ_DATE];
        if with_token {
            names.push(X_AMZ_SECURITY_TOKEN);
        }
        names.sort_unstable();

        let mut headers = Vec::with_capacity(names.len());
        for name in &names {
            let value = req
                .headers
                .get(*name)
                .ok_or_else(|| Error::request_invalid(format!("signed header {name} is missing")))?
                .to_str()?;
            headers.push((name.to_string(), value.to_string()));
        }

        Ok(Self {
            method: req.method.as_str().to_string(),
            path: req.path.clone(),
            query: canonical_query_string(&req.query),
            headers,
            signed_headers: names.into_iter().map(String::from).collect(),
            body_hash: hex_sha256(body),
        })
    }
}

impl Display for CanonicalRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}", self.method)?;
        writeln!(f, "{}", self.path)?;
        writeln!(f, "{}", self.query)?;
        writeln!(
            f,
            "{}",
            SigningRequest::header_to_string(self.headers.clone(), ":", "\n")
        )?;
        writeln!(f)?;
        writeln!(f, "{}", self.signed_headers.join(";"))?;
        write!(f, "{}", self.body_hash)
    }
}

/// Build the canonical query string from decoded query pairs.
///
/// Pairs are encoded with the AWS set, sorted by key then value, and joined
/// with `&`. A key without value renders as `key=`.
///
/// Sorting compares the encoded bytes, not the decoded text.
pub fn canonical_query_string(query: &[(String, String)]) -> String {
    let mut pairs = query
        .iter()
        .map(|(k, v)| {
            (
                utf8_percent_encode(k, &AWS_QUERY_ENCODE_SET).to_string(),
                utf8_percent_encode(v, &AWS_QUERY_ENCODE_SET).to_string(),
            )
        })
        .collect::<Vec<_>>();
    pairs.sort();

    pairs
        .iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join("&")
}

fn canonicalize_header(
    ctx: &mut SigningRequest,
    cred: &Credential,
    now: DateTime,
) -> Result<()> {
    // Header names and values need to be normalized according to Step 4 of https://docs.aws.amazon.com/general/latest/gr/sigv4-create-canonical-request.html
    for (_, value) in ctx.headers.iter_mut() {
        SigningRequest::header_value_normalize(value)
    }

    // HOST always follows the url so that the signature matches what is sent.
    let host = HeaderValue::from_str(&ctx.host_with_port()).map_err(|e| {
        Error::request_invalid("failed to parse authority as header value").with_source(e)
    })?;
    ctx.headers.insert(header::HOST, host);

    let date = HeaderValue::try_from(format_iso8601(now))
        .map_err(|e| Error::unexpected("failed to create date header").with_source(e))?;
    ctx.headers.insert(X_AMZ_DATE, date);

    match &cred.session_token {
        Some(token) => {
            let mut value = HeaderValue::from_str(token).map_err(|e| {
                Error::credential_invalid("session token is not a valid header value")
                    .with_source(e)
            })?;
            // Set token value sensitive to avoid leaking.
            value.set_sensitive(true);

            ctx.headers.insert(X_AMZ_SECURITY_TOKEN, value);
        }
        None => {
            ctx.headers.remove(X_AMZ_SECURITY_TOKEN);
        }
    }

    Ok(())
}

/// Derive the signing key: `kDate -> kRegion -> kService -> kSigning`.
///
/// Every intermediate key lives only inside this call.
fn generate_signing_key(secret: &str, time: DateTime, region: &str, service: &str) -> Vec<u8> {
    // Sign secret
    let secret = format!("AWS4{secret}");
    // Sign date
    let sign_date = hmac_sha256(secret.as_bytes(), format_date(time).as_bytes());
    // Sign region
    let sign_region = hmac_sha256(sign_date.as_slice(), region.as_bytes());
    // Sign service
    let sign_service = hmac_sha256(sign_region.as_slice(), service.as_bytes());
    // Sign request
    hmac_sha256(sign_service.as_slice(), AWS4_REQUEST.as_bytes())
}
