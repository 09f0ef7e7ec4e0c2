mod canonical;
mod standard;

use anyhow::Result;
use chrono::{TimeZone, Utc};
use graphsign_aws_v4::{Credential, RequestSigner};
use graphsign_core::time::DateTime;
use graphsign_core::{Context, SignRequest};
use http::request::Parts;
use http::{Method, Request};
use log::debug;

/// Fixed time used by the published SigV4 suite.
pub fn suite_time() -> DateTime {
    Utc.with_ymd_and_hms(2015, 8, 30, 12, 36, 0)
        .single()
        .expect("time must be valid")
}

/// Credential used by the published SigV4 suite.
pub fn suite_credential() -> Credential {
    Credential {
        access_key_id: "AKIDEXAMPLE".to_string(),
        secret_access_key: "wJalrXUtnFEMI/K7MDENG+bPxRfiCYEXAMPLEKEY".to_string(),
        session_token: None,
        expires_in: None,
    }
}

/// Sign a request the way the suite expects: region `us-east-1`, service `service`.
pub async fn sign_suite_request(method: Method, uri: &str, body: &[u8]) -> Result<Parts> {
    let _ = env_logger::builder().is_test(true).try_init();

    let (mut parts, _) = Request::builder()
        .method(method)
        .uri(uri)
        .body(())?
        .into_parts();

    RequestSigner::new("service", "us-east-1")
        .with_time(suite_time())
        .sign_request(&Context::new(), &mut parts, body, &suite_credential())
        .await?;

    debug!("signed request: {parts:?}");
    Ok(parts)
}

/// Extract the `Signature=` component of the Authorization header.
pub fn signature_of(parts: &Parts) -> String {
    let auth = parts.headers[http::header::AUTHORIZATION]
        .to_str()
        .expect("authorization must be ascii");
    auth.rsplit("Signature=")
        .next()
        .expect("signature must exist")
        .to_string()
}
