use super::{sign_suite_request, suite_credential, suite_time};
use anyhow::Result;
use graphsign_aws_v4::{canonical_query_string, CanonicalRequest, SignableBody};
use graphsign_core::SigningRequest;
use http::{Method, Request};
use pretty_assertions::assert_eq;
use sha2::{Digest, Sha256};
use test_case::test_case;

#[test_case("/?b=2&a=1", "a=1&b=2"; "sorted by key")]
#[test_case("/?a=2&a=1", "a=1&a=2"; "sorted by value")]
#[test_case("/?cancelQuery&queryId=q1", "cancelQuery=&queryId=q1"; "key without value")]
#[test_case("/?q=a+b", "q=a%20b"; "plus decodes to space")]
#[test_case("/?q=%21%27%28%29%2a", "q=%21%27%28%29%2A"; "reserved chars use uppercase hex")]
#[test_case("/?q=it's(1)!", "q=it%27s%281%29%21"; "raw reserved chars")]
#[test_case("/", ""; "no query")]
fn test_canonical_query(path_and_query: &str, expected: &str) {
    let (mut parts, _) = Request::get(format!("https://example.amazonaws.com{path_and_query}"))
        .body(())
        .expect("request must be valid")
        .into_parts();
    let req = SigningRequest::build(&mut parts).expect("request must be signable");

    assert_eq!(canonical_query_string(&req.query), expected);
}

#[tokio::test]
async fn test_host_keeps_explicit_port() -> Result<()> {
    let parts = sign_suite_request(Method::GET, "http://localhost:8182/status", b"").await?;
    assert_eq!(parts.headers["host"], "localhost:8182");

    let parts = sign_suite_request(Method::GET, "https://db.example.com/status", b"").await?;
    assert_eq!(parts.headers["host"], "db.example.com");
    Ok(())
}

#[tokio::test]
async fn test_path_is_not_reencoded() -> Result<()> {
    let (mut parts, _) = Request::get("https://example.amazonaws.com/a%20b/c")
        .body(())?
        .into_parts();
    let mut req = SigningRequest::build(&mut parts)?;
    req.headers.insert("host", "example.amazonaws.com".parse()?);
    req.headers.insert("x-amz-date", "20150830T123600Z".parse()?);

    let creq = CanonicalRequest::new(&req, false, b"")?;
    assert_eq!(creq.path, "/a%20b/c");
    Ok(())
}

#[tokio::test]
async fn test_body_hash_covers_exact_bytes() -> Result<()> {
    let body = SignableBody::Form(vec![("query".to_string(), "g.V().count()".to_string())])
        .to_bytes()?;

    let (mut parts, _) = Request::post("https://example.amazonaws.com/openCypher")
        .body(())?
        .into_parts();
    let mut req = SigningRequest::build(&mut parts)?;
    req.headers.insert("host", "example.amazonaws.com".parse()?);
    req.headers.insert("x-amz-date", "20150830T123600Z".parse()?);

    let creq = CanonicalRequest::new(&req, false, &body)?;
    assert_eq!(creq.body_hash, hex::encode(Sha256::digest(&body)));
    assert!(creq.to_string().ends_with(&creq.body_hash));
    Ok(())
}

#[tokio::test]
async fn test_session_token_is_signed() -> Result<()> {
    use graphsign_aws_v4::RequestSigner;
    use graphsign_core::{Context, SignRequest};

    let cred = graphsign_aws_v4::Credential {
        session_token: Some("token".to_string()),
        ..suite_credential()
    };
    let (mut parts, _) = Request::get("https://example.amazonaws.com/").body(())?.into_parts();
    RequestSigner::new("service", "us-east-1")
        .with_time(suite_time())
        .sign_request(&Context::new(), &mut parts, b"", &cred)
        .await?;

    assert_eq!(parts.headers["x-amz-security-token"], "token");
    assert!(parts.headers["authorization"]
        .to_str()?
        .contains("SignedHeaders=host;x-amz-date;x-amz-security-token,"));
    Ok(())
}
