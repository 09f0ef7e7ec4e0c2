use super::{sign_suite_request, signature_of};
use anyhow::Result;
use http::Method;
use pretty_assertions::assert_eq;

#[tokio::test]
async fn test_get_vanilla() -> Result<()> {
    let parts = sign_suite_request(Method::GET, "https://example.amazonaws.com/", b"").await?;

    assert_eq!(
        parts.headers[http::header::AUTHORIZATION],
        "AWS4-HMAC-SHA256 Credential=AKIDEXAMPLE/20150830/us-east-1/service/aws4_request, SignedHeaders=host;x-amz-date, Signature=5fa00fa31553b73ebf1942676e86291e8372ff2a2260956d9b8aae1d763fbf31"
    );
    assert_eq!(parts.headers["x-amz-date"], "20150830T123600Z");
    assert_eq!(parts.headers["host"], "example.amazonaws.com");
    Ok(())
}

#[tokio::test]
async fn test_get_vanilla_empty_query() -> Result<()> {
    let parts = sign_suite_request(Method::GET, "https://example.amazonaws.com/?", b"").await?;

    assert_eq!(
        signature_of(&parts),
        "5fa00fa31553b73ebf1942676e86291e8372ff2a2260956d9b8aae1d763fbf31"
    );
    Ok(())
}

#[tokio::test]
async fn test_get_vanilla_query_order_key_case() -> Result<()> {
    let parts = sign_suite_request(
        Method::GET,
        "https://example.amazonaws.com/?Param2=value2&Param1=value1",
        b"",
    )
    .await?;

    assert_eq!(
        signature_of(&parts),
        "b97d918cfa904a5beff61c982a1b6f458b799221646efd99d3219ec94cdf2500"
    );
    // The URI is signed as canonical form but sent as given.
    assert_eq!(parts.uri.query(), Some("Param2=value2&Param1=value1"));
    Ok(())
}

#[tokio::test]
async fn test_post_vanilla() -> Result<()> {
    let parts = sign_suite_request(Method::POST, "https://example.amazonaws.com/", b"").await?;

    assert_eq!(
        signature_of(&parts),
        "5da7c1a2acd57cee7505fc6676e4e544621c30862966e37dddb68e92efbe5d6b"
    );
    Ok(())
}

#[tokio::test]
async fn test_body_changes_signature() -> Result<()> {
    let empty = sign_suite_request(Method::POST, "https://example.amazonaws.com/", b"").await?;
    let form = sign_suite_request(
        Method::POST,
        "https://example.amazonaws.com/",
        b"query=SELECT%20%2A",
    )
    .await?;

    assert_ne!(signature_of(&empty), signature_of(&form));
    Ok(())
}
