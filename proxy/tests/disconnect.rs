//! Query lifecycle over real sockets, where the server decides when a
//! response body is dropped.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::Router;
use bytes::Bytes;
use graphsign_aws_v4::StaticCredentialProvider;
use graphsign_core::Context;
use graphsign_proxy::{router, Config, Proxy, ReqwestTransport};
use pretty_assertions::assert_eq;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio::time::timeout;

const GREMLIN_RESULT: &str = r#"{"result":{"data":[1]}}"#;

/// Fake database that reports every cancel call it receives.
async fn start_upstream() -> (String, mpsc::UnboundedReceiver<String>) {
    let (tx, rx) = mpsc::unbounded_channel::<String>();

    let app = Router::new()
        .route(
            "/gremlin",
            post(|| async {
                (
                    StatusCode::OK,
                    [("content-type", "application/json")],
                    GREMLIN_RESULT,
                )
            }),
        )
        .route(
            "/gremlin/status",
            get(
                |State(tx): State<mpsc::UnboundedSender<String>>,
                 Query(params): Query<Vec<(String, String)>>| async move {
                    let id = params
                        .into_iter()
                        .find(|(k, _)| k == "queryId")
                        .map(|(_, v)| v)
                        .unwrap_or_default();
                    let _ = tx.send(format!("gremlin:{id}"));
                    "{}"
                },
            ),
        )
        .route(
            "/sparql",
            post(|| async {
                tokio::time::sleep(Duration::from_secs(60)).await;
                "{}"
            }),
        )
        .route(
            "/sparql/status",
            post(
                |State(tx): State<mpsc::UnboundedSender<String>>, body: Bytes| async move {
                    let _ = tx.send(format!("sparql:{}", String::from_utf8_lossy(&body)));
                    "{}"
                },
            ),
        )
        .with_state(tx);

    (serve(app).await, rx)
}

/// Serve `app` on a random local port and return its base url.
async fn serve(app: Router) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}")
}

async fn start_proxy() -> String {
    let _ = env_logger::builder().is_test(true).try_init();

    let proxy = Proxy::new(
        Context::new(),
        StaticCredentialProvider::new("AKIDEXAMPLE", "wJalrXUtnFEMI/K7MDENG+bPxRfiCYEXAMPLEKEY"),
        Arc::new(ReqwestTransport::new().unwrap()),
        &Config::default(),
    );
    serve(router(proxy)).await
}

#[tokio::test]
async fn test_completed_response_sends_no_cancel() {
    let (upstream, mut cancels) = start_upstream().await;
    let proxy = start_proxy().await;

    let resp = reqwest::Client::new()
        .post(format!("{proxy}/gremlin"))
        .header("graph-db-connection-url", &upstream)
        .header("queryid", "q-1")
        .header("content-type", "application/json")
        .body(r#"{"query":"g.V().limit(1)"}"#)
        .send()
        .await
        .unwrap();

    assert_eq!(resp.status(), reqwest::StatusCode::OK);
    assert_eq!(
        resp.headers()["content-length"],
        GREMLIN_RESULT.len().to_string().as_str()
    );
    let body = resp.bytes().await.unwrap();
    assert_eq!(body, Bytes::from_static(GREMLIN_RESULT.as_bytes()));

    // A cancel, if any, is spawned as soon as the server drops the body.
    let cancel = timeout(Duration::from_millis(500), cancels.recv()).await;
    assert!(cancel.is_err(), "unexpected cancel call: {cancel:?}");
}

#[tokio::test]
async fn test_client_gone_mid_forward_sends_one_cancel() {
    let (upstream, mut cancels) = start_upstream().await;
    let proxy = start_proxy().await;

    let sent = reqwest::Client::new()
        .post(format!("{proxy}/sparql"))
        .header("graph-db-connection-url", &upstream)
        .header("queryid", "q-2")
        .header("content-type", "application/json")
        .body(r#"{"query":"SELECT * WHERE { ?s ?p ?o }"}"#)
        .timeout(Duration::from_millis(300))
        .send()
        .await;
    assert!(sent.is_err(), "upstream should still be running the query");

    let cancel = timeout(Duration::from_secs(5), cancels.recv())
        .await
        .expect("cancel must be sent")
        .unwrap();
    assert_eq!(cancel, "sparql:cancelQuery&queryId=q-2&silent=true");

    let again = timeout(Duration::from_millis(500), cancels.recv()).await;
    assert!(again.is_err(), "cancel sent twice: {again:?}");
}
