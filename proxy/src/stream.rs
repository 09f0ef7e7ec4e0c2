use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use axum::body::{Body, HttpBody};
use axum::response::Response;
use bytes::Bytes;
use http::header::CONTENT_LENGTH;
use http_body::{Frame, SizeHint};
use log::{debug, error};

use crate::lifecycle::QueryLifecycle;

/// Relay an upstream response to the client.
///
/// Status and headers are copied as they are. The body is pulled from the
/// upstream only as fast as the client reads it.
pub fn relay(upstream: http::Response<Body>, lifecycle: Arc<QueryLifecycle>) -> Response {
    let (parts, body) = upstream.into_parts();
    debug!("relaying upstream response: {}", parts.status);

    if body.is_end_stream() {
        lifecycle.complete();
        return Response::from_parts(parts, Body::empty());
    }

    let content_length = parts
        .headers
        .get(CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<u64>().ok());
    let body = Body::new(RelayBody::new(body, lifecycle, content_length));
    Response::from_parts(parts, body)
}

/// Response body that reports its outcome to the query lifecycle.
///
/// The query completes once the last byte has been handed to the server,
/// which is either when the upstream body ends or when the advertised
/// `content-length` has been relayed. The server stops polling at that
/// point and may drop the body without ever seeing its end.
///
/// An upstream error is logged, ends the query and is passed on so that the
/// server aborts the connection. Being dropped before completion means the
/// client went away.
pub struct RelayBody {
    inner: Body,
    lifecycle: Arc<QueryLifecycle>,
    remaining: Option<u64>,
    done: bool,
}

impl RelayBody {
    /// Wrap `inner`, which is expected to carry `content_length` bytes when
    /// that is known.
    pub fn new(inner: Body, lifecycle: Arc<QueryLifecycle>, content_length: Option<u64>) -> Self {
        Self {
            inner,
            lifecycle,
            remaining: content_length,
            done: false,
        }
    }

    fn finish(&mut self) {
        self.done = true;
        self.lifecycle.complete();
    }
}

impl HttpBody for RelayBody {
    type Data = Bytes;
    type Error = axum::Error;

    fn poll_frame(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
        let this = self.get_mut();
        if this.done {
            return Poll::Ready(None);
        }

        match Pin::new(&mut this.inner).poll_frame(cx) {
            Poll::Pending => Poll::Pending,
            Poll::Ready(None) => {
                this.finish();
                Poll::Ready(None)
            }
            Poll::Ready(Some(Err(err))) => {
                error!("upstream body failed mid-stream, aborting response: {err}");
                this.done = true;
                this.lifecycle.fail();
                Poll::Ready(Some(Err(err)))
            }
            Poll::Ready(Some(Ok(frame))) => {
                let relayed = frame.data_ref().map_or(0, |data| data.len() as u64);
                if let Some(remaining) = this.remaining.as_mut() {
                    *remaining = remaining.saturating_sub(relayed);
                }
                if this.remaining == Some(0) || this.inner.is_end_stream() {
                    this.finish();
                }
                Poll::Ready(Some(Ok(frame)))
            }
        }
    }

    fn is_end_stream(&self) -> bool {
        self.done || self.inner.is_end_stream()
    }

    fn size_hint(&self) -> SizeHint {
        match self.remaining {
            Some(n) if self.inner.size_hint().exact().is_none() => SizeHint::with_exact(n),
            _ => self.inner.size_hint(),
        }
    }
}

impl Drop for RelayBody {
    fn drop(&mut self) {
        if !self.done {
            self.lifecycle.on_close();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lifecycle::QueryState;
    use crate::query::Endpoint;
    use crate::testing::{forwarder, handle, RecordingTransport};
    use futures::stream;
    use http::StatusCode;
    use http_body_util::BodyExt;
    use pretty_assertions::assert_eq;
    use std::time::Duration;
    use tokio::time::timeout;

    fn lifecycle(
        query_id: Option<&str>,
    ) -> (
        Arc<QueryLifecycle>,
        tokio::sync::mpsc::UnboundedReceiver<http::Request<Bytes>>,
    ) {
        let (transport, rx) = RecordingTransport::new();
        (
            QueryLifecycle::new(handle(Endpoint::Gremlin, query_id, false), forwarder(transport)),
            rx,
        )
    }

    #[tokio::test]
    async fn test_relay_preserves_status_headers_and_bytes() {
        let (lifecycle, _rx) = lifecycle(Some("q-1"));
        let upstream = http::Response::builder()
            .status(StatusCode::CREATED)
            .header("content-type", "application/json")
            .header("content-encoding", "gzip")
            .header("x-upstream", "1")
            .body(Body::from_stream(stream::iter(vec![
                Ok::<_, std::io::Error>(Bytes::from_static(b"{\"a\":")),
                Ok(Bytes::from_static(b"1}")),
            ])))
            .unwrap();

        let resp = relay(upstream, lifecycle.clone());
        assert_eq!(resp.status(), StatusCode::CREATED);
        assert_eq!(resp.headers()["content-type"], "application/json");
        assert_eq!(resp.headers()["content-encoding"], "gzip");
        assert_eq!(resp.headers()["x-upstream"], "1");
        assert_eq!(lifecycle.state(), QueryState::Active);

        let body = resp.into_body().collect().await.unwrap().to_bytes();
        assert_eq!(body, Bytes::from_static(b"{\"a\":1}"));
        assert_eq!(lifecycle.state(), QueryState::Completed);
    }

    #[tokio::test]
    async fn test_relay_empty_body() {
        let (lifecycle, _rx) = lifecycle(Some("q-1"));
        let upstream = http::Response::builder()
            .status(StatusCode::NO_CONTENT)
            .body(Body::empty())
            .unwrap();

        let resp = relay(upstream, lifecycle.clone());
        assert_eq!(resp.status(), StatusCode::NO_CONTENT);
        assert_eq!(lifecycle.state(), QueryState::Completed);

        let body = resp.into_body().collect().await.unwrap().to_bytes();
        assert!(body.is_empty());
    }

    #[tokio::test]
    async fn test_relay_mid_stream_error_aborts() {
        let (lifecycle, mut rx) = lifecycle(Some("q-1"));
        let upstream = http::Response::new(Body::from_stream(stream::iter(vec![
            Ok(Bytes::from_static(b"partial")),
            Err(std::io::Error::other("connection reset")),
        ])));

        let resp = relay(upstream, lifecycle.clone());
        assert!(resp.into_body().collect().await.is_err());
        assert_eq!(lifecycle.state(), QueryState::UpstreamCancelled);

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_dropped_body_cancels_query() {
        let (lifecycle, mut rx) = lifecycle(Some("q-1"));
        let upstream = http::Response::new(Body::from_stream(stream::iter(vec![
            Ok::<_, std::io::Error>(Bytes::from_static(b"first")),
            Ok(Bytes::from_static(b"second")),
        ])));

        let mut body = relay(upstream, lifecycle.clone()).into_body();
        let frame = body.frame().await.unwrap().unwrap();
        assert_eq!(frame.into_data().unwrap(), Bytes::from_static(b"first"));
        drop(body);

        assert_eq!(lifecycle.state(), QueryState::ClientCancelled);
        let req = timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("cancel must be sent")
            .unwrap();
        assert_eq!(
            req.uri(),
            "http://db.example.com:8182/gremlin/status?cancelQuery&queryId=q-1"
        );
    }

    #[tokio::test]
    async fn test_content_length_body_completes_on_last_byte() {
        let (lifecycle, mut rx) = lifecycle(Some("q-1"));
        let upstream = http::Response::builder()
            .header("content-length", "11")
            .body(Body::from_stream(stream::iter(vec![
                Ok::<_, std::io::Error>(Bytes::from_static(b"first")),
                Ok(Bytes::from_static(b"second")),
            ])))
            .unwrap();

        let mut body = relay(upstream, lifecycle.clone()).into_body();
        assert_eq!(body.size_hint().exact(), Some(11));

        // The server stops reading once it has written `content-length`
        // bytes and drops the body without waiting for its end.
        body.frame().await.unwrap().unwrap();
        assert_eq!(lifecycle.state(), QueryState::Active);
        body.frame().await.unwrap().unwrap();
        assert_eq!(lifecycle.state(), QueryState::Completed);
        assert!(body.is_end_stream());
        drop(body);

        assert_eq!(lifecycle.state(), QueryState::Completed);
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_content_length_body_dropped_early_cancels() {
        let (lifecycle, mut rx) = lifecycle(Some("q-1"));
        let upstream = http::Response::builder()
            .header("content-length", "11")
            .body(Body::from_stream(stream::iter(vec![
                Ok::<_, std::io::Error>(Bytes::from_static(b"first")),
                Ok(Bytes::from_static(b"second")),
            ])))
            .unwrap();

        let mut body = relay(upstream, lifecycle.clone()).into_body();
        body.frame().await.unwrap().unwrap();
        drop(body);

        assert_eq!(lifecycle.state(), QueryState::ClientCancelled);
        timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("cancel must be sent")
            .unwrap();
    }
}
