//! Streams a render service response into the inbound response body.
//!
//! The body handed to hyper is the receiving half of a bounded channel; a
//! copy task owns the upstream response and pushes its chunks into the
//! sending half. Whoever finishes first decides the outcome:
//!
//! - upstream exhausted: the sender is dropped and the body ends cleanly,
//! - upstream read fails: the error is pushed into the body so hyper aborts
//!   the inbound response,
//! - inbound client gone: hyper drops the body, the next send fails and the
//!   copy stops.
//!
//! In every case the upstream response is dropped exactly once, when `copy`
//! returns.

use crate::errors::ProxyError;
use hyper::body::{Body, Bytes, Frame};
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::sync::mpsc;

/// Number of chunks buffered between the upstream reader and the inbound writer.
///
/// This bounds chunks, not bytes: a chunk is whatever one upstream read
/// produced, so a transfer holds at most `RELAY_CAPACITY + 1` of them, each no
/// larger than the HTTP client's read buffer.
pub const RELAY_CAPACITY: usize = 4;

#[derive(thiserror::Error, Debug)]
pub enum RelayError {
    #[error("response sink closed after {0} bytes")]
    SinkClosed(u64),
    #[error("upstream read failed after {written} bytes: {message}")]
    UpstreamRead { written: u64, message: String },
}

/// Writable half of the relay, the response sink.
pub struct BodySender {
    tx: mpsc::Sender<Result<Bytes, ProxyError>>,
}

impl BodySender {
    async fn send(&self, item: Result<Bytes, ProxyError>) -> bool {
        self.tx.send(item).await.is_ok()
    }
}

/// Response body fed by a [`BodySender`].
pub struct RelayBody {
    rx: mpsc::Receiver<Result<Bytes, ProxyError>>,
}

impl Body for RelayBody {
    type Data = Bytes;
    type Error = ProxyError;

    fn poll_frame(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Frame<Bytes>, ProxyError>>> {
        self.rx
            .poll_recv(cx)
            .map(|item| item.map(|chunk| chunk.map(Frame::data)))
    }
}

pub fn channel(capacity: usize) -> (BodySender, RelayBody) {
    let (tx, rx) = mpsc::channel(capacity);
    (BodySender { tx }, RelayBody { rx })
}

/// Copies the whole upstream body into `sink` and returns the number of bytes written.
pub async fn copy(mut upstream: reqwest::Response, sink: BodySender) -> Result<u64, RelayError> {
    let url = upstream.url().to_string();
    let mut written = 0u64;

    loop {
        match upstream.chunk().await {
            Ok(Some(chunk)) => {
                let len = chunk.len() as u64;
                if !sink.send(Ok(chunk)).await {
                    return Err(RelayError::SinkClosed(written));
                }
                written += len;
            }
            Ok(None) => return Ok(written),
            Err(e) => {
                let error = ProxyError::from_upstream(&url, e);
                let message = error.to_string();
                // The client may already be gone, the read error is reported either way.
                let _ = sink.send(Err(error)).await;
                return Err(RelayError::UpstreamRead { written, message });
            }
        }
    }
}
