use crate::errors::ProxyError;
use bytes::Bytes;
use http::HeaderMap;
use http::header::CONTENT_TYPE;
use http_body_util::combinators::BoxBody;
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use hyper::service::{Service, service_fn};
use hyper::{Request, Response, StatusCode};
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto::Builder;
use std::convert::Infallible;
use std::future::{Ready, ready};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::sync::oneshot;

pub fn full_body<E>(data: impl Into<Bytes>) -> BoxBody<Bytes, E>
where
    E: 'static,
{
    Full::new(data.into()).map_err(|e: Infallible| match e {}).boxed()
}

/// Serves `service` on an ephemeral local port.
pub async fn spawn_server<S, E>(service: S) -> SocketAddr
where
    S: Service<Request<Incoming>, Response = Response<BoxBody<Bytes, E>>, Error = E>
        + Send
        + Sync
        + 'static,
    S::Future: Send + 'static,
    E: std::error::Error + Send + Sync + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let service = Arc::new(service);

    tokio::spawn(async move {
        loop {
            let (stream, _) = listener.accept().await.unwrap();
            let io = TokioIo::new(stream);
            let svc = service.clone();
            tokio::spawn(async move {
                let _ = Builder::new(TokioExecutor::new())
                    .serve_connection(io, svc)
                    .await;
            });
        }
    });

    addr
}

/// Render service double that records what it was asked for.
pub struct Upstream {
    addr: SocketAddr,
    seen: Arc<Mutex<Vec<(String, HeaderMap)>>>,
}

impl Upstream {
    pub async fn spawn(content_type: Option<&'static str>, body: Vec<u8>) -> Self {
        Self::spawn_full(StatusCode::OK, content_type, Bytes::from(body)).await
    }

    pub async fn spawn_with_status(status: StatusCode) -> Self {
        Self::spawn_full(status, Some("text/plain"), Bytes::from_static(b"nope")).await
    }

    async fn spawn_full(status: StatusCode, content_type: Option<&'static str>, body: Bytes) -> Self {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let recorder = seen.clone();

        let service = service_fn(move |req: Request<Incoming>| {
            let target = req
                .uri()
                .path_and_query()
                .map(|pq| pq.as_str().to_string())
                .unwrap_or_default();
            recorder
                .lock()
                .unwrap()
                .push((target, req.headers().clone()));

            let mut response = Response::new(full_body::<Infallible>(body.clone()));
            *response.status_mut() = status;
            if let Some(content_type) = content_type {
                response
                    .headers_mut()
                    .insert(CONTENT_TYPE, content_type.parse().unwrap());
            }
            async move { Ok::<_, Infallible>(response) }
        });

        let addr = spawn_server(service).await;
        Self { addr, seen }
    }

    /// Value for `urlApi` pointing at this double.
    pub fn url_api(&self) -> String {
        format!("http://{}/", self.addr)
    }

    pub fn requests(&self) -> Vec<String> {
        self.seen
            .lock()
            .unwrap()
            .iter()
            .map(|(target, _)| target.clone())
            .collect()
    }

    pub fn saw_header(&self, name: &str) -> bool {
        self.seen
            .lock()
            .unwrap()
            .iter()
            .any(|(_, headers)| headers.contains_key(name))
    }

    pub fn saw_header_value(&self, name: &str, value: &str) -> bool {
        self.seen
            .lock()
            .unwrap()
            .iter()
            .any(|(_, headers)| headers.get_all(name).iter().any(|v| v == value))
    }
}

pub async fn spawn_upstream(content_type: Option<&'static str>, body: &'static str) -> Upstream {
    Upstream::spawn(content_type, body.as_bytes().to_vec()).await
}

/// Sends a response head and part of the body, then goes silent.
pub async fn spawn_stalling_upstream() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        loop {
            let (mut stream, _) = listener.accept().await.unwrap();
            tokio::spawn(async move {
                let mut buf = [0u8; 4096];
                let _ = stream.read(&mut buf).await;
                let head = "HTTP/1.1 200 OK\r\ncontent-type: text/html\r\ncontent-length: 100\r\n\r\npartial";
                let _ = stream.write_all(head.as_bytes()).await;
                tokio::time::sleep(Duration::from_secs(30)).await;
            });
        }
    });

    addr
}

/// Streams a chunked body forever. The receiver resolves once the client has
/// closed the connection.
pub async fn spawn_endless_upstream() -> (SocketAddr, oneshot::Receiver<()>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (closed_tx, closed_rx) = oneshot::channel();

    tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.unwrap();
        let mut buf = [0u8; 4096];
        let _ = stream.read(&mut buf).await;

        let (mut reader, mut writer) = stream.split();
        let head = "HTTP/1.1 200 OK\r\ncontent-type: text/html\r\ntransfer-encoding: chunked\r\n\r\n";
        if writer.write_all(head.as_bytes()).await.is_ok() {
            loop {
                tokio::select! {
                    read = reader.read(&mut buf) => {
                        if matches!(read, Ok(0) | Err(_)) {
                            break;
                        }
                    }
                    _ = tokio::time::sleep(Duration::from_millis(10)) => {
                        if writer.write_all(b"8\r\n<p>.</p>\r\n").await.is_err() {
                            break;
                        }
                    }
                }
            }
        }
        let _ = closed_tx.send(());
    });

    (addr, closed_rx)
}

/// Next service double counting its calls.
#[derive(Clone, Default)]
pub struct CountingNext {
    pub calls: Arc<AtomicUsize>,
}

impl<B> Service<Request<B>> for CountingNext {
    type Response = Response<BoxBody<Bytes, ProxyError>>;
    type Error = ProxyError;
    type Future = Ready<Result<Self::Response, Self::Error>>;

    fn call(&self, _req: Request<B>) -> Self::Future {
        self.calls.fetch_add(1, Ordering::SeqCst);
        ready(Ok(Response::new(full_body("from next"))))
    }
}

pub fn delegate() -> (CountingNext, Arc<AtomicUsize>) {
    let next = CountingNext::default();
    let calls = next.calls.clone();
    (next, calls)
}
