//! Shared utilities for integration testing.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use bytes::Bytes;
use http::{Method, Request, Response};
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::client::legacy::Client;
use hyper_util::rt::{TokioExecutor, TokioIo};
use tokio::net::TcpListener;

use http_retry::{RetryBody, RetryLayer, RetryPolicy, RetryService};

/// A request as seen by the backend.
#[derive(Debug, Clone)]
pub struct Recorded {
    pub method: Method,
    pub body: Bytes,
}

/// Handle to a running mock backend.
pub struct Backend {
    pub addr: SocketAddr,
    requests: Arc<Mutex<Vec<Recorded>>>,
}

#[allow(dead_code)]
impl Backend {
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    pub fn calls(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub fn requests(&self) -> Vec<Recorded> {
        self.requests.lock().unwrap().clone()
    }
}

/// Start a programmable mock backend on an ephemeral port.
///
/// `f` receives the zero-based call index and returns status and body.
pub async fn start_programmable_backend<F, Fut>(f: F) -> Backend
where
    F: Fn(u32) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = (u16, String)> + Send + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let f = Arc::new(f);
    let calls = Arc::new(AtomicU32::new(0));
    let requests = Arc::new(Mutex::new(Vec::new()));
    let log = requests.clone();

    tokio::spawn(async move {
        loop {
            let (stream, _) = match listener.accept().await {
                Ok(conn) => conn,
                Err(_) => break,
            };

            let f = f.clone();
            let calls = calls.clone();
            let log = log.clone();
            tokio::spawn(async move {
                let service = service_fn(move |req: Request<Incoming>| {
                    let f = f.clone();
                    let calls = calls.clone();
                    let log = log.clone();
                    async move {
                        let method = req.method().clone();
                        let body = req.into_body().collect().await?.to_bytes();
                        log.lock().unwrap().push(Recorded { method, body });

                        let n = calls.fetch_add(1, Ordering::SeqCst);
                        let (status, body) = f(n).await;
                        Ok::<_, hyper::Error>(
                            Response::builder()
                                .status(status)
                                .body(Full::new(Bytes::from(body)))
                                .unwrap(),
                        )
                    }
                });

                let _ = http1::Builder::new()
                    .serve_connection(TokioIo::new(stream), service)
                    .await;
            });
        }
    });

    Backend { addr, requests }
}

/// A backend answering `status` to the first `failures` calls and 200 afterwards.
#[allow(dead_code)]
pub async fn start_flaky_backend(failures: u32, status: u16) -> Backend {
    start_programmable_backend(move |n| async move {
        if n < failures {
            (status, "Service Unavailable".into())
        } else {
            (200, "Success".into())
        }
    })
    .await
}

/// A real hyper client wrapped in the retry layer.
pub fn retrying_client(policy: RetryPolicy) -> RetryService<Client<HttpConnector, RetryBody>> {
    use tower::Layer;

    let client = Client::builder(TokioExecutor::new()).build_http::<RetryBody>();
    RetryLayer::new(policy).layer(client)
}
