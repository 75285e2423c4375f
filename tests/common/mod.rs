//! In-process HTTP server for exercising the client against scripted
//! upstream behavior.
#![allow(dead_code)]
use hyper::service::{make_service_fn, service_fn};
use hyper::{Body, Request, Response, Server};
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;

/// Scripted response for one request: an artificial service delay and the
/// response itself. The handler receives the zero-based request index and
/// the request.
pub type Handler = Arc<dyn Fn(usize, &Request<Body>) -> (Duration, Response<Body>) + Send + Sync>;

pub struct MockUpstream {
    pub addr: SocketAddr,
    hits:     Arc<AtomicUsize>,
    shutdown: Option<oneshot::Sender<()>>,
}

impl MockUpstream {
    pub fn spawn(handler: Handler) -> Self {
        let hits = Arc::new(AtomicUsize::new(0));
        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let counter = hits.clone();
        let make_service = make_service_fn(move |_conn| {
            let handler = handler.clone();
            let counter = counter.clone();
            async move {
                Ok::<_, Infallible>(service_fn(move |req: Request<Body>| {
                    let handler = handler.clone();
                    let counter = counter.clone();
                    async move {
                        let n = counter.fetch_add(1, Ordering::SeqCst);
                        let (delay, response) = handler(n, &req);
                        if !delay.is_zero() {
                            tokio::time::sleep(delay).await;
                        }
                        Ok::<_, Infallible>(response)
                    }
                }))
            }
        });
        let server = Server::bind(&SocketAddr::from(([127, 0, 0, 1], 0))).serve(make_service);
        let addr = server.local_addr();
        let graceful = server.with_graceful_shutdown(async {
            shutdown_rx.await.ok();
        });
        tokio::spawn(graceful);
        Self {
            addr,
            hits,
            shutdown: Some(shutdown_tx),
        }
    }

    /// Number of requests observed so far.
    pub fn hits(&self) -> usize { self.hits.load(Ordering::SeqCst) }

    pub fn url(&self) -> String { format!("http://{}", self.addr) }
}

impl Drop for MockUpstream {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown.take() {
            tx.send(()).ok();
        }
    }
}

pub fn json_response(status: u16, body: &str) -> Response<Body> {
    Response::builder()
        .status(status)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .expect("static response")
}

/// A handler that always answers with the same status and body.
pub fn fixed(status: u16, body: &'static str) -> Handler {
    Arc::new(move |_, _| (Duration::ZERO, json_response(status, body)))
}
