use super::{Connection, Exchange};
use crate::error::TransportError;
use crate::types::{Operation, Request, Response, ValueType};
use async_trait::async_trait;
use axum::Router;
use axum::body::{Body, to_bytes};
use axum::extract::{Path, State};
use axum::http::{Method, StatusCode};
use axum::response::{IntoResponse, Json};
use axum::routing::any;
use reqwest::Url;
use serde_json::Value;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Largest request body accepted when no limit is configured
pub const DEFAULT_MAX_BODY: usize = 1024;

/// How long a request waits for the dispatcher when no timeout is configured
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Clone)]
struct HttpState {
    requests: mpsc::Sender<Request>,
    max_body: usize,
    timeout: Duration,
}

/// REST-style text transport server
///
/// `GET /<key>` reads, `POST /<key>` writes the JSON body, `DELETE /<key>`
/// deletes. Every answer from the store is a 200 carrying the JSON response
/// envelope; transport problems map to 4xx/5xx statuses.
pub struct HttpServer {
    listener: TcpListener,
    router: Router,
}

impl HttpServer {
    pub async fn bind(
        addr: &str,
        requests: mpsc::Sender<Request>,
        max_body: usize,
        timeout: Duration,
    ) -> Result<Self, TransportError> {
        let listener = TcpListener::bind(addr).await?;
        Ok(Self {
            listener,
            router: router(requests, max_body, timeout),
        })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    pub async fn run(self) -> Result<(), TransportError> {
        info!("HTTP server listening on {}", self.local_addr()?);
        axum::serve(self.listener, self.router).await?;
        Ok(())
    }
}

/// Build the request router on its own, e.g. to embed it in another app
pub fn router(requests: mpsc::Sender<Request>, max_body: usize, timeout: Duration) -> Router {
    let state = HttpState {
        requests,
        max_body,
        timeout,
    };

    // An empty key never matches the wildcard and falls through to 404
    Router::new()
        .route("/*key", any(handle_key))
        .fallback(|| async { StatusCode::NOT_FOUND })
        .with_state(state)
}

async fn handle_key(
    State(state): State<HttpState>,
    Path(key): Path<String>,
    method: Method,
    body: Body,
) -> axum::response::Response {
    if key.is_empty() {
        return StatusCode::NOT_FOUND.into_response();
    }

    let (request, pending) = match method {
        Method::GET => Request::read(key, ValueType::None),
        Method::DELETE => Request::delete(key),
        Method::POST => {
            let bytes = match to_bytes(body, state.max_body).await {
                Ok(bytes) => bytes,
                Err(e) => {
                    warn!("Rejecting POST /{}: {}", key, e);
                    return StatusCode::BAD_REQUEST.into_response();
                }
            };
            let value: Value = match serde_json::from_slice(&bytes) {
                Ok(value) => value,
                Err(e) => {
                    warn!("Rejecting POST /{}: {}", key, e);
                    return StatusCode::BAD_REQUEST.into_response();
                }
            };
            Request::write(key, ValueType::None, value)
        }
        _ => return StatusCode::METHOD_NOT_ALLOWED.into_response(),
    };
    debug!("HTTP {} {}", request.op, request.key);

    let exchange = async {
        state.requests.send(request).await.ok()?;
        pending.await.ok()
    };

    match tokio::time::timeout(state.timeout, exchange).await {
        Ok(Some(response)) => (StatusCode::OK, Json(response)).into_response(),
        Ok(None) => StatusCode::SERVICE_UNAVAILABLE.into_response(),
        Err(_) => {
            warn!("Timed out waiting for the dispatcher");
            StatusCode::REQUEST_TIMEOUT.into_response()
        }
    }
}

/// Text transport client; each request becomes one HTTP call
pub struct HttpClient {
    http: reqwest::Client,
    base_url: Url,
}

impl HttpClient {
    /// `host` may be `host:port` or a full `http://` URL
    pub fn connect(host: &str) -> Result<Connection, TransportError> {
        let base_url = if host.starts_with("http://") || host.starts_with("https://") {
            Url::parse(host)
        } else {
            Url::parse(&format!("http://{}", host))
        }
        .map_err(|_| TransportError::Malformed("invalid HTTP base URL"))?;
        if base_url.cannot_be_a_base() {
            return Err(TransportError::Malformed("invalid HTTP base URL"));
        }
        info!("HTTP client using {}", base_url);

        Ok(Connection::spawn(Self {
            http: reqwest::Client::new(),
            base_url,
        }))
    }

    /// The URL addressing `key`
    ///
    /// Each `/`-separated piece of the key is its own percent-encoded path
    /// segment, which the server's path extractor decodes back to the key.
    fn key_url(&self, key: &str) -> Result<Url, TransportError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| TransportError::Malformed("invalid HTTP base URL"))?
            .pop_if_empty()
            .extend(key.split('/'));
        Ok(url)
    }
}

#[async_trait]
impl Exchange for HttpClient {
    async fn exchange(&mut self, request: &Request) -> Result<Response, TransportError> {
        let url = self.key_url(&request.key)?;

        // The server treats every write as untyped
        let call = match request.op {
            Operation::Read => self.http.get(url.clone()),
            Operation::Write => self.http.post(url.clone()).json(&request.value.val),
            Operation::Delete => self.http.delete(url.clone()),
        };
        debug!("HTTP {} {}", request.op, url);

        let reply = call.send().await?;
        let status = reply.status();
        if !status.is_success() {
            return Err(TransportError::Status(status));
        }

        let response: Response = reply.json().await?;
        Ok(Response::from_parts(response.error, response.value))
    }
}
