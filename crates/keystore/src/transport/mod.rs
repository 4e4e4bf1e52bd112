pub mod http;
pub mod tcp;
pub mod udp;

pub use http::{HttpClient, HttpServer};
pub use tcp::{TcpClient, TcpServer};
pub use udp::{UdpClient, UdpServer};

use crate::client::Client;
use crate::error::TransportError;
use crate::types::{PendingResponse, Request, Response, ValueHolder};
use async_trait::async_trait;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Requests a client connection buffers before callers start waiting
const CLIENT_QUEUE: usize = 32;

/// Client side of one wire protocol: ship a request, return the answer
///
/// Implementations own their socket; the routing task calls them one
/// request at a time.
#[async_trait]
pub trait Exchange: Send + 'static {
    async fn exchange(&mut self, request: &Request) -> Result<Response, TransportError>;
}

/// A running client connection
///
/// Owns the routing task that drains the façade's channel into an
/// [`Exchange`]. The task ends on [`Connection::close`] or once every
/// [`Client`] handed out by [`Connection::client`] is dropped.
pub struct Connection {
    client: Client,
    quit: Option<oneshot::Sender<()>>,
    router: JoinHandle<()>,
}

impl Connection {
    pub fn spawn<E: Exchange>(exchange: E) -> Self {
        let (requests_tx, requests_rx) = mpsc::channel(CLIENT_QUEUE);
        let (quit_tx, quit_rx) = oneshot::channel();
        let router = tokio::spawn(route(exchange, requests_rx, quit_rx));

        Self {
            client: Client::new(requests_tx),
            quit: Some(quit_tx),
            router,
        }
    }

    pub fn client(&self) -> Client {
        self.client.clone()
    }

    /// Stop routing and drop the underlying socket
    pub async fn close(mut self) {
        if let Some(quit) = self.quit.take() {
            let _ = quit.send(());
        }
        let _ = self.router.await;
    }
}

async fn route<E: Exchange>(
    mut exchange: E,
    mut requests: mpsc::Receiver<Request>,
    mut quit: oneshot::Receiver<()>,
) {
    // Dropping the Connection without close() leaves routing to the clients
    let mut detached = false;
    loop {
        tokio::select! {
            request = requests.recv() => {
                let Some(request) = request else {
                    debug!("All clients dropped, closing connection");
                    return;
                };
                let response = match exchange.exchange(&request).await {
                    Ok(response) => response,
                    Err(e) => {
                        warn!("{} {} failed: {}", request.op, request.key, e);
                        Response::failure(
                            e.to_string(),
                            ValueHolder::empty(request.value.value_type),
                        )
                    }
                };
                request.respond(response);
            }
            closed = &mut quit, if !detached => {
                if closed.is_ok() {
                    debug!("Client connection is shutting down");
                    return;
                }
                detached = true;
            }
        }
    }
}

/// Hand a decoded request to the dispatcher and wait for its answer
///
/// `None` means the dispatcher is gone or dropped the request.
pub(crate) async fn dispatch(
    requests: &mpsc::Sender<Request>,
    request: Request,
    pending: PendingResponse,
) -> Option<Response> {
    if requests.send(request).await.is_err() {
        warn!("Dispatcher is not accepting requests");
        return None;
    }
    pending.await.ok()
}
