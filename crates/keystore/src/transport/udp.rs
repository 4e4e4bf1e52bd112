use super::{Connection, Exchange, dispatch};
use crate::error::TransportError;
use crate::proto::{self, wire};
use crate::types::{PendingResponse, Request, Response, ValueHolder, ValueType};
use async_trait::async_trait;
use prost::Message;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::UdpSocket;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Receive buffer size; longer packets are truncated by the socket
pub const DEFAULT_BUFFER_SIZE: usize = 1024;

/// Datagram transport server
///
/// One request per packet, one response per packet. Requests are handled in
/// detached tasks, so responses can leave in a different order than their
/// requests arrived.
pub struct UdpServer {
    socket: Arc<UdpSocket>,
    requests: mpsc::Sender<Request>,
    buffer_size: usize,
}

impl UdpServer {
    pub async fn bind(
        addr: &str,
        requests: mpsc::Sender<Request>,
        buffer_size: usize,
    ) -> Result<Self, TransportError> {
        let socket = UdpSocket::bind(addr).await?;
        Ok(Self {
            socket: Arc::new(socket),
            requests,
            buffer_size,
        })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    pub async fn run(self) -> Result<(), TransportError> {
        info!("UDP server listening on {}", self.local_addr()?);
        let mut buf = vec![0u8; self.buffer_size];

        loop {
            let (n, peer) = match self.socket.recv_from(&mut buf).await {
                Ok(received) => received,
                Err(e) => {
                    warn!("Error whilst reading UDP packet: {}", e);
                    continue;
                }
            };

            let socket = Arc::clone(&self.socket);
            match decode_request(&buf[..n]) {
                Ok((request, pending)) => {
                    debug!("UDP {} {} from {}", request.op, request.key, peer);
                    let requests = self.requests.clone();
                    tokio::spawn(async move {
                        if let Some(response) = dispatch(&requests, request, pending).await {
                            send_response(&socket, peer, &response).await;
                        }
                    });
                }
                Err(e) => {
                    warn!("Undecodable UDP packet from {}: {}", peer, e);
                    let response =
                        Response::failure(e.to_string(), ValueHolder::empty(ValueType::None));
                    tokio::spawn(async move {
                        send_response(&socket, peer, &response).await;
                    });
                }
            }
        }
    }
}

fn decode_request(packet: &[u8]) -> Result<(Request, PendingResponse), TransportError> {
    let proto_request = wire::Request::decode(packet)?;
    proto::proto_to_request(&proto_request)
        .ok_or(TransportError::Malformed("invalid request"))
}

async fn send_response(socket: &UdpSocket, peer: SocketAddr, response: &Response) {
    let packet = proto::response_to_proto(response).encode_to_vec();
    if let Err(e) = socket.send_to(&packet, peer).await {
        warn!("Error writing UDP response to {}: {}", peer, e);
    }
}

/// Datagram transport client
///
/// The socket is connected to the server, so only its packets are received.
/// Each exchange sends one packet and takes the next packet as the answer.
pub struct UdpClient {
    socket: UdpSocket,
    buffer_size: usize,
}

impl UdpClient {
    /// Bind `local_addr` and connect to the server at `server_addr`
    pub async fn connect(
        server_addr: &str,
        local_addr: &str,
    ) -> Result<Connection, TransportError> {
        let socket = UdpSocket::bind(local_addr).await?;
        socket.connect(server_addr).await?;
        info!(
            "UDP client connected to {} from {}",
            server_addr,
            socket.local_addr()?
        );
        Ok(Connection::spawn(Self {
            socket,
            buffer_size: DEFAULT_BUFFER_SIZE,
        }))
    }
}

#[async_trait]
impl Exchange for UdpClient {
    async fn exchange(&mut self, request: &Request) -> Result<Response, TransportError> {
        let packet = proto::request_to_proto(request).encode_to_vec();
        self.socket.send(&packet).await?;

        let mut buf = vec![0u8; self.buffer_size];
        let n = self.socket.recv(&mut buf).await?;
        let proto_response = wire::Response::decode(&buf[..n])?;
        proto::proto_to_response(&proto_response)
            .ok_or(TransportError::Malformed("invalid response"))
    }
}
