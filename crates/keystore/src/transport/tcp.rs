use super::{Connection, Exchange, dispatch};
use crate::error::TransportError;
use crate::proto::{self, wire};
use crate::types::{Request, Response};
use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use prost::Message;
use std::io::ErrorKind;
use std::net::SocketAddr;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::tcp::OwnedWriteHalf;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

/// Largest frame accepted when no limit is configured
pub const DEFAULT_MAX_FRAME: usize = 4 * 1024 * 1024;

/// Responses queued per connection before request tasks wait on the writer
const OUTBOUND_QUEUE: usize = 64;

/// Read one length-prefixed frame (4 bytes big-endian, then the body)
///
/// Returns `Ok(None)` when the peer closes the stream between frames.
pub async fn read_frame<R>(
    reader: &mut R,
    max_len: usize,
) -> Result<Option<Bytes>, TransportError>
where
    R: AsyncRead + Unpin,
{
    let len = match reader.read_u32().await {
        Ok(len) => len as usize,
        Err(e) if e.kind() == ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    if len > max_len {
        return Err(TransportError::FrameTooLarge(len));
    }

    let mut buf = BytesMut::zeroed(len);
    reader.read_exact(&mut buf).await?;
    Ok(Some(buf.freeze()))
}

/// Write `message` as one length-prefixed frame
pub async fn write_frame<W, M>(writer: &mut W, message: &M) -> Result<(), TransportError>
where
    W: AsyncWrite + Unpin,
    M: Message,
{
    let mut buf = BytesMut::with_capacity(message.encoded_len());
    message.encode(&mut buf)?;

    writer.write_u32(buf.len() as u32).await?;
    writer.write_all(&buf).await?;
    writer.flush().await?;
    Ok(())
}

/// Stream transport server
///
/// One reader task per connection decodes requests in a loop. Each request
/// is dispatched from its own task, and all responses for a connection go
/// through a single writer task so frames never interleave.
pub struct TcpServer {
    listener: TcpListener,
    requests: mpsc::Sender<Request>,
    max_frame: usize,
}

impl TcpServer {
    pub async fn bind(
        addr: &str,
        requests: mpsc::Sender<Request>,
        max_frame: usize,
    ) -> Result<Self, TransportError> {
        let listener = TcpListener::bind(addr).await?;
        Ok(Self {
            listener,
            requests,
            max_frame,
        })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    pub async fn run(self) -> Result<(), TransportError> {
        info!("TCP server listening on {}", self.local_addr()?);

        loop {
            let (socket, peer) = match self.listener.accept().await {
                Ok(accepted) => accepted,
                Err(e) => {
                    error!("Failed to accept TCP connection: {}", e);
                    continue;
                }
            };
            debug!("New TCP connection from {}", peer);

            let requests = self.requests.clone();
            let max_frame = self.max_frame;
            tokio::spawn(async move {
                if let Err(e) = handle_connection(socket, peer, requests, max_frame).await {
                    error!("TCP connection error from {}: {}", peer, e);
                }
            });
        }
    }
}

async fn handle_connection(
    socket: TcpStream,
    peer: SocketAddr,
    requests: mpsc::Sender<Request>,
    max_frame: usize,
) -> Result<(), TransportError> {
    let (mut reader, writer) = socket.into_split();
    let (outbound, outbound_rx) = mpsc::channel(OUTBOUND_QUEUE);
    tokio::spawn(write_responses(writer, outbound_rx, peer));

    loop {
        let frame = match read_frame(&mut reader, max_frame).await {
            Ok(Some(frame)) => frame,
            Ok(None) => {
                debug!("Client {} closed the TCP connection", peer);
                return Ok(());
            }
            Err(e) => {
                // Undecodable input ends the connection like a disconnect
                warn!("Closing TCP connection from {}: {}", peer, e);
                return Ok(());
            }
        };

        let proto_request = match wire::Request::decode(frame) {
            Ok(request) => request,
            Err(e) => {
                warn!("Closing TCP connection from {}: {}", peer, e);
                return Ok(());
            }
        };
        let Some((request, pending)) = proto::proto_to_request(&proto_request) else {
            warn!("Closing TCP connection from {}: malformed request", peer);
            return Ok(());
        };
        debug!("TCP {} {} from {}", request.op, request.key, peer);

        let requests = requests.clone();
        let outbound = outbound.clone();
        tokio::spawn(async move {
            if let Some(response) = dispatch(&requests, request, pending).await {
                let _ = outbound.send(proto::response_to_proto(&response)).await;
            }
        });
    }
}

/// Sole writer for a connection; exits once every sender is gone
async fn write_responses(
    mut writer: OwnedWriteHalf,
    mut outbound: mpsc::Receiver<wire::Response>,
    peer: SocketAddr,
) {
    while let Some(response) = outbound.recv().await {
        if let Err(e) = write_frame(&mut writer, &response).await {
            warn!("Failed to write TCP response to {}: {}", peer, e);
            return;
        }
    }
}

/// Stream transport client, one exchange at a time over a persistent socket
///
/// A failed exchange can leave the stream part way through a frame, so the
/// first failure shuts the socket down and every later exchange fails.
pub struct TcpClient {
    stream: TcpStream,
    max_frame: usize,
    broken: bool,
}

impl TcpClient {
    pub async fn connect(addr: &str) -> Result<Connection, TransportError> {
        Self::connect_with_max_frame(addr, DEFAULT_MAX_FRAME).await
    }

    /// Connect, refusing response frames longer than `max_frame` bytes
    pub async fn connect_with_max_frame(
        addr: &str,
        max_frame: usize,
    ) -> Result<Connection, TransportError> {
        let stream = TcpStream::connect(addr).await?;
        info!("TCP client connected to {}", addr);
        Ok(Connection::spawn(Self {
            stream,
            max_frame,
            broken: false,
        }))
    }

    async fn round_trip(&mut self, request: &Request) -> Result<Response, TransportError> {
        write_frame(&mut self.stream, &proto::request_to_proto(request)).await?;

        let frame = read_frame(&mut self.stream, self.max_frame)
            .await?
            .ok_or(TransportError::Malformed("connection closed before response"))?;
        let proto_response = wire::Response::decode(frame)?;
        proto::proto_to_response(&proto_response)
            .ok_or(TransportError::Malformed("invalid response"))
    }
}

#[async_trait]
impl Exchange for TcpClient {
    async fn exchange(&mut self, request: &Request) -> Result<Response, TransportError> {
        if self.broken {
            return Err(TransportError::Disconnected);
        }

        let result = self.round_trip(request).await;
        if result.is_err() {
            self.broken = true;
            if let Err(e) = self.stream.shutdown().await {
                debug!("Error shutting down TCP client stream: {}", e);
            }
        }
        result
    }
}
