use keystore::proto::{self, wire};
use keystore::transport::UdpClient;
use keystore::transport::udp::{DEFAULT_BUFFER_SIZE, UdpServer};
use keystore::{ClientError, Dispatcher, DispatcherHandle, Store};
use prost::Message;
use serde_json::json;
use std::net::SocketAddr;
use tokio::net::UdpSocket;

async fn start_server() -> (DispatcherHandle, SocketAddr) {
    let (dispatcher, handle) = Dispatcher::new(Store::new(), 64);
    dispatcher.start();

    let server = UdpServer::bind("127.0.0.1:0", handle.requests(), DEFAULT_BUFFER_SIZE)
        .await
        .unwrap();
    let addr = server.local_addr().unwrap();
    tokio::spawn(server.run());
    (handle, addr)
}

#[tokio::test]
async fn test_client_round_trip() {
    let (_handle, addr) = start_server().await;
    let connection = UdpClient::connect(&addr.to_string(), "127.0.0.1:0")
        .await
        .unwrap();
    let client = connection.client();

    client.set_bool("b", true).await.unwrap();
    client.set_array("a", vec![json!(1), json!(1.5)]).await.unwrap();

    assert!(client.get_bool("b").await.unwrap());
    assert_eq!(
        client.get_array("a").await.unwrap(),
        vec![json!(1), json!(1.5)]
    );
    assert_eq!(client.get("b").await.unwrap(), json!(true));

    client.delete("b").await.unwrap();
    let err = client.get("b").await.unwrap_err();
    assert!(matches!(&err, ClientError::Rejected(msg) if msg == "key 'b' does not exist"));

    connection.close().await;
}

#[tokio::test]
async fn test_garbage_packet_gets_error_response() {
    let (_handle, addr) = start_server().await;
    let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    socket.connect(addr).await.unwrap();

    // Field 1 as a length-delimited value cut short
    socket.send(&[0x0a, 0xff, 0x01]).await.unwrap();

    let mut buf = vec![0u8; DEFAULT_BUFFER_SIZE];
    let n = socket.recv(&mut buf).await.unwrap();
    let response = proto::proto_to_response(&wire::Response::decode(&buf[..n]).unwrap()).unwrap();
    assert!(!response.success);
    assert!(!response.error.is_empty());
}

#[tokio::test]
async fn test_oversized_packet_is_truncated_and_server_keeps_serving() {
    let (handle, addr) = start_server().await;
    let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    socket.connect(addr).await.unwrap();

    let (request, _pending) = keystore::Request::write(
        "big",
        keystore::ValueType::String,
        json!("x".repeat(DEFAULT_BUFFER_SIZE * 2)),
    );
    let packet = proto::request_to_proto(&request).encode_to_vec();
    assert!(packet.len() > DEFAULT_BUFFER_SIZE);
    socket.send(&packet).await.unwrap();

    let mut buf = vec![0u8; DEFAULT_BUFFER_SIZE];
    let n = socket.recv(&mut buf).await.unwrap();
    let response = proto::proto_to_response(&wire::Response::decode(&buf[..n]).unwrap()).unwrap();
    assert!(!response.success);
    assert!(handle.client().get("big").await.is_err());

    let connection = UdpClient::connect(&addr.to_string(), "127.0.0.1:0")
        .await
        .unwrap();
    connection.client().set_int("after", 3).await.unwrap();
    assert_eq!(handle.client().get_int("after").await.unwrap(), 3);
}
