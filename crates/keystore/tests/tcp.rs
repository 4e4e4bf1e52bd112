use keystore::proto::{self, wire};
use keystore::transport::TcpClient;
use keystore::transport::tcp::{DEFAULT_MAX_FRAME, TcpServer, read_frame, write_frame};
use keystore::{ClientError, Dispatcher, DispatcherHandle, Request, Store, ValueType};
use prost::Message;
use serde_json::json;
use std::net::SocketAddr;
use tokio::net::TcpStream;

async fn start_server() -> (DispatcherHandle, SocketAddr) {
    let (dispatcher, handle) = Dispatcher::new(Store::new(), 64);
    dispatcher.start();

    let server = TcpServer::bind("127.0.0.1:0", handle.requests(), DEFAULT_MAX_FRAME)
        .await
        .unwrap();
    let addr = server.local_addr().unwrap();
    tokio::spawn(server.run());
    (handle, addr)
}

#[tokio::test]
async fn test_client_round_trip() {
    let (_handle, addr) = start_server().await;
    let connection = TcpClient::connect(&addr.to_string()).await.unwrap();
    let client = connection.client();

    client.set_int("n", 12).await.unwrap();
    client.set_float("f", 12.0).await.unwrap();
    client
        .set("doc", json!({"list": [1, 2.5, "x", null], "ok": true}))
        .await
        .unwrap();

    assert_eq!(client.get_int("n").await.unwrap(), 12);
    assert_eq!(client.get_float("f").await.unwrap(), 12.0);
    assert_eq!(
        client.get("doc").await.unwrap(),
        json!({"list": [1, 2.5, "x", null], "ok": true})
    );

    client.delete("n").await.unwrap();
    let err = client.get_int("n").await.unwrap_err();
    assert!(matches!(&err, ClientError::Rejected(msg) if msg == "key 'n' does not exist"));

    connection.close().await;
}

#[tokio::test]
async fn test_type_mismatch_over_tcp() {
    let (_handle, addr) = start_server().await;
    let connection = TcpClient::connect(&addr.to_string()).await.unwrap();
    let client = connection.client();

    client.set_string("s", "v").await.unwrap();
    assert!(matches!(
        client.get_bool("s").await,
        Err(ClientError::Rejected(_))
    ));
}

#[tokio::test]
async fn test_clients_share_one_store() {
    let (handle, addr) = start_server().await;
    let first = TcpClient::connect(&addr.to_string()).await.unwrap();
    let second = TcpClient::connect(&addr.to_string()).await.unwrap();

    first.client().set_string("shared", "yes").await.unwrap();
    assert_eq!(second.client().get_string("shared").await.unwrap(), "yes");
    assert_eq!(handle.client().get_string("shared").await.unwrap(), "yes");
}

#[tokio::test]
async fn test_pipelined_requests_get_whole_frames() {
    let (handle, addr) = start_server().await;
    handle.client().set_string("a", "first").await.unwrap();
    handle.client().set_string("b", "second").await.unwrap();

    let mut stream = TcpStream::connect(addr).await.unwrap();
    for key in ["a", "b"] {
        let (request, _pending) = Request::read(key, ValueType::String);
        write_frame(&mut stream, &proto::request_to_proto(&request))
            .await
            .unwrap();
    }

    let mut values = Vec::new();
    for _ in 0..2 {
        let frame = read_frame(&mut stream, DEFAULT_MAX_FRAME)
            .await
            .unwrap()
            .unwrap();
        let response = proto::proto_to_response(&wire::Response::decode(frame).unwrap()).unwrap();
        assert!(response.success);
        values.push(response.value.val);
    }
    values.sort_by_key(|v| v.to_string());
    assert_eq!(values, vec![json!("first"), json!("second")]);
}

#[tokio::test]
async fn test_oversized_response_disconnects_client() {
    let (handle, addr) = start_server().await;
    handle
        .client()
        .set_string("big", "x".repeat(4096))
        .await
        .unwrap();
    handle.client().set_int("small", 1).await.unwrap();

    let connection = TcpClient::connect_with_max_frame(&addr.to_string(), 1024)
        .await
        .unwrap();
    let client = connection.client();

    let err = client.get_string("big").await.unwrap_err();
    assert!(
        matches!(&err, ClientError::Rejected(msg) if msg.contains("exceeds limit")),
        "unexpected error: {err}"
    );

    // The rest of the oversized frame is never read as a response
    let err = client.get_int("small").await.unwrap_err();
    assert!(
        matches!(&err, ClientError::Rejected(msg) if msg.contains("unusable")),
        "unexpected error: {err}"
    );

    // A fresh connection is unaffected
    let fresh = TcpClient::connect(&addr.to_string()).await.unwrap();
    assert_eq!(fresh.client().get_int("small").await.unwrap(), 1);
}
