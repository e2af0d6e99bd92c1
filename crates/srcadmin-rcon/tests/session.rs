//! Client and pool behavior against an in-process mock admin server.

use srcadmin_core::Error;
use srcadmin_rcon::packet::{read_packet, write_packet, Packet};
use srcadmin_rcon::{RconClient, RconPool, TYPE_AUTH, TYPE_AUTH_RESPONSE, TYPE_EXEC, TYPE_VALUE};
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};
use uuid::Uuid;

async fn spawn_server<F, Fut>(handler: F) -> SocketAddr
where
    F: FnOnce(TcpStream) -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send,
{
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        if let Ok((stream, _)) = listener.accept().await {
            handler(stream).await;
        }
    });
    addr
}

/// Accept the AUTH frame and acknowledge it by echoing the request id.
async fn handle_auth(stream: &mut TcpStream) {
    let auth = read_packet(stream).await.unwrap();
    assert_eq!(auth.packet_type, TYPE_AUTH);
    let ack = Packet::new(auth.request_id, TYPE_AUTH_RESPONSE, "");
    write_packet(stream, &ack).await.unwrap();
}

/// Read one EXEC + sentinel round, answer with a single VALUE frame.
async fn handle_exec_round(stream: &mut TcpStream, reply: &str) -> (i32, String) {
    let exec = read_packet(stream).await.unwrap();
    assert_eq!(exec.packet_type, TYPE_EXEC);
    let sentinel = read_packet(stream).await.unwrap();
    assert_eq!(sentinel.packet_type, TYPE_VALUE);
    assert!(sentinel.body.is_empty());

    write_packet(stream, &Packet::new(exec.request_id, TYPE_VALUE, reply))
        .await
        .unwrap();
    write_packet(stream, &Packet::new(sentinel.request_id, TYPE_VALUE, ""))
        .await
        .unwrap();
    (exec.request_id, exec.body)
}

#[tokio::test]
async fn test_connect_and_execute() {
    let addr = spawn_server(|mut stream| async move {
        handle_auth(&mut stream).await;
        let (_, body) = handle_exec_round(&mut stream, "hostname: mock").await;
        assert_eq!(body, "status");
    })
    .await;

    let client = RconClient::new(addr.to_string(), "cs2admin");
    client.connect().await.unwrap();
    assert!(client.is_connected().await);

    let out = client.execute("status").await.unwrap();
    assert_eq!(out, "hostname: mock");
    client.close().await;
}

#[tokio::test]
async fn test_connect_twice_is_noop() {
    let addr = spawn_server(|mut stream| async move {
        handle_auth(&mut stream).await;
        // Keep the socket open; a second connect must not dial again
        let _ = read_packet(&mut stream).await;
    })
    .await;

    let client = RconClient::new(addr.to_string(), "pw");
    client.connect().await.unwrap();
    client.connect().await.unwrap();
    assert!(client.is_connected().await);
}

#[tokio::test]
async fn test_auth_failure_leaves_pool_empty() {
    // Server rejects credentials with request id -1
    let addr = spawn_server(|mut stream| async move {
        let auth = read_packet(&mut stream).await.unwrap();
        assert_eq!(auth.packet_type, TYPE_AUTH);
        let nack = Packet::new(-1, TYPE_AUTH_RESPONSE, "");
        write_packet(&mut stream, &nack).await.unwrap();
    })
    .await;

    let pool = RconPool::new();
    let id = Uuid::new_v4();

    let result = pool.connect(id, addr.to_string(), "wrong").await;
    assert!(matches!(result, Err(Error::AuthFailed)));
    assert!(pool.get(id).is_none());

    let result = pool.execute(id, "status").await;
    assert!(matches!(result, Err(Error::NotConnected(_))));
}

#[tokio::test]
async fn test_fragmented_response_reassembly() {
    let addr = spawn_server(|mut stream| async move {
        handle_auth(&mut stream).await;

        let exec = read_packet(&mut stream).await.unwrap();
        assert_eq!(exec.body, "status");
        let sentinel = read_packet(&mut stream).await.unwrap();

        // Response split across three VALUE frames, one of them empty,
        // then the sentinel echo
        for body in ["hostn", "ame: x", ""] {
            write_packet(&mut stream, &Packet::new(exec.request_id, TYPE_VALUE, body))
                .await
                .unwrap();
        }
        write_packet(
            &mut stream,
            &Packet::new(sentinel.request_id, TYPE_VALUE, ""),
        )
        .await
        .unwrap();
    })
    .await;

    let client = RconClient::new(addr.to_string(), "pw");
    client.connect().await.unwrap();

    let out = client.execute("status").await.unwrap();
    assert_eq!(out, "hostname: x");
}

#[tokio::test]
async fn test_pool_uniqueness() {
    let pool = Arc::new(RconPool::new());
    let id = Uuid::new_v4();

    let addr = spawn_server(|mut stream| async move {
        handle_auth(&mut stream).await;
        let _ = read_packet(&mut stream).await;
    })
    .await;

    pool.connect(id, addr.to_string(), "pw").await.unwrap();
    assert_eq!(pool.len(), 1);

    let result = pool.connect(id, addr.to_string(), "pw").await;
    assert!(matches!(result, Err(Error::AlreadyConnected(_))));
    assert_eq!(pool.len(), 1);

    pool.disconnect(id).await;
    assert!(pool.is_empty());
}

#[tokio::test]
async fn test_concurrent_executes_are_serialized() {
    const ROUNDS: usize = 8;

    let (ids_tx, ids_rx) = std::sync::mpsc::channel::<i32>();
    let addr = spawn_server(move |mut stream| async move {
        handle_auth(&mut stream).await;
        // Each round must arrive as a complete EXEC + sentinel pair; any
        // interleaving would trip the type asserts in handle_exec_round
        for _ in 0..ROUNDS {
            let (exec_id, _) = handle_exec_round(&mut stream, "ok").await;
            ids_tx.send(exec_id).unwrap();
        }
    })
    .await;

    let client = Arc::new(RconClient::new(addr.to_string(), "pw"));
    client.connect().await.unwrap();

    let mut handles = Vec::new();
    for _ in 0..ROUNDS {
        let client = Arc::clone(&client);
        handles.push(tokio::spawn(
            async move { client.execute("noop").await },
        ));
    }
    for handle in handles {
        assert_eq!(handle.await.unwrap().unwrap(), "ok");
    }

    let observed: Vec<i32> = ids_rx.try_iter().collect();
    assert_eq!(observed.len(), ROUNDS);
    for pair in observed.windows(2) {
        assert!(pair[0] < pair[1], "request ids not strictly increasing");
    }
}
