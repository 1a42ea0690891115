//! Shared utilities for integration tests.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use upload_dispatch::config::{ListenerConfig, ServerConfig};
use upload_dispatch::http::{Dispatcher, Server};
use upload_dispatch::routing::RouteTable;

/// Config bound to an ephemeral port with small limits.
pub fn test_config() -> ServerConfig {
    let mut config = ServerConfig {
        listener: ListenerConfig {
            bind_address: "127.0.0.1:0".to_string(),
            shutdown_timeout_secs: 5,
            ..ListenerConfig::default()
        },
        ..ServerConfig::default()
    };
    config.limits.max_body_bytes = 1024;
    config.upload.max_file_megabytes = 1;
    config
}

/// Start a server for `routes` and return it with its bound address.
pub async fn start(routes: RouteTable) -> (Server, SocketAddr) {
    let mut server = Server::new(test_config(), routes).unwrap();
    let addr = server.start().await.unwrap();
    (server, addr)
}

pub async fn start_with(dispatcher: Dispatcher) -> (Server, SocketAddr) {
    let mut server = Server::with_dispatcher(test_config(), dispatcher);
    let addr = server.start().await.unwrap();
    (server, addr)
}

pub fn url(addr: SocketAddr, path: &str) -> String {
    format!("http://{addr}{path}")
}

/// A PNG signature followed by filler, `len` bytes in total.
pub fn png_bytes(len: usize) -> Vec<u8> {
    let mut bytes = vec![0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A];
    bytes.extend((0..len.saturating_sub(8)).map(|i| (i % 251) as u8));
    bytes
}

/// Write a raw request and read until the server closes the connection.
pub async fn raw_exchange(addr: SocketAddr, request: &[u8]) -> String {
    let mut stream = TcpStream::connect(addr).await.unwrap();
    stream.write_all(request).await.unwrap();

    let mut response = Vec::new();
    tokio::time::timeout(Duration::from_secs(5), stream.read_to_end(&mut response))
        .await
        .expect("server did not close the connection")
        .unwrap();
    String::from_utf8_lossy(&response).into_owned()
}
