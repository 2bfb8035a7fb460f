//! Shared fixtures for the end-to-end scenarios in `bridge_integration.rs`:
//! a throwaway echo origin and an in-process bridge instance, both bound to
//! ephemeral ports.

use std::net::SocketAddr;
use std::sync::Arc;

use pproxy_bridge::{Bridge, BridgeConfig, ProxyPolicy};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

/// Start a TCP server that echoes back whatever it reads, until the peer
/// closes its write half. Stands in for an "origin server" on the far side
/// of a tunnel.
pub async fn spawn_echo_server() -> SocketAddr {
  let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
  let addr = listener.local_addr().unwrap();
  tokio::spawn(async move {
    loop {
      let (mut stream, _) = match listener.accept().await {
        Ok(pair) => pair,
        Err(_) => return,
      };
      tokio::spawn(async move {
        let mut buf = [0u8; 4096];
        loop {
          match stream.read(&mut buf).await {
            Ok(0) | Err(_) => return,
            Ok(n) => {
              if stream.write_all(&buf[..n]).await.is_err() {
                return;
              }
            }
          }
        }
      });
    }
  });
  addr
}

/// Start a bridge instance with the given policy and return its bound
/// address. Used both as the "level-1" bridge under test and as a "level-2"
/// upstream bridge that the level-1 bridge dials into.
pub async fn spawn_bridge(policy: Arc<dyn ProxyPolicy>) -> SocketAddr {
  let config = BridgeConfig {
    bind_addr: "127.0.0.1:0".to_string(),
    ..BridgeConfig::default()
  };
  let bridge = Bridge::new(config, policy);
  let listener = bridge.bind().await.unwrap();
  let addr = listener.local_addr().unwrap();
  tokio::spawn(async move {
    let _ = bridge.run(listener).await;
  });
  addr
}
