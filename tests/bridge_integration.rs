//! End-to-end scenarios exercising every ingress × level-2 combination, using
//! the credential scheme the original source's test suite already defines:
//! `hh1` (HTTP ingress, HTTP level-2), `ss1` (SOCKS5 ingress, SOCKS5
//! level-2), `hs1` (HTTP ingress, SOCKS5 level-2), `sh1` (SOCKS5 ingress,
//! HTTP level-2), and `x`/`y` (direct, no level-2 at all).

mod common;

use std::net::SocketAddr;
use std::sync::Arc;

use async_trait::async_trait;
use base64::Engine;
use pproxy_bridge::{BridgeError, ProxyPolicy, Result, UpstreamTarget};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

/// Mirrors the original test suite's `OnAuth` fixture: a fixed table of
/// known (user, password) pairs, each mapping to either a level-2 URL or
/// direct dial, everything else rejected.
struct TableDrivenPolicy {
  routes: Vec<(&'static str, &'static str, Option<String>)>,
}

#[async_trait]
impl ProxyPolicy for TableDrivenPolicy {
  async fn on_auth(&self, user: &str, password: &str) -> Result<Option<UpstreamTarget>> {
    for (u, p, route) in &self.routes {
      if *u == user && *p == password {
        return match route {
          None => Ok(None),
          Some(url) => pproxy_bridge::policy::parse_upstream_target(url).map(Some),
        };
      }
    }
    Err(BridgeError::PolicyRejected(format!("unknown credentials: {user}:{password}")))
  }
}

async fn spawn_level2() -> SocketAddr {
  let policy = TableDrivenPolicy {
    routes: vec![("h2", "h2", None), ("s2", "s2", None)],
  };
  common::spawn_bridge(Arc::new(policy)).await
}

async fn spawn_level1(level2_addr: SocketAddr) -> SocketAddr {
  let policy = TableDrivenPolicy {
    routes: vec![
      ("hh1", "hh1", Some(format!("http://h2:h2@{level2_addr}"))),
      ("ss1", "ss1", Some(format!("socks5://s2:s2@{level2_addr}"))),
      ("hs1", "hs1", Some(format!("socks5://s2:s2@{level2_addr}"))),
      ("sh1", "sh1", Some(format!("http://h2:h2@{level2_addr}"))),
      ("x", "y", None),
    ],
  };
  common::spawn_bridge(Arc::new(policy)).await
}

async fn http_connect_tunnel(bridge_addr: SocketAddr, target: SocketAddr, user: &str, pass: &str) -> TcpStream {
  let mut stream = TcpStream::connect(bridge_addr).await.unwrap();
  let target = format!("{}:{}", target.ip(), target.port());
  let auth = base64::engine::general_purpose::STANDARD.encode(format!("{user}:{pass}"));
  let request = format!(
    "CONNECT {target} HTTP/1.1\r\nHost: {target}\r\nProxy-Authorization: Basic {auth}\r\n\r\n"
  );
  stream.write_all(request.as_bytes()).await.unwrap();

  let response = read_until_blank_line(&mut stream).await;
  assert!(
    response.starts_with("HTTP/1.1 200"),
    "unexpected CONNECT response: {response:?}"
  );
  stream
}

async fn socks5_connect_tunnel(bridge_addr: SocketAddr, target: SocketAddr, user: &str, pass: &str) -> TcpStream {
  let mut stream = TcpStream::connect(bridge_addr).await.unwrap();
  stream.write_all(&[0x05, 0x01, 0x02]).await.unwrap();
  let mut choice = [0u8; 2];
  stream.read_exact(&mut choice).await.unwrap();
  assert_eq!(choice, [0x05, 0x02]);

  let mut login = vec![0x01u8, user.len() as u8];
  login.extend_from_slice(user.as_bytes());
  login.push(pass.len() as u8);
  login.extend_from_slice(pass.as_bytes());
  stream.write_all(&login).await.unwrap();
  let mut login_reply = [0u8; 2];
  stream.read_exact(&mut login_reply).await.unwrap();
  assert_eq!(login_reply[1], 0x00, "login rejected");

  let ip = match target.ip() {
    std::net::IpAddr::V4(v4) => v4.octets(),
    _ => panic!("test fixture only uses IPv4"),
  };
  let mut request = vec![0x05, 0x01, 0x00, 0x01];
  request.extend_from_slice(&ip);
  request.extend_from_slice(&target.port().to_be_bytes());
  stream.write_all(&request).await.unwrap();

  let mut reply = [0u8; 10];
  stream.read_exact(&mut reply).await.unwrap();
  assert_eq!((reply[0], reply[1]), (0x05, 0x00), "CONNECT failed");
  stream
}

async fn read_until_blank_line(stream: &mut TcpStream) -> String {
  let mut buf = Vec::new();
  let mut byte = [0u8; 1];
  loop {
    stream.read_exact(&mut byte).await.unwrap();
    buf.push(byte[0]);
    if buf.ends_with(b"\r\n\r\n") {
      return String::from_utf8_lossy(&buf).into_owned();
    }
  }
}

async fn assert_tunnel_echoes(mut stream: TcpStream) {
  stream.write_all(b"ping").await.unwrap();
  let mut buf = [0u8; 4];
  stream.read_exact(&mut buf).await.unwrap();
  assert_eq!(&buf, b"ping");
}

#[tokio::test]
async fn http_ingress_http_level2() {
  let origin = common::spawn_echo_server().await;
  let level2 = spawn_level2().await;
  let level1 = spawn_level1(level2).await;

  let stream = http_connect_tunnel(level1, origin, "hh1", "hh1").await;
  assert_tunnel_echoes(stream).await;
}

#[tokio::test]
async fn socks5_ingress_socks5_level2() {
  let origin = common::spawn_echo_server().await;
  let level2 = spawn_level2().await;
  let level1 = spawn_level1(level2).await;

  let stream = socks5_connect_tunnel(level1, origin, "ss1", "ss1").await;
  assert_tunnel_echoes(stream).await;
}

#[tokio::test]
async fn http_ingress_socks5_level2() {
  let origin = common::spawn_echo_server().await;
  let level2 = spawn_level2().await;
  let level1 = spawn_level1(level2).await;

  let stream = http_connect_tunnel(level1, origin, "hs1", "hs1").await;
  assert_tunnel_echoes(stream).await;
}

#[tokio::test]
async fn socks5_ingress_http_level2() {
  let origin = common::spawn_echo_server().await;
  let level2 = spawn_level2().await;
  let level1 = spawn_level1(level2).await;

  let stream = socks5_connect_tunnel(level1, origin, "sh1", "sh1").await;
  assert_tunnel_echoes(stream).await;
}

#[tokio::test]
async fn direct_dial_bypasses_level2() {
  let origin = common::spawn_echo_server().await;
  let level2 = spawn_level2().await;
  let level1 = spawn_level1(level2).await;

  let stream = http_connect_tunnel(level1, origin, "x", "y").await;
  assert_tunnel_echoes(stream).await;
}

#[tokio::test]
async fn unknown_credentials_are_rejected() {
  let origin = common::spawn_echo_server().await;
  let level2 = spawn_level2().await;
  let level1 = spawn_level1(level2).await;

  let mut stream = TcpStream::connect(level1).await.unwrap();
  let target = format!("{}:{}", origin.ip(), origin.port());
  let auth = base64::engine::general_purpose::STANDARD.encode("nope:nope");
  let request =
    format!("CONNECT {target} HTTP/1.1\r\nHost: {target}\r\nProxy-Authorization: Basic {auth}\r\n\r\n");
  stream.write_all(request.as_bytes()).await.unwrap();

  // The bridge drops the connection rather than replying; a read returns
  // EOF (0 bytes) instead of a 200 response.
  let mut buf = [0u8; 1];
  let n = stream.read(&mut buf).await.unwrap_or(0);
  assert_eq!(n, 0, "expected connection to be closed after rejected auth");
}
