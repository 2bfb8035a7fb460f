//! The embedding API: binds a listener, drives each connection's handshake
//! under a timeout, and wires ingress → policy → upstream → response →
//! relay. See SPEC_FULL.md §5/§6.

use std::sync::Arc;
use std::time::Duration;

use tokio::io::AsyncReadExt;
use tokio::net::{TcpListener, TcpStream};

use crate::error::{BridgeError, Result};
use crate::http_ingress::parse_http_ingress;
use crate::policy::ProxyPolicy;
use crate::relay::relay;
use crate::response::{forward_direct_request, write_tunnel_established};
use crate::session::{Credentials, IngressProtocol, SessionInfo, UpstreamScheme, UpstreamTarget};
use crate::socks5_ingress::{read_connect_request, read_greeting_and_auth};
use crate::upstream_http::connect_via_http_upstream;
use crate::upstream_socks5::connect_via_socks5_upstream;

/// Tunables for the bridge, separate from any one session's behavior.
#[derive(Debug, Clone)]
pub struct BridgeConfig {
  pub bind_addr: String,
  pub handshake_timeout: Duration,
  pub max_header_bytes: usize,
}

impl Default for BridgeConfig {
  fn default() -> Self {
    Self {
      bind_addr: "127.0.0.1:0".to_string(),
      handshake_timeout: Duration::from_secs(10),
      max_header_bytes: 64 * 1024,
    }
  }
}

/// Owns a policy and its config; cheap to clone, so each accepted connection
/// gets its own copy of the handle rather than sharing `&Bridge` across
/// spawned tasks.
#[derive(Clone)]
pub struct Bridge {
  config: BridgeConfig,
  policy: Arc<dyn ProxyPolicy>,
}

impl Bridge {
  pub fn new(config: BridgeConfig, policy: Arc<dyn ProxyPolicy>) -> Self {
    Self { config, policy }
  }

  /// Bind the listener and return it alongside the resolved local address,
  /// so callers that asked for port 0 can learn the real port before the
  /// accept loop starts.
  pub async fn bind(&self) -> std::io::Result<TcpListener> {
    TcpListener::bind(&self.config.bind_addr).await
  }

  /// Drive a single accepted client connection's handshake: discriminate
  /// the ingress protocol, parse the session, consult the policy hook, open
  /// the upstream (direct or level-2), and emit the ingress-side success
  /// reply. Returns the upstream socket on success, ready to be handed to
  /// [`relay`] alongside `client`. Every failure just closes the socket —
  /// the bridge never sends a protocol-level error reply (§7).
  pub async fn handshake(&self, client: &mut TcpStream) -> Result<TcpStream> {
    tokio::time::timeout(self.config.handshake_timeout, self.handshake_inner(client))
      .await
      .map_err(|_| BridgeError::Timeout)?
  }

  async fn handshake_inner(&self, client: &mut TcpStream) -> Result<TcpStream> {
    let first_byte = client.read_u8().await?;
    let upstream = if first_byte == 0x05 {
      self.handshake_socks5(client).await?
    } else {
      self.handshake_http(client, first_byte).await?
    };
    Ok(upstream)
  }

  /// HTTP ingress reads the whole request (request line, headers,
  /// credentials) in one shot before the policy hook is ever consulted —
  /// there's no separate wire round for auth to interleave with.
  async fn handshake_http(&self, client: &mut TcpStream, first_byte: u8) -> Result<TcpStream> {
    let session = parse_http_ingress(client, first_byte, self.config.max_header_bytes).await?;
    let upstream_target = self
      .policy
      .on_auth(&session.credentials.user, &session.credentials.password)
      .await?;
    let upstream = self.establish_upstream(client, &session, upstream_target).await?;
    self.policy.on_success(client, &upstream);
    Ok(upstream)
  }

  /// SOCKS5 ingress has a distinct wire round for the auth sub-negotiation
  /// before the CONNECT request; the policy hook is consulted right after
  /// that round (and before the CONNECT request is read), so a rejected
  /// session closes having sent nothing beyond the `05 02`/`01 00` replies.
  async fn handshake_socks5(&self, client: &mut TcpStream) -> Result<TcpStream> {
    let credentials = read_greeting_and_auth(client).await?;
    let upstream_target = self.policy.on_auth(&credentials.user, &credentials.password).await?;

    let (target_host, target_port) = read_connect_request(client).await?;
    let session = socks5_session(target_host, target_port, credentials);

    let upstream = self.establish_upstream(client, &session, upstream_target).await?;
    self.policy.on_success(client, &upstream);
    Ok(upstream)
  }

  async fn establish_upstream(
    &self,
    client: &mut TcpStream,
    session: &SessionInfo,
    upstream_target: Option<UpstreamTarget>,
  ) -> Result<TcpStream> {
    match upstream_target {
      Some(target) => {
        let mut upstream = dial_upstream(session, &target).await?;
        write_tunnel_established(client, session).await?;
        // A level-2 HTTP proxy already received the (rewritten) request as
        // part of establishing the upstream connection itself. A level-2
        // SOCKS5 proxy only ran the generic CONNECT handshake, so a plain
        // (non-CONNECT) HTTP request still needs replaying onto the now-
        // tunneled socket, exactly as for a direct dial.
        if target.scheme == UpstreamScheme::Socks5 {
          forward_direct_request(&mut upstream, session).await?;
        }
        Ok(upstream)
      }
      None => {
        let mut origin = TcpStream::connect(session.target_addr())
          .await
          .map_err(|e| BridgeError::UpstreamConnectFailed(session.target_addr(), e.to_string()))?;
        write_tunnel_established(client, session).await?;
        forward_direct_request(&mut origin, session).await?;
        Ok(origin)
      }
    }
  }

  /// Accept connections forever, spawning one task per connection that
  /// performs [`handshake`](Self::handshake) followed by [`relay`]. Returns
  /// only on a listener-level I/O error.
  pub async fn run(&self, listener: TcpListener) -> std::io::Result<()> {
    loop {
      let (mut stream, peer) = listener.accept().await?;
      log::debug!("accepted connection from {peer}");
      let bridge = self.clone();
      tokio::spawn(async move {
        match bridge.handshake(&mut stream).await {
          Ok(upstream) => {
            if let Err(e) = relay(stream, upstream).await {
              log::warn!("relay for {peer} ended with an error: {e}");
            }
          }
          Err(e) => log::warn!("handshake with {peer} failed: {e}"),
        }
      });
    }
  }
}

fn socks5_session(target_host: String, target_port: u16, credentials: Credentials) -> SessionInfo {
  SessionInfo {
    ingress_protocol: IngressProtocol::Socks5,
    method: None,
    target_host,
    target_port,
    original_request_line: String::new(),
    origin_header_block: String::new(),
    forward_header_block: String::new(),
    auth_line: None,
    target_absolute_prefix: None,
    credentials,
  }
}

async fn dial_upstream(session: &SessionInfo, target: &UpstreamTarget) -> Result<TcpStream> {
  match target.scheme {
    UpstreamScheme::Http => connect_via_http_upstream(session, target).await,
    UpstreamScheme::Socks5 => connect_via_socks5_upstream(session, target).await,
  }
}
