//! Upstream ("level-2") HTTP proxy client. See SPEC_FULL.md §4.5.

use base64::Engine;
use tokio::net::TcpStream;

use crate::error::{BridgeError, Result};
use crate::framing::{read_header_block, write_all};
use crate::session::{IngressProtocol, SessionInfo, UpstreamTarget};

/// Dial `upstream` and drive whatever exchange is needed to establish the
/// tunnel (or, for a plain HTTP forward, to hand the request off), mirroring
/// the original source's `httpLevel2`.
pub async fn connect_via_http_upstream(
  session: &SessionInfo,
  upstream: &UpstreamTarget,
) -> Result<TcpStream> {
  let mut stream = TcpStream::connect((upstream.host.as_str(), upstream.port))
    .await
    .map_err(|e| BridgeError::UpstreamConnectFailed(format!("{}:{}", upstream.host, upstream.port), e.to_string()))?;

  let auth_line = proxy_authorization_line(upstream);
  let is_connect = session.ingress_protocol == IngressProtocol::Http && session.method.as_deref() == Some("CONNECT");

  let request = match session.ingress_protocol {
    // The client's own request, replayed as-is: absolute-form request line
    // preserved (the next hop is also a proxy), headers preserved verbatim
    // except the client's Proxy-Authorization is swapped for the level-2
    // proxy's own credentials.
    IngressProtocol::Http => {
      let header_block = rewrite_origin_header_block(session, &auth_line);
      format!("{}{}", session.original_request_line, header_block)
    }
    // No original HTTP request exists to replay; synthesize a fresh CONNECT.
    IngressProtocol::Socks5 => synthesize_connect_request(session, &auth_line),
  };

  write_all(&mut stream, request.as_bytes()).await?;

  // A SOCKS5-originated session is always establishing a tunnel; an
  // HTTP-originated session only is if the client itself sent CONNECT.
  // Anything else is a plain forward whose response flows through the
  // relay pump untouched.
  if is_connect || session.ingress_protocol == IngressProtocol::Socks5 {
    let response = read_header_block(&mut stream, None, 8192).await?;
    let text = String::from_utf8_lossy(&response);
    if !text.starts_with("HTTP/1.1 200") && !text.starts_with("HTTP/1.0 200") {
      return Err(BridgeError::UpstreamProtocolError(format!(
        "level-2 HTTP proxy refused CONNECT: {}",
        text.lines().next().unwrap_or("")
      )));
    }
  }

  Ok(stream)
}

fn proxy_authorization_line(upstream: &UpstreamTarget) -> Option<String> {
  if !upstream.has_credentials() {
    return None;
  }
  let token = base64::engine::general_purpose::STANDARD
    .encode(format!("{}:{}", upstream.username, upstream.password));
  Some(format!("Proxy-Authorization: Basic {token}\r\n"))
}

/// Remove the client's own `Proxy-Authorization` line (if any) from
/// `origin_header_block` and splice in the level-2 proxy's credentials (if
/// any), keeping every other header — including other `Proxy-*` headers —
/// verbatim, since the next hop is itself a proxy.
fn rewrite_origin_header_block(session: &SessionInfo, new_auth_line: &Option<String>) -> String {
  let mut block = match &session.auth_line {
    Some(old) => session.origin_header_block.replacen(old.as_str(), "", 1),
    None => session.origin_header_block.clone(),
  };
  if let Some(new) = new_auth_line {
    block = format!("{new}{block}");
  }
  block
}

/// Used when the ingress session is itself a tunnel request with no
/// underlying HTTP request to replay (a SOCKS5 CONNECT): synthesize a fresh
/// `CONNECT host:port` request against the level-2 proxy.
fn synthesize_connect_request(session: &SessionInfo, auth_line: &Option<String>) -> String {
  let target = session.target_addr();
  let mut out = format!("CONNECT {target} HTTP/1.1\r\nHost: {target}\r\n");
  if let Some(line) = auth_line {
    out.push_str(line);
  }
  out.push_str("\r\n");
  out
}
