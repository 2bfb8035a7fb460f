//! Upstream ("level-2") SOCKS5 client. See SPEC_FULL.md §4.6.
//!
//! Parses the wire directly rather than going through a SOCKS5 client crate,
//! so the exact byte sequence and ordering required by the handshake is
//! guaranteed rather than hidden behind a black-box `connect()` call.

use tokio::net::TcpStream;

use crate::error::{BridgeError, Result};
use crate::framing::{read_exact_n, write_all};
use crate::session::{SessionInfo, UpstreamTarget};

const METHOD_NO_AUTH: u8 = 0x00;
const METHOD_USERPASS: u8 = 0x02;

pub async fn connect_via_socks5_upstream(
  session: &SessionInfo,
  upstream: &UpstreamTarget,
) -> Result<TcpStream> {
  let mut stream = TcpStream::connect((upstream.host.as_str(), upstream.port))
    .await
    .map_err(|e| BridgeError::UpstreamConnectFailed(format!("{}:{}", upstream.host, upstream.port), e.to_string()))?;

  // Offer both no-auth and username/password; let the server pick.
  write_all(&mut stream, &[0x05, 0x02, METHOD_NO_AUTH, METHOD_USERPASS]).await?;
  let choice = read_exact_n(&mut stream, 2).await?;
  if choice[0] != 0x05 {
    return Err(BridgeError::UpstreamProtocolError(format!(
      "level-2 SOCKS5 proxy replied with bad version: {:#x}",
      choice[0]
    )));
  }

  match choice[1] {
    METHOD_USERPASS => {
      let mut login = vec![0x01u8];
      push_len_prefixed(&mut login, upstream.username.as_bytes());
      push_len_prefixed(&mut login, upstream.password.as_bytes());
      write_all(&mut stream, &login).await?;
      let reply = read_exact_n(&mut stream, 2).await?;
      if reply[1] != 0x00 {
        return Err(BridgeError::UpstreamProtocolError(
          "level-2 SOCKS5 proxy rejected credentials".into(),
        ));
      }
    }
    METHOD_NO_AUTH => {}
    0xFF => {
      return Err(BridgeError::UpstreamProtocolError(
        "level-2 SOCKS5 proxy accepted no offered auth method".into(),
      ))
    }
    other => {
      return Err(BridgeError::UpstreamProtocolError(format!(
        "level-2 SOCKS5 proxy chose unsupported method {other:#x}"
      )))
    }
  }

  write_all(&mut stream, &connect_request(session)).await?;
  let reply = read_exact_n(&mut stream, 10).await?;
  if reply[0] != 0x05 || reply[1] != 0x00 {
    return Err(BridgeError::UpstreamProtocolError(format!(
      "level-2 SOCKS5 CONNECT failed, REP={:#x}",
      reply[1]
    )));
  }

  Ok(stream)
}

fn push_len_prefixed(buf: &mut Vec<u8>, bytes: &[u8]) {
  buf.push(bytes.len() as u8);
  buf.extend_from_slice(bytes);
}

/// Always addresses the target by domain name (ATYP 0x03), regardless of
/// whether the original session target was an IP literal: the level-2
/// proxy is told to resolve it, just as the original source does.
fn connect_request(session: &SessionInfo) -> Vec<u8> {
  let mut req = vec![0x05, 0x01, 0x00, 0x03];
  push_len_prefixed(&mut req, session.target_host.as_bytes());
  req.extend_from_slice(&session.target_port.to_be_bytes());
  req
}
