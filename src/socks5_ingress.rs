//! SOCKS5 ingress state machine (RFC 1928 + RFC 1929). See SPEC_FULL.md §4.3.
//!
//! Split into two phases — [`read_greeting_and_auth`] and
//! [`read_connect_request`] — rather than one function that reads the whole
//! handshake, because the policy decision has to land in between: a
//! rejected session must close right after the `01 00` sub-negotiation
//! reply, before the CONNECT request is even read off the wire.

use tokio::io::{AsyncRead, AsyncWrite};

use crate::error::{BridgeError, Result};
use crate::framing::{read_exact_n, read_len_prefixed, read_u16_be, write_all};
use crate::session::Credentials;

const CMD_CONNECT: u8 = 0x01;
const ATYP_IPV4: u8 = 0x01;
const ATYP_DOMAIN: u8 = 0x03;
const MAX_DOMAIN_LEN: u8 = 0x80;

/// Run the greeting and username/password sub-negotiation, having already
/// consumed the `0x05` version byte via the discriminator. Always replies
/// `05 02` to the greeting and `01 00` to the sub-negotiation, regardless of
/// what the client offered or what credentials it sent — the actual
/// accept/reject decision is the caller's to make from the returned
/// credentials, and is enforced by closing the socket rather than replying.
pub async fn read_greeting_and_auth<S: AsyncRead + AsyncWrite + Unpin>(stream: &mut S) -> Result<Credentials> {
  let nmethods = read_exact_n(stream, 1).await?[0] as usize;
  if nmethods == 0 || nmethods == 0xFF {
    return Err(BridgeError::MalformedRequest(format!(
      "SOCKS5 greeting offered an invalid method count: {nmethods}"
    )));
  }
  let _methods = read_exact_n(stream, nmethods).await?;

  write_all(stream, &[0x05, 0x02]).await?;

  let credentials = read_username_password(stream).await?;
  write_all(stream, &[0x01, 0x00]).await?;

  Ok(credentials)
}

async fn read_username_password<S: AsyncRead + Unpin>(stream: &mut S) -> Result<Credentials> {
  let ver = read_exact_n(stream, 1).await?[0];
  if ver != 0x01 {
    return Err(BridgeError::MalformedRequest(format!(
      "unsupported sub-negotiation version: {ver:#x}"
    )));
  }
  let user = read_len_prefixed(stream).await?;
  let password = read_len_prefixed(stream).await?;
  Ok(Credentials {
    user: String::from_utf8_lossy(&user).into_owned(),
    password: String::from_utf8_lossy(&password).into_owned(),
  })
}

/// Read the CONNECT request (`VER CMD RSV ATYP ...`) and return its target
/// as `(host, port)`. Only ever called once the policy hook has already
/// authorized the session.
pub async fn read_connect_request<S: AsyncRead + Unpin>(stream: &mut S) -> Result<(String, u16)> {
  let header = read_exact_n(stream, 3).await?; // VER CMD RSV
  if header[0] != 0x05 {
    return Err(BridgeError::MalformedRequest(format!(
      "bad SOCKS5 version in request: {:#x}",
      header[0]
    )));
  }
  if header[1] != CMD_CONNECT {
    return Err(BridgeError::Socks5Unsupported(format!(
      "CMD {:#x} (only CONNECT is supported)",
      header[1]
    )));
  }

  let atyp = read_exact_n(stream, 1).await?[0];
  let host = match atyp {
    ATYP_IPV4 => {
      let octets = read_exact_n(stream, 4).await?;
      format!("{}.{}.{}.{}", octets[0], octets[1], octets[2], octets[3])
    }
    ATYP_DOMAIN => {
      let len = read_exact_n(stream, 1).await?[0];
      if len > MAX_DOMAIN_LEN {
        return Err(BridgeError::Socks5Unsupported(format!("domain name length {len} exceeds {MAX_DOMAIN_LEN}")));
      }
      let name = read_exact_n(stream, len as usize).await?;
      String::from_utf8(name).map_err(|_| BridgeError::MalformedRequest("non-UTF-8 domain name".into()))?
    }
    other => return Err(BridgeError::Socks5Unsupported(format!("ATYP {other:#x} (only IPv4 and domain are supported)"))),
  };
  let port = read_u16_be(stream).await?;
  Ok((host, port))
}

/// Write the fixed SOCKS5 success reply (`BND.ADDR`/`BND.PORT` zeroed, as
/// the original source does — real bound-address reporting isn't needed by
/// any client this bridge talks to).
pub async fn write_connect_success<W: AsyncWrite + Unpin>(stream: &mut W) -> Result<()> {
  write_all(stream, &[0x05, 0x00, 0x00, 0x01, 0, 0, 0, 0, 0, 0]).await
}
