//! Writes the ingress-facing reply once a tunnel (direct or level-2) is
//! established, or once a plain HTTP request has been forwarded and needs
//! its request line rewritten before the raw bytes are relayed. See
//! SPEC_FULL.md §4.7.

use tokio::io::AsyncWrite;

use crate::error::Result;
use crate::framing::write_all;
use crate::http_ingress::rewrite_request_line_origin_form;
use crate::session::{IngressProtocol, SessionInfo};
use crate::socks5_ingress::write_connect_success;

/// Tell the client its tunnel is up. For HTTP CONNECT this is the classic
/// `200 Connection Established` line; for SOCKS5 it's the fixed success
/// reply. Non-CONNECT HTTP requests have nothing to announce here — the
/// upstream's actual response is what gets relayed.
pub async fn write_tunnel_established<W: AsyncWrite + Unpin>(
  client: &mut W,
  session: &SessionInfo,
) -> Result<()> {
  match session.ingress_protocol {
    IngressProtocol::Http => {
      if session.method.as_deref() == Some("CONNECT") {
        write_all(client, b"HTTP/1.1 200 Connection Established\r\n\r\n").await?;
      }
    }
    IngressProtocol::Socks5 => write_connect_success(client).await?,
  }
  Ok(())
}

/// For a direct (no level-2) dial of a plain HTTP request, replay the
/// request onto the origin connection: the request line is rewritten to
/// origin-form (absolute-URI prefix stripped) since it's no longer being
/// sent to a proxy.
pub async fn forward_direct_request<W: AsyncWrite + Unpin>(
  origin: &mut W,
  session: &SessionInfo,
) -> Result<()> {
  if session.ingress_protocol != IngressProtocol::Http || session.method.as_deref() == Some("CONNECT") {
    return Ok(());
  }
  let request_line = rewrite_request_line_origin_form(session);
  let mut out = request_line;
  out.push_str(&session.forward_header_block);
  write_all(origin, out.as_bytes()).await
}
