//! Bounded, protocol-agnostic reads shared by the ingress parsers and the
//! upstream clients. HTTP framing reads byte-at-a-time so the reader never
//! consumes bytes past the boundary it's looking for, which is what lets
//! the rest of the bridge avoid any pushback/prepend buffer.

use crate::error::{BridgeError, Result};
use tokio::io::{AsyncReadExt, AsyncWriteExt};

/// Read bytes one at a time until the accumulated buffer ends with
/// `\r\n\r\n`, or fail with `HeaderTooLarge` once `max_bytes` is exceeded.
///
/// Mirrors the original source's byte-at-a-time header loop: reading a
/// single byte per `read()` call means we can never read past the blank
/// line that terminates the header block.
pub async fn read_header_block<R: tokio::io::AsyncRead + Unpin>(
  stream: &mut R,
  first_byte: Option<u8>,
  max_bytes: usize,
) -> Result<Vec<u8>> {
  let mut buffer = Vec::with_capacity(256);
  if let Some(b) = first_byte {
    buffer.push(b);
  }

  loop {
    if buffer.len() > max_bytes {
      return Err(BridgeError::HeaderTooLarge(max_bytes));
    }
    if buffer.ends_with(b"\r\n\r\n") {
      return Ok(buffer);
    }
    let byte = stream.read_u8().await?;
    buffer.push(byte);
  }
}

/// Read exactly `len` bytes.
pub async fn read_exact_n<R: tokio::io::AsyncRead + Unpin>(
  stream: &mut R,
  len: usize,
) -> Result<Vec<u8>> {
  let mut buf = vec![0u8; len];
  stream.read_exact(&mut buf).await?;
  Ok(buf)
}

/// Read a SOCKS5-style length-prefixed field: one length byte, then that
/// many bytes of payload.
pub async fn read_len_prefixed<R: tokio::io::AsyncRead + Unpin>(stream: &mut R) -> Result<Vec<u8>> {
  let len = stream.read_u8().await? as usize;
  read_exact_n(stream, len).await
}

/// Read a big-endian `u16` (used for SOCKS5 ports).
pub async fn read_u16_be<R: tokio::io::AsyncRead + Unpin>(stream: &mut R) -> Result<u16> {
  stream.read_u16().await.map_err(BridgeError::from)
}

/// Write all bytes, mapping the I/O error into the taxonomy.
pub async fn write_all<W: tokio::io::AsyncWrite + Unpin>(stream: &mut W, bytes: &[u8]) -> Result<()> {
  stream
    .write_all(bytes)
    .await
    .map_err(|e| BridgeError::WriteFailed(e.to_string()))?;
  stream
    .flush()
    .await
    .map_err(|e| BridgeError::WriteFailed(e.to_string()))
}
