//! Error taxonomy for the protocol bridge.

/// Every way a connection's handshake can fail.
///
/// Every variant is fatal for the connection: the bridge never replies with
/// a protocol-level error frame, it just closes the socket after logging.
#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
  #[error("failed to read from socket: {0}")]
  ReadFailed(#[from] std::io::Error),

  #[error("failed to write to socket: {0}")]
  WriteFailed(String),

  #[error("HTTP header block exceeded {0} bytes without a terminating blank line")]
  HeaderTooLarge(usize),

  #[error("unknown HTTP method: {0}")]
  UnknownMethod(String),

  #[error("malformed request: {0}")]
  MalformedRequest(String),

  #[error("Proxy-Authorization header could not be decoded")]
  BadAuth,

  #[error("policy rejected the session: {0}")]
  PolicyRejected(String),

  #[error("failed to connect to upstream {0}: {1}")]
  UpstreamConnectFailed(String, String),

  #[error("upstream protocol error: {0}")]
  UpstreamProtocolError(String),

  #[error("SOCKS5 feature unsupported: {0}")]
  Socks5Unsupported(String),

  #[error("handshake timed out")]
  Timeout,
}

pub type Result<T> = std::result::Result<T, BridgeError>;
