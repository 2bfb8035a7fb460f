//! The data model shared by both ingress parsers and both upstream clients.

/// Which wire protocol the client spoke on the ingress socket.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngressProtocol {
  Http,
  Socks5,
}

/// Which wire protocol an upstream ("level-2") target speaks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpstreamScheme {
  Http,
  Socks5,
}

/// The parsed form of whatever `on_auth` returned. `None` upstream URL means
/// direct; this struct is what a non-empty return value becomes.
#[derive(Debug, Clone)]
pub struct UpstreamTarget {
  pub scheme: UpstreamScheme,
  pub host: String,
  pub port: u16,
  pub username: String,
  pub password: String,
}

impl UpstreamTarget {
  pub fn has_credentials(&self) -> bool {
    !self.username.is_empty()
  }
}

/// Credentials parsed off the wire, scoped to a single handshake.
#[derive(Debug, Clone, Default)]
pub struct Credentials {
  pub user: String,
  pub password: String,
}

impl Credentials {
  pub fn is_empty(&self) -> bool {
    self.user.is_empty() && self.password.is_empty()
  }
}

/// The single normalized record both ingress parsers build and both
/// upstream clients consume.
#[derive(Debug, Clone)]
pub struct SessionInfo {
  pub ingress_protocol: IngressProtocol,
  pub method: Option<String>,
  pub target_host: String,
  pub target_port: u16,
  pub original_request_line: String,
  pub origin_header_block: String,
  pub forward_header_block: String,
  pub auth_line: Option<String>,
  pub target_absolute_prefix: Option<String>,
  pub credentials: Credentials,
}

impl SessionInfo {
  /// `host:port` as used on the wire for non-CONNECT SOCKS5 level-2 dials
  /// and for dialing the origin directly.
  pub fn target_addr(&self) -> String {
    format!("{}:{}", self.target_host, self.target_port)
  }
}
