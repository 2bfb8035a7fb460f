//! The external injection point: credential verification and level-2 target
//! selection. See SPEC_FULL.md §4.4.

use async_trait::async_trait;
use tokio::net::TcpStream;

use crate::error::{BridgeError, Result};
use crate::session::{UpstreamScheme, UpstreamTarget};

/// Implemented by the embedder. `on_auth` is called once per handshake with
/// whatever credentials the client presented (empty strings if none), and
/// decides whether the session proceeds and where its traffic is dialed.
#[async_trait]
pub trait ProxyPolicy: Send + Sync {
  /// Return `Ok(None)` to dial the target directly, `Ok(Some(target))` to
  /// bridge through a level-2 upstream, or `Err` to refuse the session.
  async fn on_auth(&self, user: &str, password: &str) -> Result<Option<UpstreamTarget>>;

  /// Called once the tunnel is fully established, just before the relay
  /// pump starts. Infallible: it observes, it doesn't gate.
  fn on_success(&self, _client: &TcpStream, _upstream: &TcpStream) {}
}

/// Parse a level-2 target URL of the form `scheme://[user:pass@]host:port`
/// into an [`UpstreamTarget`]. An empty string means "dial direct" and is
/// handled by the caller before this is invoked.
pub fn parse_upstream_target(raw: &str) -> Result<UpstreamTarget> {
  let url = url::Url::parse(raw)
    .map_err(|e| BridgeError::PolicyRejected(format!("bad upstream URL {raw:?}: {e}")))?;

  let scheme = match url.scheme() {
    "http" => UpstreamScheme::Http,
    "socks5" => UpstreamScheme::Socks5,
    other => {
      return Err(BridgeError::PolicyRejected(format!(
        "unsupported upstream scheme: {other:?}"
      )))
    }
  };

  let host = url
    .host_str()
    .ok_or_else(|| BridgeError::PolicyRejected(format!("upstream URL missing host: {raw:?}")))?
    .to_string();
  let port = url.port().unwrap_or(80);

  Ok(UpstreamTarget {
    scheme,
    host,
    port,
    username: url.username().to_string(),
    password: url.password().unwrap_or("").to_string(),
  })
}

/// A policy that accepts every session and always dials direct. Useful as a
/// default and in tests.
pub struct AllowAllPolicy;

#[async_trait]
impl ProxyPolicy for AllowAllPolicy {
  async fn on_auth(&self, _user: &str, _password: &str) -> Result<Option<UpstreamTarget>> {
    Ok(None)
  }
}

/// A policy that accepts every session and bridges it through the same
/// level-2 target regardless of credentials. Backs the CLI's `--upstream`
/// flag for single-tenant demo use; real deployments supply their own
/// `ProxyPolicy` backed by a credential store.
pub struct FixedUpstreamPolicy {
  target: UpstreamTarget,
}

impl FixedUpstreamPolicy {
  pub fn new(target: UpstreamTarget) -> Self {
    Self { target }
  }
}

#[async_trait]
impl ProxyPolicy for FixedUpstreamPolicy {
  async fn on_auth(&self, _user: &str, _password: &str) -> Result<Option<UpstreamTarget>> {
    Ok(Some(UpstreamTarget {
      scheme: self.target.scheme,
      host: self.target.host.clone(),
      port: self.target.port,
      username: self.target.username.clone(),
      password: self.target.password.clone(),
    }))
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn http_and_socks5_upstream_urls_both_default_to_port_80() {
    let http = parse_upstream_target("http://h2:h2@127.0.0.1").unwrap();
    assert_eq!(http.port, 80);

    let socks5 = parse_upstream_target("socks5://s2:s2@127.0.0.1").unwrap();
    assert_eq!(socks5.scheme, UpstreamScheme::Socks5);
    assert_eq!(socks5.port, 80);
  }

  #[test]
  fn explicit_port_is_preserved() {
    let target = parse_upstream_target("socks5://s2:s2@127.0.0.1:1080").unwrap();
    assert_eq!(target.port, 1080);
  }
}
