//! Dual HTTP/SOCKS5 proxy bridge with level-2 upstream protocol translation.

pub mod bridge;
pub mod error;
pub mod framing;
pub mod http_ingress;
pub mod policy;
pub mod relay;
pub mod response;
pub mod session;
pub mod socks5_ingress;
pub mod upstream_http;
pub mod upstream_socks5;

pub use bridge::{Bridge, BridgeConfig};
pub use error::{BridgeError, Result};
pub use policy::{AllowAllPolicy, FixedUpstreamPolicy, ProxyPolicy};
pub use session::{Credentials, IngressProtocol, SessionInfo, UpstreamScheme, UpstreamTarget};
