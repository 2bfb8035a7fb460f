//! CLI entry point: binds the bridge and runs it as a long-lived daemon,
//! handing the resolved bind address back to its caller as JSON on stdout so
//! a parent process can read the real port when `--bind` asks for port 0.

use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use pproxy_bridge::policy::parse_upstream_target;
use pproxy_bridge::{AllowAllPolicy, Bridge, BridgeConfig, FixedUpstreamPolicy, ProxyPolicy};

#[derive(Parser, Debug)]
#[command(name = "pproxy-bridge", about = "Dual HTTP/SOCKS5 proxy bridge")]
struct Args {
  /// Address to listen on. Use `:0` to let the OS pick a port.
  #[arg(long, default_value = "127.0.0.1:0")]
  bind: String,

  /// Seconds to allow a client to complete its handshake before the
  /// connection is dropped.
  #[arg(long, default_value_t = 10)]
  handshake_timeout_secs: u64,

  /// Upper bound on an HTTP header block before the connection is refused.
  #[arg(long, default_value_t = 64 * 1024)]
  max_header_bytes: usize,

  /// Level-2 upstream URL (`http://` or `socks5://`, optionally with
  /// embedded credentials) bridged to for every accepted connection,
  /// regardless of the credentials the client presents. Omit for a direct
  /// (no level-2) demo proxy. This is a single-tenant stand-in for the
  /// credential-aware policy a real deployment supplies via the library API.
  #[arg(long)]
  upstream: Option<String>,
}

#[tokio::main]
async fn main() {
  env_logger::init();
  std::panic::set_hook(Box::new(|info| {
    log::error!("panic: {info}");
  }));

  let args = Args::parse();
  let config = BridgeConfig {
    bind_addr: args.bind,
    handshake_timeout: Duration::from_secs(args.handshake_timeout_secs),
    max_header_bytes: args.max_header_bytes,
  };

  let policy: Arc<dyn ProxyPolicy> = match args.upstream {
    Some(url) => match parse_upstream_target(&url) {
      Ok(target) => Arc::new(FixedUpstreamPolicy::new(target)),
      Err(e) => {
        log::error!("invalid --upstream {url:?}: {e}");
        std::process::exit(1);
      }
    },
    None => Arc::new(AllowAllPolicy),
  };

  let bridge = Bridge::new(config, policy);
  let listener = match bridge.bind().await {
    Ok(l) => l,
    Err(e) => {
      log::error!("failed to bind: {e}");
      std::process::exit(1);
    }
  };

  let local_addr = listener
    .local_addr()
    .map(|a| a.to_string())
    .unwrap_or_default();
  println!("{}", serde_json::json!({ "bindAddr": local_addr }));

  if let Err(e) = bridge.run(listener).await {
    log::error!("accept loop terminated: {e}");
    std::process::exit(1);
  }
}
