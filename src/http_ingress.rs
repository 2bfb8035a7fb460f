//! HTTP proxy ingress: request line + header parsing, Basic auth decode,
//! `Proxy-*` stripping. See SPEC_FULL.md §4.2.

use base64::Engine;

use crate::error::{BridgeError, Result};
use crate::framing::read_header_block;
use crate::session::{Credentials, IngressProtocol, SessionInfo};

const ALLOWED_METHODS: &[&str] = &["CONNECT", "GET", "POST", "PUT", "DELETE", "HEAD", "OPTIONS"];

/// Parse an HTTP ingress session starting from the byte already consumed by
/// the discriminator (`first_byte`).
pub async fn parse_http_ingress<R: tokio::io::AsyncRead + Unpin>(
  stream: &mut R,
  first_byte: u8,
  max_header_bytes: usize,
) -> Result<SessionInfo> {
  let raw = read_header_block(stream, Some(first_byte), max_header_bytes).await?;
  let text = String::from_utf8_lossy(&raw).into_owned();

  let mut lines = text.split("\r\n");
  let request_line = lines
    .next()
    .filter(|l| !l.is_empty())
    .ok_or_else(|| BridgeError::MalformedRequest("empty request line".into()))?
    .to_string();

  let parts: Vec<&str> = request_line.split(' ').collect();
  if parts.len() < 2 {
    return Err(BridgeError::MalformedRequest(format!(
      "malformed request line: {request_line:?}"
    )));
  }
  let method = parts[0].to_string();
  if !ALLOWED_METHODS.contains(&method.as_str()) {
    return Err(BridgeError::UnknownMethod(method));
  }
  let target = parts[1].to_string();

  let mut origin_header_block = String::new();
  let mut forward_header_block = String::new();
  let mut auth_line: Option<String> = None;
  let mut target_host = String::new();
  let mut target_port: u16 = 80;

  for line in lines {
    // `text` was split on "\r\n", so the terminating blank line shows up as
    // an empty string once, followed by the trailing empty tail from the
    // final "\r\n" in "\r\n\r\n" — stop at the first one.
    if line.is_empty() {
      origin_header_block.push_str("\r\n");
      forward_header_block.push_str("\r\n");
      break;
    }

    origin_header_block.push_str(line);
    origin_header_block.push_str("\r\n");

    if starts_with_ci(line, "Proxy-Authorization") {
      auth_line = Some(format!("{line}\r\n"));
      continue;
    }
    if starts_with_ci(line, "Proxy-") {
      continue;
    }

    if starts_with_ci(line, "Host:") {
      let value = line[5..].trim();
      match value.rsplit_once(':') {
        Some((host, port)) if !host.is_empty() => {
          target_host = host.to_string();
          target_port = port
            .parse()
            .map_err(|_| BridgeError::MalformedRequest(format!("bad Host port: {value:?}")))?;
        }
        _ => {
          target_host = value.to_string();
          target_port = 80;
        }
      }
    }

    forward_header_block.push_str(line);
    forward_header_block.push_str("\r\n");
  }

  let mut target_absolute_prefix = None;
  if method != "CONNECT" {
    let (prefix, _rest) = split_absolute_prefix(&target)
      .ok_or_else(|| BridgeError::MalformedRequest(format!("not an absolute URI: {target:?}")))?;
    let url = url::Url::parse(&target)
      .map_err(|e| BridgeError::MalformedRequest(format!("bad target URL {target:?}: {e}")))?;
    target_host = url
      .host_str()
      .ok_or_else(|| BridgeError::MalformedRequest(format!("no host in {target:?}")))?
      .to_string();
    target_port = url.port().unwrap_or(80);
    target_absolute_prefix = Some(prefix);
  } else {
    let (host, port) = target
      .rsplit_once(':')
      .ok_or_else(|| BridgeError::MalformedRequest(format!("CONNECT target missing port: {target:?}")))?;
    target_host = host.to_string();
    target_port = port
      .parse()
      .map_err(|_| BridgeError::MalformedRequest(format!("bad CONNECT port: {target:?}")))?;
  }

  let credentials = parse_basic_auth(auth_line.as_deref())?;

  Ok(SessionInfo {
    ingress_protocol: IngressProtocol::Http,
    method: Some(method),
    target_host,
    target_port,
    original_request_line: format!("{request_line}\r\n"),
    origin_header_block,
    forward_header_block,
    auth_line,
    target_absolute_prefix,
    credentials,
  })
}

fn starts_with_ci(line: &str, prefix: &str) -> bool {
  line.len() >= prefix.len() && line[..prefix.len()].eq_ignore_ascii_case(prefix)
}

/// Split `scheme://authority/path...` into `("scheme://authority", "/path...")`
/// using the literal third `/` in the string, so the replace used to strip
/// the prefix from the request line matches byte-for-byte regardless of how
/// the authority was spelled.
fn split_absolute_prefix(target: &str) -> Option<(String, String)> {
  let mut slash_count = 0;
  for (i, c) in target.char_indices() {
    if c == '/' {
      slash_count += 1;
      if slash_count == 3 {
        return Some((target[..i].to_string(), target[i..].to_string()));
      }
    }
  }
  None
}

/// Decode a `Proxy-Authorization: Basic <b64>` line into (user, password).
pub fn parse_basic_auth(auth_line: Option<&str>) -> Result<Credentials> {
  let Some(line) = auth_line else {
    return Ok(Credentials::default());
  };
  let tokens: Vec<&str> = line.trim_end().split(' ').collect();
  if tokens.len() < 3 || !tokens[1].eq_ignore_ascii_case("Basic") {
    return Err(BridgeError::BadAuth);
  }
  let decoded = base64::engine::general_purpose::STANDARD
    .decode(tokens[2])
    .map_err(|_| BridgeError::BadAuth)?;
  let decoded = String::from_utf8(decoded).map_err(|_| BridgeError::BadAuth)?;
  let (user, password) = decoded.split_once(':').ok_or(BridgeError::BadAuth)?;
  Ok(Credentials {
    user: user.to_string(),
    password: password.to_string(),
  })
}

/// Rewrite the request line into origin-form by stripping the absolute-URI
/// prefix, per §4.7.
pub fn rewrite_request_line_origin_form(session: &SessionInfo) -> String {
  match &session.target_absolute_prefix {
    Some(prefix) => session.original_request_line.replacen(prefix, "", 1),
    None => session.original_request_line.clone(),
  }
}
