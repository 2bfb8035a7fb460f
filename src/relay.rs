//! Pumps bytes both directions between the client and the established
//! tunnel once the handshake is done.
//!
//! Races two spawned `tokio::io::copy` tasks with `select!`; whichever
//! direction finishes first causes the other to be aborted and both socket
//! halves to be shut down, so neither side is left half-open after the
//! other end has gone away.

use tokio::io::{self, AsyncRead, AsyncWrite, AsyncWriteExt};

/// Copy bytes in both directions between `client` and `upstream` until
/// either side closes, then make sure both sockets are fully shut down.
pub async fn relay<C, U>(client: C, upstream: U) -> io::Result<(u64, u64)>
where
  C: AsyncRead + AsyncWrite + Unpin + Send + 'static,
  U: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
  let (mut client_read, mut client_write) = io::split(client);
  let (mut upstream_read, mut upstream_write) = io::split(upstream);

  let client_to_upstream = tokio::spawn(async move {
    let result = io::copy(&mut client_read, &mut upstream_write).await;
    let _ = upstream_write.shutdown().await;
    result
  });
  let upstream_to_client = tokio::spawn(async move {
    let result = io::copy(&mut upstream_read, &mut client_write).await;
    let _ = client_write.shutdown().await;
    result
  });

  tokio::select! {
    result = client_to_upstream => {
      upstream_to_client.abort();
      let sent = result.map_err(to_io_error)??;
      let received = wait_aborted(upstream_to_client).await;
      Ok((sent, received))
    }
    result = upstream_to_client => {
      client_to_upstream.abort();
      let received = result.map_err(to_io_error)??;
      let sent = wait_aborted(client_to_upstream).await;
      Ok((sent, received))
    }
  }
}

/// The loser of the race was just aborted; its partial byte count (if any
/// bytes made it through before the abort landed) isn't observable once
/// aborted, so it reports 0. What matters for the invariant this enforces
/// (neither task outlives the other) is that it's no longer running.
async fn wait_aborted(handle: tokio::task::JoinHandle<io::Result<u64>>) -> u64 {
  match handle.await {
    Ok(Ok(n)) => n,
    _ => 0,
  }
}

fn to_io_error(e: tokio::task::JoinError) -> io::Error {
  io::Error::other(e.to_string())
}
