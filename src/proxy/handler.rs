use std::net::SocketAddr;
use std::time::Instant;

use anyhow::{Context, Result};
use http::Method;
use tokio::io::{AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tracing::debug;

use crate::cache::{canonical_host, compute_key};
use crate::logging::AccessLogBuilder;
use crate::proxy::AppContext;
use crate::proxy::codec::read_request;
use crate::proxy::error::MissingHostError;
use crate::proxy::respond::{CacheDisposition, write_response};
use crate::proxy::{forward, tunnel};

/// Drives one accepted connection through its lifecycle:
/// await request → (tunnel | cache lookup) → respond → close.
pub async fn handle_connection(
    stream: TcpStream,
    peer: SocketAddr,
    app: AppContext,
) -> Result<()> {
    let started = Instant::now();
    let mut reader = BufReader::new(stream);

    let request = match read_request(&mut reader, app.settings.origin_rewrite()).await? {
        Some(request) => request,
        None => {
            debug!(peer = %peer, "connection closed without a request");
            return Ok(());
        }
    };

    if request.method == Method::CONNECT {
        return tunnel::handle_connect(reader, &request.target, peer, started).await;
    }

    // The fixed-origin rewrite guarantees a Host; only full-proxy clients
    // can omit it.
    let host = canonical_host(request.host().ok_or(MissingHostError)?).to_string();

    let key = compute_key(&request.method, &host, &request.target);
    let (entry, disposition) = match app.cache.get(&key).await? {
        Some(entry) => (entry, CacheDisposition::Hit),
        None => {
            let entry = forward::fetch_from_origin(&request).await?;
            app.cache.put(&key, &entry).await?;
            (entry, CacheDisposition::Miss)
        }
    };

    let stream = reader.get_mut();
    let bytes_out = write_response(stream, &entry, disposition)
        .await
        .with_context(|| format!("writing response to {peer}"))?;
    stream
        .shutdown()
        .await
        .with_context(|| format!("closing connection to {peer}"))?;

    AccessLogBuilder::new(peer)
        .method(request.method.as_str())
        .host(host)
        .path(request.target.clone())
        .status(entry.status_code().unwrap_or(0))
        .cache(disposition.as_str())
        .bytes(request.body.as_ref().map_or(0, |body| body.len() as u64), bytes_out)
        .elapsed(started.elapsed())
        .log();

    Ok(())
}
