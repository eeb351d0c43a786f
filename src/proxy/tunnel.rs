use std::net::SocketAddr;
use std::time::Instant;

use anyhow::Result;
use thiserror::Error;
use tokio::io::{self, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tracing::debug;

use crate::logging::AccessLogBuilder;

const ESTABLISHED: &[u8] = b"HTTP/1.1 200 Connection Established\r\nProxy-Agent: magpie\r\n\r\n";
const RELAY_CHUNK: usize = 8192;

#[derive(Debug, Error)]
pub enum TunnelError {
    #[error("invalid CONNECT target '{target}'")]
    InvalidTarget { target: String },
    #[error("failed to connect to tunnel target {host}:{port}")]
    Connect {
        host: String,
        port: u16,
        #[source]
        source: std::io::Error,
    },
    #[error("I/O failure on CONNECT tunnel")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Clone, PartialEq)]
pub struct TunnelTarget {
    pub host: String,
    pub port: u16,
}

/// Parses a CONNECT target of the form `host[:port]`, defaulting the port to
/// 443 when omitted.
pub fn parse_tunnel_target(target: &str) -> Result<TunnelTarget, TunnelError> {
    let invalid = || TunnelError::InvalidTarget {
        target: target.to_string(),
    };
    let trimmed = target.trim();
    let (host, port) = match trimmed.rsplit_once(':') {
        Some((host, port_str)) => {
            let port = port_str.parse::<u16>().map_err(|_| invalid())?;
            (host, port)
        }
        None => (trimmed, 443),
    };
    if host.is_empty() {
        return Err(invalid());
    }
    Ok(TunnelTarget {
        host: host.to_string(),
        port,
    })
}

/// Serves a CONNECT request: dials the target, acknowledges the client with
/// a synthetic 200, then pumps bytes in both directions until either side
/// closes. The proxy never looks inside the tunneled stream, and a
/// closed/erroring direction is the normal way a tunnel ends.
pub async fn handle_connect(
    reader: BufReader<TcpStream>,
    target: &str,
    peer: SocketAddr,
    started: Instant,
) -> Result<()> {
    let target = parse_tunnel_target(target)?;
    let mut upstream = TcpStream::connect((target.host.as_str(), target.port))
        .await
        .map_err(|source| TunnelError::Connect {
            host: target.host.clone(),
            port: target.port,
            source,
        })?;
    debug!(host = %target.host, port = target.port, "tunnel target connected");

    // Bytes the request reader buffered past the CONNECT head belong to the
    // tunnel and must reach the target.
    let leftover = reader.buffer().to_vec();
    let mut client = reader.into_inner();

    client.write_all(ESTABLISHED).await.map_err(TunnelError::Io)?;
    client.flush().await.map_err(TunnelError::Io)?;
    if !leftover.is_empty() {
        upstream.write_all(&leftover).await.map_err(TunnelError::Io)?;
        upstream.flush().await.map_err(TunnelError::Io)?;
    }

    let (client_bytes, upstream_bytes) = relay(&mut client, &mut upstream).await;
    debug!(
        peer = %peer,
        client_bytes,
        upstream_bytes,
        "tunnel closed"
    );

    AccessLogBuilder::for_connect(peer, target.host.clone(), format!("{}:{}", target.host, target.port))
        .status(200)
        .bytes(client_bytes + leftover.len() as u64, upstream_bytes)
        .elapsed(started.elapsed())
        .log();
    Ok(())
}

/// Runs both relay directions concurrently and joins them before returning,
/// yielding (client→target, target→client) byte counts.
async fn relay(client: &mut TcpStream, upstream: &mut TcpStream) -> (u64, u64) {
    let (mut client_reader, mut client_writer) = io::split(client);
    let (mut upstream_reader, mut upstream_writer) = io::split(upstream);

    let client_to_upstream = relay_half(&mut client_reader, &mut upstream_writer);
    let upstream_to_client = relay_half(&mut upstream_reader, &mut client_writer);

    tokio::join!(client_to_upstream, upstream_to_client)
}

/// Copies fixed-size chunks from reader to writer, flushing after every
/// chunk, until EOF or an I/O error on either side. The writer is shut down
/// afterwards so the opposite endpoint observes the end of the stream.
async fn relay_half<R, W>(reader: &mut R, writer: &mut W) -> u64
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut buffer = [0u8; RELAY_CHUNK];
    let mut transferred = 0u64;
    loop {
        let read = match reader.read(&mut buffer).await {
            Ok(0) | Err(_) => break,
            Ok(n) => n,
        };
        if writer.write_all(&buffer[..read]).await.is_err() {
            break;
        }
        if writer.flush().await.is_err() {
            break;
        }
        transferred = transferred.saturating_add(read as u64);
    }
    let _ = writer.shutdown().await;
    transferred
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_to_port_443() {
        let target = parse_tunnel_target("example.com").expect("parse");
        assert_eq!(target.host, "example.com");
        assert_eq!(target.port, 443);
    }

    #[test]
    fn explicit_port_is_honored() {
        let target = parse_tunnel_target("example.com:8443").expect("parse");
        assert_eq!(target.host, "example.com");
        assert_eq!(target.port, 8443);
    }

    #[test]
    fn empty_host_is_rejected() {
        let err = parse_tunnel_target(":443").unwrap_err();
        assert!(matches!(err, TunnelError::InvalidTarget { .. }));
        let err = parse_tunnel_target("").unwrap_err();
        assert!(matches!(err, TunnelError::InvalidTarget { .. }));
    }

    #[test]
    fn non_numeric_port_is_rejected() {
        let err = parse_tunnel_target("example.com:https").unwrap_err();
        assert!(matches!(err, TunnelError::InvalidTarget { .. }));
    }

    #[tokio::test]
    async fn relay_half_copies_until_source_closes() {
        let (mut source_tx, source_rx) = tokio::io::duplex(64);
        let (sink_tx, mut sink_rx) = tokio::io::duplex(64);

        let writer_task = tokio::spawn(async move {
            let mut reader = source_rx;
            let mut writer = sink_tx;
            relay_half(&mut reader, &mut writer).await
        });

        source_tx.write_all(b"tunnel payload").await.expect("write");
        drop(source_tx);

        let transferred = writer_task.await.expect("join");
        assert_eq!(transferred, b"tunnel payload".len() as u64);

        let mut received = Vec::new();
        sink_rx.read_to_end(&mut received).await.expect("read");
        assert_eq!(received, b"tunnel payload");
    }
}
