use std::io::ErrorKind;

use bytes::Bytes;
use thiserror::Error;
use tokio::io::{AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tracing::debug;

use crate::cache::CacheEntry;
use crate::proxy::codec::{HeaderBag, ParsedRequest, read_trimmed_line};

/// Proxy-hop headers that must never be forwarded verbatim to the origin.
const HOP_HEADERS: [&str; 3] = ["host", "connection", "proxy-connection"];

#[derive(Debug, Error)]
pub enum ForwardError {
    #[error("malformed origin URL '{url}'")]
    InvalidUrl { url: String },
    #[error("origin scheme '{scheme}' is not supported for forwarding")]
    UnsupportedScheme { scheme: String },
    #[error("failed to connect to origin {authority}")]
    Connect {
        authority: String,
        #[source]
        source: std::io::Error,
    },
    #[error("I/O failure while exchanging with origin {authority}")]
    Io {
        authority: String,
        #[source]
        source: std::io::Error,
    },
    #[error("malformed status line '{line}' from origin {authority}")]
    BadStatusLine { authority: String, line: String },
}

/// Where a non-CONNECT request is actually sent: scheme and authority taken
/// from the effective Host value (or from an absolute-form target), path
/// appended verbatim.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct OriginTarget {
    pub scheme: &'static str,
    pub host: String,
    pub port: u16,
    pub authority: String,
    pub path: String,
}

/// Forwards one request to its origin and captures the response as a cache
/// entry. Single attempt: any failure surfaces to the caller, which aborts
/// the connection without retrying or falling back.
pub async fn fetch_from_origin(request: &ParsedRequest) -> Result<CacheEntry, ForwardError> {
    let host_value = request.host().ok_or_else(|| ForwardError::InvalidUrl {
        url: request.target.clone(),
    })?;
    let target = resolve_origin_target(host_value, &request.target)?;
    if target.scheme != "http" {
        return Err(ForwardError::UnsupportedScheme {
            scheme: target.scheme.to_string(),
        });
    }

    let authority = target.authority.clone();
    let io_err = |source| ForwardError::Io {
        authority: authority.clone(),
        source,
    };

    let stream = TcpStream::connect((target.host.as_str(), target.port))
        .await
        .map_err(|source| ForwardError::Connect {
            authority: target.authority.clone(),
            source,
        })?;
    debug!(authority = %target.authority, path = %target.path, "connected to origin");
    let mut stream = BufReader::new(stream);

    let mut head = format!("{} {} HTTP/1.1\r\n", request.method, target.path);
    head.push_str(&format!("Host: {}\r\n", target.authority));
    for header in request.headers.iter() {
        if HOP_HEADERS.contains(&header.lower_name()) {
            continue;
        }
        head.push_str(&format!("{}: {}\r\n", header.name(), header.joined_value()));
    }
    head.push_str("Connection: close\r\n\r\n");

    let writer = stream.get_mut();
    writer.write_all(head.as_bytes()).await.map_err(io_err)?;
    if let Some(body) = &request.body {
        writer.write_all(body).await.map_err(io_err)?;
    }
    writer.flush().await.map_err(io_err)?;

    let status_line = read_trimmed_line(&mut stream)
        .await
        .map_err(io_err)?
        .ok_or_else(|| io_err(std::io::Error::from(ErrorKind::UnexpectedEof)))?;
    let (code, reason) = parse_status_line(&status_line).ok_or_else(|| {
        ForwardError::BadStatusLine {
            authority: target.authority.clone(),
            line: status_line.clone(),
        }
    })?;

    // The stored status line carries the client's declared version, not the
    // origin's.
    let stored_status_line = if reason.is_empty() {
        format!("{} {}", request.version, code)
    } else {
        format!("{} {} {}", request.version, code, reason)
    };

    let mut headers = HeaderBag::new();
    loop {
        let line = read_trimmed_line(&mut stream).await.map_err(io_err)?;
        let Some(line) = line else { break };
        if line.is_empty() {
            break;
        }
        headers.push_line(&line);
    }

    // Both success and error responses arrive on the same stream; status
    // does not change how the body is captured.
    let content_length = headers
        .first_value("Content-Length")
        .and_then(|raw| raw.trim().parse::<usize>().ok());
    let body = match content_length {
        Some(length) => {
            let mut buf = vec![0u8; length];
            stream.read_exact(&mut buf).await.map_err(io_err)?;
            Bytes::from(buf)
        }
        None => {
            let mut buf = Vec::new();
            stream.read_to_end(&mut buf).await.map_err(io_err)?;
            Bytes::from(buf)
        }
    };

    Ok(CacheEntry {
        status_line: stored_status_line,
        headers,
        body,
    })
}

fn parse_status_line(line: &str) -> Option<(u16, &str)> {
    let mut parts = line.splitn(3, ' ');
    let _version = parts.next()?;
    let code = parts.next()?.parse::<u16>().ok()?;
    Some((code, parts.next().unwrap_or("").trim()))
}

/// Resolves the absolute target for a request. Absolute-form targets (as
/// sent by full-proxy clients) carry their own authority; otherwise the
/// effective Host value supplies it, prefixed with `http://` unless it
/// already carries a scheme.
pub(crate) fn resolve_origin_target(
    host_value: &str,
    target: &str,
) -> Result<OriginTarget, ForwardError> {
    if let Some((scheme, rest)) = split_scheme(target) {
        let (authority, path) = match rest.find('/') {
            Some(idx) => (&rest[..idx], &rest[idx..]),
            None => (rest, "/"),
        };
        return build_target(scheme, authority, path, target);
    }

    let (scheme, rest) = match split_scheme(host_value) {
        Some((scheme, rest)) => (scheme, rest),
        None => ("http", host_value),
    };
    // A configured origin may carry a trailing slash or path; only the
    // authority part names the server.
    let authority = rest.split('/').next().unwrap_or("");
    let path = if target.is_empty() { "/" } else { target };
    build_target(scheme, authority, path, host_value)
}

fn split_scheme(value: &str) -> Option<(&'static str, &str)> {
    value
        .strip_prefix("http://")
        .map(|rest| ("http", rest))
        .or_else(|| value.strip_prefix("https://").map(|rest| ("https", rest)))
}

fn build_target(
    scheme: &'static str,
    authority: &str,
    path: &str,
    original: &str,
) -> Result<OriginTarget, ForwardError> {
    if authority.is_empty() {
        return Err(ForwardError::InvalidUrl {
            url: original.to_string(),
        });
    }
    let (host, port) = match authority.rsplit_once(':') {
        Some((host, port_str)) => {
            let port = port_str.parse::<u16>().map_err(|_| ForwardError::InvalidUrl {
                url: original.to_string(),
            })?;
            (host, port)
        }
        None => {
            let default_port = if scheme == "https" { 443 } else { 80 };
            (authority, default_port)
        }
    };
    if host.is_empty() {
        return Err(ForwardError::InvalidUrl {
            url: original.to_string(),
        });
    }
    Ok(OriginTarget {
        scheme,
        host: host.to_string(),
        port,
        authority: authority.to_string(),
        path: path.to_string(),
    })
}
