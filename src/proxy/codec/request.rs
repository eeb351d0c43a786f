use anyhow::Result;
use bytes::Bytes;
use http::Method;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, BufReader};

use super::headers::HeaderBag;
use super::line::read_trimmed_line;

#[derive(Debug, Error)]
pub enum ParseError {
    #[error("malformed request line '{line}'")]
    MalformedRequestLine { line: String },
    #[error("invalid Content-Length value '{value}'")]
    InvalidContentLength { value: String },
}

/// A client request after head parsing: the protocol version is kept
/// verbatim so responses can echo whatever the client declared.
#[derive(Debug, Clone)]
pub struct ParsedRequest {
    pub method: Method,
    pub target: String,
    pub version: String,
    pub headers: HeaderBag,
    pub body: Option<Bytes>,
}

impl ParsedRequest {
    pub fn host(&self) -> Option<&str> {
        self.headers.first_value("Host")
    }
}

/// Reads one request from the client stream.
///
/// Returns `Ok(None)` when the stream yields no request at all (the client
/// closed without sending anything, or sent only a blank line) — a terminal
/// signal, not an error. A request line with fewer than three tokens is a
/// [`ParseError`]; extra tokens beyond the third are ignored.
///
/// When `origin_rewrite` is set (fixed-origin mode), the Host header is
/// force-overwritten with the configured origin after the header block,
/// regardless of what the client sent.
///
/// A body is read only for POST/PUT requests carrying Content-Length, and
/// exactly that many raw bytes are consumed from the stream.
pub async fn read_request<S>(
    reader: &mut BufReader<S>,
    origin_rewrite: Option<&str>,
) -> Result<Option<ParsedRequest>>
where
    S: AsyncRead + Unpin,
{
    let Some(request_line) = read_trimmed_line(reader).await? else {
        return Ok(None);
    };
    if request_line.is_empty() {
        return Ok(None);
    }

    let tokens: Vec<&str> = request_line.split_whitespace().collect();
    if tokens.len() < 3 {
        return Err(ParseError::MalformedRequestLine { line: request_line }.into());
    }
    let method = Method::from_bytes(tokens[0].as_bytes()).map_err(|_| {
        ParseError::MalformedRequestLine {
            line: request_line.clone(),
        }
    })?;
    let target = tokens[1].to_string();
    let version = tokens[2].to_string();

    let mut headers = HeaderBag::new();
    loop {
        let Some(line) = read_trimmed_line(reader).await? else {
            break;
        };
        if line.is_empty() {
            break;
        }
        headers.push_line(&line);
    }

    if let Some(origin) = origin_rewrite {
        headers.set("Host", origin);
    }

    let content_length = if method == Method::POST || method == Method::PUT {
        match headers.first_value("Content-Length") {
            Some(raw) => Some(raw.trim().parse::<usize>().map_err(|_| {
                ParseError::InvalidContentLength {
                    value: raw.to_string(),
                }
            })?),
            None => None,
        }
    } else {
        None
    };

    let mut body = None;
    if let Some(length) = content_length
        && length > 0
    {
        let mut buf = vec![0u8; length];
        reader.read_exact(&mut buf).await?;
        body = Some(Bytes::from(buf));
    }

    Ok(Some(ParsedRequest {
        method,
        target,
        version,
        headers,
        body,
    }))
}
