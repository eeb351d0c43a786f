use tokio::io::{AsyncWrite, AsyncWriteExt};

use crate::cache::CacheEntry;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheDisposition {
    Hit,
    Miss,
}

impl CacheDisposition {
    pub fn as_str(self) -> &'static str {
        match self {
            CacheDisposition::Hit => "HIT",
            CacheDisposition::Miss => "MISS",
        }
    }
}

/// Writes a stored response back to the client: status line, the headers
/// captured from the origin, the proxy-added `X-CACHE` and forced
/// `Connection: close` headers, then the body. Returns the bytes written.
pub async fn write_response<S>(
    stream: &mut S,
    entry: &CacheEntry,
    disposition: CacheDisposition,
) -> std::io::Result<u64>
where
    S: AsyncWrite + Unpin,
{
    let mut head = String::new();
    head.push_str(&entry.status_line);
    head.push_str("\r\n");
    for header in entry.headers.iter() {
        head.push_str(header.name());
        head.push_str(": ");
        head.push_str(&header.joined_value());
        head.push_str("\r\n");
    }
    head.push_str("X-CACHE: ");
    head.push_str(disposition.as_str());
    head.push_str("\r\nConnection: close\r\n\r\n");

    stream.write_all(head.as_bytes()).await?;
    if !entry.body.is_empty() {
        stream.write_all(&entry.body).await?;
    }
    stream.flush().await?;
    Ok(head.len() as u64 + entry.body.len() as u64)
}
