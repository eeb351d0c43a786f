use bytes::{Buf, BufMut, Bytes, BytesMut};
use thiserror::Error;

use crate::proxy::codec::HeaderBag;

/// Record format version tag; rejecting foreign files cheaply on read.
const MAGIC: &[u8; 4] = b"MPX1";

/// A persisted origin response: status line (carrying the client's declared
/// protocol version), response headers, and the body bytes. Immutable once
/// written for a key.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntry {
    pub status_line: String,
    pub headers: HeaderBag,
    pub body: Bytes,
}

#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("record is truncated")]
    Truncated,
    #[error("record has an unrecognized magic prefix")]
    BadMagic,
    #[error("record field is not valid UTF-8")]
    InvalidUtf8,
}

impl CacheEntry {
    /// The numeric status code parsed back out of the stored status line.
    pub fn status_code(&self) -> Option<u16> {
        self.status_line.split_whitespace().nth(1)?.parse().ok()
    }

    /// Serializes the entry into the on-disk record layout: magic, then
    /// length-prefixed status line, header count, length-prefixed name/value
    /// pairs (values comma-rejoined), and a length-prefixed body.
    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::new();
        buf.put_slice(MAGIC);
        put_string(&mut buf, &self.status_line);
        buf.put_u32_le(self.headers.len() as u32);
        for header in self.headers.iter() {
            put_string(&mut buf, header.name());
            put_string(&mut buf, &header.joined_value());
        }
        buf.put_u64_le(self.body.len() as u64);
        buf.put_slice(&self.body);
        buf.freeze()
    }

    pub fn decode(data: &[u8]) -> Result<Self, DecodeError> {
        let mut buf = data;
        if buf.remaining() < MAGIC.len() {
            return Err(DecodeError::Truncated);
        }
        let mut magic = [0u8; 4];
        buf.copy_to_slice(&mut magic);
        if &magic != MAGIC {
            return Err(DecodeError::BadMagic);
        }

        let status_line = get_string(&mut buf)?;
        let header_count = get_u32(&mut buf)?;
        let mut headers = HeaderBag::new();
        for _ in 0..header_count {
            let name = get_string(&mut buf)?;
            let value = get_string(&mut buf)?;
            headers.set(&name, &value);
        }

        if buf.remaining() < 8 {
            return Err(DecodeError::Truncated);
        }
        let body_len = buf.get_u64_le() as usize;
        if buf.remaining() < body_len {
            return Err(DecodeError::Truncated);
        }
        let body = Bytes::copy_from_slice(&buf[..body_len]);

        Ok(Self {
            status_line,
            headers,
            body,
        })
    }
}

fn put_string(buf: &mut BytesMut, value: &str) {
    buf.put_u32_le(value.len() as u32);
    buf.put_slice(value.as_bytes());
}

fn get_u32(buf: &mut &[u8]) -> Result<u32, DecodeError> {
    if buf.remaining() < 4 {
        return Err(DecodeError::Truncated);
    }
    Ok(buf.get_u32_le())
}

fn get_string(buf: &mut &[u8]) -> Result<String, DecodeError> {
    let len = get_u32(buf)? as usize;
    if buf.remaining() < len {
        return Err(DecodeError::Truncated);
    }
    let raw = buf[..len].to_vec();
    buf.advance(len);
    String::from_utf8(raw).map_err(|_| DecodeError::InvalidUtf8)
}
