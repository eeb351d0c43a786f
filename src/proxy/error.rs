use std::net::SocketAddr;

use anyhow::Error;
use thiserror::Error;
use tracing::{debug, warn};

use crate::cache::StoreError;
use crate::proxy::codec::ParseError;
use crate::proxy::forward::ForwardError;
use crate::proxy::tunnel::TunnelError;

#[derive(Debug, Error)]
#[error("request is missing a Host header")]
pub struct MissingHostError;

/// Normalized classification of connection failures. Every error is
/// connection-local; classification only decides how the closure is logged.
pub enum ConnectionErrorKind<'a> {
    Parse(&'a ParseError),
    MissingHost,
    Store(&'a StoreError),
    Forward(&'a ForwardError),
    Tunnel(&'a TunnelError),
    Other,
}

pub fn classify_connection_error(err: &Error) -> ConnectionErrorKind<'_> {
    if let Some(parse) = err.downcast_ref::<ParseError>() {
        ConnectionErrorKind::Parse(parse)
    } else if err.downcast_ref::<MissingHostError>().is_some() {
        ConnectionErrorKind::MissingHost
    } else if let Some(store) = err.downcast_ref::<StoreError>() {
        ConnectionErrorKind::Store(store)
    } else if let Some(forward) = err.downcast_ref::<ForwardError>() {
        ConnectionErrorKind::Forward(forward)
    } else if let Some(tunnel) = err.downcast_ref::<TunnelError>() {
        ConnectionErrorKind::Tunnel(tunnel)
    } else {
        ConnectionErrorKind::Other
    }
}

pub fn log_connection_error(peer: SocketAddr, err: &Error) {
    match classify_connection_error(err) {
        ConnectionErrorKind::Parse(parse) => debug!(
            peer = %peer,
            error = %parse,
            "closed connection after malformed request"
        ),
        ConnectionErrorKind::MissingHost => debug!(
            peer = %peer,
            "closed connection without responding: no Host header"
        ),
        ConnectionErrorKind::Store(store) => warn!(
            peer = %peer,
            error = %store,
            "cache store failure aborted connection"
        ),
        ConnectionErrorKind::Forward(forward) => warn!(
            peer = %peer,
            error = %forward,
            "origin forwarding failed"
        ),
        ConnectionErrorKind::Tunnel(tunnel) => debug!(
            peer = %peer,
            error = %tunnel,
            "CONNECT tunnel ended with error"
        ),
        ConnectionErrorKind::Other => debug!(
            peer = %peer,
            error = %err,
            "connection closed with error"
        ),
    }
}
