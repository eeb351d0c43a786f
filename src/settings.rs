use std::net::{Ipv4Addr, SocketAddr};
use std::path::PathBuf;

use anyhow::{Context, Result, ensure};

use crate::cli::{Cli, LogFormat};

#[derive(Debug, Clone)]
pub struct Settings {
    pub listen: SocketAddr,
    pub origin: Option<String>,
    pub full_proxy: bool,
    pub cache_dir: PathBuf,
    pub log: LogFormat,
}

impl Settings {
    pub fn from_cli(cli: &Cli) -> Result<Self> {
        let port = cli
            .port
            .context("--port is required to start the proxy (see --help)")?;
        ensure!(
            cli.full_caching || cli.origin.is_some(),
            "--origin is required unless --full-caching is set (see --help)"
        );
        Ok(Self {
            listen: SocketAddr::from((Ipv4Addr::UNSPECIFIED, port)),
            origin: cli.origin.clone(),
            full_proxy: cli.full_caching,
            cache_dir: cli.cache_dir.clone(),
            log: cli.log,
        })
    }

    /// The origin string forced into the Host header in fixed-origin mode,
    /// or `None` when the client's own Host header is honored.
    pub fn origin_rewrite(&self) -> Option<&str> {
        if self.full_proxy {
            None
        } else {
            self.origin.as_deref()
        }
    }
}
