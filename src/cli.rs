use std::path::PathBuf;

use clap::Parser;

#[derive(Debug, Clone, Parser)]
#[command(name = "magpie", about = "Magpie disk-caching forward proxy")]
pub struct Cli {
    /// Port on which the proxy server listens.
    #[arg(long)]
    pub port: Option<u16>,

    /// Base URL of the origin server requests are forwarded to.
    #[arg(long)]
    pub origin: Option<String>,

    /// Honor each client's Host header instead of forwarding to a fixed origin.
    #[arg(long)]
    pub full_caching: bool,

    /// Remove every cached response and exit.
    #[arg(long)]
    pub clear_cache: bool,

    /// Directory where cached responses are persisted.
    #[arg(long, default_value = "./cache")]
    pub cache_dir: PathBuf,

    /// Log output format.
    #[arg(long, value_enum, default_value = "text")]
    pub log: LogFormat,
}

#[derive(Debug, Clone, Copy, clap::ValueEnum)]
pub enum LogFormat {
    Json,
    Text,
}
