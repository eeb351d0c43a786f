pub mod cache;
pub mod cli;
pub mod logging;
pub mod proxy;
pub mod settings;

use std::sync::Arc;

use anyhow::Result;
use tracing::info;

use crate::{cache::CacheStore, proxy::AppContext, settings::Settings};

pub async fn run(settings: Settings) -> Result<()> {
    let settings = Arc::new(settings);
    let cache = Arc::new(CacheStore::new(settings.cache_dir.clone()));
    cache.ensure_dir().await?;

    match settings.origin.as_deref() {
        Some(origin) if !settings.full_proxy => {
            info!(origin, "forwarding all requests to fixed origin");
        }
        _ => info!("full-proxy mode: honoring client Host headers"),
    }

    let app = AppContext::new(settings, cache);
    proxy::run(app).await
}
