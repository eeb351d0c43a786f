pub mod codec;
pub mod error;
pub mod forward;
pub mod handler;
pub mod listener;
pub mod respond;
pub mod tunnel;

use std::sync::Arc;

use anyhow::Result;

use crate::cache::CacheStore;
use crate::settings::Settings;

/// Shared state handed to every connection task.
#[derive(Clone)]
pub struct AppContext {
    pub settings: Arc<Settings>,
    pub cache: Arc<CacheStore>,
}

impl AppContext {
    pub fn new(settings: Arc<Settings>, cache: Arc<CacheStore>) -> Self {
        Self { settings, cache }
    }
}

pub async fn run(app: AppContext) -> Result<()> {
    listener::start_listener(app).await
}
