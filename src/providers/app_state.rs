//! Application state provider.

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;

use crate::{
    app_context::AppState, config::ConfigManager, discovery::DiscoveryFeed,
    providers::traits::AsyncProvider,
};

/// Builds [`AppState`] from the configuration, optionally around a custom
/// discovery feed.
pub struct AppStateProvider {
    config_manager: ConfigManager,
    feed: Option<Arc<dyn DiscoveryFeed>>,
}

impl AppStateProvider {
    pub const fn new(config_manager: ConfigManager) -> Self {
        Self {
            config_manager,
            feed: None,
        }
    }

    /// Replaces the configuration-driven feed.
    pub fn with_feed(mut self, feed: Arc<dyn DiscoveryFeed>) -> Self {
        self.feed = Some(feed);
        self
    }
}

#[async_trait]
impl AsyncProvider<Arc<AppState>> for AppStateProvider {
    async fn provide(&self) -> Result<Arc<AppState>> {
        let state = match &self.feed {
            Some(feed) => AppState::with_feed(self.config_manager.clone(), feed.clone()).await?,
            None => AppState::new(self.config_manager.clone()).await?,
        };
        Ok(Arc::new(state))
    }
}
