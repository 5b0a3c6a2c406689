//! Shared application state.

use std::sync::Arc;

use anyhow::{Context, Result};
use log::{info, warn};

use crate::{
    config::{Config, ConfigManager},
    converter::UnitConverter,
    discovery::{DiscoveryFeed, StaticDiscovery},
    registry::DeviceRegistry,
    surface::{ControlPanel, SurfaceSettings},
};

/// State shared by every service.
///
/// Built once at startup. The registry and the panel only grow; the converter
/// is immutable.
pub struct AppState {
    pub config_manager: Arc<ConfigManager>,
    /// Every discovered device, in discovery order.
    pub registry: Arc<DeviceRegistry>,
    /// Control surfaces of devices that answered their initial fetch.
    pub panel: Arc<ControlPanel>,
    pub converter: Arc<UnitConverter>,
    pub feed: Arc<dyn DiscoveryFeed>,
}

impl AppState {
    /// Builds the state with the configuration-driven discovery feed.
    pub async fn new(config_manager: ConfigManager) -> Result<Self> {
        let feed = {
            let config = config_manager.get().await;
            StaticDiscovery::from_config(&config.devices, config.request_timeout())
                .context("Failed to prepare light discovery")?
        };
        if feed.is_empty() {
            warn!("No lights configured, discovery will find nothing");
        } else {
            info!("{} light(s) configured", feed.len());
        }
        Self::with_feed(config_manager, Arc::new(feed)).await
    }

    /// Builds the state around an arbitrary discovery feed.
    pub async fn with_feed(
        config_manager: ConfigManager,
        feed: Arc<dyn DiscoveryFeed>,
    ) -> Result<Self> {
        let converter = {
            let config = config_manager.get().await;
            let table = config
                .calibration_table()
                .context("Invalid temperature calibration table")?;
            UnitConverter::new(&table).context("Failed to build temperature converter")?
        };

        Ok(Self {
            config_manager: Arc::new(config_manager),
            registry: Arc::new(DeviceRegistry::new()),
            panel: Arc::new(ControlPanel::new()),
            converter: Arc::new(converter),
            feed,
        })
    }

    pub async fn config(&self) -> tokio::sync::RwLockReadGuard<'_, Config> {
        self.config_manager.get().await
    }

    pub async fn surface_settings(&self) -> SurfaceSettings {
        self.config().await.surface_settings()
    }
}
