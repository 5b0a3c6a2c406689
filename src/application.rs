//! Application entry point and builder.

use std::sync::Arc;

use anyhow::{Result, anyhow};

use crate::{config::ConfigManager, coordinator::SystemCoordinator, discovery::DiscoveryFeed};

/// The daemon: initialize, start services, run until asked to stop.
///
/// # Example
///
/// ```no_run
/// use keylightd::application::Application;
/// use keylightd::config;
///
/// # async fn example() -> anyhow::Result<()> {
/// let config_manager = config::ConfigManager::load(None).await?;
/// let mut app = Application::builder()
///     .with_config_manager(config_manager)
///     .build()
///     .await?;
///
/// app.run().await?;
/// # Ok(())
/// # }
/// ```
pub struct Application {
    pub coordinator: SystemCoordinator,
    config_manager: ConfigManager,
}

impl Application {
    pub fn builder() -> ApplicationBuilder {
        ApplicationBuilder::new()
    }

    /// Runs the complete daemon lifecycle.
    pub async fn run(&mut self) -> Result<()> {
        self.coordinator
            .initialize(self.config_manager.clone())
            .await?;

        self.coordinator.start_all_services().await?;

        self.coordinator.run_main_loop().await
    }
}

pub struct ApplicationBuilder {
    config_manager: Option<ConfigManager>,
    feed: Option<Arc<dyn DiscoveryFeed>>,
}

impl ApplicationBuilder {
    fn new() -> Self {
        Self {
            config_manager: None,
            feed: None,
        }
    }

    pub fn with_config_manager(mut self, config_manager: ConfigManager) -> Self {
        self.config_manager = Some(config_manager);
        self
    }

    /// Discovers devices from `feed` instead of the configured device list.
    pub fn with_feed(mut self, feed: Arc<dyn DiscoveryFeed>) -> Self {
        self.feed = Some(feed);
        self
    }

    pub async fn build(self) -> Result<Application> {
        let config_manager = self
            .config_manager
            .ok_or_else(|| anyhow!("Configuration manager is required"))?;
        config_manager.validate().await?;

        let mut coordinator = SystemCoordinator::new();
        if let Some(feed) = self.feed {
            coordinator = coordinator.with_feed(feed);
        }

        Ok(Application {
            coordinator,
            config_manager,
        })
    }
}
