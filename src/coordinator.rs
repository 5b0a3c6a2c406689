//! System coordinator for managing service lifecycle and dependency injection.

use std::sync::Arc;

use anyhow::{Context, Result, bail};
use log::{error, info, warn};
use tokio::sync::broadcast::error::RecvError;

use crate::{
    app_context::AppState,
    config::ConfigManager,
    discovery::DiscoveryFeed,
    event::{Event, EventBus},
    providers::{
        AppStateProvider, AsyncProvider, DBusServiceProvider, DiscoveryServiceProvider,
        PanelServiceProvider, ServiceProvider,
    },
    task_manager::TaskManager,
};

/// What the main loop should do after an event.
#[derive(Debug, PartialEq, Eq)]
enum Flow {
    Continue,
    Stop,
}

/// Owns every service and drives the daemon from startup to shutdown.
///
/// Services start in priority order. A critical service that fails to start
/// aborts startup; the others are logged and skipped.
pub struct SystemCoordinator {
    task_manager: TaskManager,
    event_bus: EventBus,
    shared_state: Option<Arc<AppState>>,
    service_providers: Vec<Box<dyn ServiceProvider>>,
    feed: Option<Arc<dyn DiscoveryFeed>>,
    with_dbus: bool,
}

impl Default for SystemCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

impl SystemCoordinator {
    pub fn new() -> Self {
        Self {
            task_manager: TaskManager::new(),
            event_bus: EventBus::new(),
            shared_state: None,
            service_providers: Vec::new(),
            feed: None,
            with_dbus: true,
        }
    }

    /// Discovers devices from `feed` instead of the configured device list.
    pub fn with_feed(mut self, feed: Arc<dyn DiscoveryFeed>) -> Self {
        self.feed = Some(feed);
        self
    }

    /// Leaves the D-Bus control interface out.
    pub fn without_dbus(mut self) -> Self {
        self.with_dbus = false;
        self
    }

    /// Builds the shared state and registers every service provider.
    pub async fn initialize(&mut self, config_manager: ConfigManager) -> Result<()> {
        info!("Initializing SystemCoordinator...");

        let mut app_state_provider = AppStateProvider::new(config_manager);
        if let Some(feed) = &self.feed {
            app_state_provider = app_state_provider.with_feed(feed.clone());
        }
        let state = app_state_provider
            .provide()
            .await
            .context("Failed to initialize application state")?;
        self.shared_state = Some(state.clone());

        self.register_service_providers(state).await;

        info!("SystemCoordinator initialization completed");
        Ok(())
    }

    async fn register_service_providers(&mut self, state: Arc<AppState>) {
        let mut providers: Vec<Box<dyn ServiceProvider>> = vec![
            Box::new(DiscoveryServiceProvider::new(
                state.clone(),
                self.event_bus.clone(),
            )),
            Box::new(PanelServiceProvider::new(
                state.clone(),
                self.event_bus.clone(),
            )),
        ];

        if self.with_dbus {
            match DBusServiceProvider::new(state, self.event_bus.clone()).await {
                Ok(provider) => providers.push(Box::new(provider)),
                Err(e) => warn!("{e:#}, skipping D-Bus service"),
            }
        }

        providers.sort_by_key(|b| std::cmp::Reverse(b.priority()));
        self.service_providers = providers;

        info!(
            "Registered {} service providers in priority order",
            self.service_providers.len()
        );
    }

    /// Starts all registered services in priority order.
    pub async fn start_all_services(&mut self) -> Result<()> {
        info!(
            "Starting {} services in priority order...",
            self.service_providers.len()
        );

        for provider in &self.service_providers {
            let is_critical = provider.is_critical();

            match provider.start(&mut self.task_manager).await {
                Ok(()) => {
                    info!(
                        "Service '{}' started (priority: {}, critical: {})",
                        provider.name(),
                        provider.priority(),
                        is_critical
                    );
                }
                Err(e) if is_critical => {
                    return Err(e).with_context(|| {
                        format!("Critical service '{}' failed to start", provider.name())
                    });
                }
                Err(e) => {
                    warn!(
                        "Non-critical service '{}' failed to start: {e:#}",
                        provider.name()
                    );
                }
            }
        }

        info!("All critical services started successfully");
        Ok(())
    }

    /// Runs until Ctrl+C or a shutdown request, then stops every service.
    pub async fn run_main_loop(&mut self) -> Result<()> {
        let mut event_rx = self.event_bus.subscribe();
        info!("Starting main event loop");

        loop {
            tokio::select! {
                result = tokio::signal::ctrl_c() => {
                    result.context("Failed to listen for shutdown signal")?;
                    info!("Received Ctrl+C, initiating graceful shutdown...");
                    break;
                }
                event = event_rx.recv() => {
                    if self.handle_event(event)? == Flow::Stop {
                        break;
                    }
                }
            }
        }

        self.shutdown().await;
        info!("Main event loop terminated");
        Ok(())
    }

    fn handle_event(&self, event: Result<Event, RecvError>) -> Result<Flow> {
        match event {
            Ok(Event::SystemShutdown) => {
                info!("Shutdown requested");
                return Ok(Flow::Stop);
            }
            Ok(Event::DiscoveryFailed(reason)) => {
                error!("Discovery failed: {reason}");
            }
            Ok(Event::SeedFailed(device)) => {
                warn!("'{device}' is registered but has no control surface");
            }
            Ok(event) => {
                info!("Received event: {event:?}");
            }
            Err(RecvError::Closed) => {
                bail!("Event bus channel closed unexpectedly");
            }
            Err(RecvError::Lagged(n)) => {
                warn!("Event bus lagged by {n} messages");
            }
        }
        Ok(Flow::Continue)
    }

    async fn shutdown(&mut self) {
        info!("Initiating graceful shutdown...");

        if let Err(e) = self.task_manager.shutdown_all().await {
            error!("Error during task shutdown: {e:#}");
        }

        info!("Shutdown complete");
    }

    pub const fn event_bus(&self) -> &EventBus {
        &self.event_bus
    }

    pub fn state(&self) -> Option<&Arc<AppState>> {
        self.shared_state.as_ref()
    }

    pub fn running_services(&self) -> Vec<&'static str> {
        self.service_providers.iter().map(|p| p.name()).collect()
    }
}
