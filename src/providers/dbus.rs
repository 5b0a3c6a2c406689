//! D-Bus service provider.

use anyhow::{Context, Result};
use async_trait::async_trait;
use log::{info, warn};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use zbus::Connection;

use crate::{
    app_context::AppState,
    event::EventBus,
    interface::{DBusInterface, OBJECT_PATH, SERVICE_NAME},
    providers::traits::ServiceProvider,
    task_manager::TaskManager,
};

/// Exposes the control interface on the session bus.
///
/// Optional: when no session bus is reachable the coordinator skips this
/// provider and the daemon runs without remote control.
pub struct DBusServiceProvider {
    state: Arc<AppState>,
    event_bus: EventBus,
    connection: Connection,
}

impl DBusServiceProvider {
    /// Connects to the session bus.
    pub async fn new(state: Arc<AppState>, event_bus: EventBus) -> Result<Self> {
        let connection = Connection::session()
            .await
            .context("Failed to connect to the D-Bus session bus")?;
        Ok(Self {
            state,
            event_bus,
            connection,
        })
    }
}

#[async_trait]
impl ServiceProvider for DBusServiceProvider {
    async fn start(&self, task_manager: &mut TaskManager) -> Result<()> {
        let interface = DBusInterface::new(
            self.state.clone(),
            env!("CARGO_PKG_VERSION").to_string(),
            self.event_bus.clone(),
        );
        self.connection
            .object_server()
            .at(OBJECT_PATH, interface)
            .await
            .context("Failed to register D-Bus object")?;
        self.connection
            .request_name(SERVICE_NAME)
            .await
            .with_context(|| format!("Failed to acquire bus name {SERVICE_NAME}"))?;
        info!("Serving {SERVICE_NAME} at {OBJECT_PATH}");

        let connection = self.connection.clone();
        task_manager.spawn_task(self.name(), |cancel_token| async move {
            run_dbus_service(connection, cancel_token).await
        });
        Ok(())
    }

    fn name(&self) -> &'static str {
        "DBusService"
    }

    fn priority(&self) -> i32 {
        8
    }
}

/// Keeps the connection alive until cancelled, then releases the name.
async fn run_dbus_service(connection: Connection, cancel_token: CancellationToken) -> Result<()> {
    cancel_token.cancelled().await;
    info!("D-Bus service cancelled");

    if let Err(e) = connection.release_name(SERVICE_NAME).await {
        warn!("Failed to release {SERVICE_NAME}: {e}");
    }
    Ok(())
}
