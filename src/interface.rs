//! D-Bus control interface.
//!
//! This is the input side of the daemon: every user action arrives here and
//! is routed to the matching control surface.

use std::sync::Arc;

use log::{info, warn};
use zbus::{fdo, interface, object_server::SignalEmitter};

use crate::{
    app_context::AppState,
    event::{Event, EventBus},
    state_sync::{DeviceStateSync, toggle_power_all},
    surface::ControlSurface,
};

pub const SERVICE_NAME: &str = "io.github.keylightd";
pub const OBJECT_PATH: &str = "/io/github/keylightd";

pub struct DBusInterface {
    state: Arc<AppState>,
    event_bus: EventBus,
    version: String,
}

impl DBusInterface {
    pub fn new(state: Arc<AppState>, version: String, event_bus: EventBus) -> Self {
        Self {
            state,
            event_bus,
            version,
        }
    }

    async fn surface(&self, device: &str) -> fdo::Result<Arc<ControlSurface>> {
        self.state
            .panel
            .find(device)
            .await
            .ok_or_else(|| unknown(device))
    }
}

fn unknown(device: &str) -> fdo::Error {
    fdo::Error::InvalidArgs(format!("Unknown device '{device}'"))
}

#[interface(name = "io.github.keylightd1")]
impl DBusInterface {
    #[zbus(signal)]
    async fn stopped(emitter: &SignalEmitter<'_>) -> zbus::Result<()>;

    async fn stop(
        &self,
        #[zbus(signal_emitter)] emitter: SignalEmitter<'_>,
    ) -> fdo::Result<()> {
        info!("Stop requested over D-Bus");
        emitter.stopped().await?;
        self.event_bus
            .publish(Event::SystemShutdown)
            .map_err(|e| fdo::Error::Failed(e.to_string()))
    }

    /// Toggles every registered device; returns how many were toggled.
    async fn toggle_all(&self) -> u32 {
        let toggled = toggle_power_all(&self.state.registry).await;
        u32::try_from(toggled).unwrap_or(u32::MAX)
    }

    /// Devices without controls are still reachable by their registered name.
    async fn toggle_power(&self, device: &str) -> fdo::Result<bool> {
        if let Some(surface) = self.state.panel.find(device).await {
            return Ok(surface.toggle_power().await);
        }

        let handle = self
            .state
            .registry
            .find(device)
            .await
            .ok_or_else(|| unknown(device))?;
        match DeviceStateSync::new(handle).toggle_power().await {
            Ok(_) => Ok(true),
            Err(e) => {
                warn!("{e}");
                Ok(false)
            }
        }
    }

    /// Steps brightness by `delta` and returns the new value.
    async fn step_brightness(&self, device: &str, delta: i32) -> fdo::Result<i32> {
        self.surface(device)
            .await?
            .step_brightness(delta)
            .await
            .ok_or_else(|| fdo::Error::Failed(format!("Brightness step on '{device}' failed")))
    }

    /// Slider input; the write happens once input pauses.
    async fn set_brightness(&self, device: &str, percent: i32) -> fdo::Result<()> {
        self.surface(device).await?.on_brightness_changed(percent);
        Ok(())
    }

    /// Slider input in Kelvin; the write happens once input pauses.
    async fn set_temperature(&self, device: &str, kelvin: i32) -> fdo::Result<()> {
        self.surface(device).await?.on_temperature_changed(kelvin);
        Ok(())
    }

    /// `(name, brightness percent, temperature Kelvin)` per controllable device.
    async fn devices(&self) -> Vec<(String, i32, i32)> {
        self.state
            .panel
            .snapshot()
            .await
            .iter()
            .map(|surface| {
                let labels = surface.labels();
                (labels.name, labels.brightness, labels.temperature)
            })
            .collect()
    }

    #[zbus(property)]
    async fn version(&self) -> String {
        self.version.clone()
    }
}
