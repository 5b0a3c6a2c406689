//! Per-device control surfaces and the panel that holds them.
//!
//! A [`ControlSurface`] is the explicit context for one device: it owns the
//! device handle, one debounce session per slider and the labels the
//! renderer shows. Immediate actions (power toggle, brightness steps) go
//! straight through [`DeviceStateSync`]; slider input is coalesced first.

use std::{ops::RangeInclusive, sync::Arc, time::Duration};

use log::{debug, warn};
use serde::{Deserialize, Serialize};
use tokio::{
    sync::{RwLock, watch},
    task::JoinHandle,
};

use crate::{
    converter::UnitConverter,
    debounce::{DEFAULT_QUIET_WINDOW, DebounceSession, Settle},
    error::DeviceError,
    light::{LightGroup, display_name},
    registry::DeviceRef,
    state_sync::DeviceStateSync,
};

/// Inclusive slider range with a step grid anchored at `min`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SliderRange {
    pub min: i32,
    pub max: i32,
    pub step: i32,
}

impl SliderRange {
    /// Brightness in percent.
    pub const BRIGHTNESS: Self = Self {
        min: 3,
        max: 100,
        step: 1,
    };

    /// Color temperature in Kelvin.
    pub const TEMPERATURE: Self = Self {
        min: 2900,
        max: 7000,
        step: 50,
    };

    pub fn bounds(&self) -> RangeInclusive<i32> {
        self.min..=self.max
    }

    /// Clamps `value` into the range and rounds it to the nearest step.
    ///
    /// ```
    /// use keylightd::surface::SliderRange;
    ///
    /// assert_eq!(SliderRange::TEMPERATURE.snap(4024), 4000);
    /// assert_eq!(SliderRange::TEMPERATURE.snap(4025), 4050);
    /// assert_eq!(SliderRange::BRIGHTNESS.snap(0), 3);
    /// ```
    pub fn snap(&self, value: i32) -> i32 {
        let clamped = value.clamp(self.min, self.max);
        if self.step <= 1 {
            return clamped;
        }

        let steps = (clamped - self.min + self.step / 2) / self.step;
        let snapped = self.min + steps * self.step;
        if snapped > self.max {
            snapped - self.step
        } else {
            snapped
        }
    }
}

/// Tunables shared by every surface.
#[derive(Debug, Clone, PartialEq)]
pub struct SurfaceSettings {
    pub brightness: SliderRange,
    pub temperature: SliderRange,
    pub quiet_window: Duration,
    pub clamp_brightness_steps: bool,
}

impl Default for SurfaceSettings {
    fn default() -> Self {
        Self {
            brightness: SliderRange::BRIGHTNESS,
            temperature: SliderRange::TEMPERATURE,
            quiet_window: DEFAULT_QUIET_WINDOW,
            clamp_brightness_steps: true,
        }
    }
}

pub fn brightness_label(percent: i32) -> String {
    format!("Brightness: {percent}%")
}

pub fn temperature_label(kelvin: i32) -> String {
    format!("Temperature: {kelvin} K")
}

/// What the renderer shows for one device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SurfaceLabels {
    pub name: String,
    pub brightness: i32,
    pub temperature: i32,
}

impl SurfaceLabels {
    pub fn brightness_text(&self) -> String {
        brightness_label(self.brightness)
    }

    pub fn temperature_text(&self) -> String {
        temperature_label(self.temperature)
    }
}

/// Control context for a single device.
#[derive(Debug)]
pub struct ControlSurface {
    name: String,
    sync: DeviceStateSync,
    converter: Arc<UnitConverter>,
    settings: SurfaceSettings,
    brightness: DebounceSession,
    temperature: DebounceSession,
    labels: watch::Sender<SurfaceLabels>,
}

impl ControlSurface {
    /// Builds a surface from a fetched snapshot; the first light seeds the
    /// labels.
    pub fn new(
        device: DeviceRef,
        converter: Arc<UnitConverter>,
        settings: SurfaceSettings,
        seed: &LightGroup,
    ) -> Result<Self, DeviceError> {
        let name = device.name();
        let first = seed.primary().ok_or_else(|| DeviceError::NoLights {
            device: name.clone(),
        })?;

        let labels = SurfaceLabels {
            name: display_name(&name),
            brightness: first.brightness,
            temperature: converter.to_kelvin(first.temperature),
        };

        Ok(Self {
            brightness: DebounceSession::with_quiet_window(
                format!("{name}/brightness"),
                settings.quiet_window,
            ),
            temperature: DebounceSession::with_quiet_window(
                format!("{name}/temperature"),
                settings.quiet_window,
            ),
            labels: watch::Sender::new(labels),
            sync: DeviceStateSync::new(device),
            converter,
            settings,
            name,
        })
    }

    /// Fetches the device once and builds its surface from the result.
    pub async fn seed(
        device: DeviceRef,
        converter: Arc<UnitConverter>,
        settings: SurfaceSettings,
    ) -> Result<Self, DeviceError> {
        let group = device.fetch_light_group().await?;
        Self::new(device, converter, settings, &group)
    }

    /// Device name as announced by discovery.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn labels(&self) -> SurfaceLabels {
        self.labels.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<SurfaceLabels> {
        self.labels.subscribe()
    }

    /// Toggles every light of the device. Returns whether the write happened.
    pub async fn toggle_power(&self) -> bool {
        match self.sync.toggle_power().await {
            Ok(_) => true,
            Err(e) => {
                warn!("Power toggle dropped: {e}");
                false
            }
        }
    }

    pub async fn brightness_down(&self) -> Option<i32> {
        self.step_brightness(-1).await
    }

    pub async fn brightness_up(&self) -> Option<i32> {
        self.step_brightness(1).await
    }

    /// Steps brightness by `delta` and refreshes the label on success.
    pub async fn step_brightness(&self, delta: i32) -> Option<i32> {
        let bounds = self
            .settings
            .clamp_brightness_steps
            .then(|| self.settings.brightness.bounds());

        match self.sync.step_brightness(delta, bounds).await {
            Ok(brightness) => {
                self.labels.send_modify(|labels| labels.brightness = brightness);
                Some(brightness)
            }
            Err(e) => {
                warn!("Brightness step dropped: {e}");
                None
            }
        }
    }

    /// Slider input in percent. The label follows immediately; the device
    /// write is debounced.
    pub fn on_brightness_changed(&self, percent: i32) -> JoinHandle<Settle> {
        let percent = self.settings.brightness.snap(percent);
        self.labels.send_modify(|labels| labels.brightness = percent);

        let sync = self.sync.clone();
        self.brightness.submit(percent, move |percent| async move {
            match sync.set_brightness(percent).await {
                Ok(()) => debug!("Brightness set to {percent}%"),
                Err(e) => warn!("Brightness update dropped: {e}"),
            }
        })
    }

    /// Slider input in Kelvin. The label follows immediately; the device
    /// write is debounced and converted to native units at fire time.
    pub fn on_temperature_changed(&self, kelvin: i32) -> JoinHandle<Settle> {
        let kelvin = self.settings.temperature.snap(kelvin);
        self.labels.send_modify(|labels| labels.temperature = kelvin);

        let sync = self.sync.clone();
        let converter = self.converter.clone();
        self.temperature.submit(kelvin, move |kelvin| async move {
            let native = converter.to_native(kelvin);
            match sync.set_temperature(native).await {
                Ok(()) => debug!("Temperature set to {kelvin} K (native {native})"),
                Err(e) => warn!("Temperature update dropped: {e}"),
            }
        })
    }
}

/// Ordered list of surfaces, in the order devices were discovered.
#[derive(Debug, Default)]
pub struct ControlPanel {
    surfaces: RwLock<Vec<Arc<ControlSurface>>>,
}

impl ControlPanel {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn add(&self, surface: Arc<ControlSurface>) {
        self.surfaces.write().await.push(surface);
    }

    /// Looks a surface up by device name, raw or as displayed.
    pub async fn find(&self, name: &str) -> Option<Arc<ControlSurface>> {
        self.surfaces
            .read()
            .await
            .iter()
            .find(|surface| surface.name() == name || display_name(surface.name()) == name)
            .cloned()
    }

    pub async fn snapshot(&self) -> Vec<Arc<ControlSurface>> {
        self.surfaces.read().await.clone()
    }

    pub async fn len(&self) -> usize {
        self.surfaces.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.surfaces.read().await.is_empty()
    }
}
