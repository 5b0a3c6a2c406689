//! Light state model and the device handle abstraction.

use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;
use serde::{Deserialize, Serialize};

use crate::error::DeviceError;

/// State code the devices report for a light that is on.
pub const POWER_ON_CODE: i32 = 0;

/// State code written to switch a light off.
pub const POWER_OFF_CODE: i32 = 1;

/// State of a single light inside a group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Light {
    /// Power state code. See [`POWER_ON_CODE`].
    pub on: i32,
    /// Brightness in percent.
    pub brightness: i32,
    /// Color temperature in device-native units.
    pub temperature: i32,
}

impl Light {
    pub const fn is_on(&self) -> bool {
        self.on == POWER_ON_CODE
    }
}

/// Snapshot of a device's lights at fetch time.
///
/// This is a plain value: `clone()` is a deep copy, so a clone can be mutated
/// and written back without touching the snapshot it came from.
///
/// # Example
///
/// ```
/// use keylightd::light::{Light, LightGroup};
///
/// let fetched = LightGroup::from(vec![Light { on: 0, brightness: 40, temperature: 213 }]);
/// let mut update = fetched.clone();
/// update.lights[0].brightness = 41;
/// assert_eq!(fetched.lights[0].brightness, 40);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LightGroup {
    pub number_of_lights: usize,
    pub lights: Vec<Light>,
}

impl From<Vec<Light>> for LightGroup {
    fn from(lights: Vec<Light>) -> Self {
        Self {
            number_of_lights: lights.len(),
            lights,
        }
    }
}

impl LightGroup {
    /// First light of the group, which drives the brightness and temperature
    /// controls.
    pub fn primary(&self) -> Option<&Light> {
        self.lights.first()
    }

    pub fn primary_mut(&mut self) -> Option<&mut Light> {
        self.lights.first_mut()
    }

    /// Returns a copy where every light is flipped relative to its own state.
    pub fn toggled(&self) -> Self {
        let mut next = self.clone();
        for light in &mut next.lights {
            light.on = if light.is_on() {
                POWER_OFF_CODE
            } else {
                POWER_ON_CODE
            };
        }
        next
    }
}

/// Handle to a remote light discovered on the network.
///
/// Both operations are network round trips and may fail; callers treat any
/// failure as "this action did not happen".
#[cfg_attr(test, automock)]
#[async_trait]
pub trait LightDevice: Send + Sync + core::fmt::Debug {
    /// Stable device name, as announced by discovery.
    fn name(&self) -> String;

    /// Network address the device is reached at.
    fn address(&self) -> String;

    /// Fetches the current state of all lights.
    async fn fetch_light_group(&self) -> Result<LightGroup, DeviceError>;

    /// Writes a full light group back to the device.
    async fn update_light_group(&self, group: &LightGroup) -> Result<(), DeviceError>;
}

/// Name as it should be displayed: discovery escapes spaces with backslashes.
pub fn display_name(name: &str) -> String {
    name.replace('\\', "")
}
