//! Read-modify-write cycles against a device's light state.
//!
//! Every mutation starts from a fresh fetch so that changes made elsewhere
//! (the vendor app, a hardware button) are never clobbered by a stale copy.
//! The fetched snapshot is never modified; a clone is changed and written.

use std::ops::RangeInclusive;

use futures::future::join_all;
use log::{info, warn};

use crate::{
    error::DeviceError,
    light::LightGroup,
    registry::{DeviceRef, DeviceRegistry},
};

/// Fetch/modify/write operations for a single device.
#[derive(Debug, Clone)]
pub struct DeviceStateSync {
    device: DeviceRef,
}

impl DeviceStateSync {
    pub fn new(device: DeviceRef) -> Self {
        Self { device }
    }

    /// Fetches the current state of the device.
    pub async fn fetch(&self) -> Result<LightGroup, DeviceError> {
        self.device.fetch_light_group().await
    }

    /// Fetches, applies `mutate` to a copy, and writes the copy back.
    ///
    /// Returns the group as written.
    async fn modify<F>(&self, mutate: F) -> Result<LightGroup, DeviceError>
    where
        F: FnOnce(&LightGroup) -> Result<Option<LightGroup>, DeviceError>,
    {
        let current = self.fetch().await?;
        match mutate(&current)? {
            Some(next) => {
                self.device.update_light_group(&next).await?;
                Ok(next)
            }
            None => Ok(current),
        }
    }

    fn no_lights(&self) -> DeviceError {
        DeviceError::NoLights {
            device: self.device.name(),
        }
    }

    /// Flips every light relative to its own current state.
    pub async fn toggle_power(&self) -> Result<LightGroup, DeviceError> {
        self.modify(|current| Ok(Some(current.toggled()))).await
    }

    /// Moves the first light's brightness by `delta`.
    ///
    /// With `bounds`, the result is clamped and no write happens when the
    /// value would not change. Returns the resulting brightness.
    pub async fn step_brightness(
        &self,
        delta: i32,
        bounds: Option<RangeInclusive<i32>>,
    ) -> Result<i32, DeviceError> {
        let written = self
            .modify(|current| {
                let light = current.primary().ok_or_else(|| self.no_lights())?;
                let target = stepped(light.brightness, delta, bounds.as_ref());
                if target == light.brightness {
                    return Ok(None);
                }

                let mut next = current.clone();
                if let Some(light) = next.primary_mut() {
                    light.brightness = target;
                }
                Ok(Some(next))
            })
            .await?;

        written
            .primary()
            .map(|light| light.brightness)
            .ok_or_else(|| self.no_lights())
    }

    /// Sets the first light's brightness in percent.
    pub async fn set_brightness(&self, percent: i32) -> Result<(), DeviceError> {
        self.modify(|current| {
            let mut next = current.clone();
            next.primary_mut().ok_or_else(|| self.no_lights())?.brightness = percent;
            Ok(Some(next))
        })
        .await
        .map(|_| ())
    }

    /// Sets the first light's temperature in device-native units.
    pub async fn set_temperature(&self, native: i32) -> Result<(), DeviceError> {
        self.modify(|current| {
            let mut next = current.clone();
            next.primary_mut().ok_or_else(|| self.no_lights())?.temperature = native;
            Ok(Some(next))
        })
        .await
        .map(|_| ())
    }
}

/// Brightness after a step of `delta`. Bounds pull an out-of-range value in
/// only in the direction of the step.
fn stepped(current: i32, delta: i32, bounds: Option<&RangeInclusive<i32>>) -> i32 {
    let target = current.saturating_add(delta);
    let Some(bounds) = bounds else {
        return target;
    };
    let clamped = target.clamp(*bounds.start(), *bounds.end());
    match delta.signum() {
        1 => clamped.max(current),
        -1 => clamped.min(current),
        _ => current,
    }
}

/// Toggles power on every registered device.
///
/// Works on a registry snapshot, so discovery can keep appending while the
/// round trips are in flight. Failures are logged and skipped. Returns the
/// number of devices that were toggled.
pub async fn toggle_power_all(registry: &DeviceRegistry) -> usize {
    let devices = registry.snapshot().await;

    let results = join_all(devices.into_iter().map(|device| async move {
        let name = device.name();
        (name, DeviceStateSync::new(device).toggle_power().await)
    }))
    .await;

    let mut toggled = 0;
    for (name, result) in results {
        match result {
            Ok(_) => toggled += 1,
            Err(e) => warn!("Toggle all: skipping '{name}': {e}"),
        }
    }

    info!("Toggled power on {toggled} device(s)");
    toggled
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::light::{Light, LightDevice, MockLightDevice, POWER_OFF_CODE, POWER_ON_CODE};
    use async_trait::async_trait;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;
    use std::{sync::Arc, time::Duration};

    fn light(on: i32, brightness: i32) -> Light {
        Light {
            on,
            brightness,
            temperature: 213,
        }
    }

    fn mock_device(name: &str) -> MockLightDevice {
        let mut mock = MockLightDevice::new();
        mock.expect_name().return_const(name.to_string());
        mock.expect_address()
            .return_const(format!("{name}.local:9123"));
        mock
    }

    fn serving(mut mock: MockLightDevice, group: LightGroup) -> MockLightDevice {
        mock.expect_fetch_light_group()
            .returning(move || Ok(group.clone()));
        mock
    }

    fn fetch_failure(device: &str) -> DeviceError {
        DeviceError::Fetch {
            device: device.to_string(),
            reason: "connection refused".to_string(),
        }
    }

    #[tokio::test]
    async fn toggle_writes_per_light_negation() {
        let group = LightGroup::from(vec![
            light(POWER_ON_CODE, 10),
            light(POWER_OFF_CODE, 20),
            light(POWER_ON_CODE, 30),
        ]);
        let mut mock = serving(mock_device("desk"), group);
        mock.expect_update_light_group()
            .withf(|group: &LightGroup| {
                group.lights.iter().map(|l| l.on).collect::<Vec<_>>()
                    == vec![POWER_OFF_CODE, POWER_ON_CODE, POWER_OFF_CODE]
            })
            .times(1)
            .returning(|_| Ok(()));

        let sync = DeviceStateSync::new(Arc::new(mock));
        let written = sync.toggle_power().await.unwrap();
        assert_eq!(written.lights[1].brightness, 20);
    }

    #[tokio::test]
    async fn fetch_failure_skips_the_write() {
        let mut mock = mock_device("desk");
        mock.expect_fetch_light_group()
            .times(1)
            .returning(|| Err(fetch_failure("desk")));
        mock.expect_update_light_group().never();

        let sync = DeviceStateSync::new(Arc::new(mock));
        assert!(matches!(
            sync.toggle_power().await,
            Err(DeviceError::Fetch { .. })
        ));
    }

    #[tokio::test]
    async fn write_failure_is_reported() {
        let mut mock = serving(mock_device("desk"), LightGroup::from(vec![light(0, 50)]));
        mock.expect_update_light_group().times(1).returning(|_| {
            Err(DeviceError::Write {
                device: "desk".to_string(),
                reason: "timeout".to_string(),
            })
        });

        let sync = DeviceStateSync::new(Arc::new(mock));
        assert!(matches!(
            sync.set_brightness(60).await,
            Err(DeviceError::Write { .. })
        ));
    }

    #[tokio::test]
    async fn step_brightness_moves_by_delta() {
        let mut mock = serving(mock_device("desk"), LightGroup::from(vec![light(0, 50)]));
        mock.expect_update_light_group()
            .withf(|group: &LightGroup| group.lights[0].brightness == 51)
            .times(1)
            .returning(|_| Ok(()));

        let sync = DeviceStateSync::new(Arc::new(mock));
        assert_eq!(sync.step_brightness(1, Some(3..=100)).await.unwrap(), 51);
    }

    #[tokio::test]
    async fn step_brightness_at_bound_does_not_write() {
        let mut mock = serving(mock_device("desk"), LightGroup::from(vec![light(0, 100)]));
        mock.expect_update_light_group().never();

        let sync = DeviceStateSync::new(Arc::new(mock));
        assert_eq!(sync.step_brightness(1, Some(3..=100)).await.unwrap(), 100);
    }

    #[tokio::test]
    async fn step_down_below_range_never_raises() {
        let mut mock = serving(mock_device("desk"), LightGroup::from(vec![light(0, 1)]));
        mock.expect_update_light_group().never();

        let sync = DeviceStateSync::new(Arc::new(mock));
        assert_eq!(sync.step_brightness(-1, Some(3..=100)).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn step_up_below_range_lands_on_the_minimum() {
        let mut mock = serving(mock_device("desk"), LightGroup::from(vec![light(0, 1)]));
        mock.expect_update_light_group()
            .withf(|group: &LightGroup| group.lights[0].brightness == 3)
            .times(1)
            .returning(|_| Ok(()));

        let sync = DeviceStateSync::new(Arc::new(mock));
        assert_eq!(sync.step_brightness(1, Some(3..=100)).await.unwrap(), 3);
    }

    #[test]
    fn bounded_step_follows_the_delta() {
        assert_eq!(stepped(50, -1, Some(&(3..=100))), 49);
        assert_eq!(stepped(3, -1, Some(&(3..=100))), 3);
        assert_eq!(stepped(120, 1, Some(&(3..=100))), 120);
        assert_eq!(stepped(120, -1, Some(&(3..=100))), 100);
        assert_eq!(stepped(1, 0, Some(&(3..=100))), 1);
        assert_eq!(stepped(1, -1, None), 0);
    }

    proptest! {
        #[test]
        fn bounded_step_never_moves_against_delta(
            current in -50i32..150,
            delta in -10i32..=10,
        ) {
            let next = stepped(current, delta, Some(&(3..=100)));
            if delta < 0 {
                prop_assert!(next <= current);
            } else {
                prop_assert!(next >= current);
            }
        }
    }

    #[tokio::test]
    async fn step_brightness_without_bounds_is_unclamped() {
        let mut mock = serving(mock_device("desk"), LightGroup::from(vec![light(0, 3)]));
        mock.expect_update_light_group()
            .withf(|group: &LightGroup| group.lights[0].brightness == 2)
            .times(1)
            .returning(|_| Ok(()));

        let sync = DeviceStateSync::new(Arc::new(mock));
        assert_eq!(sync.step_brightness(-1, None).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn set_temperature_only_touches_first_light() {
        let group = LightGroup::from(vec![light(0, 50), light(1, 70)]);
        let mut mock = serving(mock_device("desk"), group);
        mock.expect_update_light_group()
            .withf(|group: &LightGroup| {
                group.lights[0].temperature == 250
                    && group.lights[1].temperature == 213
                    && group.lights[1].on == 1
            })
            .times(1)
            .returning(|_| Ok(()));

        let sync = DeviceStateSync::new(Arc::new(mock));
        sync.set_temperature(250).await.unwrap();
    }

    #[tokio::test]
    async fn empty_group_is_rejected_without_writing() {
        let mut mock = serving(mock_device("desk"), LightGroup::from(vec![]));
        mock.expect_update_light_group().never();

        let sync = DeviceStateSync::new(Arc::new(mock));
        assert!(matches!(
            sync.set_brightness(40).await,
            Err(DeviceError::NoLights { .. })
        ));
        assert!(matches!(
            sync.step_brightness(1, None).await,
            Err(DeviceError::NoLights { .. })
        ));
    }

    #[tokio::test]
    async fn toggle_all_skips_failing_devices() {
        let registry = DeviceRegistry::new();

        for name in ["left", "right"] {
            let mut mock = serving(mock_device(name), LightGroup::from(vec![light(0, 50)]));
            mock.expect_update_light_group()
                .times(1)
                .returning(|_| Ok(()));
            registry.append(Arc::new(mock)).await;
        }

        let mut broken = mock_device("broken");
        broken
            .expect_fetch_light_group()
            .returning(|| Err(fetch_failure("broken")));
        broken.expect_update_light_group().never();
        registry.append(Arc::new(broken)).await;

        assert_eq!(toggle_power_all(&registry).await, 2);
    }

    #[tokio::test]
    async fn toggle_all_on_empty_registry_is_a_no_op() {
        assert_eq!(toggle_power_all(&DeviceRegistry::new()).await, 0);
    }

    /// Device whose fetch appends to the registry it lives in; deadlocks if
    /// toggle-all held the registry lock across device I/O.
    #[derive(Debug)]
    struct ReentrantDevice {
        registry: Arc<DeviceRegistry>,
    }

    #[async_trait]
    impl LightDevice for ReentrantDevice {
        fn name(&self) -> String {
            "reentrant".to_string()
        }

        fn address(&self) -> String {
            "reentrant.local:9123".to_string()
        }

        async fn fetch_light_group(&self) -> Result<LightGroup, DeviceError> {
            let mut late = mock_device("late");
            late.expect_fetch_light_group().never();
            self.registry.append(Arc::new(late)).await;
            Ok(LightGroup::from(vec![light(0, 50)]))
        }

        async fn update_light_group(&self, _group: &LightGroup) -> Result<(), DeviceError> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn toggle_all_releases_registry_before_device_io() {
        let registry = Arc::new(DeviceRegistry::new());
        registry
            .append(Arc::new(ReentrantDevice {
                registry: registry.clone(),
            }))
            .await;

        let toggled = tokio::time::timeout(Duration::from_secs(1), toggle_power_all(&registry))
            .await
            .expect("toggle-all held the registry lock during I/O");

        assert_eq!(toggled, 1);
        assert_eq!(registry.len().await, 2);
    }
}
