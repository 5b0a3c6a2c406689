//! Registry of discovered devices.

use std::sync::Arc;

use tokio::sync::RwLock;

use crate::light::LightDevice;

/// Shared device handle.
pub type DeviceRef = Arc<dyn LightDevice>;

/// Append-only, ordered collection of discovered devices.
///
/// Appends are serialized by the write lock, so a reader sees each device
/// either fully or not at all. Readers take a [`snapshot`](Self::snapshot)
/// and release the lock before doing any network I/O, which keeps discovery
/// from stalling behind slow devices.
///
/// # Example
///
/// ```no_run
/// use keylightd::registry::{DeviceRef, DeviceRegistry};
///
/// # async fn example(device: DeviceRef) {
/// let registry = DeviceRegistry::new();
/// registry.append(device).await;
///
/// for device in registry.snapshot().await {
///     let _ = device.fetch_light_group().await;
/// }
/// # }
/// ```
#[derive(Debug, Default)]
pub struct DeviceRegistry {
    devices: RwLock<Vec<DeviceRef>>,
}

impl DeviceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a device at the end of the registry.
    pub async fn append(&self, device: DeviceRef) {
        self.devices.write().await.push(device);
    }

    /// Point-in-time copy of the device handles, in discovery order.
    pub async fn snapshot(&self) -> Vec<DeviceRef> {
        self.devices.read().await.clone()
    }

    /// Looks a device up by its announced name.
    pub async fn find(&self, name: &str) -> Option<DeviceRef> {
        self.devices
            .read()
            .await
            .iter()
            .find(|device| device.name() == name)
            .cloned()
    }

    pub async fn len(&self) -> usize {
        self.devices.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.devices.read().await.is_empty()
    }
}
