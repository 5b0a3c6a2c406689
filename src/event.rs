//! Event bus for lifecycle notifications between services.

use anyhow::Result;
use tokio::sync::broadcast;

/// Application events.
///
/// Published by the discovery path and the D-Bus interface, consumed by the
/// coordinator and the panel renderer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// A device was appended to the registry.
    DeviceDiscovered(String),
    /// A control surface for the named device was added to the panel.
    SurfaceReady(String),
    /// The initial fetch of the named device failed; it has no surface.
    SeedFailed(String),
    /// Discovery stopped accepting devices.
    DiscoveryFinished { devices: usize },
    /// The discovery feed failed after startup.
    DiscoveryFailed(String),
    SystemShutdown,
}

/// Publish-subscribe channel shared by all services.
///
/// # Example
///
/// ```no_run
/// use keylightd::event::{Event, EventBus};
///
/// let event_bus = EventBus::new();
/// let mut subscriber = event_bus.subscribe();
///
/// event_bus.publish(Event::DeviceDiscovered("desk".into())).unwrap();
///
/// // In async context:
/// // let event = subscriber.recv().await;
/// ```
#[derive(Debug, Clone)]
pub struct EventBus {
    sender: broadcast::Sender<Event>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::with_capacity(100)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publishes an event to all subscribers.
    ///
    /// Returns an error if there are no active subscribers.
    pub fn publish(&self, event: Event) -> Result<()> {
        self.sender.send(event)?;
        Ok(())
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.sender.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}
