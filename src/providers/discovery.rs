//! Discovery service: fans discovered devices into the registry and builds
//! their control surfaces.

use std::{sync::Arc, time::Duration};

use anyhow::{Context, Result};
use async_trait::async_trait;
use log::{error, info, warn};
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;

use crate::{
    app_context::AppState,
    discovery::DiscoverySession,
    event::{Event, EventBus},
    providers::traits::ServiceProvider,
    registry::DeviceRef,
    surface::ControlSurface,
    task_manager::TaskManager,
};

/// Why the discovery loop stopped accepting devices.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StopReason {
    /// The feed closed its channel.
    Exhausted,
    /// The discovery deadline elapsed.
    Deadline,
    /// The feed's background task failed.
    FeedFailed(String),
    /// The service was cancelled.
    Cancelled,
}

/// Outcome of one discovery run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveryReport {
    /// Devices appended to the registry.
    pub devices: usize,
    /// Devices that also got a control surface.
    pub surfaces: usize,
    pub stop: StopReason,
}

/// Critical service: startup fails if the feed cannot be started.
///
/// # Example
///
/// ```no_run
/// use std::sync::Arc;
/// use keylightd::providers::DiscoveryServiceProvider;
/// use keylightd::event::EventBus;
/// use keylightd::app_context::AppState;
///
/// # async fn example(state: Arc<AppState>) -> anyhow::Result<()> {
/// let provider = DiscoveryServiceProvider::new(state, EventBus::new());
/// # Ok(())
/// # }
/// ```
pub struct DiscoveryServiceProvider {
    state: Arc<AppState>,
    event_bus: EventBus,
}

impl DiscoveryServiceProvider {
    pub fn new(state: Arc<AppState>, event_bus: EventBus) -> Self {
        Self { state, event_bus }
    }
}

#[async_trait]
impl ServiceProvider for DiscoveryServiceProvider {
    async fn start(&self, task_manager: &mut TaskManager) -> Result<()> {
        let session = self
            .state
            .feed
            .start()
            .await
            .context("Failed to start light discovery")?;

        let state = self.state.clone();
        let event_bus = self.event_bus.clone();
        let deadline = state.config().await.discovery_timeout();

        task_manager.spawn_task(self.name(), move |cancel_token| async move {
            consume_discovery(session, &state, &event_bus, deadline, cancel_token).await;
            Ok(())
        });
        Ok(())
    }

    fn name(&self) -> &'static str {
        "DiscoveryService"
    }

    fn priority(&self) -> i32 {
        10
    }

    fn is_critical(&self) -> bool {
        true
    }
}

/// Accepts devices from `session` until the feed closes, fails, the deadline
/// passes or `cancel_token` fires.
///
/// The feed task is aborted and the channel dropped on the way out.
pub async fn consume_discovery(
    session: DiscoverySession,
    state: &AppState,
    event_bus: &EventBus,
    deadline: Duration,
    cancel_token: CancellationToken,
) -> DiscoveryReport {
    let DiscoverySession {
        devices: mut rx,
        mut run,
    } = session;

    let timer = sleep(deadline);
    tokio::pin!(timer);

    let mut feed_finished = false;
    let mut devices = 0;
    let mut surfaces = 0;

    let stop = loop {
        tokio::select! {
            biased;
            () = cancel_token.cancelled() => break StopReason::Cancelled,
            () = &mut timer => break StopReason::Deadline,
            finished = &mut run, if !feed_finished => {
                feed_finished = true;
                let failure = match finished {
                    Ok(Ok(())) => None,
                    Ok(Err(e)) => Some(e.to_string()),
                    Err(join_error) => Some(format!("discovery task aborted: {join_error}")),
                };
                if let Some(reason) = failure {
                    error!("{reason}");
                    let _ = event_bus.publish(Event::DiscoveryFailed(reason.clone()));
                    break StopReason::FeedFailed(reason);
                }
                // Keep draining; the channel closes once the buffer is empty.
            }
            next = rx.recv() => match next {
                Some(device) => {
                    devices += 1;
                    // A slow seed must not hold the loop past the deadline.
                    let seeded = tokio::select! {
                        biased;
                        () = cancel_token.cancelled() => break StopReason::Cancelled,
                        () = &mut timer => break StopReason::Deadline,
                        seeded = admit(device, state, event_bus) => seeded,
                    };
                    if seeded {
                        surfaces += 1;
                    }
                }
                None => break StopReason::Exhausted,
            },
        }
    };

    if stop == StopReason::Deadline {
        info!("Discovery window of {deadline:?} elapsed");
    }
    run.abort();
    drop(rx);

    info!("Discovery stopped ({stop:?}): {devices} device(s), {surfaces} surface(s)");
    let _ = event_bus.publish(Event::DiscoveryFinished { devices });

    DiscoveryReport {
        devices,
        surfaces,
        stop,
    }
}

/// Registers one device and tries to build its surface. Returns whether a
/// surface was added.
async fn admit(device: DeviceRef, state: &AppState, event_bus: &EventBus) -> bool {
    let name = device.name();
    state.registry.append(device.clone()).await;
    info!("Discovered '{name}' at {}", device.address());
    let _ = event_bus.publish(Event::DeviceDiscovered(name.clone()));

    let settings = state.surface_settings().await;
    match ControlSurface::seed(device, state.converter.clone(), settings).await {
        Ok(surface) => {
            state.panel.add(Arc::new(surface)).await;
            let _ = event_bus.publish(Event::SurfaceReady(name));
            true
        }
        Err(e) => {
            warn!("No controls for '{name}': {e}");
            let _ = event_bus.publish(Event::SeedFailed(name));
            false
        }
    }
}
