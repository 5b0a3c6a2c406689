//! Panel service: the headless renderer of control surfaces.
//!
//! Every surface publishes its labels through a watch channel; the renderer
//! merges them into one stream and writes a line whenever a label changes.

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use log::{debug, info, warn};
use tokio::sync::broadcast::{Receiver, error::RecvError};
use tokio_stream::{StreamExt, StreamMap, wrappers::WatchStream};
use tokio_util::sync::CancellationToken;

use crate::{
    app_context::AppState,
    event::{Event, EventBus},
    providers::traits::ServiceProvider,
    surface::{ControlSurface, SurfaceLabels},
    task_manager::TaskManager,
};

pub struct PanelServiceProvider {
    state: Arc<AppState>,
    event_bus: EventBus,
}

impl PanelServiceProvider {
    pub fn new(state: Arc<AppState>, event_bus: EventBus) -> Self {
        Self { state, event_bus }
    }
}

#[async_trait]
impl ServiceProvider for PanelServiceProvider {
    async fn start(&self, task_manager: &mut TaskManager) -> Result<()> {
        // Subscribe before spawning so no SurfaceReady slips through.
        let events = self.event_bus.subscribe();
        let state = self.state.clone();

        task_manager.spawn_task(self.name(), |cancel_token| async move {
            run_panel(state, events, cancel_token, |line| info!("{line}")).await;
            Ok(())
        });
        Ok(())
    }

    fn name(&self) -> &'static str {
        "PanelService"
    }

    fn priority(&self) -> i32 {
        4
    }
}

/// One display line for a surface.
pub fn render_line(labels: &SurfaceLabels) -> String {
    format!(
        "{} | {} | {}",
        labels.name,
        labels.brightness_text(),
        labels.temperature_text()
    )
}

type LabelStreams = StreamMap<String, WatchStream<SurfaceLabels>>;

fn track(streams: &mut LabelStreams, surface: &ControlSurface) {
    if !streams.contains_key(surface.name()) {
        debug!("Rendering '{}'", surface.name());
        streams.insert(surface.name().to_string(), WatchStream::new(surface.subscribe()));
    }
}

async fn track_all(streams: &mut LabelStreams, state: &AppState) {
    for surface in state.panel.snapshot().await {
        track(streams, &surface);
    }
}

/// Renders every surface on the panel until cancelled, passing each line to
/// `draw`.
pub async fn run_panel<F>(
    state: Arc<AppState>,
    mut events: Receiver<Event>,
    cancel_token: CancellationToken,
    mut draw: F,
) where
    F: FnMut(String) + Send,
{
    let mut streams = LabelStreams::new();
    track_all(&mut streams, &state).await;

    loop {
        tokio::select! {
            () = cancel_token.cancelled() => {
                info!("Panel service cancelled");
                break;
            }
            event = events.recv() => match event {
                Ok(Event::SurfaceReady(name)) => {
                    if let Some(surface) = state.panel.find(&name).await {
                        track(&mut streams, &surface);
                    }
                }
                Ok(Event::DiscoveryFinished { devices }) => {
                    info!("Panel shows {} of {devices} discovered device(s)", streams.len());
                }
                Ok(_) => {}
                Err(RecvError::Lagged(n)) => {
                    warn!("Panel missed {n} events, resyncing");
                    track_all(&mut streams, &state).await;
                }
                Err(RecvError::Closed) => break,
            },
            Some((_, labels)) = streams.next(), if !streams.is_empty() => {
                draw(render_line(&labels));
            }
        }
    }
}
