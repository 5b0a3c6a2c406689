//! Device discovery feeds.
//!
//! A feed hands out devices over an `mpsc` channel while its own background
//! task runs. Closing the channel means "no more devices"; the consumer side
//! lives in [`providers::discovery`](crate::providers::discovery).

use std::sync::Arc;

use async_trait::async_trait;
use log::{debug, info};
use tokio::{sync::mpsc, task::JoinHandle};

use crate::{
    config::DeviceCfg,
    drivers::elgato::{ElgatoLight, http_client},
    error::DiscoveryError,
    registry::DeviceRef,
};

/// Buffer between a feed and its consumer.
pub const FEED_CAPACITY: usize = 16;

/// A running discovery: the device stream plus the feed's background task.
#[derive(Debug)]
pub struct DiscoverySession {
    pub devices: mpsc::Receiver<DeviceRef>,
    pub run: JoinHandle<Result<(), DiscoveryError>>,
}

/// Source of discovered devices.
#[async_trait]
pub trait DiscoveryFeed: Send + Sync + core::fmt::Debug {
    /// Starts discovery. An error here is fatal to startup.
    async fn start(&self) -> Result<DiscoverySession, DiscoveryError>;
}

/// Announces the lights listed in the configuration, in order.
#[derive(Debug, Clone)]
pub struct StaticDiscovery {
    devices: Vec<DeviceRef>,
}

impl StaticDiscovery {
    pub fn new(devices: Vec<DeviceRef>) -> Self {
        Self { devices }
    }

    /// Builds one HTTP-backed light per configured entry, sharing a client.
    pub fn from_config(
        entries: &[DeviceCfg],
        request_timeout: std::time::Duration,
    ) -> Result<Self, DiscoveryError> {
        let http = http_client(request_timeout).map_err(|e| DiscoveryError::Init(e.to_string()))?;

        let devices = entries
            .iter()
            .map(|entry| {
                Arc::new(ElgatoLight::new(
                    entry.name.clone(),
                    entry.host.clone(),
                    entry.port,
                    http.clone(),
                )) as DeviceRef
            })
            .collect();

        Ok(Self::new(devices))
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }
}

#[async_trait]
impl DiscoveryFeed for StaticDiscovery {
    async fn start(&self) -> Result<DiscoverySession, DiscoveryError> {
        let (tx, rx) = mpsc::channel(FEED_CAPACITY);
        let devices = self.devices.clone();
        info!("Announcing {} configured light(s)", devices.len());

        let run = tokio::spawn(async move {
            for device in devices {
                debug!("Announcing '{}' at {}", device.name(), device.address());
                if tx.send(device).await.is_err() {
                    debug!("Discovery consumer went away");
                    break;
                }
            }
            Ok(())
        });

        Ok(DiscoverySession { devices: rx, run })
    }
}
