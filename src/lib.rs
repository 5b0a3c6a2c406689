//! # keylightd
//!
//! A Linux daemon for controlling Elgato Key Light devices over the network.
//!
//! ## Features
//!
//! - **Async Architecture**: Built on Tokio; device I/O never blocks input
//! - **Event-Driven**: Services communicate via [`EventBus`](event::EventBus)
//! - **Discovery**: Devices arrive through a pluggable [`DiscoveryFeed`](discovery::DiscoveryFeed)
//! - **Debounced Sliders**: Bursts of slider input collapse into one write
//! - **Calibrated Temperature**: Kelvin labels via a natural cubic spline
//! - **D-Bus Interface**: Toggle, step and slider control from the desktop
//!
//! ## Architecture
//!
//! - [`SystemCoordinator`](coordinator::SystemCoordinator) - Main lifecycle manager
//! - [`AppState`](app_context::AppState) - Registry, panel and converter shared by services
//! - [`ControlSurface`](surface::ControlSurface) - Per-device control context
//! - Service providers for discovery, rendering and D-Bus
//!
//! ## Example
//!
//! ```no_run
//! use keylightd::{application::Application, config::ConfigManager};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config_manager = ConfigManager::load(None).await?;
//!     Application::builder()
//!         .with_config_manager(config_manager)
//!         .build()
//!         .await?
//!         .run()
//!         .await
//! }
//! ```

pub mod app_context;
pub mod application;
pub mod cli;
pub mod config;
pub mod converter;
pub mod coordinator;
pub mod debounce;
pub mod discovery;
pub mod drivers;
pub mod error;
pub mod event;
pub mod interface;
pub mod light;
pub mod providers;
pub mod registry;
pub mod state_sync;
pub mod surface;
pub mod task_manager;
