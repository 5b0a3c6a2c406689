//! Dependency injection providers for service management.
//!
//! Each provider builds one part of the daemon from shared state and
//! registers its long-running task with the [`TaskManager`](crate::task_manager::TaskManager).

pub mod app_state;
pub mod dbus;
pub mod discovery;
pub mod panel;
pub mod traits;

pub use app_state::AppStateProvider;
pub use dbus::DBusServiceProvider;
pub use discovery::DiscoveryServiceProvider;
pub use panel::PanelServiceProvider;
pub use traits::{AsyncProvider, ServiceProvider};
