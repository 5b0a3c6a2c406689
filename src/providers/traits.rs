use anyhow::Result;
use async_trait::async_trait;

use crate::task_manager::TaskManager;

/// Builds a component asynchronously.
///
/// # Example
///
/// ```no_run
/// use keylightd::providers::traits::AsyncProvider;
///
/// struct Greeting;
///
/// #[async_trait::async_trait]
/// impl AsyncProvider<String> for Greeting {
///     async fn provide(&self) -> anyhow::Result<String> {
///         Ok("hello".to_string())
///     }
/// }
/// ```
#[async_trait]
pub trait AsyncProvider<T> {
    async fn provide(&self) -> Result<T>;
}

/// A service started by the coordinator through the [`TaskManager`].
///
/// Services start in descending [`priority`](Self::priority). A failing
/// critical service aborts startup; a failing non-critical one is logged and
/// skipped.
///
/// # Example
///
/// ```no_run
/// use keylightd::providers::traits::ServiceProvider;
/// use keylightd::task_manager::TaskManager;
/// use anyhow::Result;
///
/// struct Heartbeat;
///
/// #[async_trait::async_trait]
/// impl ServiceProvider for Heartbeat {
///     async fn start(&self, task_manager: &mut TaskManager) -> Result<()> {
///         task_manager.spawn_task(self.name(), |token| async move {
///             token.cancelled().await;
///             Ok(())
///         });
///         Ok(())
///     }
///
///     fn name(&self) -> &'static str { "Heartbeat" }
/// }
/// ```
#[async_trait]
pub trait ServiceProvider: Send + Sync {
    /// Prepares the service and spawns its task(s).
    async fn start(&self, task_manager: &mut TaskManager) -> Result<()>;

    fn name(&self) -> &'static str;

    fn priority(&self) -> i32 {
        0
    }

    fn is_critical(&self) -> bool {
        false
    }
}
