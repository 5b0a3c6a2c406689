//! Named background tasks sharing one cancellation tree.

use std::{collections::HashMap, future::Future, time::Duration};

use anyhow::{Context, Result, anyhow};
use log::{error, info, warn};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// How long a single task gets to wind down after cancellation.
pub const SHUTDOWN_GRACE: Duration = Duration::from_secs(10);

/// Owns the service tasks of the daemon.
///
/// Each task receives a child of the global token; cancelling the global
/// token asks every task to stop.
pub struct TaskManager {
    tasks: HashMap<String, JoinHandle<Result<()>>>,
    pub global_token: CancellationToken,
    grace: Duration,
}

impl TaskManager {
    pub fn new() -> Self {
        Self::with_grace(SHUTDOWN_GRACE)
    }

    pub fn with_grace(grace: Duration) -> Self {
        Self {
            tasks: HashMap::new(),
            global_token: CancellationToken::new(),
            grace,
        }
    }

    /// Spawns `task_fn` under `name`. A task with the same name is replaced
    /// and its predecessor cancelled along with everything else on shutdown.
    pub fn spawn_task<F, Fut>(&mut self, name: impl Into<String>, task_fn: F)
    where
        F: FnOnce(CancellationToken) -> Fut + Send + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        let name = name.into();
        let token = self.global_token.child_token();
        let task_name = name.clone();

        let handle = tokio::spawn(async move {
            info!("Starting task: {task_name}");
            let result = task_fn(token).await;
            match &result {
                Ok(()) => info!("Task '{task_name}' completed"),
                Err(e) => error!("Task '{task_name}' failed: {e:#}"),
            }
            result
        });

        if self.tasks.insert(name.clone(), handle).is_some() {
            warn!("Task '{name}' replaced a running task with the same name");
        }
        info!("Task '{name}' spawned");
    }

    /// Cancels every task and waits for each one, up to the grace period.
    ///
    /// Returns the first failure, if any.
    pub async fn shutdown_all(&mut self) -> Result<()> {
        info!("Stopping all {} tasks", self.tasks.len());
        self.global_token.cancel();

        let mut first_error = None;
        for (name, handle) in self.tasks.drain() {
            let outcome = match tokio::time::timeout(self.grace, handle).await {
                Ok(Ok(result)) => result,
                Ok(Err(join_error)) => Err(anyhow!("task '{name}' panicked: {join_error}")),
                Err(_) => Err(anyhow!("task '{name}' did not stop within {:?}", self.grace)),
            };

            if let Err(e) = outcome {
                warn!("{e:#}");
                first_error.get_or_insert(e);
            }
        }

        match first_error {
            Some(e) => Err(e).context("One or more tasks failed during shutdown"),
            None => {
                info!("All tasks stopped");
                Ok(())
            }
        }
    }

    pub fn active_count(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_running(&self, name: &str) -> bool {
        self.tasks
            .get(name)
            .is_some_and(|handle| !handle.is_finished())
    }
}

impl Default for TaskManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn tasks_stop_on_cancellation() {
        let mut manager = TaskManager::new();
        manager.spawn_task("waiter", |token| async move {
            token.cancelled().await;
            Ok(())
        });

        assert_eq!(manager.active_count(), 1);
        assert!(manager.is_running("waiter"));

        manager.shutdown_all().await.unwrap();
        assert_eq!(manager.active_count(), 0);
        assert!(manager.global_token.is_cancelled());
    }

    #[tokio::test]
    async fn task_failure_is_reported_on_shutdown() {
        let mut manager = TaskManager::new();
        manager.spawn_task("broken", |_| async { Err(anyhow!("boom")) });
        manager.spawn_task("fine", |token| async move {
            token.cancelled().await;
            Ok(())
        });

        let error = manager.shutdown_all().await.unwrap_err();
        assert!(format!("{error:#}").contains("boom"));
    }

    #[tokio::test]
    async fn panicking_task_is_reported() {
        let mut manager = TaskManager::new();
        manager.spawn_task("panics", |_| async {
            let lights: Vec<i32> = Vec::new();
            assert!(!lights.is_empty(), "kaboom");
            Ok(())
        });

        let error = manager.shutdown_all().await.unwrap_err();
        assert!(format!("{error:#}").contains("panicked"));
    }

    #[tokio::test(start_paused = true)]
    async fn stuck_task_times_out() {
        let mut manager = TaskManager::with_grace(Duration::from_millis(50));
        manager.spawn_task("stuck", |_| std::future::pending::<Result<()>>());

        let error = manager.shutdown_all().await.unwrap_err();
        assert!(format!("{error:#}").contains("did not stop"));
    }

    #[tokio::test]
    async fn finished_task_is_not_running() {
        let mut manager = TaskManager::new();
        manager.spawn_task("oneshot", |_| async { Ok(()) });
        tokio::task::yield_now().await;
        tokio::time::sleep(Duration::from_millis(10)).await;

        assert!(!manager.is_running("oneshot"));
        assert!(!manager.is_running("unknown"));
        manager.shutdown_all().await.unwrap();
    }
}
