use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use tokio::task::JoinHandle;

const STARTUP_STABILIZATION_WINDOW: Duration = Duration::from_millis(300);

/// waits a short window for a spawned background task to prove it didn't die
/// immediately on startup, without blocking forever on a task that's supposed
/// to run until shutdown.
pub async fn verify_background_task_running(name: &str, task: &mut JoinHandle<()>) -> Result<()> {
    match tokio::time::timeout(STARTUP_STABILIZATION_WINDOW, task).await {
        Err(_) => Ok(()),
        Ok(join_res) => match join_res {
            Ok(()) => Err(anyhow!("{name} exited during startup stabilization window")),
            Err(err) => Err(anyhow!("{name} panicked during startup: {err}")),
        },
    }
    .with_context(|| format!("startup check failed for {name}"))
}
