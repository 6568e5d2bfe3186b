//! Fire-and-forget side tasks whose failure must never reach the caller.

use std::fmt::Display;
use std::future::Future;

use tokio::task::JoinHandle;

/// Spawn `task`; an `Err` is logged at warn level and otherwise dropped.
pub fn spawn_best_effort<F, E>(name: &'static str, task: F) -> JoinHandle<()>
where
    F: Future<Output = Result<(), E>> + Send + 'static,
    E: Display + Send + 'static,
{
    tokio::spawn(async move {
        if let Err(e) = task.await {
            tracing::warn!(task = name, error = %e, "Best-effort task failed");
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    #[tokio::test]
    async fn test_success_runs_to_completion() {
        let ran = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&ran);
        spawn_best_effort("ok", async move {
            flag.store(true, Ordering::SeqCst);
            Ok::<(), String>(())
        })
        .await
        .unwrap();
        assert!(ran.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_failure_is_swallowed() {
        let handle = spawn_best_effort("fails", async { Err::<(), _>("disk full") });
        assert!(handle.await.is_ok());
    }
}
