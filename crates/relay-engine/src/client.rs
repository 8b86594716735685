//! Process-wide worker and router singletons.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::OnceCell;
use tracing::{error, info, instrument};

use relay_media::{EngineError, EngineResult, MediaEngine, MediaRouter, MediaWorker, RouterSettings, WorkerSettings};

/// Delay between a fatal worker fault and process exit, so the fault can be
/// flushed to logs before the supervisor restarts us.
const FATAL_EXIT_GRACE: Duration = Duration::from_secs(2);

/// Lazy owner of the engine's worker and router.
///
/// Both are created at most once per process and shared read-mostly
/// afterwards. There is no recovery path: a worker fault is terminal.
pub struct EngineClient {
    engine: Arc<dyn MediaEngine>,
    worker_settings: WorkerSettings,
    router_settings: RouterSettings,
    worker: OnceCell<Arc<dyn MediaWorker>>,
    router: OnceCell<Arc<dyn MediaRouter>>,
}

impl EngineClient {
    /// Create a client. Nothing is spawned until the first `ensure_*` call.
    pub fn new(
        engine: Arc<dyn MediaEngine>,
        worker_settings: WorkerSettings,
        router_settings: RouterSettings,
    ) -> Self {
        Self {
            engine,
            worker_settings,
            router_settings,
            worker: OnceCell::new(),
            router: OnceCell::new(),
        }
    }

    /// Create the worker at most once and arm the fatal-fault watcher.
    #[instrument(name = "ensure_worker", skip(self))]
    pub async fn ensure_worker(&self) -> EngineResult<Arc<dyn MediaWorker>> {
        let worker = self
            .worker
            .get_or_try_init(|| async {
                let worker = self.engine.create_worker(&self.worker_settings).await?;
                info!(pid = worker.pid(), "media worker created");
                spawn_fatal_watcher(Arc::clone(&worker));
                Ok::<_, EngineError>(worker)
            })
            .await?;
        Ok(Arc::clone(worker))
    }

    /// Create the router at most once, from the single worker.
    #[instrument(name = "ensure_router", skip(self))]
    pub async fn ensure_router(&self) -> EngineResult<Arc<dyn MediaRouter>> {
        let router = self
            .router
            .get_or_try_init(|| async {
                let worker = self.ensure_worker().await?;
                info!("creating router");
                let router = worker.create_router(&self.router_settings).await?;
                info!("router created");
                Ok::<_, EngineError>(router)
            })
            .await?;
        Ok(Arc::clone(router))
    }
}

/// A fatal worker fault is process-wide and unrecoverable: log it, give the
/// logs a moment to flush, then exit and let the supervisor restart us.
fn spawn_fatal_watcher(worker: Arc<dyn MediaWorker>) {
    tokio::spawn(async move {
        let reason = worker.died().await;
        error!(
            pid = worker.pid(),
            %reason,
            "media worker died, exiting in {} seconds",
            FATAL_EXIT_GRACE.as_secs()
        );
        tokio::time::sleep(FATAL_EXIT_GRACE).await;
        std::process::exit(1);
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use relay_media::mock::MockEngine;

    #[tokio::test]
    async fn test_worker_created_once() {
        let engine = MockEngine::new();
        let state = engine.state();
        let client = EngineClient::new(
            Arc::new(engine),
            WorkerSettings::default(),
            RouterSettings::default(),
        );

        for _ in 0..3 {
            client.ensure_worker().await.unwrap();
        }
        assert_eq!(
            state
                .workers_created
                .load(std::sync::atomic::Ordering::SeqCst),
            1
        );
    }

    #[tokio::test]
    async fn test_router_created_once() {
        let engine = MockEngine::new();
        let state = engine.state();
        let client = EngineClient::new(
            Arc::new(engine),
            WorkerSettings::default(),
            RouterSettings::default(),
        );

        for _ in 0..5 {
            client.ensure_router().await.unwrap();
        }
        assert_eq!(
            state
                .routers_created
                .load(std::sync::atomic::Ordering::SeqCst),
            1
        );
        assert_eq!(
            state
                .workers_created
                .load(std::sync::atomic::Ordering::SeqCst),
            1
        );
    }
}
