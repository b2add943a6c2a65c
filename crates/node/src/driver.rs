//! Periodic advance task.

use crate::FinalizationService;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error};

/// Drives the finalization service: a tokio task that periodically advances
/// the finalization point, runs the orchestrator's stage timeouts and
/// refreshes the exported metrics.
pub struct AdvanceDriver {
    handle: JoinHandle<()>,
    shutdown: watch::Sender<bool>,
}

impl AdvanceDriver {
    /// Spawn the driver with the given tick interval.
    pub fn spawn(service: Arc<FinalizationService>, tick: Duration) -> Self {
        let (shutdown, mut shutdown_changed) = watch::channel(false);

        let handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval(tick);
            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        if let Err(service_error) = service.advance_finalization_point() {
                            // storage is unusable; there is nothing sensible
                            // left for this task to do
                            error!(error = %service_error, "failed to advance finalization point");
                            break;
                        }
                        service.advance(service.now());
                        service.report_metrics();
                    }
                    _ = shutdown_changed.changed() => {
                        debug!("advance driver shutting down");
                        break;
                    }
                }
            }
        });

        Self { handle, shutdown }
    }

    /// Stop the driver and wait for the task to exit.
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        let _ = self.handle.await;
    }
}
