//! Worker pool for per-service checks
//!
//! Jobs are pushed onto a bounded async_channel shared by a fixed number of
//! workers. Each job carries a oneshot sender for its outcome; the receivers
//! are awaited in registry order, which gives both the full join and the
//! stable report order regardless of completion order.

use std::sync::Arc;

use async_channel::Receiver;
use futures::future::join_all;
use tokio::sync::oneshot;
use tracing::instrument;

use crate::config::VERIFIER_QUEUE_CAPACITY;
use crate::registry::ServiceName;

use super::{check_service, CheckContext, ServiceOutcome};

/// One service to check, with the channel its outcome is published on
struct CheckJob {
    service: ServiceName,
    response: oneshot::Sender<ServiceOutcome>,
}

/// Worker that drains the shared job queue
struct CheckWorker {
    id: usize,
    jobs: Receiver<CheckJob>,
    ctx: Arc<CheckContext>,
}

impl CheckWorker {
    #[instrument(name = "verifier.worker", skip(self), fields(worker_id = self.id))]
    async fn run(self) {
        tracing::trace!("Worker starting");
        while let Ok(job) = self.jobs.recv().await {
            let outcome = check_service(&self.ctx, &job.service).await;
            if job.response.send(outcome).is_err() {
                tracing::debug!(service = %job.service, "Outcome receiver dropped");
            }
        }
        tracing::trace!("Job queue closed, worker exiting");
    }
}

/// Check every service and return the outcomes in the order given.
///
/// Runs all checks to completion; a check whose worker died yields a
/// not-found outcome rather than being dropped.
pub(super) async fn run_checks(
    ctx: Arc<CheckContext>,
    services: &[ServiceName],
    concurrency: usize,
) -> Vec<ServiceOutcome> {
    let (job_tx, job_rx) = async_channel::bounded(VERIFIER_QUEUE_CAPACITY);

    let worker_count = concurrency.clamp(1, services.len().max(1));
    let workers: Vec<_> = (0..worker_count)
        .map(|id| {
            let worker = CheckWorker {
                id,
                jobs: job_rx.clone(),
                ctx: ctx.clone(),
            };
            tokio::spawn(worker.run())
        })
        .collect();
    drop(job_rx);
    tracing::debug!(workers = worker_count, services = services.len(), "Spawned verifier workers");

    let mut pending = Vec::with_capacity(services.len());
    for service in services {
        let (tx, rx) = oneshot::channel();
        let job = CheckJob {
            service: service.clone(),
            response: tx,
        };
        if job_tx.send(job).await.is_err() {
            // Every worker is gone; the dropped sender surfaces as an aborted outcome
            tracing::error!(service = %service, "Verifier job queue closed");
        }
        pending.push((service.clone(), rx));
    }
    // Closing the queue lets idle workers exit once it drains
    drop(job_tx);

    let results = join_all(pending.into_iter().map(|(service, rx)| async move {
        match rx.await {
            Ok(outcome) => outcome,
            Err(_) => {
                tracing::error!(service = %service, "Service check did not complete");
                ServiceOutcome::aborted(service, "verification task aborted before completing")
            }
        }
    }))
    .await;

    for handle in join_all(workers).await {
        if let Err(e) = handle {
            tracing::error!(error = %e, "Verifier worker panicked");
        }
    }

    results
}
