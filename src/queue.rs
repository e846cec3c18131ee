//! Background analysis queue.
//!
//! Submissions are persisted as PENDING before they are enqueued, so a
//! request id handed to a client always resolves. A fixed pool of tokio
//! workers shares one bounded channel; each job runs under a wall-clock
//! timeout and ends COMPLETED (result row written in the same transaction)
//! or FAILED with `"<Kind>: <message>"`.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, Mutex};
use tracing::{debug, error, info, warn};

use crate::config::JobsConfig;
use crate::error::{AnalysisError, TransientInfraError};
use crate::models::{AnalysisRequest, AnalysisResult};
use crate::pipeline::{self, AnalysisServices};
use crate::store::ResultStore;

const QUEUE_CLOSED_ERROR: &str = "TransientInfraError: job queue is closed";

#[derive(Clone)]
pub struct JobQueue {
    sender: mpsc::Sender<String>,
    store: ResultStore,
}

impl JobQueue {
    /// Recover state left by a previous process, then start the workers.
    ///
    /// Rows still PROCESSING are failed; rows still PENDING are re-enqueued.
    pub async fn start(
        config: &JobsConfig,
        store: ResultStore,
        services: AnalysisServices,
    ) -> Result<Self, TransientInfraError> {
        let interrupted = store.fail_interrupted().await?;
        if interrupted > 0 {
            warn!(count = interrupted, "marked interrupted analyses as FAILED");
        }

        let (sender, receiver) = mpsc::channel::<String>(config.queue_capacity.max(1));
        let receiver = Arc::new(Mutex::new(receiver));
        let timeout = Duration::from_secs(config.timeout_secs);

        for worker_id in 0..config.workers.max(1) {
            let receiver = Arc::clone(&receiver);
            let store = store.clone();
            let services = services.clone();
            tokio::spawn(async move {
                worker_loop(worker_id, receiver, store, services, timeout).await;
            });
        }
        info!(workers = config.workers, "job workers started");

        let pending = store.pending_ids().await?;
        if !pending.is_empty() {
            info!(count = pending.len(), "re-enqueueing pending analyses");
            let requeue = sender.clone();
            tokio::spawn(async move {
                for id in pending {
                    if requeue.send(id).await.is_err() {
                        break;
                    }
                }
            });
        }

        Ok(Self { sender, store })
    }

    /// Persist a PENDING request and hand it to the workers.
    pub async fn submit(&self, file_path: &str, query: &str) -> Result<String, TransientInfraError> {
        let request = self.store.create_request(query, file_path).await?;

        if self.sender.send(request.id.clone()).await.is_err() {
            self.store.fail(&request.id, QUEUE_CLOSED_ERROR).await?;
            return Err(TransientInfraError("job queue is closed".to_string()));
        }

        debug!(request_id = %request.id, file = file_path, "analysis submitted");
        Ok(request.id)
    }

    pub async fn status(&self, id: &str) -> Result<Option<AnalysisRequest>, TransientInfraError> {
        self.store.get_request(id).await
    }

    pub async fn result(&self, id: &str) -> Result<Option<AnalysisResult>, TransientInfraError> {
        self.store.get_result(id).await
    }
}

async fn worker_loop(
    worker_id: usize,
    receiver: Arc<Mutex<mpsc::Receiver<String>>>,
    store: ResultStore,
    services: AnalysisServices,
    timeout: Duration,
) {
    loop {
        // Hold the lock only while waiting for the next id.
        let next = { receiver.lock().await.recv().await };
        let Some(id) = next else {
            debug!(worker_id, "job channel closed, worker exiting");
            break;
        };
        process_job(worker_id, &store, &services, timeout, &id).await;
    }
}

async fn process_job(
    worker_id: usize,
    store: &ResultStore,
    services: &AnalysisServices,
    timeout: Duration,
    id: &str,
) {
    let request = match store.get_request(id).await {
        Ok(Some(request)) => request,
        Ok(None) => {
            warn!(request_id = id, "queued request not found");
            return;
        }
        Err(e) => {
            error!(request_id = id, error = %e, "failed to load queued request");
            record_failure(store, id, &AnalysisError::Infra(e).report()).await;
            return;
        }
    };

    match store.mark_processing(id).await {
        Ok(true) => {}
        Ok(false) => {
            debug!(request_id = id, status = %request.status, "request no longer pending, skipped");
            return;
        }
        Err(e) => {
            error!(request_id = id, error = %e, "failed to mark request processing");
            record_failure(store, id, &AnalysisError::Infra(e).report()).await;
            return;
        }
    }

    info!(worker_id, request_id = id, "analysis started");

    // Run on its own task so a panic fails the request instead of the worker.
    let job_services = services.clone();
    let query = request.query.clone();
    let file_path = request.file_path.clone();
    let mut handle = tokio::spawn(async move {
        pipeline::analyze(&job_services, &query, Path::new(&file_path)).await
    });

    let outcome = match tokio::time::timeout(timeout, &mut handle).await {
        Ok(Ok(result)) => result,
        Ok(Err(join_err)) => Err(AnalysisError::Infra(TransientInfraError(format!(
            "analysis task aborted: {}",
            join_err
        )))),
        Err(_) => {
            handle.abort();
            Err(AnalysisError::Timeout(timeout.as_secs()))
        }
    };

    let stored = match outcome {
        Ok(report) => store.complete(id, &report.render()).await.map(|_| {
            info!(worker_id, request_id = id, "analysis completed");
        }),
        Err(e) => {
            warn!(worker_id, request_id = id, error = %e.report(), "analysis failed");
            store.fail(id, &e.report()).await.map(|_| ())
        }
    };

    if let Err(e) = stored {
        error!(request_id = id, error = %e, "failed to record analysis outcome");
        record_failure(store, id, &AnalysisError::Infra(e).report()).await;
    }
}

/// Last-chance FAILED write so a polling client never waits on a row no
/// worker owns.
async fn record_failure(store: &ResultStore, id: &str, error: &str) {
    match store.fail(id, error).await {
        Ok(true) => {}
        Ok(false) => debug!(request_id = id, "request already terminal, failure not recorded"),
        Err(e) => error!(request_id = id, error = %e, "failed to record analysis failure"),
    }
}
