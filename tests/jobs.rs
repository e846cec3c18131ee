mod common;

use async_trait::async_trait;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;

use report_analyst::config::{Config, JobsConfig};
use report_analyst::db;
use report_analyst::embedding::HashingEmbedder;
use report_analyst::error::OrchestrationError;
use report_analyst::llm::{ChatPrompt, LanguageModel};
use report_analyst::migrate;
use report_analyst::models::{AnalysisRequest, JobStatus};
use report_analyst::pipeline::{AnalysisServices, PipelineSettings};
use report_analyst::queue::JobQueue;
use report_analyst::store::ResultStore;

/// Each completion waits for one permit, so the test decides when the
/// worker may finish.
struct GatedModel {
    gate: Arc<Semaphore>,
}

#[async_trait]
impl LanguageModel for GatedModel {
    fn model_name(&self) -> &str {
        "gated"
    }

    async fn complete(&self, prompt: &ChatPrompt) -> Result<String, OrchestrationError> {
        self.gate
            .acquire()
            .await
            .map_err(|e| OrchestrationError::Model(e.to_string()))?
            .forget();
        Ok(format!("{} excerpts reviewed.", prompt.context.len()))
    }
}

async fn start_queue(
    dir: &Path,
    gate: Arc<Semaphore>,
    timeout_secs: u64,
) -> JobQueue {
    let pool = db::connect_path(&dir.join("jobs.sqlite")).await.unwrap();
    migrate::apply_schema(&pool).await.unwrap();
    let services = AnalysisServices::new(
        Arc::new(HashingEmbedder::default()),
        Arc::new(GatedModel { gate }),
        PipelineSettings::from_config(&Config::minimal()).unwrap(),
    );
    let jobs = JobsConfig {
        workers: 2,
        timeout_secs,
        queue_capacity: 8,
    };
    JobQueue::start(&jobs, ResultStore::from_pool(pool), services)
        .await
        .unwrap()
}

async fn wait_terminal(queue: &JobQueue, id: &str) -> AnalysisRequest {
    for _ in 0..400 {
        let request = queue.status(id).await.unwrap().unwrap();
        if request.status.is_terminal() {
            return request;
        }
        tokio::time::sleep(Duration::from_millis(25)).await;
    }
    panic!("request {} never reached a terminal status", id);
}

#[tokio::test]
async fn poll_before_completion_is_never_completed() {
    let dir = tempfile::tempdir().unwrap();
    let report = common::write_report(dir.path(), "report.pdf");
    let gate = Arc::new(Semaphore::new(0));
    let queue = start_queue(dir.path(), Arc::clone(&gate), 60).await;

    let id = queue
        .submit(&report.display().to_string(), "What is my hemoglobin level?")
        .await
        .unwrap();

    let first = queue.status(&id).await.unwrap().unwrap();
    assert!(matches!(first.status, JobStatus::Pending | JobStatus::Processing));
    assert!(queue.result(&id).await.unwrap().is_none());

    // Still gated: the worker cannot have finished.
    tokio::time::sleep(Duration::from_millis(200)).await;
    let blocked = queue.status(&id).await.unwrap().unwrap();
    assert_eq!(blocked.status, JobStatus::Processing);

    gate.add_permits(4);
    let done = wait_terminal(&queue, &id).await;
    assert_eq!(done.status, JobStatus::Completed);
    assert!(done.error.is_none());

    let result = queue.result(&id).await.unwrap().unwrap();
    assert!(result.content.contains("## Medical Data Verifier"));
    assert!(result.content.contains("## Certified Exercise Physiologist"));
}

#[tokio::test]
async fn job_timeout_marks_failed() {
    let dir = tempfile::tempdir().unwrap();
    let report = common::write_report(dir.path(), "report.pdf");
    // Never opened.
    let gate = Arc::new(Semaphore::new(0));
    let queue = start_queue(dir.path(), gate, 1).await;

    let id = queue
        .submit(&report.display().to_string(), "Summarise my Blood Test Report")
        .await
        .unwrap();

    let done = wait_terminal(&queue, &id).await;
    assert_eq!(done.status, JobStatus::Failed);
    assert_eq!(
        done.error.as_deref(),
        Some("TimeoutError: analysis timed out after 1s")
    );
    assert!(queue.result(&id).await.unwrap().is_none());
}

#[tokio::test]
async fn non_pdf_upload_fails_with_load_error() {
    let dir = tempfile::tempdir().unwrap();
    let fake = dir.path().join("report.pdf");
    std::fs::write(&fake, "Hemoglobin 13.5 g/dL, typed by hand").unwrap();
    let queue = start_queue(dir.path(), Arc::new(Semaphore::new(100)), 60).await;

    let id = queue
        .submit(&fake.display().to_string(), "Summarise my Blood Test Report")
        .await
        .unwrap();

    let done = wait_terminal(&queue, &id).await;
    assert_eq!(done.status, JobStatus::Failed);
    assert!(done
        .error
        .unwrap()
        .starts_with("LoadError: not a PDF file"));
}

#[tokio::test]
async fn concurrent_requests_complete_independently() {
    let dir = tempfile::tempdir().unwrap();
    let a = common::write_report(dir.path(), "a.pdf");
    let b = common::write_report(dir.path(), "b.pdf");
    let queue = start_queue(dir.path(), Arc::new(Semaphore::new(100)), 60).await;

    let id_a = queue
        .submit(&a.display().to_string(), "What is my hemoglobin level?")
        .await
        .unwrap();
    let id_b = queue
        .submit(&b.display().to_string(), "How is my cholesterol?")
        .await
        .unwrap();
    assert_ne!(id_a, id_b);

    let (done_a, done_b) = tokio::join!(wait_terminal(&queue, &id_a), wait_terminal(&queue, &id_b));
    assert_eq!(done_a.status, JobStatus::Completed);
    assert_eq!(done_b.status, JobStatus::Completed);
}
