//! Job runner tests: notification ordering, cancellation races, embedding
//! reuse and startup recovery

mod helpers;

use contentflow_api::api::ws::{subscribe, ProgressFilter};
use contentflow_api::db;
use contentflow_api::models::{Content, GenerateRequest, JobStatus, ProcessingJob, SourceType};
use contentflow_api::services::pipeline::status_snapshot;
use contentflow_common::{MessageKind, NotificationMessage};
use helpers::{test_app, test_app_with, test_settings, MockOrchestrator, TestApp};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Semaphore};
use uuid::Uuid;

/// Persist a content row and its PENDING job without starting the pipeline
async fn queue_job(app: &TestApp, url: &str) -> (ProcessingJob, GenerateRequest) {
    let request = GenerateRequest::new(url, SourceType::Article);
    let content = Content::new(
        "user_demo",
        request.source_type,
        request.source_url.clone(),
        request.source_metadata(),
    );
    let job = ProcessingJob::new(
        content.id,
        Uuid::new_v4().to_string(),
        request.unique_content_types(),
    );
    db::contents::insert_content_with_job(&app.state.db, &content, &job)
        .await
        .unwrap();
    (job, request)
}

async fn next_message(rx: &mut mpsc::UnboundedReceiver<NotificationMessage>) -> NotificationMessage {
    tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("message in time")
        .expect("connection still open")
}

#[tokio::test]
async fn test_notifications_follow_persisted_state() {
    let app = test_app(MockOrchestrator::succeeding()).await;
    let (job, request) = queue_job(&app, "https://example.com/post").await;
    let (_, mut rx) = app.state.registry.open(&job.session_id).await;

    let handle = app.state.runner.spawn(job.id, request);

    let mut kinds = Vec::new();
    let mut last_progress = 0;
    loop {
        let message = next_message(&mut rx).await;
        let progress = message.data["progress_percent"].as_i64().unwrap();
        assert!(progress >= last_progress, "progress went backwards");
        last_progress = progress;

        // Whatever a client is told is already durable
        let stored = db::jobs::load_job(&app.state.db, job.id).await.unwrap().unwrap();
        assert!(stored.progress_percent >= progress);

        kinds.push(message.kind);
        if message.kind == MessageKind::Complete {
            assert_eq!(stored.status, JobStatus::Completed);
            assert_eq!(message.data["content_id"], job.content_id.to_string());
            break;
        }
    }
    handle.await.unwrap();

    assert_eq!(
        kinds,
        vec![
            MessageKind::Status,
            MessageKind::Progress,
            MessageKind::Progress,
            MessageKind::Complete
        ]
    );
    assert_eq!(last_progress, 100);
}

#[tokio::test]
async fn test_subscriber_mid_run_sees_completion() {
    let gate = Arc::new(Semaphore::new(0));
    let app = test_app(MockOrchestrator::gated(gate.clone())).await;
    let (job, request) = queue_job(&app, "https://example.com/post").await;

    let handle = app.state.runner.spawn(job.id, request);
    app.wait_for_status(job.id, JobStatus::Processing).await;

    let mut subscription = subscribe(&app.state, &job.session_id).await;
    let snapshot = subscription.snapshot.clone().expect("job exists");
    assert_eq!(snapshot.data["status"], "processing");
    assert_eq!(snapshot.data["progress_percent"], 20);

    // Everything after the snapshot read is delivered, nothing is lost
    gate.add_permits(1);
    let mut filter = ProgressFilter::starting_at(Some(&snapshot));
    let mut admitted = Vec::new();
    while !filter.is_finished() {
        let message = next_message(&mut subscription.outbound).await;
        if filter.admit(&message) {
            admitted.push(message);
        }
    }
    handle.await.unwrap();

    let last = admitted.last().unwrap();
    assert_eq!(last.kind, MessageKind::Complete);
    assert_eq!(last.data["progress_percent"], 100);
    assert!(admitted
        .windows(2)
        .all(|pair| pair[0].data["progress_percent"].as_i64() <= pair[1].data["progress_percent"].as_i64()));
}

#[tokio::test]
async fn test_subscriber_after_completion_gets_final_snapshot() {
    let app = test_app(MockOrchestrator::succeeding()).await;
    let (job, request) = queue_job(&app, "https://example.com/post").await;
    app.state.runner.spawn(job.id, request).await.unwrap();

    let subscription = subscribe(&app.state, &job.session_id).await;
    let snapshot = subscription.snapshot.expect("job exists");
    assert_eq!(snapshot.data["status"], "completed");
    assert!(ProgressFilter::starting_at(Some(&snapshot)).is_finished());
    assert!(app.state.registry.is_open(&job.session_id).await);
}

#[tokio::test]
async fn test_job_runs_without_any_listener() {
    let app = test_app(MockOrchestrator::succeeding()).await;
    let (job, request) = queue_job(&app, "https://example.com/post").await;

    assert!(!app.state.registry.is_open(&job.session_id).await);
    app.state.runner.spawn(job.id, request).await.unwrap();

    let stored = db::jobs::load_job(&app.state.db, job.id).await.unwrap().unwrap();
    assert_eq!(stored.status, JobStatus::Completed);

    // A late client gets the final state as its snapshot
    let snapshot = status_snapshot(&stored);
    assert_eq!(snapshot.kind, MessageKind::Status);
    assert_eq!(snapshot.data["status"], "completed");
    assert_eq!(snapshot.data["progress_percent"], 100);
}

#[tokio::test]
async fn test_failure_is_pushed_as_error_message() {
    let app = test_app(MockOrchestrator::failing_generate("quota exceeded")).await;
    let (job, request) = queue_job(&app, "https://example.com/post").await;
    let (_, mut rx) = app.state.registry.open(&job.session_id).await;

    app.state.runner.spawn(job.id, request).await.unwrap();

    let mut last = None;
    while let Ok(message) = rx.try_recv() {
        last = Some(message);
    }
    let last = last.expect("messages were pushed");
    assert_eq!(last.kind, MessageKind::Error);
    assert_eq!(last.data["status"], "failed");
    assert_eq!(last.data["error_code"], "PROCESSING_ERROR");
    assert!(last.data["error_message"]
        .as_str()
        .unwrap()
        .contains("quota exceeded"));
}

#[tokio::test]
async fn test_cancel_pushes_error_and_stops_pipeline() {
    let gate = Arc::new(Semaphore::new(0));
    let app = test_app(MockOrchestrator::gated(gate.clone())).await;
    let (job, request) = queue_job(&app, "https://example.com/post").await;
    let (_, mut rx) = app.state.registry.open(&job.session_id).await;

    let handle = app.state.runner.spawn(job.id, request);
    app.wait_for_status(job.id, JobStatus::Processing).await;

    app.state.runner.cancel(job.id).await.unwrap();
    handle.await.unwrap();

    let mut messages = Vec::new();
    while let Ok(message) = rx.try_recv() {
        messages.push(message);
    }
    let last = messages.last().unwrap();
    assert_eq!(last.kind, MessageKind::Error);
    assert_eq!(last.data["error_code"], "CANCELLED");
    assert!(messages.iter().all(|m| m.kind != MessageKind::Complete));
    assert!(!app.state.runner.is_active(job.id).await);
    assert!(app.state.runner.last_error().await.is_none());
}

#[tokio::test]
async fn test_late_results_do_not_overwrite_cancellation() {
    let gate = Arc::new(Semaphore::new(0));
    let app = test_app(MockOrchestrator::gated(gate.clone())).await;
    let (job, request) = queue_job(&app, "https://example.com/post").await;

    let handle = app.state.runner.spawn(job.id, request);
    let mut running = app.wait_for_status(job.id, JobStatus::Processing).await;

    // Cancelled by someone who cannot reach this runner's token
    running.cancel().unwrap();
    assert!(db::jobs::save_checkpoint(&app.state.db, &running).await.unwrap());

    gate.add_permits(1);
    handle.await.unwrap();

    let stored = db::jobs::load_job(&app.state.db, job.id).await.unwrap().unwrap();
    assert_eq!(stored.status, JobStatus::Cancelled);
    assert_eq!(stored.progress_percent, 20);

    let content = db::contents::load_content(&app.state.db, job.content_id)
        .await
        .unwrap()
        .unwrap();
    assert!(content.summary.is_none());
    assert!(content.generated_content.is_empty());
}

#[tokio::test]
async fn test_duplicate_run_is_refused() {
    let gate = Arc::new(Semaphore::new(0));
    let app = test_app(MockOrchestrator::gated(gate.clone())).await;
    let (job, request) = queue_job(&app, "https://example.com/post").await;

    let first = app.state.runner.spawn(job.id, request.clone());
    app.wait_for_status(job.id, JobStatus::Processing).await;

    app.state.runner.spawn(job.id, request).await.unwrap();
    assert_eq!(app.state.runner.active_count().await, 1);
    assert_eq!(app.orchestrator.extract_calls.load(Ordering::SeqCst), 1);

    gate.add_permits(1);
    first.await.unwrap();

    let stored = db::jobs::load_job(&app.state.db, job.id).await.unwrap().unwrap();
    assert_eq!(stored.status, JobStatus::Completed);
}

#[tokio::test]
async fn test_identical_text_reuses_cached_embedding() {
    let orchestrator = MockOrchestrator {
        embedding_per_call: true,
        ..MockOrchestrator::succeeding()
    };
    let app = test_app(orchestrator).await;

    let mut embeddings = Vec::new();
    for url in ["https://example.com/a", "https://example.com/b"] {
        let (job, request) = queue_job(&app, url).await;
        app.state.runner.spawn(job.id, request).await.unwrap();
        let content = db::contents::load_content(&app.state.db, job.content_id)
            .await
            .unwrap()
            .unwrap();
        embeddings.push(content.embedding);
    }

    assert_eq!(app.orchestrator.extract_calls.load(Ordering::SeqCst), 2);
    assert_eq!(embeddings[0], Some(vec![1.0]));
    assert_eq!(embeddings[1], Some(vec![1.0]));
    assert_eq!(db::embedding_cache::count(&app.state.db).await.unwrap(), 1);
}

#[tokio::test]
async fn test_deduplication_can_be_disabled() {
    let orchestrator = MockOrchestrator {
        embedding_per_call: true,
        ..MockOrchestrator::succeeding()
    };
    let mut settings = test_settings();
    settings.processing.enable_vector_deduplication = false;
    let app = test_app_with(orchestrator, settings).await;

    let mut embeddings = Vec::new();
    for url in ["https://example.com/a", "https://example.com/b"] {
        let (job, request) = queue_job(&app, url).await;
        app.state.runner.spawn(job.id, request).await.unwrap();
        let content = db::contents::load_content(&app.state.db, job.content_id)
            .await
            .unwrap()
            .unwrap();
        embeddings.push(content.embedding);
    }

    assert_eq!(embeddings[1], Some(vec![2.0]));
    assert_eq!(db::embedding_cache::count(&app.state.db).await.unwrap(), 0);
}

#[tokio::test]
async fn test_startup_recovery_fails_unfinished_jobs() {
    let app = test_app(MockOrchestrator::succeeding()).await;

    let (pending, _) = queue_job(&app, "https://example.com/pending").await;
    let (mut running, _) = queue_job(&app, "https://example.com/running").await;
    running.start().unwrap();
    db::jobs::save_checkpoint(&app.state.db, &running).await.unwrap();

    let (finished, request) = queue_job(&app, "https://example.com/done").await;
    app.state.runner.spawn(finished.id, request).await.unwrap();

    let recovered = db::jobs::fail_interrupted_jobs(&app.state.db).await.unwrap();
    assert_eq!(recovered, 2);

    for id in [pending.id, running.id] {
        let job = db::jobs::load_job(&app.state.db, id).await.unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Failed);
        assert_eq!(job.error_code.as_deref(), Some("INTERRUPTED"));
    }
    let done = db::jobs::load_job(&app.state.db, finished.id).await.unwrap().unwrap();
    assert_eq!(done.status, JobStatus::Completed);
}
