//! Integration tests for the background scheduler.
//!
//! - Priority and FIFO ordering with a single worker
//! - Backoff-delayed retries picked up without outside help
//! - Graceful shutdown interrupting provider polling

mod common;

use std::time::Duration;

use crate::common::{crawl_job, training_job, wait_for_status, TestHarness};
use crawler_queue::testing::MockProvider;
use crawler_queue::{ErrorKind, JobOptions, JobPriority, JobScheduler, JobStatus, QueueError};

#[tokio::test]
async fn single_worker_runs_jobs_by_priority() {
    let ctx = TestHarness::new(MockProvider::new());
    let a = ctx
        .queue
        .add_job(crawl_job("A"), JobOptions::with_priority(JobPriority::Low))
        .unwrap();
    ctx.queue
        .add_job(crawl_job("B"), JobOptions::with_priority(JobPriority::High))
        .unwrap();
    ctx.queue
        .add_job(crawl_job("C"), JobOptions::with_priority(JobPriority::Normal))
        .unwrap();

    JobScheduler::new(ctx.processor.clone()).start().unwrap();
    wait_for_status(&ctx.handle(a), JobStatus::Completed).await;
    ctx.queue.shutdown().await;

    assert_eq!(ctx.provider.started_jobs(), vec!["B", "C", "A"]);
    assert_eq!(ctx.queue.stats().completed, 3);
}

#[tokio::test]
async fn scheduler_retries_after_backoff() {
    let ctx = TestHarness::new(MockProvider::new().with_failed_starts(1));
    JobScheduler::new(ctx.processor.clone()).start().unwrap();

    let id = ctx
        .queue
        .add_job(training_job("docs"), JobOptions::default())
        .unwrap();
    wait_for_status(&ctx.handle(id), JobStatus::Training).await;
    ctx.queue.shutdown().await;

    assert_eq!(ctx.handle(id).attempts(), 2);
    assert_eq!(ctx.provider.start_call_count(), 2);
    assert_eq!(ctx.notifier.event_count(), 1);
}

#[tokio::test]
async fn concurrent_workers_never_share_a_job() {
    let mut config = common::fast_config();
    config.scheduler.concurrency = 4;
    let ctx = TestHarness::with_config(MockProvider::new().with_pending_polls(2), config);

    let ids: Vec<_> = (0..20)
        .map(|i| {
            ctx.queue
                .add_job(crawl_job(&format!("job-{i}")), JobOptions::default())
                .unwrap()
        })
        .collect();
    JobScheduler::new(ctx.processor.clone()).start().unwrap();

    for id in &ids {
        wait_for_status(&ctx.handle(*id), JobStatus::Completed).await;
    }
    ctx.queue.shutdown().await;

    assert_eq!(ctx.provider.start_call_count(), 20);
    for id in ids {
        assert_eq!(ctx.handle(id).attempts(), 1);
    }
}

#[tokio::test]
async fn shutdown_interrupts_polling_and_keeps_job_retryable() {
    let mut config = common::fast_config();
    config.processor.poll_interval = Duration::from_millis(20);
    config.processor.poll_timeout = Duration::from_secs(60);
    let ctx = TestHarness::with_config(MockProvider::new().with_pending_polls(u32::MAX), config);
    JobScheduler::new(ctx.processor.clone()).start().unwrap();

    let id = ctx
        .queue
        .add_job(crawl_job("slow"), JobOptions::default())
        .unwrap();
    tokio::time::timeout(Duration::from_secs(5), async {
        while ctx.provider.status_call_count() == 0 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .unwrap();

    tokio::time::timeout(Duration::from_secs(5), ctx.queue.shutdown())
        .await
        .unwrap();

    let job = ctx.handle(id).snapshot();
    assert_eq!(job.status, JobStatus::Retrying);
    assert_eq!(job.attempts, 1);
    assert_eq!(job.last_error_kind, Some(ErrorKind::Interrupted));
    assert!(job.provider_job_id.is_some());
}

#[tokio::test]
async fn shutdown_waits_for_direct_processing() {
    let mut config = common::fast_config();
    config.processor.poll_interval = Duration::from_millis(20);
    config.processor.poll_timeout = Duration::from_secs(60);
    let provider = MockProvider::new()
        .with_pending_polls(u32::MAX)
        .with_status_delay(Duration::from_millis(300));
    let ctx = TestHarness::with_config(provider, config);

    let id = ctx
        .queue
        .add_job(crawl_job("slow"), JobOptions::default())
        .unwrap();
    let processor = ctx.processor.clone();
    let run = tokio::spawn(async move { processor.process_job(id).await });

    tokio::time::timeout(Duration::from_secs(5), async {
        while ctx.provider.status_call_count() == 0 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .unwrap();

    tokio::time::timeout(Duration::from_secs(5), ctx.queue.shutdown())
        .await
        .unwrap();

    let job = ctx.handle(id).snapshot();
    assert_eq!(job.status, JobStatus::Retrying);
    assert_eq!(job.last_error_kind, Some(ErrorKind::Interrupted));
    assert_eq!(run.await.unwrap().unwrap(), JobStatus::Retrying);
}

#[tokio::test]
async fn nothing_is_accepted_after_shutdown() {
    let ctx = TestHarness::new(MockProvider::new());
    JobScheduler::new(ctx.processor.clone()).start().unwrap();
    ctx.queue.shutdown().await;

    assert!(matches!(
        ctx.queue.add_job(crawl_job("late"), JobOptions::default()),
        Err(QueueError::ShutdownInProgress)
    ));
    assert!(matches!(
        JobScheduler::new(ctx.processor.clone()).start(),
        Err(QueueError::ShutdownInProgress)
    ));
}
