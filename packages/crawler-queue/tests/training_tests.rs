//! Integration tests for multi-source training.
//!
//! The aggregator reads the crawler queue and a stand-in document queue
//! through `JobSource` and emits one combined start event.

mod common;

use std::sync::Arc;

use crate::common::{crawl_job, training_job, TestHarness};
use crawler_queue::testing::{MockProvider, RecordingNotifier, StaticJobSource};
use crawler_queue::{
    JobOptions, QueueError, SourceJobStatus, TrainingAggregator, TrainingSource, CRAWLER_SOURCE,
};
use uuid::Uuid;

#[tokio::test]
async fn combines_crawler_and_document_sources() {
    let ctx = TestHarness::new(MockProvider::new());
    let crawl_id = ctx
        .queue
        .add_job(training_job("docs"), JobOptions::default())
        .unwrap();
    ctx.processor.process_job(crawl_id).await.unwrap();

    let pdfs = Arc::new(StaticJobSource::new());
    let pdf_id = Uuid::new_v4();
    pdfs.insert(pdf_id, SourceJobStatus::Completed, Some("pdf/handbook.jsonl"));

    let notifier = Arc::new(RecordingNotifier::new());
    let aggregator = TrainingAggregator::new(notifier.clone())
        .with_source(CRAWLER_SOURCE, ctx.queue.clone())
        .with_source("pdf", pdfs);

    let run = aggregator
        .start_training(
            &[
                TrainingSource::crawler(crawl_id),
                TrainingSource::new("pdf", pdf_id),
            ],
            Some("llama"),
        )
        .await
        .unwrap();

    assert_eq!(run.data.sources.len(), 2);
    assert_eq!(run.data.sources[0].path.as_deref(), Some("datasets/docs.jsonl"));
    assert_eq!(run.data.sources[1].path.as_deref(), Some("pdf/handbook.jsonl"));

    let events = notifier.events();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].job_id, run.training_id);
    assert_eq!(events[0].data["modelType"], "llama");
    assert_eq!(events[0].data["sources"].as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn plain_crawl_job_counts_as_ready_source() {
    let ctx = TestHarness::new(MockProvider::new());
    let crawl_id = ctx
        .queue
        .add_job(crawl_job("docs"), JobOptions::default())
        .unwrap();
    ctx.processor.process_job(crawl_id).await.unwrap();

    let pdfs = Arc::new(StaticJobSource::new());
    let pdf_id = Uuid::new_v4();
    pdfs.insert(pdf_id, SourceJobStatus::Completed, Some("pdf/handbook.jsonl"));

    let notifier = Arc::new(RecordingNotifier::new());
    let aggregator = TrainingAggregator::new(notifier.clone())
        .with_source(CRAWLER_SOURCE, ctx.queue.clone())
        .with_source("pdf", pdfs);

    let run = aggregator
        .start_training(
            &[
                TrainingSource::crawler(crawl_id),
                TrainingSource::new("pdf", pdf_id),
            ],
            None,
        )
        .await
        .unwrap();

    assert_eq!(run.data.sources.len(), 2);
    assert_eq!(run.data.sources[0].job_id, crawl_id);
    assert_eq!(run.data.sources[0].path, None);

    let events = notifier.events();
    assert_eq!(events.len(), 1);
    let sources = events[0].data["sources"].as_array().unwrap();
    assert_eq!(sources.len(), 2);
    assert!(sources[0].get("path").is_none());
}

#[tokio::test]
async fn queued_crawl_job_blocks_training() {
    let ctx = TestHarness::new(MockProvider::new());
    let crawl_id = ctx
        .queue
        .add_job(training_job("docs"), JobOptions::default())
        .unwrap();

    let notifier = Arc::new(RecordingNotifier::new());
    let aggregator =
        TrainingAggregator::new(notifier.clone()).with_source(CRAWLER_SOURCE, ctx.queue.clone());

    match aggregator
        .start_training(&[TrainingSource::crawler(crawl_id)], None)
        .await
    {
        Err(QueueError::SourceNotReady { job_id, .. }) => assert_eq!(job_id, crawl_id),
        other => panic!("unexpected result: {other:?}"),
    }
    assert_eq!(notifier.event_count(), 0);
}

#[tokio::test]
async fn missing_job_in_registered_source_is_not_ready() {
    let notifier = Arc::new(RecordingNotifier::new());
    let aggregator = TrainingAggregator::new(notifier.clone())
        .with_source("pdf", Arc::new(StaticJobSource::new()));

    let err = aggregator
        .start_training(&[TrainingSource::new("pdf", Uuid::new_v4())], None)
        .await
        .unwrap_err();

    assert!(err.to_string().contains("not found"));
    assert_eq!(notifier.event_count(), 0);
}
