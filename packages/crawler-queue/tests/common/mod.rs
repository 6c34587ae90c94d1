// Common test utilities

use std::sync::Arc;
use std::time::Duration;

use crawler_queue::testing::{MockProvider, RecordingNotifier};
use crawler_queue::{
    CrawlerQueue, JobConfig, JobHandle, JobProcessor, JobStatus, ProviderRegistry, QueueConfig,
};

/// Queue, processor, and mocks wired together the way an application would.
pub struct TestHarness {
    pub queue: Arc<CrawlerQueue>,
    pub provider: MockProvider,
    pub notifier: Arc<RecordingNotifier>,
    pub processor: Arc<JobProcessor>,
}

impl TestHarness {
    pub fn new(provider: MockProvider) -> Self {
        Self::with_config(provider, fast_config())
    }

    pub fn with_config(provider: MockProvider, config: QueueConfig) -> Self {
        init_tracing();

        let queue = Arc::new(CrawlerQueue::new(config));
        let providers = Arc::new(
            ProviderRegistry::new().with_provider("jina", Arc::new(provider.clone())),
        );
        let notifier = Arc::new(RecordingNotifier::new());
        let processor = Arc::new(JobProcessor::new(
            queue.clone(),
            providers,
            notifier.clone(),
        ));

        Self {
            queue,
            provider,
            notifier,
            processor,
        }
    }

    pub fn handle(&self, job_id: uuid::Uuid) -> JobHandle {
        self.queue.get_job(job_id).expect("job exists")
    }
}

/// Initialize tracing subscriber to respect RUST_LOG.
/// Run tests with: RUST_LOG=debug cargo test -- --nocapture
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Millisecond-scale timings so retries and polling finish quickly.
pub fn fast_config() -> QueueConfig {
    let mut config = QueueConfig::default();
    config.retry.base_delay = Duration::from_millis(10);
    config.retry.max_delay = Duration::from_millis(100);
    config.processor.poll_interval = Duration::from_millis(5);
    config.processor.poll_timeout = Duration::from_secs(2);
    config.scheduler.idle_poll_interval = Duration::from_millis(20);
    config
}

pub fn crawl_job(name: &str) -> JobConfig {
    JobConfig::builder()
        .name(name)
        .url(format!("https://{name}.example.com"))
        .provider("jina")
        .build()
}

pub fn training_job(name: &str) -> JobConfig {
    JobConfig::builder()
        .name(name)
        .url(format!("https://{name}.example.com"))
        .provider("jina")
        .transform_for_training(true)
        .auto_train(true)
        .build()
}

/// Wait until the job reaches `status`, panicking after five seconds.
pub async fn wait_for_status(handle: &JobHandle, status: JobStatus) {
    let reached = tokio::time::timeout(Duration::from_secs(5), async {
        while handle.status() != status {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await;
    assert!(
        reached.is_ok(),
        "job {} stuck in {} waiting for {}",
        handle.id(),
        handle.status(),
        status
    );
}
