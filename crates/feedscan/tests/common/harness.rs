//! Test harness wiring the pipeline against scripted collaborators.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::Utc;
use futures_util::stream;

use feedscan::error::SourceError;
use feedscan::registry::{JobRecord, JobRegistry, MemoryRegistry};
use feedscan::scheduler::SchedulerContext;
use feedscan::source::{ByteStream, DownloadUrlProvider, FileSource, SignedUrl};
use feedscan::validate::StaticReferenceProvider;
use feedscan::{JobProgressBroadcaster, JobScheduler, Settings};

/// What a scripted URL streams back.
#[derive(Clone)]
pub enum ScriptedBody {
    /// The chunks of a finite body.
    Chunks(Vec<Vec<u8>>),
    /// Repeats `chunk` forever with `delay` between chunks.
    Endless { chunk: Vec<u8>, delay: Duration },
    /// The GET fails with this HTTP status.
    Fail { status: u16 },
}

/// File source that serves scripted bodies by URL.
#[derive(Default)]
pub struct ScriptedSource {
    bodies: Mutex<HashMap<String, ScriptedBody>>,
}

impl ScriptedSource {
    pub fn put(&self, url: &str, body: ScriptedBody) {
        self.bodies.lock().unwrap().insert(url.to_string(), body);
    }
}

#[async_trait]
impl FileSource for ScriptedSource {
    async fn open(&self, url: &str) -> Result<ByteStream, SourceError> {
        let body = self
            .bodies
            .lock()
            .unwrap()
            .get(url)
            .cloned()
            .ok_or_else(|| SourceError::Status {
                status: 404,
                url: url.to_string(),
            })?;

        match body {
            ScriptedBody::Chunks(chunks) => {
                let items: Vec<Result<Bytes, SourceError>> =
                    chunks.into_iter().map(|c| Ok(Bytes::from(c))).collect();
                Ok(Box::pin(stream::iter(items)))
            }
            ScriptedBody::Endless { chunk, delay } => {
                let endless = stream::unfold((chunk, delay), |(chunk, delay)| async move {
                    tokio::time::sleep(delay).await;
                    let item = Ok(Bytes::from(chunk.clone()));
                    Some((item, (chunk, delay)))
                });
                Ok(Box::pin(endless))
            }
            ScriptedBody::Fail { status } => Err(SourceError::Status {
                status,
                url: url.to_string(),
            }),
        }
    }
}

/// URL provider mapping item ids straight to scripted URLs.
#[derive(Default)]
pub struct ScriptedUrls {
    urls: Mutex<HashMap<String, String>>,
    failing: Mutex<Vec<String>>,
}

impl ScriptedUrls {
    pub fn put(&self, item_id: &str, url: &str) {
        self.urls
            .lock()
            .unwrap()
            .insert(item_id.to_string(), url.to_string());
    }

    pub fn fail_for(&self, item_id: &str) {
        self.failing.lock().unwrap().push(item_id.to_string());
    }
}

#[async_trait]
impl DownloadUrlProvider for ScriptedUrls {
    async fn download_url(&self, item_id: &str) -> Result<SignedUrl, SourceError> {
        if self.failing.lock().unwrap().iter().any(|id| id == item_id) {
            return Err(SourceError::UrlUnavailable(item_id.to_string()));
        }
        self.urls
            .lock()
            .unwrap()
            .get(item_id)
            .map(|url| SignedUrl {
                url: url.clone(),
                expires_at: Some(Utc::now() + chrono::Duration::hours(1)),
            })
            .ok_or_else(|| SourceError::UrlUnavailable(item_id.to_string()))
    }
}

/// Isolated pipeline environment: in-memory registry, scripted source,
/// scheduler, and a broadcaster to observe events.
pub struct TestHarness {
    pub registry: Arc<MemoryRegistry>,
    pub source: Arc<ScriptedSource>,
    pub urls: Arc<ScriptedUrls>,
    pub broadcaster: JobProgressBroadcaster,
    pub scheduler: JobScheduler,
    pub settings: Arc<Settings>,
}

impl TestHarness {
    /// Harness with defaults suitable for small test feeds: 12 minimum
    /// columns, tiny fragments, 1 s tickers.
    pub fn new() -> Self {
        Self::with_settings(Self::default_settings())
    }

    pub fn with_settings(settings: Settings) -> Self {
        let registry = Arc::new(MemoryRegistry::new());
        let source = Arc::new(ScriptedSource::default());
        let urls = Arc::new(ScriptedUrls::default());
        let broadcaster = JobProgressBroadcaster::default();
        let reference = Arc::new(StaticReferenceProvider::from_slices(&[
            ("currencies", &["EUR", "USD"][..]),
            ("provinces", &["BC", "ON", "QC"][..]),
            ("products", &["WIDGET", "GADGET"][..]),
        ]));
        let settings = Arc::new(settings);

        let scheduler = JobScheduler::new(SchedulerContext {
            registry: Arc::clone(&registry) as Arc<dyn JobRegistry>,
            source: Arc::clone(&source) as Arc<dyn FileSource>,
            urls: Arc::clone(&urls) as Arc<dyn DownloadUrlProvider>,
            reference,
            broadcaster: broadcaster.clone(),
            settings: Arc::clone(&settings),
        });

        Self {
            registry,
            source,
            urls,
            broadcaster,
            scheduler,
            settings,
        }
    }

    pub fn default_settings() -> Settings {
        let mut settings = Settings::with_min_columns(12);
        settings.fragment_max_bytes = 4096;
        settings.heartbeat_interval_secs = 1;
        settings.metrics_log_interval_secs = 1;
        settings
    }

    /// Creates a QUEUED job whose URL streams `body`, and returns its id.
    pub async fn queue_job(&self, name: &str, body: ScriptedBody) -> String {
        let url = format!("https://files.test/{}", name);
        let item_id = format!("item-{}", name);
        self.source.put(&url, body);
        self.urls.put(&item_id, &url);

        let record = JobRecord::new(&format!("{}.csv", name), &item_id, 0);
        let job_id = record.id.clone();
        self.registry.create(record).await.unwrap();
        job_id
    }

    /// Enqueues the job directly (bypassing auto_dequeue) and returns
    /// whether a runner started.
    pub async fn start_job(&self, job_id: &str, name: &str) -> bool {
        let url = format!("https://files.test/{}", name);
        self.scheduler.enqueue(job_id, &url).await
    }

    /// Polls the registry until the job reaches a terminal status.
    pub async fn wait_for_terminal(&self, job_id: &str, timeout: Duration) -> JobRecord {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            if let Some(record) = self.registry.get(job_id).await.unwrap() {
                if record.status.is_terminal() {
                    return record;
                }
            }
            if tokio::time::Instant::now() >= deadline {
                panic!("job {} did not reach a terminal status in time", job_id);
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }

    /// Polls until the scheduler has no active runners.
    pub async fn wait_for_idle(&self, timeout: Duration) {
        let deadline = tokio::time::Instant::now() + timeout;
        while self.scheduler.active_count() > 0 {
            if tokio::time::Instant::now() >= deadline {
                panic!("scheduler did not go idle in time");
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }
}

impl Default for TestHarness {
    fn default() -> Self {
        Self::new()
    }
}
