// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use adpulse::config::settings::RetrySettings;
use adpulse::domain::models::target::{DailyStatSample, TrackedTarget};
use adpulse::domain::repositories::target_repository::TargetRepository;
use adpulse::domain::services::alert_service::AlertThresholds;
use adpulse::domain::services::extraction_service::{ExtractionConfig, ExtractionService};
use adpulse::domain::services::llm_service::TextGenerator;
use adpulse::domain::services::notification_service::{AlertDispatcher, Notifier};
use adpulse::engines::blocking_monitor::{BlockingMonitor, BlockingMonitorConfig};
use adpulse::engines::circuit_breaker::CircuitBreaker;
use adpulse::engines::guard::{AntiDetectionGuard, GuardConfig};
use adpulse::engines::reqwest_engine::ReqwestFetcher;
use adpulse::infrastructure::cache::result_cache::ResultCache;
use adpulse::infrastructure::repositories::memory_batch_repo::InMemoryBatchRepository;
use adpulse::infrastructure::repositories::memory_target_repo::InMemoryTargetRepository;
use adpulse::queue::planner::{BatchPlanner, PlannerConfig};
use adpulse::queue::processor::{ProcessorConfig, QueueProcessor, ScrapePolicy};
use adpulse::utils::clock::ManualClock;
use adpulse::utils::errors::NotificationError;
use adpulse::utils::retry_policy::RetryPolicy;
use adpulse::workers::batch_worker::BatchWorker;
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// 测试起始时间：2025-03-02 07:00 UTC，当天首批 06:00 已到期
pub fn start_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 3, 2, 7, 0, 0).unwrap()
}

pub fn yesterday() -> NaiveDate {
    NaiveDate::from_ymd_opt(2025, 3, 1).unwrap()
}

/// 带一条前一日样本的目标
pub fn target(id: &str, previous: u32) -> TrackedTarget {
    let mut target = TrackedTarget::new(id, format!("Page {}", id));
    target.upsert_sample(DailyStatSample::compute(yesterday(), 0, previous));
    target
}

/// 广告库页面，计数嵌在 `ad_library_main` 数据块中
pub fn ad_library_page(name: &str, count: u32) -> String {
    format!(
        r#"<html><head><title>Ad Library</title></head><body>
<script type="application/json">{{"require":[["AdLibrary",{{"ad_library_main":{{"page_name":"{}","totalCount":{}}}}}]]}}</script>
</body></html>"#,
        name, count
    )
}

#[derive(Default)]
pub struct RecordingNotifier {
    pub sent: Mutex<Vec<(String, String)>>,
}

impl RecordingNotifier {
    pub fn messages(&self) -> Vec<String> {
        self.sent.lock().iter().map(|(_, m)| m.clone()).collect()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn send(&self, recipient_id: &str, message: &str) -> Result<(), NotificationError> {
        self.sent
            .lock()
            .push((recipient_id.to_string(), message.to_string()));
        Ok(())
    }
}

/// 固定回复并计数的文本生成器
pub struct CannedGenerator {
    pub calls: AtomicUsize,
    reply: String,
}

impl CannedGenerator {
    pub fn new(reply: &str) -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
            reply: reply.to_string(),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TextGenerator for CannedGenerator {
    async fn complete(&self, _prompt: &str) -> anyhow::Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.reply.clone())
    }
}

/// 完整装配的流水线，出站请求指向 `base_url`
pub struct Pipeline {
    pub clock: Arc<ManualClock>,
    pub targets: Arc<InMemoryTargetRepository>,
    pub planner: Arc<BatchPlanner>,
    pub processor: Arc<QueueProcessor>,
    pub circuit: Arc<CircuitBreaker>,
    pub monitor: Arc<BlockingMonitor>,
    pub notifier: Arc<RecordingNotifier>,
}

impl Pipeline {
    pub fn new(base_url: &str, targets: Vec<TrackedTarget>) -> Self {
        Self::with_generator(base_url, targets, None)
    }

    pub fn with_generator(
        base_url: &str,
        targets: Vec<TrackedTarget>,
        generator: Option<Arc<dyn TextGenerator>>,
    ) -> Self {
        let clock = Arc::new(ManualClock::new(start_time()));
        let targets = Arc::new(InMemoryTargetRepository::with_targets(targets));
        let circuit = Arc::new(CircuitBreaker::new(clock.clone()));
        let monitor = Arc::new(BlockingMonitor::new(
            BlockingMonitorConfig {
                base_delay: Duration::ZERO,
                ..Default::default()
            },
            clock.clone(),
        ));
        let guard = Arc::new(AntiDetectionGuard::new(
            GuardConfig {
                base_delay: Duration::ZERO,
                failure_step: Duration::ZERO,
                max_failure_delay: Duration::ZERO,
                jitter: Duration::ZERO,
                ..Default::default()
            },
            Vec::new(),
            circuit.clone(),
            monitor.clone(),
            clock.clone(),
        ));
        let planner = Arc::new(
            BatchPlanner::new(
                Arc::new(InMemoryBatchRepository::new()),
                PlannerConfig {
                    batch_size: 2,
                    ..Default::default()
                },
                clock.clone(),
            )
            .with_monitor(monitor.clone()),
        );
        let notifier = Arc::new(RecordingNotifier::default());
        let retry = RetrySettings {
            max_retries: 2,
            blocking_max_retries: 2,
            network_initial_backoff_ms: 2_000,
            blocking_initial_backoff_ms: 30_000,
            max_backoff_ms: 300_000,
            backoff_multiplier: 2.0,
        };
        let fetcher = ReqwestFetcher::new(3, Duration::from_secs(5)).expect("http client");

        let processor = Arc::new(QueueProcessor::new(
            targets.clone(),
            planner.clone(),
            Arc::new(fetcher),
            guard,
            Arc::new(ResultCache::new(
                Duration::from_secs(1800),
                100,
                clock.clone(),
            )),
            Arc::new(ExtractionService::new(generator, ExtractionConfig::default())),
            monitor.clone(),
            Arc::new(AlertDispatcher::new(notifier.clone())),
            clock.clone(),
            ProcessorConfig {
                policy: ScrapePolicy::default(),
                network_retry: RetryPolicy::network(&retry).without_jitter(),
                blocking_retry: RetryPolicy::blocking(&retry).without_jitter(),
                thresholds: AlertThresholds::default(),
                recipients: vec!["ops-team".to_string()],
                url_template: format!(
                    "{}/ads/library/?country={{country}}&view_all_page_id={{page_id}}",
                    base_url
                ),
                default_region: "ALL".to_string(),
                fetch_timeout: Duration::from_secs(5),
            },
        ));

        Self {
            clock,
            targets,
            planner,
            processor,
            circuit,
            monitor,
            notifier,
        }
    }

    pub fn worker(&self) -> BatchWorker {
        BatchWorker::new(
            self.targets.clone() as Arc<dyn TargetRepository>,
            self.planner.clone(),
            self.processor.clone(),
            Duration::from_secs(60),
        )
    }
}
