// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use adpulse::config::settings::Settings;
use adpulse::domain::repositories::target_repository::TargetRepository;
use adpulse::domain::services::extraction_service::ExtractionService;
use adpulse::domain::services::llm_service::{OpenAiTextGenerator, TextGenerator};
use adpulse::domain::services::notification_service::{AlertDispatcher, LogNotifier, Notifier};
use adpulse::engines::blocking_monitor::{BlockingMonitor, BlockingMonitorConfig};
use adpulse::engines::circuit_breaker::CircuitBreaker;
use adpulse::engines::guard::AntiDetectionGuard;
use adpulse::engines::reqwest_engine::ReqwestFetcher;
use adpulse::infrastructure::cache::result_cache::ResultCache;
use adpulse::infrastructure::repositories::memory_batch_repo::InMemoryBatchRepository;
use adpulse::infrastructure::repositories::memory_target_repo::InMemoryTargetRepository;
use adpulse::infrastructure::services::webhook_notifier::WebhookNotifier;
use adpulse::queue::planner::{BatchPlanner, PlannerConfig};
use adpulse::queue::processor::{ProcessorConfig, QueueProcessor};
use adpulse::utils::clock::{Clock, SystemClock};
use adpulse::utils::telemetry;
use adpulse::workers::batch_worker::BatchWorker;
use anyhow::Context;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// 主函数
///
/// 应用程序入口点，负责初始化所有组件并启动批次工作器
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 1. Initialize logging
    telemetry::init_telemetry();
    info!("Starting adpulse...");

    // 2. Load configuration
    let settings = Settings::new().context("failed to load configuration")?;
    info!("Configuration loaded");

    if settings.metrics.enabled {
        adpulse::infrastructure::metrics::init_metrics(&settings.metrics.listen_addr);
    }

    // 3. Storage
    let targets = match &settings.store.targets_file {
        Some(path) => InMemoryTargetRepository::load_from_file(path)
            .await
            .with_context(|| format!("failed to load targets from {}", path))?,
        None => {
            warn!("No targets file configured, starting with an empty target list");
            InMemoryTargetRepository::new()
        }
    };
    info!("Loaded {} tracked targets", targets.len());
    let targets: Arc<dyn TargetRepository> = Arc::new(targets);
    let batches = Arc::new(InMemoryBatchRepository::new());

    // 4. Pacing and blocking protection
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let circuit = Arc::new(CircuitBreaker::new(clock.clone()));
    let monitor = Arc::new(BlockingMonitor::new(
        BlockingMonitorConfig::from(&settings.monitor),
        clock.clone(),
    ));
    let guard = Arc::new(AntiDetectionGuard::from_settings(
        &settings.guard,
        circuit,
        monitor.clone(),
        clock.clone(),
    ));
    let fetcher = Arc::new(
        ReqwestFetcher::new(settings.fetcher.max_concurrency, settings.fetch_timeout())
            .context("failed to build HTTP client")?,
    );

    // 5. Extraction
    let generator = OpenAiTextGenerator::from_settings(&settings.llm)?
        .map(|g| Arc::new(g) as Arc<dyn TextGenerator>);
    if generator.is_none() {
        info!("No LLM API key configured, model-assisted extraction disabled");
    }
    let extraction = Arc::new(ExtractionService::new(
        generator,
        settings.extraction_config(),
    ));
    let cache = Arc::new(ResultCache::new(
        settings.cache_ttl(),
        settings.cache.max_entries,
        clock.clone(),
    ));

    // 6. Notifications
    let notifier: Arc<dyn Notifier> = match &settings.notifications.webhook_url {
        Some(url) => Arc::new(
            WebhookNotifier::new(
                url.clone(),
                settings.notifications.webhook_secret.clone(),
                clock.clone(),
            )
            .context("failed to build webhook notifier")?,
        ),
        None => Arc::new(LogNotifier),
    };
    let dispatcher = Arc::new(AlertDispatcher::new(notifier));

    // 7. Scheduling and processing
    let planner = Arc::new(
        BatchPlanner::new(
            batches,
            PlannerConfig::from(&settings.scheduler),
            clock.clone(),
        )
        .with_monitor(monitor.clone()),
    );
    let processor = Arc::new(QueueProcessor::new(
        targets.clone(),
        planner.clone(),
        fetcher,
        guard,
        cache,
        extraction,
        monitor,
        dispatcher,
        clock,
        ProcessorConfig::from_settings(&settings),
    ));

    let worker = Arc::new(BatchWorker::new(
        targets,
        planner,
        processor,
        Duration::from_secs(settings.scheduler.tick_interval_secs),
    ));
    let handle = worker.start();
    info!("Batch worker running, press Ctrl+C to stop");

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for shutdown signal")?;
    info!("Shutdown signal received, stopping batch worker");
    handle.abort();

    Ok(())
}
