// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use chrono::{DateTime, Utc};
use futures::future::join_all;
use metrics::{counter, histogram};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use crate::config::settings::Settings;
use crate::domain::models::alert::Alert;
use crate::domain::models::batch::Batch;
use crate::domain::models::job::{Job, JobResult, JobStatus};
use crate::domain::models::target::{DailyStatSample, TrackedTarget};
use crate::domain::repositories::target_repository::TargetRepository;
use crate::domain::services::alert_service::{derive_alerts, AlertThresholds};
use crate::domain::services::extraction_service::{ExtractionOutcome, ExtractionService};
use crate::domain::services::notification_service::{AlertDispatcher, DispatchSummary};
use crate::engines::blocking_monitor::BlockingMonitor;
use crate::engines::guard::AntiDetectionGuard;
use crate::engines::traits::{target_url, FetchRequest, Fetcher};
use crate::infrastructure::cache::result_cache::ResultCache;
use crate::queue::planner::BatchPlanner;
use crate::utils::clock::Clock;
use crate::utils::errors::{JobError, RepositoryError};
use crate::utils::retry_policy::RetryPolicy;

/// 抓取策略
#[derive(Debug, Clone)]
pub struct ScrapePolicy {
    /// 批次内并发上限
    pub max_concurrency: usize,
    /// 提取结果缓存时长
    pub cache_ttl: Duration,
    pub batch_size: usize,
}

impl Default for ScrapePolicy {
    fn default() -> Self {
        Self {
            max_concurrency: 3,
            cache_ttl: Duration::from_secs(1800),
            batch_size: 50,
        }
    }
}

/// 队列处理器配置
#[derive(Debug, Clone)]
pub struct ProcessorConfig {
    pub policy: ScrapePolicy,
    pub network_retry: RetryPolicy,
    pub blocking_retry: RetryPolicy,
    pub thresholds: AlertThresholds,
    /// 告警接收方
    pub recipients: Vec<String>,
    /// 目标地址模板，包含 `{page_id}` 和 `{country}` 占位符
    pub url_template: String,
    pub default_region: String,
    pub fetch_timeout: Duration,
}

impl ProcessorConfig {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            policy: ScrapePolicy {
                max_concurrency: settings.fetcher.max_concurrency.max(1),
                cache_ttl: settings.cache_ttl(),
                batch_size: settings.scheduler.batch_size.max(1),
            },
            network_retry: RetryPolicy::network(&settings.retry),
            blocking_retry: RetryPolicy::blocking(&settings.retry),
            thresholds: settings.alerts.clone(),
            recipients: settings.notifications.recipients.clone(),
            url_template: settings.fetcher.target_url_template.clone(),
            default_region: settings.fetcher.default_region.clone(),
            fetch_timeout: settings.fetch_timeout(),
        }
    }
}

/// 单个批次的处理报告
#[derive(Debug, Clone)]
pub struct BatchReport {
    pub batch_id: Uuid,
    pub succeeded: usize,
    pub failed: usize,
    pub alerts: Vec<Alert>,
    pub results: Vec<JobResult>,
    pub dispatch: DispatchSummary,
}

impl BatchReport {
    /// 成功但样本未写入存储的任务数
    pub fn unrecorded(&self) -> usize {
        self.results
            .iter()
            .filter(|r| r.is_success() && !r.recorded)
            .count()
    }
}

/// 队列处理器
///
/// 逐个取出到期批次，在并发上限内为批次中的每个目标执行抓取任务，
/// 汇总告警后统一分发，并在结束时把批次标记为已处理。
pub struct QueueProcessor {
    targets: Arc<dyn TargetRepository>,
    planner: Arc<BatchPlanner>,
    fetcher: Arc<dyn Fetcher>,
    guard: Arc<AntiDetectionGuard>,
    cache: Arc<ResultCache<ExtractionOutcome>>,
    extraction: Arc<ExtractionService>,
    monitor: Arc<BlockingMonitor>,
    dispatcher: Arc<AlertDispatcher>,
    clock: Arc<dyn Clock>,
    config: ProcessorConfig,
}

impl QueueProcessor {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        targets: Arc<dyn TargetRepository>,
        planner: Arc<BatchPlanner>,
        fetcher: Arc<dyn Fetcher>,
        guard: Arc<AntiDetectionGuard>,
        cache: Arc<ResultCache<ExtractionOutcome>>,
        extraction: Arc<ExtractionService>,
        monitor: Arc<BlockingMonitor>,
        dispatcher: Arc<AlertDispatcher>,
        clock: Arc<dyn Clock>,
        config: ProcessorConfig,
    ) -> Self {
        Self {
            targets,
            planner,
            fetcher,
            guard,
            cache,
            extraction,
            monitor,
            dispatcher,
            clock,
            config,
        }
    }

    pub fn config(&self) -> &ProcessorConfig {
        &self.config
    }

    /// 当前生效的并发数：配置上限与监控建议值中较小者
    pub fn effective_concurrency(&self) -> usize {
        self.config
            .policy
            .max_concurrency
            .min(self.monitor.recommended_concurrency())
            .max(1)
    }

    /// 处理下一个到期批次
    ///
    /// # 返回值
    ///
    /// * `Ok(Some(BatchReport))` - 处理了一个批次
    /// * `Ok(None)` - 当前没有到期批次
    pub async fn process_next(&self) -> Result<Option<BatchReport>, RepositoryError> {
        match self.planner.next_batch().await? {
            Some(batch) => Ok(Some(self.process_batch(&batch).await)),
            None => Ok(None),
        }
    }

    /// 处理一个批次
    ///
    /// 任务按当前并发数分组，组内并行、组间串行；每组开始前重新读取监控建议值。
    /// 无论任务成败，批次最终都会被标记为已处理。
    #[instrument(skip(self, batch), fields(batch_id = %batch.id, batch_index = batch.index))]
    pub async fn process_batch(&self, batch: &Batch) -> BatchReport {
        let started = Instant::now();
        if let Err(e) = self.planner.mark_processing(batch.id).await {
            warn!("Failed to mark batch as processing: {}", e);
        }

        let now = self.clock.now();
        let max_retries = self.config.network_retry.max_attempts();
        let mut pending: Vec<Job> = batch
            .target_ids
            .iter()
            .map(|id| Job::new(batch.id, id.clone(), 0, max_retries, now))
            .collect();
        pending.reverse();

        info!(
            jobs = pending.len(),
            concurrency = self.effective_concurrency(),
            "Processing batch"
        );

        let mut results = Vec::with_capacity(pending.len());
        while !pending.is_empty() {
            let size = self.effective_concurrency().min(pending.len());
            let chunk: Vec<Job> = (0..size).filter_map(|_| pending.pop()).collect();
            let chunk_results =
                join_all(chunk.into_iter().map(|job| self.process_job_with_retry(job))).await;
            results.extend(chunk_results);
        }

        let alerts: Vec<Alert> = results.iter().flat_map(|r| r.alerts.clone()).collect();
        let dispatch = self
            .dispatcher
            .dispatch(&alerts, &self.config.recipients)
            .await;

        if let Err(e) = self.planner.mark_processed(batch.id).await {
            error!("Failed to mark batch as processed: {}", e);
        }

        let succeeded = results.iter().filter(|r| r.is_success()).count();
        let report = BatchReport {
            batch_id: batch.id,
            succeeded,
            failed: results.len() - succeeded,
            alerts,
            results,
            dispatch,
        };

        histogram!("adpulse_batch_duration_seconds").record(started.elapsed().as_secs_f64());
        info!(
            succeeded = report.succeeded,
            failed = report.failed,
            unrecorded = report.unrecorded(),
            alerts = report.alerts.len(),
            delivered = report.dispatch.delivered,
            "Batch processed in {:?}",
            started.elapsed()
        );
        report
    }

    /// 执行单个任务，失败时按错误类型退避重试
    ///
    /// 拦截类失败使用长退避策略，网络类失败使用短退避策略；
    /// 达到最大尝试次数或遇到不可重试错误时返回失败结果。
    #[instrument(skip(self, job), fields(target_id = %job.target_id, batch_id = %job.batch_id))]
    pub async fn process_job_with_retry(&self, mut job: Job) -> JobResult {
        let target = match self.targets.find_by_id(&job.target_id).await {
            Ok(Some(target)) if target.active => target,
            Ok(_) => {
                let err = JobError::TargetVanished(job.target_id.clone());
                return self.finish_failed(&mut job, "", 0, err);
            }
            Err(e) => return self.finish_failed(&mut job, "", 0, e.into()),
        };

        let mut attempts = 0;
        loop {
            attempts += 1;
            job.start();

            let err = match self.attempt(&target).await {
                Ok((outcome, from_cache)) => {
                    job.succeed();
                    return self
                        .finish_success(&job, &target, outcome, from_cache, attempts)
                        .await;
                }
                Err(err) => err,
            };

            let policy = if err.is_blocking() {
                &self.config.blocking_retry
            } else {
                &self.config.network_retry
            };
            if !err.is_retryable() || !policy.should_retry(attempts) {
                return self.finish_failed(&mut job, &target.name, attempts, err);
            }

            let backoff = policy.calculate_backoff(attempts);
            job.schedule_retry();
            warn!(
                attempt = attempts,
                max_attempts = policy.max_attempts(),
                "Job attempt failed, retrying in {:?}: {}",
                backoff,
                err
            );
            self.clock.sleep(backoff).await;
        }
    }

    /// 单次执行：等待熔断器、查缓存、抓取并提取
    ///
    /// # 返回值
    ///
    /// 提取结果以及是否来自缓存
    async fn attempt(&self, target: &TrackedTarget) -> Result<(ExtractionOutcome, bool), JobError> {
        let waited = self.guard.wait_until_clear().await;
        if !waited.is_zero() {
            debug!("Waited {:?} for circuit to close", waited);
        }

        let region = target.region_or(&self.config.default_region);
        let key = ResultCache::<ExtractionOutcome>::key(&target.id, region);
        if let Some(hit) = self.cache.get(&key) {
            debug!("Cache hit for {}", key);
            return Ok((hit, true));
        }

        let url = target_url(&self.config.url_template, &target.id, region)
            .map_err(|e| JobError::InvalidTarget(e.to_string()))?;
        let request_config = self.guard.gate().await;
        let request = FetchRequest::new(url.as_str(), self.config.fetch_timeout)
            .with_headers(request_config.headers);

        let response = self.fetcher.fetch(&request).await?;
        if let Some(classification) = self.guard.observe(&response, Some(&target.id)) {
            return Err(JobError::Blocked(classification));
        }
        let response = response.error_for_status()?;

        let outcome = self.extraction.extract(&target.id, &response.body).await;
        self.cache
            .set(&key, outcome.clone(), Some(self.config.policy.cache_ttl));
        Ok((outcome, false))
    }

    async fn finish_success(
        &self,
        job: &Job,
        target: &TrackedTarget,
        outcome: ExtractionOutcome,
        from_cache: bool,
        attempts: u32,
    ) -> JobResult {
        let now = self.clock.now();
        let date = self.planner.local_date(now);
        let previous = target.previous_count(date);
        let current = outcome.total_active_ads;
        let sample = DailyStatSample::compute(date, previous, current);
        let page_name = outcome
            .advertiser_name
            .clone()
            .unwrap_or_else(|| target.name.clone());

        let recorded = match self.persist(&target.id, sample.clone(), now).await {
            Ok(()) => true,
            Err(e) => {
                error!("Failed to persist daily sample: {}", e);
                false
            }
        };

        let alerts = derive_alerts(
            &self.config.thresholds,
            &target.id,
            &page_name,
            previous,
            current,
        );

        counter!("adpulse_jobs_total", "outcome" => "succeeded").increment(1);
        info!(
            previous,
            current,
            tier = %outcome.tier,
            from_cache,
            attempts,
            "Recorded {} active ads for {}",
            current,
            page_name
        );

        JobResult {
            job_id: job.id,
            target_id: target.id.clone(),
            page_name,
            status: JobStatus::Succeeded,
            previous,
            current,
            delta: sample.delta,
            percent_change: sample.percent_change,
            attempts,
            from_cache,
            tier: Some(outcome.tier),
            recorded,
            alerts,
            error: None,
        }
    }

    async fn persist(
        &self,
        target_id: &str,
        sample: DailyStatSample,
        now: DateTime<Utc>,
    ) -> Result<(), RepositoryError> {
        self.targets.upsert_daily_sample(target_id, sample).await?;
        self.targets.touch_last_checked(target_id, now).await
    }

    fn finish_failed(
        &self,
        job: &mut Job,
        page_name: &str,
        attempts: u32,
        err: JobError,
    ) -> JobResult {
        job.fail();
        counter!("adpulse_jobs_total", "outcome" => "failed").increment(1);
        error!(attempts, "Job failed: {}", err);
        JobResult::failed(job, page_name, attempts, err.to_string())
    }
}

#[cfg(test)]
#[path = "processor_test.rs"]
mod tests;
