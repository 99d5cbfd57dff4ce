//! Exactly-once analysis of a behavior record under concurrent invocations.

use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, error, info, instrument, warn};

use sprout_ai::{AnalysisOutput, AnalyzerChain};
use sprout_core::{AnalysisStatus, ExpectedStatus, Observation, RecordId};

use super::store::JobStore;
use super::types::{AnalysisOutcome, FailureReason, JobPatch};
use crate::config::AnalysisConfig;
use crate::metrics::{MetricsAggregator, MetricsDelta, MetricsStore};

/// Runs the analyzer chain for a record and commits the result exactly once.
///
/// There is no in-process lock. Every terminal write is a conditional update
/// guarded on `status == analyzing`, so among any number of concurrent
/// invocations at most one commit matches; the rest observe a stale write.
pub struct AnalysisOrchestrator<S, M> {
    jobs: Arc<S>,
    chain: Arc<AnalyzerChain>,
    metrics: MetricsAggregator<M>,
    config: AnalysisConfig,
}

impl<S, M> Clone for AnalysisOrchestrator<S, M> {
    fn clone(&self) -> Self {
        Self {
            jobs: Arc::clone(&self.jobs),
            chain: Arc::clone(&self.chain),
            metrics: self.metrics.clone(),
            config: self.config.clone(),
        }
    }
}

enum Attempt {
    Finished(AnalysisOutput),
    TimedOut,
    Crashed(String),
}

impl<S: JobStore, M: MetricsStore> AnalysisOrchestrator<S, M> {
    pub fn new(jobs: Arc<S>, chain: AnalyzerChain, metrics: Arc<M>, config: AnalysisConfig) -> Self {
        let metrics = MetricsAggregator::new(metrics).with_invariant_check(config.metrics_invariant_check);
        Self {
            jobs,
            chain: Arc::new(chain),
            metrics,
            config,
        }
    }

    pub fn jobs(&self) -> &Arc<S> {
        &self.jobs
    }

    pub fn metrics(&self) -> &MetricsAggregator<M> {
        &self.metrics
    }

    pub fn config(&self) -> &AnalysisConfig {
        &self.config
    }

    /// Analyze one record. Never panics or errors; every failure is an outcome.
    #[instrument(skip_all, fields(record_id = %id))]
    pub async fn run_analysis(&self, id: RecordId) -> AnalysisOutcome {
        let started = Instant::now();

        let job = match self.jobs.get(id).await {
            Ok(Some(job)) => job,
            Ok(None) => {
                info!("record not found");
                return AnalysisOutcome::NotFound;
            }
            Err(e) => {
                error!(error = %e, "failed to read record");
                return AnalysisOutcome::Failed(FailureReason::Store(e.to_string()));
            }
        };

        match job.status {
            AnalysisStatus::Done => {
                return match job.result {
                    Some(result) => {
                        debug!("already analyzed, returning stored result");
                        self.metrics.increment(MetricsDelta::skip());
                        AnalysisOutcome::Cached(result)
                    }
                    None => {
                        error!("record is done but has no stored result");
                        AnalysisOutcome::Failed(FailureReason::Store(
                            "done record has no result".to_string(),
                        ))
                    }
                };
            }
            AnalysisStatus::Failed => {
                info!("record already failed, not re-analyzing");
                return AnalysisOutcome::Failed(FailureReason::AlreadyFailed);
            }
            AnalysisStatus::Pending | AnalysisStatus::Analyzing => {}
        }

        let mut marked = self.mark(id, JobPatch::analyzing()).await;

        let observation = Arc::new(job.observation);
        let mut retry_count = job.retry_count;
        let mut retried = false;
        let mut attempt: u32 = 1;

        loop {
            match self.attempt(Arc::clone(&observation)).await {
                Attempt::Finished(output) => {
                    return self.commit_done(id, output, retried, marked, started).await;
                }
                Attempt::Crashed(reason) => {
                    error!(attempt, %reason, "analyzer task failed");
                    let outcome = AnalysisOutcome::Failed(FailureReason::Analyzer(reason));
                    return self.commit_failed(id, started, false, marked, outcome).await;
                }
                Attempt::TimedOut if retry_count < self.config.max_retries => {
                    retry_count += 1;
                    retried = true;
                    warn!(
                        attempt,
                        retry_count,
                        timeout_ms = self.config.analysis_timeout.as_millis() as u64,
                        "analysis timed out, retrying"
                    );
                    self.metrics.increment(MetricsDelta::timeout_retry());
                    marked |= self.mark(id, JobPatch::retry(retry_count)).await;
                    attempt += 1;
                }
                Attempt::TimedOut => {
                    warn!(attempt, retry_count, "analysis timed out, retries exhausted");
                    return self
                        .commit_failed(id, started, true, marked, AnalysisOutcome::TimedOut)
                        .await;
                }
            }
        }
    }

    /// Race one chain run against the deadline.
    ///
    /// The chain runs on its own task. On timeout the handle is dropped, which
    /// detaches the task rather than cancelling it; a late result is discarded.
    async fn attempt(&self, observation: Arc<Observation>) -> Attempt {
        let chain = Arc::clone(&self.chain);
        let handle = tokio::spawn(async move { chain.analyze_with_report(&observation).await });

        match tokio::time::timeout(self.config.analysis_timeout, handle).await {
            Ok(Ok((output, report))) => {
                debug!(
                    strategy = report.used.as_deref().unwrap_or("fallback"),
                    skipped = ?report.skipped,
                    failed = report.errors.len(),
                    "analyzer chain finished"
                );
                Attempt::Finished(output)
            }
            Ok(Err(join_err)) => Attempt::Crashed(join_err.to_string()),
            Err(_elapsed) => Attempt::TimedOut,
        }
    }

    /// Best-effort `analyzing` marker. Never resurrects a terminal record.
    ///
    /// Returns `false` only when the write itself failed.
    async fn mark(&self, id: RecordId, patch: JobPatch) -> bool {
        match self.jobs.conditional_update(id, ExpectedStatus::NotTerminal, patch).await {
            Ok(0) => {
                debug!("marker matched nothing; record already terminal");
                true
            }
            Ok(_) => true,
            Err(e) => {
                warn!(error = %e, "failed to write analyzing marker, continuing");
                false
            }
        }
    }

    /// Whether a commit that matched nothing lost to another invocation.
    ///
    /// With the marker in place that is the only explanation. Without it the
    /// record may still be `pending`, which is a bookkeeping failure.
    async fn lost_race(&self, id: RecordId, marked: bool) -> bool {
        if marked {
            return true;
        }
        match self.jobs.get(id).await {
            Ok(Some(job)) if !job.status.is_terminal() => {
                error!(status = %job.status, "commit matched nothing; analyzing marker was never written");
                false
            }
            Ok(_) => true,
            Err(e) => {
                error!(error = %e, "failed to re-read record after unmatched commit");
                false
            }
        }
    }

    async fn commit_done(
        &self,
        id: RecordId,
        output: AnalysisOutput,
        after_retry: bool,
        marked: bool,
        started: Instant,
    ) -> AnalysisOutcome {
        let expected = ExpectedStatus::Exactly(AnalysisStatus::Analyzing);
        match self.jobs.conditional_update(id, expected, JobPatch::done(output.clone())).await {
            Ok(0) if self.lost_race(id, marked).await => {
                info!(matched = 0, "stale commit, another invocation finished first");
                AnalysisOutcome::Stale
            }
            Ok(0) => {
                self.metrics
                    .increment(MetricsDelta::failure(elapsed_ms(started), false));
                AnalysisOutcome::Failed(FailureReason::Store(
                    "analyzing marker was not written".to_string(),
                ))
            }
            Ok(matched) => {
                info!(matched, source = ?output.source, after_retry, "analysis committed");
                self.metrics
                    .increment(MetricsDelta::success(elapsed_ms(started), after_retry));
                AnalysisOutcome::Analyzed { output, after_retry }
            }
            Err(e) => {
                error!(error = %e, "failed to commit analysis result");
                let outcome = AnalysisOutcome::Failed(FailureReason::Store(e.to_string()));
                self.commit_failed(id, started, false, marked, outcome).await
            }
        }
    }

    /// Terminal failure through the same guard as success.
    ///
    /// `outcome` is what this caller gets unless the write turns out stale.
    async fn commit_failed(
        &self,
        id: RecordId,
        started: Instant,
        timed_out: bool,
        marked: bool,
        outcome: AnalysisOutcome,
    ) -> AnalysisOutcome {
        let expected = ExpectedStatus::Exactly(AnalysisStatus::Analyzing);
        match self.jobs.conditional_update(id, expected, JobPatch::failed()).await {
            Ok(0) if self.lost_race(id, marked).await => {
                info!(matched = 0, "stale failure commit, another invocation finished first");
                return AnalysisOutcome::Stale;
            }
            Ok(0) => warn!(timed_out, "record left non-terminal, reporting failure"),
            Ok(matched) => info!(matched, timed_out, "record marked failed"),
            Err(e) => error!(error = %e, "failed to mark record failed"),
        }

        self.metrics
            .increment(MetricsDelta::failure(elapsed_ms(started), timed_out));

        outcome
    }
}

fn elapsed_ms(started: Instant) -> u64 {
    u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX)
}
