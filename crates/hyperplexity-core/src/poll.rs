//! Scheduling wrappers: blocking waits with progress reporting, and a lazy
//! stream of job messages.
//!
//! The waits lock the session context only around each poll, so other tool
//! calls are served while a wait is in progress. Transient failures are
//! logged and polling continues; any other failure ends the wait.

use std::time::{Duration, Instant};

use tokio::sync::Mutex;
use tokio_stream::Stream;

use crate::adapter::{GetConversationRequest, WorkflowAdapter};
use crate::error::HpxResult;
use crate::models::{ConversationSnapshot, JobMessage, JobSnapshot, JobStatus};
use crate::session::SessionContext;

pub const DEFAULT_WAIT_TIMEOUT: Duration = Duration::from_secs(600);
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(15);
pub const DEFAULT_EXPECTED_TURN: Duration = Duration::from_secs(120);

/// Receives progress percentages (0 to 100) while a wait is running.
pub trait ProgressSink: Send + Sync {
    fn report(&self, progress: f64, message: Option<&str>);
}

/// Writes progress to the log.
pub struct LogProgress;

impl ProgressSink for LogProgress {
    fn report(&self, progress: f64, message: Option<&str>) {
        match message {
            Some(m) => tracing::info!("[Wait] {:.0}% {}", progress, m),
            None => tracing::debug!("[Wait] {:.0}%", progress),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct WaitOptions {
    pub timeout: Duration,
    pub poll_interval: Duration,
    /// Conversation waits only: typical duration of one AI turn.
    pub expected: Duration,
}

impl Default for WaitOptions {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_WAIT_TIMEOUT,
            poll_interval: DEFAULT_POLL_INTERVAL,
            expected: DEFAULT_EXPECTED_TURN,
        }
    }
}

impl WaitOptions {
    /// Defaults overridden by whichever values a caller supplied, in seconds.
    pub fn from_secs(timeout: Option<u64>, poll_interval: Option<u64>, expected: Option<u64>) -> Self {
        let defaults = Self::default();
        Self {
            timeout: timeout.map(Duration::from_secs).unwrap_or(defaults.timeout),
            poll_interval: poll_interval
                .filter(|s| *s > 0)
                .map(Duration::from_secs)
                .unwrap_or(defaults.poll_interval),
            expected: expected
                .filter(|s| *s > 0)
                .map(Duration::from_secs)
                .unwrap_or(defaults.expected),
        }
    }
}

/// Last observed state of a wait, and whether it ran out of time.
#[derive(Debug, Clone)]
pub struct Waited<T> {
    pub last: Option<T>,
    pub timed_out: bool,
    pub timeout: Duration,
}

// ─── Progress geometry ──────────────────────────────────────────────────

/// Maps per-phase native progress onto one monotonic 0 to 100 bar.
///
/// The first phase owns the full range. Each newly seen intermediate
/// completion spends 80% of the remaining range on the finished phase and
/// hands the rest to the next one.
#[derive(Debug, Clone)]
pub struct PhaseProgress {
    floor: f64,
    ceiling: f64,
    within: f64,
    last_emitted: f64,
    last_split: Option<String>,
}

const MIN_WITHIN_PHASE: f64 = 2.0;

impl Default for PhaseProgress {
    fn default() -> Self {
        Self {
            floor: 0.0,
            ceiling: 99.0,
            within: MIN_WITHIN_PHASE,
            last_emitted: 0.0,
            last_split: None,
        }
    }
}

impl PhaseProgress {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a native within-phase reading.
    pub fn observe(&mut self, progress: f64) {
        self.within = progress;
    }

    /// Value to report now; never below anything reported before.
    pub fn emit(&mut self) -> f64 {
        let within = self.within.max(MIN_WITHIN_PHASE).clamp(0.0, 99.0);
        let candidate = self.floor + within / 100.0 * (self.ceiling - self.floor);
        self.last_emitted = self.last_emitted.max(candidate);
        self.last_emitted
    }

    /// Enter the next phase after `step` completed. Returns false when the
    /// same step was already split on.
    pub fn split(&mut self, step: &str) -> bool {
        let key = step.to_ascii_lowercase();
        if self.last_split.as_deref() == Some(key.as_str()) {
            return false;
        }
        self.last_split = Some(key);
        let spent = self.floor + (self.ceiling - self.floor) * 0.8;
        self.floor = spent
            .max(self.last_emitted + 0.5)
            .min(self.ceiling - 1.0);
        self.within = MIN_WITHIN_PHASE;
        true
    }

    pub fn finish(&mut self) -> f64 {
        self.last_emitted = 100.0;
        self.last_emitted
    }
}

/// Time-based progress for conversations, which report none natively:
/// a square-root curve reaching 90 at `expected`, then two points per
/// extra minute up to 98.
pub fn synthetic_progress(elapsed: Duration, expected: Duration) -> f64 {
    let t = elapsed.as_secs_f64();
    let expected = expected.as_secs_f64().max(1.0);
    if t <= 0.0 {
        return MIN_WITHIN_PHASE;
    }
    if t < expected {
        (90.0 * (t / expected).sqrt()).min(90.0)
    } else {
        let extra_minutes = (t - expected) / 60.0;
        (90.0 + extra_minutes * 2.0).min(98.0)
    }
}

fn is_actionable(status: Option<JobStatus>) -> bool {
    matches!(
        status,
        Some(JobStatus::PreviewComplete) | Some(JobStatus::Completed) | Some(JobStatus::Failed)
    )
}

// ─── Waits ──────────────────────────────────────────────────────────────

/// Poll a job until preview_complete, completed or failed.
///
/// Each cycle reads new messages first, for progress only, then the status,
/// which alone decides when to stop. The first message read primes the
/// cursor and is discarded so an earlier phase's 100% does not leak into
/// this wait.
pub async fn wait_for_job(
    adapter: &WorkflowAdapter,
    ctx: &Mutex<SessionContext>,
    job_id: &str,
    options: WaitOptions,
    sink: &dyn ProgressSink,
) -> HpxResult<Waited<JobSnapshot>> {
    let deadline = Instant::now() + options.timeout;
    let mut progress = PhaseProgress::new();
    let mut cursor: Option<i64> = None;
    let mut primed = false;
    let mut last: Option<JobSnapshot> = None;

    loop {
        match adapter.fetch_messages(job_id, cursor).await {
            Ok(page) => {
                if page.last_seq.is_some() {
                    cursor = page.last_seq;
                }
                if primed {
                    if let Some(p) = page.latest_progress() {
                        progress.observe(p);
                    }
                }
                primed = true;
            }
            Err(e) => tracing::warn!("[Wait] Messages for {} unavailable: {}", job_id, e),
        }
        sink.report(progress.emit(), None);

        let status = {
            let mut guard = ctx.lock().await;
            adapter.get_job_status(&mut guard, job_id).await
        };
        match status {
            Ok(snapshot) => {
                if let Some(step) = snapshot.intermediate_step() {
                    if progress.split(step) {
                        tracing::info!("[Wait] Job {} finished phase '{}'", job_id, step);
                        sink.report(progress.emit(), Some(step));
                    }
                } else if is_actionable(snapshot.status) {
                    sink.report(progress.finish(), Some(snapshot.status_str()));
                    return Ok(Waited {
                        last: Some(snapshot),
                        timed_out: false,
                        timeout: options.timeout,
                    });
                }
                last = Some(snapshot);
            }
            Err(e) if e.is_retryable() => {
                tracing::warn!("[Wait] Status of {} unavailable, retrying: {}", job_id, e);
            }
            Err(e) => return Err(e),
        }

        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            tracing::info!("[Wait] Job {} wait timed out", job_id);
            return Ok(Waited {
                last,
                timed_out: true,
                timeout: options.timeout,
            });
        }
        tokio::time::sleep(options.poll_interval.min(remaining)).await;
    }
}

/// Poll a conversation until the AI needs a reply or the conversation ends.
pub async fn wait_for_conversation(
    adapter: &WorkflowAdapter,
    ctx: &Mutex<SessionContext>,
    req: GetConversationRequest,
    options: WaitOptions,
    sink: &dyn ProgressSink,
) -> HpxResult<Waited<ConversationSnapshot>> {
    let start = Instant::now();
    let deadline = start + options.timeout;
    let mut last_emitted: f64 = 0.0;
    let mut last: Option<ConversationSnapshot> = None;

    loop {
        last_emitted = last_emitted.max(synthetic_progress(start.elapsed(), options.expected));
        sink.report(last_emitted, None);

        let polled = {
            let mut guard = ctx.lock().await;
            adapter.get_conversation(&mut guard, req.clone()).await
        };
        match polled {
            Ok(snapshot) if snapshot.is_settled() => {
                sink.report(100.0, Some(snapshot.status.as_str()));
                return Ok(Waited {
                    last: Some(snapshot),
                    timed_out: false,
                    timeout: options.timeout,
                });
            }
            Ok(snapshot) => last = Some(snapshot),
            Err(e) if e.is_retryable() => {
                tracing::warn!(
                    "[Wait] Conversation {} unavailable, retrying: {}",
                    req.conversation_id,
                    e
                );
            }
            Err(e) => return Err(e),
        }

        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            tracing::info!("[Wait] Conversation {} wait timed out", req.conversation_id);
            return Ok(Waited {
                last,
                timed_out: true,
                timeout: options.timeout,
            });
        }
        tokio::time::sleep(options.poll_interval.min(remaining)).await;
    }
}

// ─── Message stream ─────────────────────────────────────────────────────

/// Stream every message of a job, polling at `interval`. Ends after one
/// more read once the job reaches a terminal status.
pub fn job_messages<'a>(
    adapter: &'a WorkflowAdapter,
    job_id: &'a str,
    interval: Duration,
) -> impl Stream<Item = HpxResult<JobMessage>> + 'a {
    async_stream::try_stream! {
        let mut cursor: Option<i64> = None;
        let mut draining = false;
        loop {
            let page = adapter.fetch_messages(job_id, cursor).await?;
            if page.last_seq.is_some() {
                cursor = page.last_seq;
            }
            for message in page.messages {
                yield message;
            }
            if draining {
                break;
            }

            let snapshot = adapter.fetch_job(job_id, false).await?;
            if snapshot.is_terminal() {
                draining = true;
                continue;
            }
            tokio::time::sleep(interval).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_phase_uses_full_range() {
        let mut p = PhaseProgress::new();
        assert_eq!(p.emit(), 1.98);
        p.observe(50.0);
        assert_eq!(p.emit(), 49.5);
        assert_eq!(p.finish(), 100.0);
    }

    #[test]
    fn test_progress_never_regresses_within_phase() {
        let mut p = PhaseProgress::new();
        p.observe(60.0);
        let high = p.emit();
        p.observe(10.0);
        assert_eq!(p.emit(), high);
    }

    #[test]
    fn test_split_hands_remaining_range_to_next_phase() {
        let mut p = PhaseProgress::new();
        p.observe(40.0);
        let before = p.emit();
        assert!(p.split("Table Making"));
        let after = p.emit();
        assert!(after > before);
        assert!(after >= 99.0 * 0.8);

        p.observe(100.0);
        assert!(p.emit() <= 99.0);
    }

    #[test]
    fn test_repeated_step_does_not_split_again() {
        let mut p = PhaseProgress::new();
        assert!(p.split("Config Generation"));
        let level = p.emit();
        assert!(!p.split("config generation"));
        assert_eq!(p.emit(), level);
        assert!(p.split("Claim Extraction"));
        assert!(p.emit() > level);
    }

    #[test]
    fn test_synthetic_progress_curve() {
        let expected = Duration::from_secs(100);
        assert_eq!(synthetic_progress(Duration::ZERO, expected), 2.0);
        assert_eq!(synthetic_progress(Duration::from_secs(25), expected), 45.0);
        assert_eq!(synthetic_progress(Duration::from_secs(100), expected), 90.0);
        assert_eq!(synthetic_progress(Duration::from_secs(160), expected), 92.0);
        assert_eq!(synthetic_progress(Duration::from_secs(10_000), expected), 98.0);
    }

    #[test]
    fn test_wait_options_defaults() {
        let o = WaitOptions::from_secs(None, Some(0), Some(30));
        assert_eq!(o.timeout, DEFAULT_WAIT_TIMEOUT);
        assert_eq!(o.poll_interval, DEFAULT_POLL_INTERVAL);
        assert_eq!(o.expected, Duration::from_secs(30));
    }
}
