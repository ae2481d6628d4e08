//! Poll-dedup-publish loop
//!
//! One cycle refreshes the session, fetches the ranked list, truncates it to
//! the configured size, and publishes every id the seen-store does not know
//! yet, in list order. An id is recorded only after its publish succeeded,
//! so a failed or interrupted item is retried on the next cycle.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

use crate::config::FailurePolicy;
use crate::db::Database;
use crate::error::Result;
use crate::platforms::Publisher;
use crate::source::ItemSource;
use crate::types::{PostDraft, StrongRef};

const DEFAULT_INTERVAL: Duration = Duration::from_secs(60);

/// Where the loop is; attached to log lines and item failures
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Refreshing,
    Listing,
    Checking,
    Fetching,
    Publishing,
    Recording,
    Sleeping,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Phase::Idle => "idle",
            Phase::Refreshing => "refreshing",
            Phase::Listing => "listing",
            Phase::Checking => "checking",
            Phase::Fetching => "fetching",
            Phase::Publishing => "publishing",
            Phase::Recording => "recording",
            Phase::Sleeping => "sleeping",
        };
        write!(f, "{}", name)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ItemFailure {
    pub id: i64,
    pub phase: Phase,
    pub message: String,
}

/// Outcome of a single cycle
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CycleReport {
    /// Length of the ranked list before truncation
    pub listed: usize,
    /// Ids looked at after truncation
    pub considered: usize,
    /// Ids already in the seen-store
    pub skipped: usize,
    pub published: Vec<(i64, StrongRef)>,
    pub failed: Vec<ItemFailure>,
    /// Set when the ranked list itself could not be fetched
    pub list_error: Option<String>,
    /// The cycle stopped early because shutdown was requested
    pub interrupted: bool,
}

impl CycleReport {
    pub fn published_ids(&self) -> Vec<i64> {
        self.published.iter().map(|(id, _)| *id).collect()
    }

    pub fn failed_ids(&self) -> Vec<i64> {
        self.failed.iter().map(|f| f.id).collect()
    }
}

pub struct Poller {
    source: Box<dyn ItemSource>,
    publisher: Box<dyn Publisher>,
    db: Database,
    top_n: usize,
    interval: Duration,
    policy: FailurePolicy,
    shutdown: Arc<AtomicBool>,
    phase: Phase,
}

impl Poller {
    /// Create a poller that considers the first `top_n` ids of each list
    ///
    /// Defaults to a one minute interval and the `isolate` failure policy.
    pub fn new(
        source: Box<dyn ItemSource>,
        publisher: Box<dyn Publisher>,
        db: Database,
        top_n: usize,
    ) -> Self {
        Self {
            source,
            publisher,
            db,
            top_n,
            interval: DEFAULT_INTERVAL,
            policy: FailurePolicy::default(),
            shutdown: Arc::new(AtomicBool::new(false)),
            phase: Phase::Idle,
        }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn with_policy(mut self, policy: FailurePolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Share a flag that stops the loop between items and during sleep
    pub fn with_shutdown(mut self, shutdown: Arc<AtomicBool>) -> Self {
        self.shutdown = shutdown;
        self
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    fn shutdown_requested(&self) -> bool {
        self.shutdown.load(Ordering::Relaxed)
    }

    /// Run one refresh-list-publish pass
    ///
    /// # Errors
    ///
    /// A failed session refresh is always returned. Under
    /// [`FailurePolicy::Abort`] the first list or item failure is returned as
    /// well; under [`FailurePolicy::Isolate`] those are collected in the
    /// report instead.
    pub async fn run_cycle(&mut self) -> Result<CycleReport> {
        let mut report = CycleReport::default();

        self.phase = Phase::Refreshing;
        if let Err(e) = self.publisher.refresh_auth().await {
            error!(phase = %self.phase, error = %e, "Session refresh failed");
            self.phase = Phase::Idle;
            return Err(e);
        }

        self.phase = Phase::Listing;
        let mut ids = match self.source.fetch_ranked_list().await {
            Ok(ids) => ids,
            Err(e) => {
                warn!(phase = %self.phase, source = self.source.name(), error = %e, "Failed to fetch ranked list");
                self.phase = Phase::Idle;
                if self.policy == FailurePolicy::Abort {
                    return Err(e.into());
                }
                report.list_error = Some(e.to_string());
                return Ok(report);
            }
        };

        report.listed = ids.len();
        ids.truncate(self.top_n);
        report.considered = ids.len();
        debug!(listed = report.listed, considered = report.considered, "Ranked list fetched");

        for id in ids {
            if self.shutdown_requested() {
                info!("Shutdown requested, stopping cycle before item {}", id);
                report.interrupted = true;
                break;
            }

            match self.process_item(id).await {
                Ok(Some(created)) => {
                    info!(id, uri = %created.uri, cid = %created.cid, "Published item");
                    report.published.push((id, created));
                }
                Ok(None) => report.skipped += 1,
                Err(e) => {
                    let phase = self.phase;
                    if phase == Phase::Recording {
                        // The post exists but is not recorded; the next cycle posts it again
                        error!(id, phase = %phase, error = %e, "Published item could not be recorded");
                    } else {
                        warn!(id, phase = %phase, error = %e, "Item failed");
                    }

                    if self.policy == FailurePolicy::Abort {
                        self.phase = Phase::Idle;
                        return Err(e);
                    }
                    report.failed.push(ItemFailure {
                        id,
                        phase,
                        message: e.to_string(),
                    });
                }
            }
        }

        self.phase = Phase::Idle;
        Ok(report)
    }

    /// Check, fetch, publish, and record one id
    ///
    /// Returns `None` when the id was already published. On error
    /// `self.phase` names the step that failed.
    async fn process_item(&mut self, id: i64) -> Result<Option<StrongRef>> {
        self.phase = Phase::Checking;
        if let Some(seen) = self.db.lookup(id).await? {
            debug!(id, cid = %seen.content_id, "Already published, skipping");
            return Ok(None);
        }

        self.phase = Phase::Fetching;
        let item = self.source.fetch_item(id).await?;

        self.phase = Phase::Publishing;
        let draft = PostDraft::from_item(&item);
        let created = self.publisher.publish(&draft).await?;

        self.phase = Phase::Recording;
        self.db.record(id, &created).await?;

        Ok(Some(created))
    }

    /// Run cycles until shutdown is requested or a cycle fails
    pub async fn run(&mut self) -> Result<()> {
        info!(
            top_n = self.top_n,
            interval = %humantime::format_duration(self.interval),
            policy = %self.policy,
            "Poll loop starting"
        );

        loop {
            if self.shutdown_requested() {
                info!("Shutdown requested, stopping poll loop");
                break;
            }

            let report = self.run_cycle().await?;
            info!(
                listed = report.listed,
                skipped = report.skipped,
                published = report.published.len(),
                failed = report.failed.len(),
                "Cycle complete"
            );

            self.sleep_interval().await;
        }

        self.phase = Phase::Idle;
        Ok(())
    }

    /// Sleep for the interval in one-second steps, waking early on shutdown
    async fn sleep_interval(&mut self) {
        self.phase = Phase::Sleeping;
        let step = Duration::from_secs(1);
        let mut remaining = self.interval;

        while !remaining.is_zero() && !self.shutdown_requested() {
            let nap = remaining.min(step);
            sleep(nap).await;
            remaining -= nap;
        }
        self.phase = Phase::Idle;
    }
}
