//! Engine configuration.

use crate::resolver::AmbiguityPolicy;
use crate::store::DEFAULT_MAX_BATCH;
use std::time::Duration;

/// Knobs for the recompute engine.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Tie-break for members sharing a name.
    pub ambiguity: AmbiguityPolicy,

    /// Upper bound on writes per committed batch. The store's own bound wins
    /// if it is smaller.
    pub batch_limit: usize,

    /// Settle time after a change-triggered request before the queue is
    /// drained, so that bursts of edits share one run.
    pub debounce: Duration,

    /// Period of the scheduled full recompute. `None` disables it.
    pub recompute_interval: Option<Duration>,

    /// Period of the aggregate report. `None` disables it.
    pub report_interval: Option<Duration>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            ambiguity: AmbiguityPolicy::FirstById,
            batch_limit: DEFAULT_MAX_BATCH,
            debounce: Duration::from_millis(250),
            recompute_interval: Some(Duration::from_secs(60 * 60)),
            report_interval: Some(Duration::from_secs(24 * 60 * 60)),
        }
    }
}

impl EngineConfig {
    /// No debounce and no schedules; every request runs as soon as it is read.
    #[must_use]
    pub fn immediate() -> Self {
        Self {
            debounce: Duration::ZERO,
            recompute_interval: None,
            report_interval: None,
            ..Default::default()
        }
    }

    /// Set the ambiguity policy.
    #[must_use]
    pub fn with_ambiguity(mut self, policy: AmbiguityPolicy) -> Self {
        self.ambiguity = policy;
        self
    }

    /// Set the batch limit (at least 1).
    #[must_use]
    pub fn with_batch_limit(mut self, limit: usize) -> Self {
        self.batch_limit = limit.max(1);
        self
    }

    /// Set the debounce window.
    #[must_use]
    pub fn with_debounce(mut self, debounce: Duration) -> Self {
        self.debounce = debounce;
        self
    }

    /// Set the scheduled recompute period.
    #[must_use]
    pub fn with_recompute_interval(mut self, interval: Option<Duration>) -> Self {
        self.recompute_interval = interval;
        self
    }

    /// Set the report period.
    #[must_use]
    pub fn with_report_interval(mut self, interval: Option<Duration>) -> Self {
        self.report_interval = interval;
        self
    }
}
