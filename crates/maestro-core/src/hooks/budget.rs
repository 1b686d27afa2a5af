//! Budget tracking: accumulated run cost gated against a per-run limit.

use std::sync::Mutex;

use crate::config::{BudgetCheckInterval, BudgetConfig};
use crate::error::OrchestratorError;
use crate::logging::ExecutionLogger;

/// Tracks cost spent during one orchestrator invocation.
pub struct BudgetTracker {
    config: BudgetConfig,
    spent: Mutex<f64>,
}

impl BudgetTracker {
    pub fn new(config: BudgetConfig) -> Self {
        Self {
            config,
            spent: Mutex::new(0.0),
        }
    }

    pub fn check_interval(&self) -> BudgetCheckInterval {
        self.config.check_interval
    }

    /// Attribute cost for `duration` of agent wall time.
    pub fn record_duration(&self, duration: std::time::Duration) {
        let cost = duration.as_secs_f64() / 60.0 * self.config.cost_per_minute;
        *self.spent.lock().expect("budget lock poisoned") += cost;
    }

    pub fn spent(&self) -> f64 {
        *self.spent.lock().expect("budget lock poisoned")
    }

    /// Ratio of the limit consumed so far.
    pub fn ratio(&self) -> f64 {
        if self.config.max_cost_per_run <= 0.0 {
            return 0.0;
        }
        self.spent() / self.config.max_cost_per_run
    }

    /// Gate: errors at or over the limit, warns at the warn threshold.
    pub fn check(&self, logger: Option<&dyn ExecutionLogger>) -> Result<(), OrchestratorError> {
        let spent = self.spent();
        let limit = self.config.max_cost_per_run;
        let ratio = self.ratio();

        if let Some(logger) = logger {
            logger.budget_status(spent, limit);
        }

        if ratio >= 1.0 {
            return Err(OrchestratorError::BudgetExceeded { spent, limit });
        }
        if ratio >= self.config.warn_threshold
            && let Some(logger) = logger
        {
            logger.budget_warning(spent, limit);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn tracker(limit: f64) -> BudgetTracker {
        BudgetTracker::new(BudgetConfig {
            max_cost_per_run: limit,
            warn_threshold: 0.8,
            check_interval: BudgetCheckInterval::PerWave,
            cost_per_minute: 1.0,
        })
    }

    #[test]
    fn cost_accumulates_from_duration() {
        let t = tracker(10.0);
        t.record_duration(Duration::from_secs(60));
        t.record_duration(Duration::from_secs(30));
        assert!((t.spent() - 1.5).abs() < 1e-9);
        assert!((t.ratio() - 0.15).abs() < 1e-9);
    }

    #[test]
    fn under_limit_passes() {
        let t = tracker(10.0);
        t.record_duration(Duration::from_secs(60));
        t.check(None).unwrap();
    }

    #[test]
    fn at_or_over_limit_errors() {
        let t = tracker(1.0);
        t.record_duration(Duration::from_secs(60));
        let err = t.check(None).unwrap_err();
        assert!(matches!(err, OrchestratorError::BudgetExceeded { .. }));
    }

    #[test]
    fn zero_limit_never_trips() {
        let t = tracker(0.0);
        t.record_duration(Duration::from_secs(3600));
        t.check(None).unwrap();
        assert_eq!(t.ratio(), 0.0);
    }
}
