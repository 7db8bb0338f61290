//! Step callback that reports session progress through tracing.

use phasebridge_core::runner::StepCallback;
use phasebridge_core::step::StepSummary;
use tracing::{debug, info};

/// Logs every step at debug level and a progress line every
/// `report_every` steps.
#[derive(Debug)]
pub struct StepLog {
    report_every: u64,
    published: usize,
    failures: usize,
}

impl StepLog {
    /// Create a callback reporting every `report_every` steps (at least 1).
    pub fn new(report_every: u64) -> Self {
        Self {
            report_every: report_every.max(1),
            published: 0,
            failures: 0,
        }
    }
}

impl StepCallback for StepLog {
    fn on_step(&mut self, summary: &StepSummary) {
        self.published = self.published.saturating_add(summary.records_published);
        self.failures = self.failures.saturating_add(summary.task_failures);

        debug!(
            step = summary.step,
            time = %summary.time,
            received = summary.records_received,
            tasks_created = summary.tasks_created,
            cyclic_runs = summary.cyclic_runs,
            single_runs = summary.single_runs,
            published = summary.records_published,
            withheld = summary.records_withheld,
            "Step complete"
        );

        if summary.step.checked_rem(self.report_every) == Some(0) {
            info!(
                step = summary.step,
                time = %summary.time,
                published_total = self.published,
                task_failures_total = self.failures,
                "Session progress"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn totals_accumulate() {
        let mut log = StepLog::new(0);
        for step in 1..=3 {
            log.on_step(&StepSummary {
                step,
                records_published: 2,
                task_failures: 1,
                ..StepSummary::default()
            });
        }
        assert_eq!(log.report_every, 1);
        assert_eq!(log.published, 6);
        assert_eq!(log.failures, 3);
    }
}
