//! Processing outcome bookkeeping
//!
//! A single consumer task owns the counters and drains the outcome stream
//! until every sender is gone. Reports surface at configured intervals so
//! the pipeline is observable without a per-item log line.

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::info;

/// Which counter decides whether a failure triggers a report.
///
/// `SuccessCount` reproduces the long-standing behavior where failure
/// reports are gated on the *success* counter: with zero successes every
/// failure reports, afterwards failures report only while the success
/// count sits on a batch boundary. `FailureCount` gates on the failure
/// counter itself.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureReportGate {
    #[default]
    SuccessCount,
    FailureCount,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProcessingTotals {
    pub succeeded: u64,
    pub failed: u64,
}

impl ProcessingTotals {
    pub fn total(&self) -> u64 {
        self.succeeded + self.failed
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportTrigger {
    Success,
    Failure,
}

/// Snapshot emitted when a counter crosses a report boundary
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MetricsReport {
    pub trigger: ReportTrigger,
    pub totals: ProcessingTotals,
}

#[derive(Debug)]
pub struct MetricsSink {
    totals: ProcessingTotals,
    batch_size: u64,
    gate: FailureReportGate,
}

impl MetricsSink {
    pub fn new(batch_size: u64, gate: FailureReportGate) -> Self {
        MetricsSink {
            totals: ProcessingTotals::default(),
            batch_size: batch_size.max(1),
            gate,
        }
    }

    pub fn totals(&self) -> ProcessingTotals {
        self.totals
    }

    /// Count one outcome; returns a report when it lands on a boundary.
    pub fn record(&mut self, succeeded: bool) -> Option<MetricsReport> {
        if succeeded {
            self.totals.succeeded += 1;
            if self.totals.succeeded % self.batch_size == 0 {
                return Some(MetricsReport {
                    trigger: ReportTrigger::Success,
                    totals: self.totals,
                });
            }
            return None;
        }

        self.totals.failed += 1;
        let gate_value = match self.gate {
            FailureReportGate::SuccessCount => self.totals.succeeded,
            FailureReportGate::FailureCount => self.totals.failed,
        };
        if gate_value % self.batch_size == 0 {
            Some(MetricsReport {
                trigger: ReportTrigger::Failure,
                totals: self.totals,
            })
        } else {
            None
        }
    }

    /// Drain outcomes until the channel closes, then return the totals.
    pub async fn run(mut self, mut outcomes: mpsc::Receiver<bool>) -> ProcessingTotals {
        while let Some(succeeded) = outcomes.recv().await {
            if let Some(report) = self.record(succeeded) {
                match report.trigger {
                    ReportTrigger::Success => {
                        info!(succeeded = report.totals.succeeded, "successfully processed items")
                    }
                    ReportTrigger::Failure => {
                        info!(failed = report.totals.failed, "failed processing items")
                    }
                }
            }
        }

        info!(
            succeeded = self.totals.succeeded,
            failed = self.totals.failed,
            "outcome stream closed"
        );
        self.totals
    }
}
