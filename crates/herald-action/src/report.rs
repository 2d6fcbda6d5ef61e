//! Final execution report.

use std::fmt;

use herald_core::config::ReportConfig;
use herald_core::error::HeraldError;
use serde::{Deserialize, Serialize};

use crate::types::ExecutionResult;

const LARGE_BATCH_NOTE: &str =
    "Large batch: some changes may take a few minutes to show up everywhere.";

/// Summary of one run handed to the notification sink.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionReport {
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    /// Rounded to one decimal place; 0 for an empty run.
    pub success_rate_percent: f64,
    /// Successes first, then failures, each in execution order.
    pub results: Vec<ExecutionResult>,
    pub note: Option<String>,
}

impl ExecutionReport {
    pub fn successes(&self) -> impl Iterator<Item = &ExecutionResult> {
        self.results.iter().filter(|r| r.success)
    }

    pub fn failures(&self) -> impl Iterator<Item = &ExecutionResult> {
        self.results.iter().filter(|r| !r.success)
    }

    /// Machine-readable form for sinks that forward reports elsewhere.
    pub fn to_json(&self) -> Result<String, HeraldError> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// Builds [`ExecutionReport`]s from raw result lists.
#[derive(Debug, Clone)]
pub struct ReportBuilder {
    note_threshold: usize,
}

impl ReportBuilder {
    pub fn new(config: &ReportConfig) -> Self {
        Self {
            note_threshold: config.note_threshold,
        }
    }

    pub fn build(&self, results: Vec<ExecutionResult>) -> ExecutionReport {
        let total = results.len();
        let (mut ordered, failures): (Vec<_>, Vec<_>) =
            results.into_iter().partition(|r| r.success);
        let succeeded = ordered.len();
        ordered.extend(failures);

        let success_rate_percent = if total == 0 {
            0.0
        } else {
            (succeeded as f64 / total as f64 * 1000.0).round() / 10.0
        };

        ExecutionReport {
            total,
            succeeded,
            failed: total - succeeded,
            success_rate_percent,
            results: ordered,
            note: (total > self.note_threshold).then(|| LARGE_BATCH_NOTE.to_string()),
        }
    }
}

impl Default for ReportBuilder {
    fn default() -> Self {
        Self::new(&ReportConfig::default())
    }
}

impl fmt::Display for ExecutionReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "{}/{} actions succeeded ({:.1}%)",
            self.succeeded, self.total, self.success_rate_percent
        )?;
        for result in &self.results {
            if result.success {
                let message = result.message.as_deref().unwrap_or("done");
                writeln!(f, "  ok   {}: {}", result.action.raw_text, message)?;
            } else {
                let error = result.error.as_deref().unwrap_or("failed");
                writeln!(f, "  FAIL {}: {}", result.action.raw_text, error)?;
            }
        }
        if let Some(note) = &self.note {
            writeln!(f, "{}", note)?;
        }
        Ok(())
    }
}
