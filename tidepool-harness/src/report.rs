//! Per-operation outcomes and the run report printed at the end.

use std::fmt;
use std::time::Duration;

use tidepool_core::ProviderId;

use crate::error::ConformanceError;
use crate::policy::Operation;

/// Result of one (provider, operation) pair.
#[derive(Debug)]
pub enum Outcome {
    Passed,
    Skipped(String),
    Failed(ConformanceError),
}

impl Outcome {
    pub fn is_passed(&self) -> bool {
        matches!(self, Outcome::Passed)
    }

    pub fn is_skipped(&self) -> bool {
        matches!(self, Outcome::Skipped(_))
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, Outcome::Failed(_))
    }

    pub fn error(&self) -> Option<&ConformanceError> {
        match self {
            Outcome::Failed(error) => Some(error),
            _ => None,
        }
    }
}

/// Report for one executed or skipped operation.
#[derive(Debug)]
pub struct OperationReport {
    pub provider: String,
    pub provider_id: ProviderId,
    pub operation: Operation,
    pub description: String,
    pub outcome: Outcome,
    /// Requests served or recorded by the cassette during the operation
    pub requests: usize,
    pub elapsed: Duration,
}

impl OperationReport {
    /// `<id>.<operation>` label used in the report.
    pub fn label(&self) -> String {
        format!("{}.{}", self.provider_id, self.operation)
    }
}

/// Counts per outcome.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Summary {
    pub passed: usize,
    pub skipped: usize,
    pub failed: usize,
    pub setup_errors: usize,
}

impl Summary {
    pub fn total(&self) -> usize {
        self.passed + self.skipped + self.failed
    }
}

impl fmt::Display for Summary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} passed, {} failed, {} skipped",
            self.passed, self.failed, self.skipped
        )?;
        if self.setup_errors > 0 {
            write!(f, ", {} providers failed to initialize", self.setup_errors)?;
        }
        Ok(())
    }
}

/// Everything a run produced.
#[derive(Debug, Default)]
pub struct RunReport {
    pub operations: Vec<OperationReport>,
    /// Always [`ConformanceError::Setup`]
    pub setup_errors: Vec<ConformanceError>,
    pub elapsed: Duration,
}

impl RunReport {
    /// True when any operation failed or any provider failed to initialize.
    pub fn has_failures(&self) -> bool {
        !self.setup_errors.is_empty() || self.operations.iter().any(|op| op.outcome.is_failed())
    }

    pub fn summary(&self) -> Summary {
        let mut summary = Summary {
            setup_errors: self.setup_errors.len(),
            ..Summary::default()
        };
        for op in &self.operations {
            match op.outcome {
                Outcome::Passed => summary.passed += 1,
                Outcome::Skipped(_) => summary.skipped += 1,
                Outcome::Failed(_) => summary.failed += 1,
            }
        }
        summary
    }

    pub fn failures(&self) -> impl Iterator<Item = &OperationReport> {
        self.operations.iter().filter(|op| op.outcome.is_failed())
    }

    /// Report for one pair, if it ran.
    pub fn find(&self, provider: &str, operation: Operation) -> Option<&OperationReport> {
        let id = ProviderId::from_name(provider);
        self.operations
            .iter()
            .find(|op| op.provider_id == id && op.operation == operation)
    }
}

const SEPARATOR_HEAVY: &str =
    "======================================================================";
const SEPARATOR_LIGHT: &str =
    "----------------------------------------------------------------------";

/// Verbose listing in the style of a text test runner.
impl fmt::Display for RunReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for op in &self.operations {
            write!(f, "{} ({}) ... ", op.description, op.label())?;
            match &op.outcome {
                Outcome::Passed => writeln!(f, "ok")?,
                Outcome::Skipped(reason) => writeln!(f, "skipped '{reason}'")?,
                Outcome::Failed(_) => writeln!(f, "FAIL")?,
            }
        }

        for error in &self.setup_errors {
            writeln!(f)?;
            writeln!(f, "{SEPARATOR_HEAVY}")?;
            writeln!(f, "ERROR: provider setup")?;
            writeln!(f, "{SEPARATOR_LIGHT}")?;
            writeln!(f, "{error}")?;
        }

        for op in self.failures() {
            writeln!(f)?;
            writeln!(f, "{SEPARATOR_HEAVY}")?;
            writeln!(f, "FAIL: {} ({})", op.description, op.label())?;
            writeln!(f, "{SEPARATOR_LIGHT}")?;
            if let Some(error) = op.outcome.error() {
                writeln!(f, "{error}")?;
            }
        }

        let summary = self.summary();
        writeln!(f, "{SEPARATOR_LIGHT}")?;
        writeln!(
            f,
            "Ran {} tests in {:.3}s",
            summary.total(),
            self.elapsed.as_secs_f64()
        )?;
        writeln!(f)?;

        let mut details = Vec::new();
        if summary.failed > 0 {
            details.push(format!("failures={}", summary.failed));
        }
        if summary.setup_errors > 0 {
            details.push(format!("errors={}", summary.setup_errors));
        }
        if summary.skipped > 0 {
            details.push(format!("skipped={}", summary.skipped));
        }
        let status = if self.has_failures() { "FAILED" } else { "OK" };
        if details.is_empty() {
            writeln!(f, "{status}")
        } else {
            writeln!(f, "{status} ({})", details.join(", "))
        }
    }
}
