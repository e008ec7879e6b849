//! Sequential execution of selected suites.

use std::collections::BTreeSet;
use std::time::Instant;

use tidepool_core::{ProviderId, SetupError};

use crate::error::ConformanceError;
use crate::policy::Operation;
use crate::report::RunReport;
use crate::suite::ConformanceSuite;

/// Which providers and operations a run covers. Empty filters select all.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Selection {
    providers: BTreeSet<ProviderId>,
    operations: BTreeSet<Operation>,
}

impl Selection {
    pub fn all() -> Self {
        Self::default()
    }

    /// Restricts the run to the named providers. Names are matched by id.
    pub fn with_providers<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.providers
            .extend(names.into_iter().map(|name| ProviderId::from_name(name.as_ref())));
        self
    }

    pub fn with_operations<I>(mut self, operations: I) -> Self
    where
        I: IntoIterator<Item = Operation>,
    {
        self.operations.extend(operations);
        self
    }

    pub fn includes_provider(&self, provider: &ProviderId) -> bool {
        self.providers.is_empty() || self.providers.contains(provider)
    }

    pub fn includes_operation(&self, operation: Operation) -> bool {
        self.operations.is_empty() || self.operations.contains(&operation)
    }
}

/// Runs suites one operation at a time and collects a [`RunReport`].
#[derive(Debug, Default)]
pub struct ConformanceRunner {
    setup_errors: Vec<(String, String)>,
}

impl ConformanceRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Carries provider construction failures into the report.
    pub fn with_setup_errors(mut self, errors: &[SetupError]) -> Self {
        self.setup_errors.extend(
            errors
                .iter()
                .map(|error| (error.provider.clone(), error.reason.clone())),
        );
        self
    }

    pub async fn run(&self, suites: &[ConformanceSuite], selection: &Selection) -> RunReport {
        let started = Instant::now();
        let mut report = RunReport::default();

        for (provider, reason) in &self.setup_errors {
            if selection.includes_provider(&ProviderId::from_name(provider)) {
                report.setup_errors.push(ConformanceError::Setup {
                    provider: provider.clone(),
                    reason: reason.clone(),
                });
            }
        }

        for suite in suites {
            if !selection.includes_provider(&suite.provider().id()) {
                tracing::debug!("Provider {} not selected", suite.name());
                continue;
            }
            for operation in suite.operations() {
                if selection.includes_operation(operation) {
                    report.operations.push(suite.run(operation).await);
                }
            }
        }

        report.elapsed = started.elapsed();
        tracing::info!("Conformance run finished: {}", report.summary());
        report
    }
}
