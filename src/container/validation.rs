//! Aggregated configuration validation.

use std::fmt;

use ahash::AHashSet;
use parking_lot::Mutex;
use serde::Serialize;
use thiserror::Error;
use tracing::warn;

use crate::error::{DiError, DiResult};
use crate::lifecycle::CacheKey;
use crate::plan::BuildPlan;

/// An instance that could not be built.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BuildFailure {
    pub plugin_type: String,
    pub instance: String,
    pub message: String,
}

/// A validation method that rejected a built object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidationFailure {
    pub concrete_type: String,
    pub method: String,
    pub message: String,
}

/// Every failure found by
/// [`Container::assert_configuration_is_valid`](crate::Container::assert_configuration_is_valid).
///
/// Build and configuration failures are counted apart from validation
/// method errors. A failure is reported once, on the instance where it
/// originates; consumers of a failed instance are not reported again.
#[derive(Debug, Clone, Default, PartialEq, Eq, Error, Serialize)]
#[error("{}", summarize(.build_failures, .validation_errors))]
pub struct ValidationReport {
    pub build_failures: Vec<BuildFailure>,
    pub validation_errors: Vec<ValidationFailure>,
}

impl ValidationReport {
    pub fn is_valid(&self) -> bool {
        self.build_failures.is_empty() && self.validation_errors.is_empty()
    }
}

fn summarize(build_failures: &[BuildFailure], validation_errors: &[ValidationFailure]) -> String {
    let mut text = format!(
        "Configuration is invalid: {} build failure(s), {} validation error(s)",
        build_failures.len(),
        validation_errors.len()
    );
    for failure in build_failures {
        text.push_str(&format!(
            "\n  Build failure for instance '{}' of {}: {}",
            failure.instance, failure.plugin_type, failure.message
        ));
    }
    for failure in validation_errors {
        text.push_str(&format!(
            "\n  Validation method {}::{} failed: {}",
            failure.concrete_type, failure.method, failure.message
        ));
    }
    text
}

/// Failures recorded so far during one validation run.
#[derive(Default)]
pub(crate) struct ValidationState {
    failed: Mutex<AHashSet<CacheKey>>,
    report: Mutex<ValidationReport>,
}

impl ValidationState {
    pub(crate) fn upstream(plan: &BuildPlan) -> DiError {
        DiError::UpstreamFailure {
            plugin_type: plan.plugin_type().short_name(),
            instance: plan.instance().name().to_string(),
        }
    }

    /// Fails with [`DiError::UpstreamFailure`] when `plan` already failed.
    pub(crate) fn check_known(&self, plan: &BuildPlan) -> DiResult<()> {
        if self.failed.lock().contains(&plan.cache_key()) {
            return Err(Self::upstream(plan));
        }
        Ok(())
    }

    pub(crate) fn has_failed(&self, plan: &BuildPlan) -> bool {
        self.failed.lock().contains(&plan.cache_key())
    }

    /// Records `err` against `plan` unless it originates upstream, and
    /// returns the error to propagate to consumers.
    pub(crate) fn record(&self, plan: &BuildPlan, err: DiError) -> DiError {
        match innermost(&err) {
            DiError::UpstreamFailure { .. } | DiError::AsyncRequired { .. } => return err,
            _ => {}
        }
        if !self.failed.lock().insert(plan.cache_key()) {
            return Self::upstream(plan);
        }

        warn!(
            target: "ferrous_ioc",
            plugin = %plan.plugin_type(),
            instance = plan.instance().name(),
            error = %err,
            "build failure during validation"
        );
        self.report.lock().build_failures.push(BuildFailure {
            plugin_type: plan.plugin_type().short_name(),
            instance: plan.instance().name().to_string(),
            message: err.to_string(),
        });
        Self::upstream(plan)
    }

    /// Records a failed validation method once per type and method.
    pub(crate) fn record_validation_error(&self, concrete_type: String, method: &str, message: String) {
        let mut report = self.report.lock();
        if report
            .validation_errors
            .iter()
            .any(|f| f.concrete_type == concrete_type && f.method == method)
        {
            return;
        }
        warn!(target: "ferrous_ioc", concrete_type = %concrete_type, method, message = %message, "validation method failed");
        report.validation_errors.push(ValidationFailure {
            concrete_type,
            method: method.to_string(),
            message,
        });
    }

    pub(crate) fn report(&self) -> ValidationReport {
        self.report.lock().clone()
    }
}

impl fmt::Debug for ValidationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ValidationState")
            .field("failed", &self.failed.lock().len())
            .finish()
    }
}

/// The innermost container error, looking through argument wrappers and
/// container errors returned from user code.
fn innermost(err: &DiError) -> &DiError {
    let mut current = err.root_cause();
    loop {
        let nested = match current {
            DiError::Build { source, .. } | DiError::Interceptor { source, .. } => source.downcast_ref::<DiError>(),
            _ => None,
        };
        match nested {
            Some(inner) => current = inner.root_cause(),
            None => return current,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn innermost_sees_through_user_code() {
        let upstream = DiError::UpstreamFailure {
            plugin_type: "A".to_string(),
            instance: "a".to_string(),
        };
        let wrapped = DiError::Argument {
            concrete_type: "C".to_string(),
            member: "constructor argument 'b'".to_string(),
            source: Box::new(DiError::Build {
                instance: "Lambda returning B".to_string(),
                source: Box::new(upstream),
            }),
        };
        assert!(matches!(innermost(&wrapped), DiError::UpstreamFailure { .. }));
    }

    #[test]
    fn report_counts_both_kinds() {
        let report = ValidationReport {
            build_failures: vec![BuildFailure {
                plugin_type: "dyn Widget".to_string(),
                instance: "red".to_string(),
                message: "boom".to_string(),
            }],
            validation_errors: vec![ValidationFailure {
                concrete_type: "Pool".to_string(),
                method: "check_size".to_string(),
                message: "empty".to_string(),
            }],
        };
        let text = report.to_string();
        assert!(!report.is_valid());
        assert!(text.contains("1 build failure(s), 1 validation error(s)"));
        assert!(text.contains("Pool::check_size"));
    }

    #[test]
    fn duplicate_validation_errors_are_merged() {
        let state = ValidationState::default();
        state.record_validation_error("Pool".to_string(), "check", "empty".to_string());
        state.record_validation_error("Pool".to_string(), "check", "empty".to_string());
        assert_eq!(state.report().validation_errors.len(), 1);
    }
}
