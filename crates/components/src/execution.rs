//! Interpretation of stage outcomes reported by the external pipeline runner.
//!
//! Nothing here schedules or awaits a run. The runner executes the declared
//! stages and reports what happened; [`interpret`] maps each report onto the
//! pipeline-run half of the error taxonomy. There is no retry.

use serde::{Deserialize, Serialize};

use construct::{StackError, StackResult};

/// Why the source stage could not produce its artifact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SourceStatus {
    Fetched { commit: String },
    RepositoryNotFound,
    BranchNotFound,
    CredentialRejected,
}

/// State of the target service when a deployment is attempted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServiceState {
    Active,
    Draining,
    Inactive,
    Missing,
}

impl ServiceState {
    pub fn is_deployable(self) -> bool {
        matches!(self, Self::Active)
    }
}

/// Outcome of one stage, as reported by the runner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "stage", rename_all = "snake_case")]
pub enum StageReport {
    Source(SourceStatus),
    Build { exit_code: i32 },
    Deploy { service: String, state: ServiceState },
}

/// Maps a single stage report onto success or a pipeline-run error.
pub fn interpret(report: &StageReport) -> StackResult<()> {
    match report {
        StageReport::Source(status) => match status {
            SourceStatus::Fetched { .. } => Ok(()),
            SourceStatus::RepositoryNotFound => Err(source_unavailable("repository not found")),
            SourceStatus::BranchNotFound => Err(source_unavailable("branch not found")),
            SourceStatus::CredentialRejected => Err(source_unavailable("credential rejected")),
        },
        StageReport::Build { exit_code: 0 } => Ok(()),
        StageReport::Build { exit_code } => Err(StackError::BuildFailed { exit_code: *exit_code }),
        StageReport::Deploy { state, .. } if state.is_deployable() => Ok(()),
        StageReport::Deploy { service, state } => Err(StackError::DeployFailed {
            service: service.clone(),
            reason: format!("service is {state:?}").to_lowercase(),
        }),
    }
}

fn source_unavailable(reason: &str) -> StackError {
    StackError::SourceUnavailable {
        reason: reason.to_owned(),
    }
}

/// Interprets a full run in stage order, stopping at the first failure.
pub fn interpret_run<'a>(reports: impl IntoIterator<Item = &'a StageReport>) -> StackResult<()> {
    reports.into_iter().try_for_each(interpret)
}

#[cfg(test)]
mod tests {
    use super::*;
    use construct::FailureSurface;
    use test_case::test_case;

    #[test_case(StageReport::Source(SourceStatus::Fetched { commit: "abc123".into() }) ; "fetched source")]
    #[test_case(StageReport::Build { exit_code: 0 } ; "clean build")]
    #[test_case(StageReport::Deploy { service: "web".into(), state: ServiceState::Active } ; "active service")]
    fn successful_stages(report: StageReport) {
        assert_eq!(interpret(&report), Ok(()));
    }

    #[test]
    fn non_zero_build_exit_is_build_failed() {
        let err = interpret(&StageReport::Build { exit_code: 2 }).unwrap_err();
        assert_eq!(err, StackError::BuildFailed { exit_code: 2 });
        assert_eq!(err.surface(), FailureSurface::PipelineRun);
    }

    #[test_case(SourceStatus::RepositoryNotFound, "repository not found")]
    #[test_case(SourceStatus::BranchNotFound, "branch not found")]
    #[test_case(SourceStatus::CredentialRejected, "credential rejected")]
    fn unreachable_source(status: SourceStatus, reason: &str) {
        assert_eq!(
            interpret(&StageReport::Source(status)),
            Err(StackError::SourceUnavailable { reason: reason.into() })
        );
    }

    #[test]
    fn draining_service_cannot_take_a_deployment() {
        let err = interpret(&StageReport::Deploy {
            service: "web".into(),
            state: ServiceState::Draining,
        })
        .unwrap_err();
        assert_eq!(
            err,
            StackError::DeployFailed {
                service: "web".into(),
                reason: "service is draining".into(),
            }
        );
    }

    #[test]
    fn run_stops_at_first_failure() {
        let reports = [
            StageReport::Source(SourceStatus::Fetched { commit: "abc".into() }),
            StageReport::Build { exit_code: 1 },
            StageReport::Deploy { service: "web".into(), state: ServiceState::Missing },
        ];
        assert_eq!(interpret_run(&reports), Err(StackError::BuildFailed { exit_code: 1 }));
    }

    #[test]
    fn reports_parse_from_runner_json() {
        let report: StageReport =
            serde_json::from_str(r#"{"stage":"deploy","service":"web","state":"inactive"}"#).unwrap();
        assert!(interpret(&report).is_err());
    }
}
