//! Three-stage delivery pipeline: Source, Build, Deploy.
//!
//! The pipeline owns an artifact store, its own role, the build project and
//! the build role's registry grant. Stages are assembled through
//! [`stage::StagePlan`], so artifact threading is fixed at compile time and
//! re-checked with [`validate_threading`] before the pipeline node is declared.

pub mod stage;

use construct::config::{BuildSection, GithubSource, PipelineSection};
use construct::types::RegistryAccess;
use construct::{
    kind, BranchName, ConfigurationError, Handle, Scope, SecretName, SecretStore, StackError, StackResult,
};
use serde_json::json;
use tracing::{debug, info};

use crate::grants::grant_registry_access;
use crate::outputs;
use crate::service::ManagedService;

pub use stage::{validate_threading, Action, Artifact, Stage, StagePlan};

/// The declared pipeline and the nodes it owns.
#[derive(Debug, Clone)]
pub struct DeliveryPipeline {
    pipeline: Handle<kind::Pipeline>,
    build_project: Handle<kind::BuildProject>,
    build_role: Handle<kind::Role>,
    artifact_store: Handle<kind::ArtifactStore>,
    stages: Vec<Stage>,
}

impl DeliveryPipeline {
    /// Declares the pipeline in a child scope of `parent`, deploying to
    /// `service`.
    ///
    /// Binds the `pipelineArn` output.
    pub fn create(
        parent: &Scope,
        id: &str,
        service: &ManagedService,
        config: &PipelineSection,
    ) -> StackResult<(Self, Scope)> {
        let mut scope = Scope::child(parent, id)?;
        let github = &config.source.github;
        let token_secret = SecretName::new(github.token_secret_name.as_str())
            .filter(|name| !name.as_str().trim().is_empty())
            .ok_or_else(|| ConfigurationError::missing("pipeline.source.github.token_secret_name"))?;
        let branch = BranchName::new(github.branch.trim())
            .ok_or_else(|| ConfigurationError::missing("pipeline.source.github.branch"))?;

        let artifact_store = scope.declare::<kind::ArtifactStore>(
            "ArtifactsBucket",
            json!({ "encryption": "S3_MANAGED", "versioned": true }),
            &[],
        )?;
        let pipeline_role = scope.declare::<kind::Role>(
            "Role",
            json!({ "assumedBy": "codepipeline.amazonaws.com" }),
            &[],
        )?;
        let build_role = scope.declare::<kind::Role>(
            "BuildRole",
            json!({ "assumedBy": "codebuild.amazonaws.com" }),
            &[],
        )?;

        let registry = service.registry();
        let build_project = declare_build_project(&mut scope, &config.build, service, &build_role)?;
        let build_grant = grant_registry_access(
            &mut scope,
            "BuildRoleRegistryGrant",
            &build_role,
            registry,
            &[RegistryAccess::Pull, RegistryAccess::Push],
        )?;

        let stages = StagePlan::new()
            .source(stage::SourceSpec {
                owner: github.owner.clone(),
                repo: github.repo.clone(),
                branch,
                token_secret,
            })?
            .build(build_project.name()?)?
            .deploy(service.cluster().name()?, service.service().name()?)
            .finish();
        validate_threading(&stages)?;
        for stage in &stages {
            debug!(stage = %stage.name, actions = stage.actions.len(), "pipeline stage planned");
        }

        let pipeline = scope.declare::<kind::Pipeline>(
            &config.id,
            json!({
                "role": pipeline_role.arn()?,
                "artifactStore": artifact_store.name()?,
                "restartExecutionOnUpdate": false,
                "stages": stages.iter().map(Stage::to_json).collect::<Vec<_>>(),
            }),
            &[
                &pipeline_role,
                &artifact_store,
                &build_project,
                &build_grant,
                service.cluster(),
                service.service(),
            ],
        )?;

        scope.output(outputs::PIPELINE_ARN, pipeline.arn()?)?;
        info!(scope = %scope.path(), stages = stages.len(), "delivery pipeline created");

        Ok((
            Self {
                pipeline,
                build_project,
                build_role,
                artifact_store,
                stages,
            },
            scope,
        ))
    }

    /// Re-checks positional artifact threading on an assembled stage list.
    pub fn validate_threading(stages: &[Stage]) -> StackResult<()> {
        validate_threading(stages)
    }

    pub fn pipeline(&self) -> &Handle<kind::Pipeline> {
        &self.pipeline
    }

    pub fn build_project(&self) -> &Handle<kind::BuildProject> {
        &self.build_project
    }

    /// Role the build runs as; holds push and pull on the registry.
    pub fn build_role(&self) -> &Handle<kind::Role> {
        &self.build_role
    }

    pub fn artifact_store(&self) -> &Handle<kind::ArtifactStore> {
        &self.artifact_store
    }

    pub fn stages(&self) -> &[Stage] {
        &self.stages
    }
}

fn declare_build_project(
    scope: &mut Scope,
    build: &BuildSection,
    service: &ManagedService,
    role: &Handle<kind::Role>,
) -> StackResult<Handle<kind::BuildProject>> {
    let registry = service.registry();
    scope.declare::<kind::BuildProject>(
        &build.id,
        json!({
            "role": role.arn()?,
            "environment": {
                "image": build.image,
                "privileged": build.privileged,
                "variables": {
                    "REPOSITORY_URI": registry.output("Uri")?,
                    "CONTAINER_NAME": service.container_identity().as_str(),
                },
            },
            "cache": { "type": "LOCAL", "modes": [build.cache_mode.as_str()] },
            "timeoutMinutes": build.timeout_minutes,
            "source": "CODEPIPELINE",
        }),
        &[role, registry],
    )
}

/// Resolves the source credential ahead of synthesis.
///
/// The value is discarded; only reachability matters. Any lookup failure is a
/// [`StackError::SourceUnavailable`].
pub fn verify_source_credential(store: &dyn SecretStore, github: &GithubSource) -> StackResult<()> {
    let name = SecretName::new(github.token_secret_name.as_str())
        .ok_or_else(|| ConfigurationError::missing("pipeline.source.github.token_secret_name"))?;
    store.resolve(&name).map_err(|e| StackError::SourceUnavailable {
        reason: format!("{}/{}@{}: {e}", github.owner, github.repo, github.branch),
    })?;
    debug!(secret = %name, "source credential resolved");
    Ok(())
}
