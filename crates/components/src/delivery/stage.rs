//! Pipeline stages, actions, and positional artifact threading.
//!
//! [`StagePlan`] is a typestate builder: `source` is only callable on an empty
//! plan, `build` only after `source`, `deploy` only after `build`, and
//! `finish` only after `deploy`. The artifact a stage produces is an
//! [`Artifact`] token moved into the next stage's action, so it has exactly
//! one consumer and cannot skip a stage.

use serde::Serialize;
use serde_json::{json, Value};

use construct::{ArtifactName, BranchName, ConfigurationError, SecretName, StackError, StackResult};

/// Opaque handle to data passed between adjacent stages.
///
/// Deliberately neither `Clone` nor `Copy`.
#[derive(Debug, PartialEq, Eq)]
pub struct Artifact {
    name: ArtifactName,
}

impl Artifact {
    fn produced_by(stage: &str, action: &str) -> StackResult<Self> {
        ArtifactName::new(format!("Artifact_{stage}_{action}"))
            .map(|name| Self { name })
            .ok_or_else(|| ConfigurationError::missing("artifact name").into())
    }

    pub fn name(&self) -> &ArtifactName {
        &self.name
    }

    fn into_name(self) -> ArtifactName {
        self.name
    }
}

// ---------------------------------------------------------------------------
// Actions
// ---------------------------------------------------------------------------

/// Pulls one branch of an external repository. Produces an artifact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SourceAction {
    pub name: String,
    pub owner: String,
    pub repo: String,
    pub branch: BranchName,
    /// Looked up by name at run time; the value is never declared.
    pub token_secret: SecretName,
    pub output: ArtifactName,
}

/// Runs the containerised build. Consumes the source artifact, produces the
/// build artifact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BuildAction {
    pub name: String,
    /// Output token of the build project that runs this action.
    pub project: String,
    pub input: ArtifactName,
    pub output: ArtifactName,
}

/// Rolls the build artifact out to the service. Consumes an artifact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeployAction {
    pub name: String,
    pub cluster: String,
    pub service: String,
    pub image_file: String,
    pub input: ArtifactName,
}

/// An action, classified by what it does with artifacts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "category", rename_all = "snake_case")]
pub enum Action {
    Source(SourceAction),
    Build(BuildAction),
    Deploy(DeployAction),
}

impl Action {
    pub fn name(&self) -> &str {
        match self {
            Self::Source(a) => &a.name,
            Self::Build(a) => &a.name,
            Self::Deploy(a) => &a.name,
        }
    }

    /// Artifact this action consumes, if any.
    pub fn input(&self) -> Option<&ArtifactName> {
        match self {
            Self::Source(_) => None,
            Self::Build(a) => Some(&a.input),
            Self::Deploy(a) => Some(&a.input),
        }
    }

    /// Artifact this action produces, if any.
    pub fn output(&self) -> Option<&ArtifactName> {
        match self {
            Self::Source(a) => Some(&a.output),
            Self::Build(a) => Some(&a.output),
            Self::Deploy(_) => None,
        }
    }

    fn position(&self) -> usize {
        match self {
            Self::Source(_) => 0,
            Self::Build(_) => 1,
            Self::Deploy(_) => 2,
        }
    }

    fn to_json(&self) -> Value {
        match self {
            Self::Source(a) => json!({
                "name": a.name,
                "provider": "GitHub",
                "owner": a.owner,
                "repo": a.repo,
                "branch": a.branch,
                "oauthToken": format!("{{{{resolve:secretsmanager:{}}}}}", a.token_secret),
                "outputs": [a.output],
            }),
            Self::Build(a) => json!({
                "name": a.name,
                "provider": "CodeBuild",
                "project": a.project,
                "inputs": [a.input],
                "outputs": [a.output],
            }),
            Self::Deploy(a) => json!({
                "name": a.name,
                "provider": "ECS",
                "cluster": a.cluster,
                "service": a.service,
                "imageFile": a.image_file,
                "inputs": [a.input],
            }),
        }
    }
}

/// One named slot of the pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Stage {
    pub name: String,
    pub actions: Vec<Action>,
}

impl Stage {
    fn single(name: &str, action: Action) -> Self {
        Self {
            name: name.to_owned(),
            actions: vec![action],
        }
    }

    fn input(&self) -> Option<&ArtifactName> {
        self.actions.iter().find_map(Action::input)
    }

    fn output(&self) -> Option<&ArtifactName> {
        self.actions.iter().find_map(Action::output)
    }

    pub fn to_json(&self) -> Value {
        json!({
            "name": self.name,
            "actions": self.actions.iter().map(Action::to_json).collect::<Vec<_>>(),
        })
    }
}

// ---------------------------------------------------------------------------
// Typestate builder
// ---------------------------------------------------------------------------

/// Settings for the source action; the builder assigns its output.
#[derive(Debug, Clone)]
pub struct SourceSpec {
    pub owner: String,
    pub repo: String,
    pub branch: BranchName,
    pub token_secret: SecretName,
}

/// Plan state: nothing declared yet.
#[derive(Debug)]
pub struct Empty;

/// Plan state: source declared, its artifact waiting for a consumer.
#[derive(Debug)]
pub struct Sourced(Artifact);

/// Plan state: build declared, its artifact waiting for a consumer.
#[derive(Debug)]
pub struct Built(Artifact);

/// Plan state: all three stages declared.
#[derive(Debug)]
pub struct Deployed;

/// Ordered stage list under construction.
#[derive(Debug)]
pub struct StagePlan<S> {
    stages: Vec<Stage>,
    state: S,
}

pub const SOURCE_STAGE: &str = "Source";
pub const BUILD_STAGE: &str = "Build";
pub const DEPLOY_STAGE: &str = "Deploy";

impl StagePlan<Empty> {
    pub fn new() -> Self {
        Self {
            stages: Vec::with_capacity(3),
            state: Empty,
        }
    }

    pub fn source(mut self, spec: SourceSpec) -> StackResult<StagePlan<Sourced>> {
        let action_name = "Github_Source";
        let artifact = Artifact::produced_by(SOURCE_STAGE, action_name)?;
        self.stages.push(Stage::single(
            SOURCE_STAGE,
            Action::Source(SourceAction {
                name: action_name.to_owned(),
                owner: spec.owner,
                repo: spec.repo,
                branch: spec.branch,
                token_secret: spec.token_secret,
                output: artifact.name().clone(),
            }),
        ));
        Ok(StagePlan {
            stages: self.stages,
            state: Sourced(artifact),
        })
    }
}

impl Default for StagePlan<Empty> {
    fn default() -> Self {
        Self::new()
    }
}

impl StagePlan<Sourced> {
    pub fn build(mut self, project: impl Into<String>) -> StackResult<StagePlan<Built>> {
        let action_name = "CodeBuild_Action";
        let Sourced(input) = self.state;
        let artifact = Artifact::produced_by(BUILD_STAGE, action_name)?;
        self.stages.push(Stage::single(
            BUILD_STAGE,
            Action::Build(BuildAction {
                name: action_name.to_owned(),
                project: project.into(),
                input: input.into_name(),
                output: artifact.name().clone(),
            }),
        ));
        Ok(StagePlan {
            stages: self.stages,
            state: Built(artifact),
        })
    }
}

impl StagePlan<Built> {
    pub fn deploy(mut self, cluster: impl Into<String>, service: impl Into<String>) -> StagePlan<Deployed> {
        let Built(input) = self.state;
        self.stages.push(Stage::single(
            DEPLOY_STAGE,
            Action::Deploy(DeployAction {
                name: "ECSDeploy_Action".to_owned(),
                cluster: cluster.into(),
                service: service.into(),
                image_file: "imagedefinitions.json".to_owned(),
                input: input.into_name(),
            }),
        ));
        StagePlan {
            stages: self.stages,
            state: Deployed,
        }
    }
}

impl StagePlan<Deployed> {
    pub fn finish(self) -> Vec<Stage> {
        self.stages
    }
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

/// Checks a stage list against the fixed topology: exactly Source, Build,
/// Deploy in that order, each stage consuming precisely what the previous one
/// produced, nothing consumed by the first stage and nothing left over after
/// the last.
pub fn validate_threading(stages: &[Stage]) -> StackResult<()> {
    let order: Vec<usize> = stages
        .iter()
        .flat_map(|s| s.actions.iter().map(Action::position))
        .collect();
    if order != [0, 1, 2] || stages.iter().any(|s| s.actions.len() != 1) {
        let names: Vec<&str> = stages.iter().map(|s| s.name.as_str()).collect();
        return Err(ConfigurationError::invalid(
            "pipeline stages",
            format!("expected Source, Build, Deploy with one action each, got {names:?}"),
        )
        .into());
    }

    let mut produced: Option<&ArtifactName> = None;
    for stage in stages {
        match (produced, stage.input()) {
            (None, None) => {}
            (Some(expected), Some(actual)) if expected == actual => {}
            (expected, _) => {
                return Err(StackError::unresolved(
                    format!("stage '{}'", stage.name),
                    expected.map_or_else(|| "no artifact".to_owned(), ToString::to_string),
                ));
            }
        }
        produced = stage.output();
    }
    if let Some(leftover) = produced {
        return Err(ConfigurationError::invalid(
            "pipeline stages",
            format!("artifact '{leftover}' is produced by the last stage but never consumed"),
        )
        .into());
    }
    Ok(())
}
