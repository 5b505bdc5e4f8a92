//! End-to-end synthesis over a full configuration.

use std::collections::BTreeSet;

use components::delivery::{Action, DeliveryPipeline};
use components::grants::registry_access_by_role;
use components::{outputs, synthesize, synthesize_with};
use construct::types::{Protocol, RegistryAccess};
use construct::{
    ConfigurationError, Credential, ResourceKind, SecretError, SecretName, SecretStore, StackConfig,
    StackError,
};
use pretty_assertions::assert_eq;
use proptest::prelude::*;
use test_case::test_case;

const CONFIG: &str = r#"
[stack]
id = "web-stack"

[cluster.vpc]
id = "vpc-1"
name = "starter-vpc"

[cluster.ecs_cluster]
id = "ecs-cluster-1"

[server]
port = 3000

[server.environment]
NODE_ENV = "production"

[server.security_group]
id = "server-sg"

[server.iam_role]
id = "server-role"

[server.load_balancer]
id = "server-lb"
certificate_arn = "arn:aws:acm:eu-west-1:123456789012:certificate/abc"

[server.ecr]
repo_id = "ecr-repo-1"

[server.health_check]
port = { fixed = 3006 }

[pipeline]
id = "server-pipeline"

[pipeline.source.github]
owner = "acme"
repo = "web"
token_secret_name = "GITHUB_TOKEN"
branch = "master"

[pipeline.build]
id = "server-build"
"#;

fn config() -> StackConfig {
    StackConfig::from_toml_str(CONFIG).unwrap()
}

fn count(declaration: &construct::Declaration, kind: ResourceKind) -> usize {
    declaration.nodes.iter().filter(|n| n.kind() == kind).count()
}

#[test]
fn one_of_each_component_in_dependency_order() {
    let stack = synthesize(&config()).unwrap();
    let declaration = &stack.declaration;

    assert_eq!(count(declaration, ResourceKind::Network), 1);
    assert_eq!(count(declaration, ResourceKind::ComputeCluster), 1);
    assert_eq!(count(declaration, ResourceKind::Service), 1);
    assert_eq!(count(declaration, ResourceKind::Pipeline), 1);

    let position = |path: &construct::NodePath| {
        declaration
            .nodes
            .iter()
            .position(|n| n.path() == path)
            .unwrap()
    };
    let network = position(stack.network.network().path());
    let cluster = position(stack.network.cluster().path());
    let service = position(stack.service.service().path());
    let pipeline = position(stack.pipeline.pipeline().path());
    assert!(network < cluster && cluster < service && service < pipeline);

    let service_node = declaration.node(stack.service.service().path().as_str()).unwrap();
    assert_eq!(
        service_node.attribute("cluster").and_then(|v| v.as_str()),
        Some(stack.network.cluster().arn().unwrap())
    );

    let deploy = stack.pipeline.stages().last().unwrap();
    match &deploy.actions[0] {
        Action::Deploy(action) => assert_eq!(action.service, stack.service.service().name().unwrap()),
        other => panic!("expected a deploy action, got {other:?}"),
    }
}

#[test]
fn every_edge_points_backwards() {
    let declaration = synthesize(&config()).unwrap().declaration;
    let index: std::collections::HashMap<_, _> = declaration
        .nodes
        .iter()
        .enumerate()
        .map(|(i, n)| (n.path().clone(), i))
        .collect();
    for edge in &declaration.edges {
        assert!(index[&edge.from] < index[&edge.to], "{} -> {}", edge.from, edge.to);
    }
}

#[test]
fn artifact_threading_is_positional() {
    let stack = synthesize(&config()).unwrap();
    let stages = stack.pipeline.stages();
    let names: Vec<&str> = stages.iter().map(|s| s.name.as_str()).collect();
    assert_eq!(names, vec!["Source", "Build", "Deploy"]);

    let source_out = stages[0].actions[0].output().unwrap();
    assert_eq!(stages[0].actions[0].input(), None);
    assert_eq!(stages[1].actions[0].input(), Some(source_out));
    assert_eq!(stages[2].actions[0].input(), stages[1].actions[0].output());
    assert_eq!(stages[2].actions[0].output(), None);
    DeliveryPipeline::validate_threading(stages).unwrap();
}

#[test]
fn execution_role_pulls_and_build_role_pushes() {
    let stack = synthesize(&config()).unwrap();
    let access = registry_access_by_role(&stack.declaration);

    assert_eq!(access.len(), 2);
    assert_eq!(
        access[stack.service.execution_role().path()],
        BTreeSet::from([RegistryAccess::Pull])
    );
    assert_eq!(
        access[stack.pipeline.build_role().path()],
        BTreeSet::from([RegistryAccess::Pull, RegistryAccess::Push])
    );
    assert!(!access.contains_key(stack.service.service_role().path()));
}

#[test]
fn port_3000_scenario() {
    let stack = synthesize(&config()).unwrap();
    let service = &stack.service;

    let rules = service.ingress_rules();
    assert_eq!(rules.len(), 1);
    assert_eq!(rules[0].protocol, Protocol::Tcp);
    assert_eq!(rules[0].port.as_u16(), 3000);
    assert_eq!(rules[0].source, "0.0.0.0/0");

    let scaling = service.autoscaling();
    assert_eq!((scaling.bounds.min(), scaling.bounds.max()), (1, 3));
    assert_eq!(scaling.cpu.target.as_u8(), 50);
    assert_eq!(scaling.cpu.scale_in_cooldown.as_secs(), 60);
    assert_eq!(scaling.cpu.scale_out_cooldown.as_secs(), 60);
}

#[test]
fn health_check_uses_the_configured_port_not_the_service_port() {
    let stack = synthesize(&config()).unwrap();
    let target_group = stack
        .declaration
        .node(stack.service.target_group().path().as_str())
        .unwrap();
    assert_eq!(target_group.attribute("port"), Some(&serde_json::json!(3000)));
    assert_eq!(
        target_group.attribute("healthCheck").unwrap()["port"],
        serde_json::json!(3006)
    );
}

#[test]
fn config_without_health_check_port_does_not_parse() {
    let document = CONFIG.replace("port = { fixed = 3006 }\n", "path = \"/\"\n");
    let err = StackConfig::from_toml_str(&document).unwrap_err();
    assert!(matches!(
        err,
        StackError::Configuration(ConfigurationError::Parse { ref message }) if message.contains("port")
    ));
}

#[test]
fn missing_token_secret_name_fails_before_any_node() {
    let mut config = config();
    config.pipeline.source.github.token_secret_name = String::new();

    let err = synthesize(&config).unwrap_err();
    assert_eq!(
        err,
        StackError::Configuration(ConfigurationError::MissingField {
            field: "pipeline.source.github.token_secret_name".into(),
        })
    );
}

#[test]
fn config_without_token_secret_name_does_not_parse() {
    let document = CONFIG.replace("token_secret_name = \"GITHUB_TOKEN\"\n", "");
    let err = StackConfig::from_toml_str(&document).unwrap_err();
    assert!(matches!(err, StackError::Configuration(ConfigurationError::Parse { .. })));
}

#[test]
fn well_formed_config_binds_all_outputs() {
    let declaration = synthesize(&config()).unwrap().declaration;
    for name in outputs::ALL {
        let value = declaration.output(name).unwrap_or_default();
        assert!(!value.is_empty(), "output {name} is empty");
    }
    assert_eq!(declaration.output(outputs::CONTAINER_NAME), Some("web"));
}

#[test_case("server-pipeline" ; "build project takes the pipeline id")]
#[test_case("ArtifactsBucket" ; "build project takes the artifact store id")]
fn sibling_collision_names_the_id(build_id: &str) {
    let mut config = config();
    config.pipeline.build.id = build_id.into();

    let err = synthesize(&config).unwrap_err();
    assert!(matches!(
        err,
        StackError::Configuration(ConfigurationError::DuplicateId { ref id, .. }) if id.as_str() == build_id
    ));
    assert!(err.to_string().contains(build_id));
}

#[test]
fn same_id_in_different_components_is_allowed() {
    let mut config = config();
    config.cluster.vpc.id = config.server.security_group.id.clone();
    assert!(synthesize(&config).is_ok());
}

struct Vault(Option<&'static str>);

impl SecretStore for Vault {
    fn resolve(&self, name: &SecretName) -> Result<Credential, SecretError> {
        self.0.map(Credential::new).ok_or_else(|| SecretError::NotFound(name.clone()))
    }
}

#[test]
fn secret_preflight_surfaces_source_unavailable() {
    let err = synthesize_with(&config(), Some(&Vault(None))).unwrap_err();
    assert!(matches!(err, StackError::SourceUnavailable { .. }));

    let stack = synthesize_with(&config(), Some(&Vault(Some("ghp_secret")))).unwrap();
    let json = stack.declaration.to_json().unwrap();
    assert!(!json.contains("ghp_secret"));
    assert!(json.contains("{{resolve:secretsmanager:GITHUB_TOKEN}}"));
}

proptest! {
    #[test]
    fn synthesis_is_idempotent(
        port in 1u16..=u16::MAX,
        min in 1u32..4,
        extra in 0u32..8,
        target in 1u8..=100,
    ) {
        let mut config = config();
        config.server.port = construct::types::Port::new(port).unwrap();
        config.server.autoscaling.capacity = construct::types::CapacityBounds::new(min, min + extra).unwrap();
        config.server.container.desired_count = min;
        config.server.autoscaling.cpu.target = construct::types::Percent::new(target).unwrap();

        let first = synthesize(&config).unwrap();
        let second = synthesize(&config).unwrap();
        prop_assert_ne!(first.synthesis_id, second.synthesis_id);
        prop_assert_eq!(&first.declaration, &second.declaration);
        prop_assert!(DeliveryPipeline::validate_threading(first.pipeline.stages()).is_ok());
    }
}
