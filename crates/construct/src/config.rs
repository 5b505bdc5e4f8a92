//! Static stack configuration.
//!
//! The configuration is loaded once, validated as a whole, and only then
//! handed to synthesis; a missing or empty required field fails with
//! [`ConfigurationError`] before any scope or resource node exists.
//!
//! Optional fields default to the values the web-service topology was
//! designed around (one task, `web` container, 1..3 tasks at 50 % CPU, ...).

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::types::{seconds, CapacityBounds, CpuScaling, DnsRecordType, HealthProbe, LocalCacheMode, Port};
use crate::{ConfigurationError, ConstructId, StackResult};

/// Top-level configuration document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StackConfig {
    pub stack: StackSection,
    pub cluster: ClusterSection,
    pub server: ServerSection,
    pub pipeline: PipelineSection,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StackSection {
    pub id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusterSection {
    pub vpc: VpcSection,
    pub ecs_cluster: IdSection,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VpcSection {
    pub id: String,
    pub name: String,
}

/// A section that only carries a construct id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IdSection {
    pub id: String,
}

// ---------------------------------------------------------------------------
// Server
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerSection {
    pub security_group: IdSection,
    pub port: Port,
    #[serde(default)]
    pub environment: BTreeMap<String, String>,
    pub iam_role: RoleSection,
    pub load_balancer: LoadBalancerSection,
    pub ecr: RegistrySection,
    #[serde(default)]
    pub container: ContainerSection,
    /// Cookie stickiness duration on the traffic target.
    #[serde(default = "default_stickiness", with = "seconds", rename = "stickiness_secs")]
    pub stickiness: std::time::Duration,
    /// Required: the probe port is never inferred from `port`.
    pub health_check: HealthProbe,
    #[serde(default)]
    pub autoscaling: AutoscalingSection,
}

fn default_stickiness() -> std::time::Duration {
    std::time::Duration::from_secs(24 * 60 * 60)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoleSection {
    pub id: String,
    /// Externally defined monitoring policy attached to the task role.
    #[serde(default = "default_monitoring_policy")]
    pub managed_policy: String,
}

fn default_monitoring_policy() -> String {
    "CloudWatchFullAccess".to_owned()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoadBalancerSection {
    pub id: String,
    /// Pre-issued certificate, referenced by ARN. Parsed when the service is
    /// created.
    pub certificate_arn: String,
    #[serde(default = "yes")]
    pub public: bool,
    #[serde(default)]
    pub record_type: DnsRecordType,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegistrySection {
    pub repo_id: String,
}

/// Where the service's container image comes from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContainerImage {
    /// Built from a local directory holding a Dockerfile.
    Asset(String),
    /// Pulled from an existing image reference.
    Registry(String),
}

impl ContainerImage {
    fn reference(&self) -> &str {
        match self {
            Self::Asset(dir) | Self::Registry(dir) => dir,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContainerSection {
    #[serde(default = "default_image")]
    pub image: ContainerImage,
    #[serde(default = "default_container_name")]
    pub name: String,
    #[serde(default = "default_desired_count")]
    pub desired_count: u32,
}

fn default_image() -> ContainerImage {
    ContainerImage::Asset(".".to_owned())
}

fn default_container_name() -> String {
    "web".to_owned()
}

fn default_desired_count() -> u32 {
    1
}

impl Default for ContainerSection {
    fn default() -> Self {
        Self {
            image: default_image(),
            name: default_container_name(),
            desired_count: default_desired_count(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AutoscalingSection {
    #[serde(default)]
    pub capacity: CapacityBounds,
    #[serde(default)]
    pub cpu: CpuScaling,
}

// ---------------------------------------------------------------------------
// Pipeline
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineSection {
    pub id: String,
    pub source: SourceSection,
    pub build: BuildSection,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceSection {
    pub github: GithubSource,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GithubSource {
    pub owner: String,
    pub repo: String,
    pub token_secret_name: String,
    pub branch: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BuildSection {
    pub id: String,
    #[serde(default = "default_build_image")]
    pub image: String,
    #[serde(default = "yes")]
    pub privileged: bool,
    #[serde(default)]
    pub cache_mode: LocalCacheMode,
    /// Passed through to the build runner; never enforced here.
    #[serde(default = "default_build_timeout")]
    pub timeout_minutes: u32,
}

fn default_build_image() -> String {
    "aws/codebuild/standard:5.0".to_owned()
}

fn default_build_timeout() -> u32 {
    60
}

fn yes() -> bool {
    true
}

// ---------------------------------------------------------------------------
// Loading and validation
// ---------------------------------------------------------------------------

impl StackConfig {
    /// Parses and validates a TOML document.
    pub fn from_toml_str(document: &str) -> StackResult<Self> {
        let config: Self = toml::from_str(document).map_err(|e| ConfigurationError::Parse {
            message: e.message().to_owned(),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Checks every required field. Runs before synthesis creates anything.
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        let github = &self.pipeline.source.github;
        let ids = [
            ("stack.id", &self.stack.id),
            ("cluster.vpc.id", &self.cluster.vpc.id),
            ("cluster.ecs_cluster.id", &self.cluster.ecs_cluster.id),
            ("server.security_group.id", &self.server.security_group.id),
            ("server.iam_role.id", &self.server.iam_role.id),
            ("server.load_balancer.id", &self.server.load_balancer.id),
            ("server.ecr.repo_id", &self.server.ecr.repo_id),
            ("pipeline.id", &self.pipeline.id),
            ("pipeline.build.id", &self.pipeline.build.id),
        ];
        let values = [
            ("cluster.vpc.name", &self.cluster.vpc.name),
            ("server.iam_role.managed_policy", &self.server.iam_role.managed_policy),
            ("server.load_balancer.certificate_arn", &self.server.load_balancer.certificate_arn),
            ("server.container.name", &self.server.container.name),
            ("pipeline.source.github.owner", &github.owner),
            ("pipeline.source.github.repo", &github.repo),
            ("pipeline.source.github.token_secret_name", &github.token_secret_name),
            ("pipeline.source.github.branch", &github.branch),
            ("pipeline.build.image", &self.pipeline.build.image),
        ];

        for (field, value) in ids.iter().chain(values.iter()) {
            if value.trim().is_empty() {
                return Err(ConfigurationError::missing(*field));
            }
        }
        for (field, value) in ids {
            if value.trim() != value.as_str() {
                return Err(ConfigurationError::invalid(field, "must not have surrounding whitespace"));
            }
            if ConstructId::new(value.as_str()).is_none() {
                return Err(ConfigurationError::invalid(field, "must not contain '/'"));
            }
        }

        if self.server.container.image.reference().trim().is_empty() {
            return Err(ConfigurationError::missing("server.container.image"));
        }
        if self.server.environment.keys().any(|k| k.trim().is_empty()) {
            return Err(ConfigurationError::invalid("server.environment", "variable names must be non-empty"));
        }

        let capacity = self.server.autoscaling.capacity;
        let desired = self.server.container.desired_count;
        if desired < capacity.min() || desired > capacity.max() {
            return Err(ConfigurationError::invalid(
                "server.container.desired_count",
                format!("{desired} is outside capacity bounds [{}, {}]", capacity.min(), capacity.max()),
            ));
        }

        // Load balancer stickiness accepts 1 second .. 7 days.
        let stickiness = self.server.stickiness.as_secs();
        if !(1..=7 * 24 * 60 * 60).contains(&stickiness) {
            return Err(ConfigurationError::invalid(
                "server.stickiness_secs",
                format!("{stickiness} is outside 1..=604800"),
            ));
        }

        let timeout = self.pipeline.build.timeout_minutes;
        if !(5..=480).contains(&timeout) {
            return Err(ConfigurationError::invalid(
                "pipeline.build.timeout_minutes",
                format!("{timeout} is outside 5..=480"),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ProbePort;
    use pretty_assertions::assert_eq;
    use test_case::test_case;

    const MINIMAL: &str = r#"
        [stack]
        id = "web-stack"

        [cluster.vpc]
        id = "vpc-1"
        name = "starter-vpc"

        [cluster.ecs_cluster]
        id = "ecs-cluster-1"

        [server]
        port = 3000

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
        id = "pipeline-1"

        [pipeline.source.github]
        owner = "acme"
        repo = "web"
        token_secret_name = "GITHUB_TOKEN"
        branch = "master"

        [pipeline.build]
        id = "build-1"
    "#;

    #[test]
    fn minimal_document_gets_topology_defaults() {
        let config = StackConfig::from_toml_str(MINIMAL).unwrap();
        assert_eq!(config.server.port.as_u16(), 3000);
        assert_eq!(config.server.container.name, "web");
        assert_eq!(config.server.container.image, ContainerImage::Asset(".".into()));
        assert_eq!(config.server.stickiness.as_secs(), 86_400);
        assert_eq!(config.server.health_check.port(), ProbePort::Fixed(Port::new(3006).unwrap()));
        assert_eq!(config.server.health_check.path(), "/");
        assert_eq!(config.server.health_check.unhealthy_threshold(), 5);
        assert_eq!(config.server.autoscaling.capacity, CapacityBounds::new(1, 3).unwrap());
        assert_eq!(config.server.autoscaling.cpu.target.as_u8(), 50);
        assert_eq!(config.server.iam_role.managed_policy, "CloudWatchFullAccess");
        assert_eq!(config.server.load_balancer.record_type, DnsRecordType::Cname);
        assert_eq!(config.pipeline.build.cache_mode, LocalCacheMode::DockerLayer);
        assert!(config.pipeline.build.privileged);
    }

    #[test]
    fn missing_token_secret_name_is_a_configuration_error() {
        let document = MINIMAL.replace("token_secret_name = \"GITHUB_TOKEN\"", "");
        let err = StackConfig::from_toml_str(&document).unwrap_err();
        match err {
            crate::StackError::Configuration(ConfigurationError::Parse { message }) => {
                assert!(message.contains("token_secret_name"), "{message}");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn empty_required_field_is_reported_by_name() {
        let mut config = StackConfig::from_toml_str(MINIMAL).unwrap();
        config.pipeline.source.github.token_secret_name = String::new();
        assert_eq!(
            config.validate(),
            Err(ConfigurationError::missing("pipeline.source.github.token_secret_name"))
        );
    }

    #[test]
    fn id_with_separator_is_invalid() {
        let mut config = StackConfig::from_toml_str(MINIMAL).unwrap();
        config.cluster.vpc.id = "vpc/1".into();
        assert!(matches!(
            config.validate(),
            Err(ConfigurationError::InvalidValue { field, .. }) if field == "cluster.vpc.id"
        ));
    }

    #[test]
    fn health_check_without_port_does_not_parse() {
        let document = MINIMAL.replace("port = { fixed = 3006 }", "path = \"/\"");
        match StackConfig::from_toml_str(&document).unwrap_err() {
            crate::StackError::Configuration(ConfigurationError::Parse { message }) => {
                assert!(message.contains("port"), "{message}");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn missing_health_check_section_does_not_parse() {
        let document = MINIMAL.replace("[server.health_check]\n        port = { fixed = 3006 }\n", "");
        match StackConfig::from_toml_str(&document).unwrap_err() {
            crate::StackError::Configuration(ConfigurationError::Parse { message }) => {
                assert!(message.contains("health_check"), "{message}");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn traffic_port_probe_must_be_spelled_out() {
        let document = MINIMAL.replace("port = { fixed = 3006 }", "port = \"traffic_port\"");
        let config = StackConfig::from_toml_str(&document).unwrap();
        assert_eq!(config.server.health_check.port(), ProbePort::TrafficPort);
    }

    #[test_case("cluster.vpc.id", " vpc-1" ; "leading space")]
    #[test_case("pipeline.build.id", "build-1 " ; "trailing space")]
    #[test_case("server.ecr.repo_id", "\tecr-repo-1" ; "leading tab")]
    fn id_with_surrounding_whitespace_is_invalid(field: &str, id: &str) {
        let mut config = StackConfig::from_toml_str(MINIMAL).unwrap();
        match field {
            "cluster.vpc.id" => config.cluster.vpc.id = id.into(),
            "pipeline.build.id" => config.pipeline.build.id = id.into(),
            _ => config.server.ecr.repo_id = id.into(),
        }
        assert_eq!(
            config.validate(),
            Err(ConfigurationError::invalid(field, "must not have surrounding whitespace"))
        );
    }

    #[test]
    fn out_of_range_port_fails_while_parsing() {
        let document = MINIMAL.replace("port = 3000", "port = 0");
        assert!(StackConfig::from_toml_str(&document).is_err());
    }

    #[test]
    fn desired_count_must_fit_capacity() {
        let mut config = StackConfig::from_toml_str(MINIMAL).unwrap();
        config.server.container.desired_count = 4;
        assert!(config.validate().is_err());
    }

    #[test]
    fn fixed_probe_port_and_autoscaling_override() {
        let document = MINIMAL.replace("port = { fixed = 3006 }", "port = { fixed = 8081 }").replace(
            "[server.ecr]",
            r#"[server.autoscaling.capacity]
            min = 1
            max = 6

            [server.ecr]"#,
        );
        let config = StackConfig::from_toml_str(&document).unwrap();
        assert_eq!(config.server.health_check.port(), ProbePort::Fixed(Port::new(8081).unwrap()));
        assert_eq!(config.server.autoscaling.capacity.max(), 6);
        assert_eq!(config.server.autoscaling.cpu, CpuScaling::default());
    }
}
