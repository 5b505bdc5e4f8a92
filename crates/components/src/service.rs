//! Load-balanced, autoscaled container service with its image registry.
//!
//! Declaration order inside [`ManagedService::create`]:
//!
//! 1. security boundary on the network, one ingress rule for the service port;
//! 2. roles, certificate reference, log group, task definition, load balancer,
//!    traffic target (stickiness + health probe) and listener;
//! 3. image registry and the execution role's pull grant;
//! 4. the service itself, which depends on the pull grant so it cannot become
//!    ready without it;
//! 5. autoscaling target and CPU tracking policy.
//!
//! Any failure returns early and drops the half-built fragment; nothing
//! reaches the parent scope.

use construct::config::{ContainerImage, ServerSection};
use construct::types::{CapacityBounds, CertificateArn, CpuScaling, HealthProbe, Port, Protocol, RegistryAccess};
use construct::{
    kind, ConfigurationError, ContainerName, Handle, NodePath, Scope, StackError, StackResult,
};
use serde::Serialize;
use serde_json::{json, Value};
use tracing::{info, warn};

use crate::grants::grant_registry_access;
use crate::network::NetworkCluster;
use crate::outputs;

/// Any IPv4 source.
pub const ANY_IPV4: &str = "0.0.0.0/0";

/// Public HTTPS listener port on the load balancer.
const LISTENER_PORT: u16 = 443;

/// One inbound traffic rule on the security boundary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IngressRule {
    pub protocol: Protocol,
    pub port: Port,
    pub source: String,
    pub description: String,
}

/// Autoscaling applied to the service's task count.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Autoscaling {
    pub bounds: CapacityBounds,
    pub cpu: CpuScaling,
}

/// The running web service and everything it owns.
#[derive(Debug, Clone)]
pub struct ManagedService {
    cluster: Handle<kind::ComputeCluster>,
    security_boundary: Handle<kind::SecurityBoundary>,
    service_role: Handle<kind::Role>,
    execution_role: Handle<kind::Role>,
    target_group: Handle<kind::TargetGroup>,
    service: Handle<kind::Service>,
    registry: Handle<kind::Registry>,
    container_identity: ContainerName,
    ingress: Vec<IngressRule>,
    health_probe: HealthProbe,
    probe_port: Port,
    autoscaling: Autoscaling,
}

impl ManagedService {
    /// Declares the service in a child scope of `parent`, consuming the
    /// network cluster's handles.
    ///
    /// Binds the `registryArn` and `containerName` outputs.
    pub fn create(
        parent: &Scope,
        id: &str,
        network: &NetworkCluster,
        config: &ServerSection,
    ) -> StackResult<(Self, Scope)> {
        let mut scope = Scope::child(parent, id)?;
        let vpc = network.network();
        let cluster = network.cluster();
        let port = config.port;

        // 1. Security boundary. Egress stays unrestricted.
        let ingress = vec![IngressRule {
            protocol: Protocol::Tcp,
            port,
            source: ANY_IPV4.to_owned(),
            description: "Ingress rule for webserver".to_owned(),
        }];
        let security_boundary = scope.declare::<kind::SecurityBoundary>(
            &config.security_group.id,
            json!({
                "network": vpc.output("Id")?,
                "description": "security group for server",
                "allowAllOutbound": true,
                "ingress": ingress_json(&ingress),
            }),
            &[vpc],
        )?;

        // 2. Service plumbing.
        let certificate_arn: CertificateArn = config
            .load_balancer
            .certificate_arn
            .parse()
            .map_err(|reason| ConfigurationError::invalid("server.load_balancer.certificate_arn", reason))?;

        let service_role = scope.declare::<kind::Role>(
            &config.iam_role.id,
            json!({
                "assumedBy": "ecs-tasks.amazonaws.com",
                "managedPolicies": [format!("arn:aws:iam::aws:policy/{}", config.iam_role.managed_policy)],
            }),
            &[],
        )?;
        let execution_role = scope.declare::<kind::Role>(
            "ExecutionRole",
            json!({ "assumedBy": "ecs-tasks.amazonaws.com" }),
            &[],
        )?;
        let certificate = scope.declare::<kind::Certificate>(
            &config.load_balancer.id,
            json!({ "arn": certificate_arn.as_str(), "imported": true }),
            &[],
        )?;
        let log_group = scope.declare::<kind::LogGroup>(
            "LogGroup",
            json!({ "streamPrefix": id }),
            &[],
        )?;

        let task_definition = scope.declare::<kind::TaskDefinition>(
            "TaskDef",
            json!({
                "compatibility": "FARGATE",
                "networkMode": "awsvpc",
                "cpu": 256,
                "memory": 512,
                "taskRole": service_role.arn()?,
                "executionRole": execution_role.arn()?,
                "containers": [{
                    "name": config.container.name,
                    "image": image_json(&config.container.image),
                    "portMappings": [{ "containerPort": port, "protocol": "tcp" }],
                    "environment": config.environment,
                    "logging": {
                        "driver": "awslogs",
                        "group": log_group.name()?,
                        "streamPrefix": id,
                    },
                }],
            }),
            &[&service_role, &execution_role, &log_group],
        )?;
        let container_identity = container_identity(&scope, task_definition.path())?;

        let scheme = if config.load_balancer.public { "internet-facing" } else { "internal" };
        let load_balancer = scope.declare::<kind::LoadBalancer>(
            &format!("{}-alb", config.load_balancer.id),
            json!({
                "scheme": scheme,
                "network": vpc.output("Id")?,
                "securityGroups": [security_boundary.output("GroupId")?],
                "dnsRecordType": config.load_balancer.record_type.as_str(),
            }),
            &[vpc, &security_boundary],
        )?;

        let probe = &config.health_check;
        let probe_port = probe.port().resolve(port);
        if probe_port != port {
            warn!(
                service_port = %port,
                probe_port = %probe_port,
                "health probe targets a fixed port different from the service port"
            );
        }
        let target_group = scope.declare::<kind::TargetGroup>(
            "TargetGroup",
            json!({
                "network": vpc.output("Id")?,
                "port": port,
                "protocol": Protocol::Http.as_str(),
                "targetType": "ip",
                "stickiness": {
                    "enabled": true,
                    "type": "lb_cookie",
                    "durationSeconds": config.stickiness.as_secs(),
                },
                "healthCheck": {
                    "path": probe.path(),
                    "protocol": probe.protocol().as_str(),
                    "port": probe_port,
                    "unhealthyThresholdCount": probe.unhealthy_threshold(),
                },
            }),
            &[vpc],
        )?;
        let listener = scope.declare::<kind::Listener>(
            "PublicListener",
            json!({
                "loadBalancer": load_balancer.arn()?,
                "port": LISTENER_PORT,
                "protocol": Protocol::Https.as_str(),
                "certificates": [certificate.arn()?],
                "defaultTargetGroup": target_group.arn()?,
            }),
            &[&load_balancer, &certificate, &target_group],
        )?;

        // 3. Registry; the runtime identity may only pull.
        let registry = scope.declare::<kind::Registry>(&config.ecr.repo_id, json!({}), &[])?;
        let pull_grant = grant_registry_access(
            &mut scope,
            "ExecutionRolePull",
            &execution_role,
            &registry,
            &[RegistryAccess::Pull],
        )?;

        // 4. The service.
        let service = scope.declare::<kind::Service>(
            "Service",
            json!({
                "cluster": cluster.arn()?,
                "taskDefinition": task_definition.arn()?,
                "desiredCount": config.container.desired_count,
                "launchType": "FARGATE",
                "deploymentController": "ECS",
                "securityGroups": [security_boundary.output("GroupId")?],
                "loadBalancers": [{
                    "containerName": container_identity.as_str(),
                    "containerPort": port,
                    "targetGroup": target_group.arn()?,
                }],
            }),
            &[cluster, &task_definition, &security_boundary, &target_group, &listener, &pull_grant],
        )?;

        // 5. Autoscaling.
        let autoscaling = Autoscaling {
            bounds: config.autoscaling.capacity,
            cpu: config.autoscaling.cpu,
        };
        let scalable_target = scope.declare::<kind::ScalableTarget>(
            "TaskCount",
            json!({
                "cluster": cluster.name()?,
                "service": service.name()?,
                "dimension": "ecs:service:DesiredCount",
                "minCapacity": autoscaling.bounds.min(),
                "maxCapacity": autoscaling.bounds.max(),
            }),
            &[cluster, &service],
        )?;
        scope.declare::<kind::ScalingPolicy>(
            "CpuScaling",
            json!({
                "scalableTarget": scalable_target.output("Id")?,
                "metric": "ECSServiceAverageCPUUtilization",
                "targetValue": autoscaling.cpu.target.as_u8(),
                "scaleInCooldownSeconds": autoscaling.cpu.scale_in_cooldown.as_secs(),
                "scaleOutCooldownSeconds": autoscaling.cpu.scale_out_cooldown.as_secs(),
            }),
            &[&scalable_target],
        )?;

        scope.output(outputs::REGISTRY_ARN, registry.arn()?)?;
        scope.output(outputs::CONTAINER_NAME, container_identity.as_str())?;
        info!(scope = %scope.path(), container = %container_identity, "managed service created");

        Ok((
            Self {
                cluster: cluster.clone(),
                security_boundary,
                service_role,
                execution_role,
                target_group,
                service,
                registry,
                container_identity,
                ingress,
                health_probe: probe.clone(),
                probe_port,
                autoscaling,
            },
            scope,
        ))
    }

    pub fn cluster(&self) -> &Handle<kind::ComputeCluster> {
        &self.cluster
    }

    pub fn security_boundary(&self) -> &Handle<kind::SecurityBoundary> {
        &self.security_boundary
    }

    /// Role the running task assumes (carries the monitoring policy).
    pub fn service_role(&self) -> &Handle<kind::Role> {
        &self.service_role
    }

    /// Role the container agent uses to pull the image.
    pub fn execution_role(&self) -> &Handle<kind::Role> {
        &self.execution_role
    }

    pub fn target_group(&self) -> &Handle<kind::TargetGroup> {
        &self.target_group
    }

    pub fn service(&self) -> &Handle<kind::Service> {
        &self.service
    }

    pub fn registry(&self) -> &Handle<kind::Registry> {
        &self.registry
    }

    pub fn container_identity(&self) -> &ContainerName {
        &self.container_identity
    }

    pub fn ingress_rules(&self) -> &[IngressRule] {
        &self.ingress
    }

    pub fn health_probe(&self) -> &HealthProbe {
        &self.health_probe
    }

    /// Port the health probe actually connects to.
    pub fn probe_port(&self) -> Port {
        self.probe_port
    }

    pub fn autoscaling(&self) -> Autoscaling {
        self.autoscaling
    }
}

fn ingress_json(rules: &[IngressRule]) -> Value {
    rules
        .iter()
        .map(|rule| {
            json!({
                "protocol": rule.protocol.as_str().to_lowercase(),
                "fromPort": rule.port,
                "toPort": rule.port,
                "source": rule.source,
                "description": rule.description,
            })
        })
        .collect()
}

fn image_json(image: &ContainerImage) -> Value {
    match image {
        ContainerImage::Asset(directory) => json!({ "asset": directory }),
        ContainerImage::Registry(reference) => json!({ "registry": reference }),
    }
}

/// Reads the container name back from the declared task definition.
fn container_identity(scope: &Scope, task_definition: &NodePath) -> StackResult<ContainerName> {
    scope
        .node(task_definition)
        .and_then(|node| node.attribute("containers"))
        .and_then(|containers| containers.get(0))
        .and_then(|container| container.get("name"))
        .and_then(Value::as_str)
        .and_then(|name| ContainerName::new(name))
        .ok_or_else(|| StackError::unresolved("container identity", format!("{task_definition}.containers[0].name")))
}
