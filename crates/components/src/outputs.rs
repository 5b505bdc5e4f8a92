//! Names of the stack's published outputs.

pub const CLUSTER_ARN: &str = "clusterArn";
pub const REGISTRY_ARN: &str = "registryArn";
pub const CONTAINER_NAME: &str = "containerName";
pub const PIPELINE_ARN: &str = "pipelineArn";

/// Every output a complete stack must bind.
pub const ALL: [&str; 4] = [CLUSTER_ARN, REGISTRY_ARN, CONTAINER_NAME, PIPELINE_ARN];
