//! Virtual network plus the compute cluster bound to it.

use construct::config::ClusterSection;
use construct::{kind, Handle, Scope, StackResult};
use serde_json::json;
use tracing::info;

use crate::outputs;

/// A virtual network and the compute cluster that runs inside it.
///
/// Subnet layout is left to the provisioning backend.
#[derive(Debug, Clone)]
pub struct NetworkCluster {
    network: Handle<kind::Network>,
    cluster: Handle<kind::ComputeCluster>,
}

impl NetworkCluster {
    /// Declares the network and cluster in a child scope of `parent`.
    ///
    /// Binds the `clusterArn` output. The returned fragment must be merged into
    /// `parent` by the caller.
    pub fn create(parent: &Scope, id: &str, config: &ClusterSection) -> StackResult<(Self, Scope)> {
        let mut scope = Scope::child(parent, id)?;

        let network = scope.declare::<kind::Network>(
            &config.vpc.id,
            json!({ "name": config.vpc.name }),
            &[],
        )?;

        let cluster = scope.declare::<kind::ComputeCluster>(
            &config.ecs_cluster.id,
            json!({ "network": network.output("Id")? }),
            &[&network],
        )?;

        scope.output(outputs::CLUSTER_ARN, cluster.arn()?)?;
        info!(scope = %scope.path(), cluster = %cluster.path(), "network cluster created");

        Ok((Self { network, cluster }, scope))
    }

    pub fn network(&self) -> &Handle<kind::Network> {
        &self.network
    }

    pub fn cluster(&self) -> &Handle<kind::ComputeCluster> {
        &self.cluster
    }
}
