//! Whole-stack synthesis.
//!
//! [`synthesize`] is the single entry point: validate the configuration,
//! optionally preflight the source credential, then create the network
//! cluster, the managed service and the delivery pipeline in that order, each
//! in its own fragment merged into the root scope, and finally freeze the
//! root into a [`Declaration`].

use construct::{ConfigurationError, Declaration, SecretStore, StackConfig, StackResult, SynthesisId};
use tracing::{debug, info, info_span};

use crate::delivery::{verify_source_credential, DeliveryPipeline};
use crate::network::NetworkCluster;
use crate::outputs;
use crate::service::ManagedService;

/// Construct ids of the three top-level components.
pub const CLUSTER_ID: &str = "Cluster";
pub const SERVICE_ID: &str = "WebApp";
pub const PIPELINE_ID: &str = "Pipeline";

/// A synthesized stack: its components and the validated declaration.
#[derive(Debug, Clone)]
pub struct StackGraph {
    pub synthesis_id: SynthesisId,
    pub network: NetworkCluster,
    pub service: ManagedService,
    pub pipeline: DeliveryPipeline,
    pub declaration: Declaration,
}

/// Synthesizes a stack without touching any secret store.
pub fn synthesize(config: &StackConfig) -> StackResult<StackGraph> {
    synthesize_with(config, None)
}

/// Synthesizes a stack, resolving the source credential through `secrets`
/// first when one is supplied.
pub fn synthesize_with(config: &StackConfig, secrets: Option<&dyn SecretStore>) -> StackResult<StackGraph> {
    let synthesis_id = SynthesisId::new_random();
    let span = info_span!("synthesize", %synthesis_id, stack = %config.stack.id);
    let _guard = span.enter();

    config.validate()?;
    if let Some(store) = secrets {
        verify_source_credential(store, &config.pipeline.source.github)?;
    }

    let mut root = construct::Scope::root(&config.stack.id)?;

    let (network, fragment) = NetworkCluster::create(&root, CLUSTER_ID, &config.cluster)?;
    root.merge(fragment)?;

    let (service, fragment) = ManagedService::create(&root, SERVICE_ID, &network, &config.server)?;
    root.merge(fragment)?;

    let (pipeline, fragment) = DeliveryPipeline::create(&root, PIPELINE_ID, &service, &config.pipeline)?;
    root.merge(fragment)?;

    let declaration = Declaration::from_scope(root)?;
    for name in outputs::ALL {
        match declaration.output(name) {
            Some(value) if !value.is_empty() => debug!(output = name, value, "output bound"),
            _ => return Err(ConfigurationError::missing(format!("output '{name}'")).into()),
        }
    }

    info!(
        nodes = declaration.nodes.len(),
        edges = declaration.edges.len(),
        "stack synthesized"
    );
    Ok(StackGraph {
        synthesis_id,
        network,
        service,
        pipeline,
        declaration,
    })
}
