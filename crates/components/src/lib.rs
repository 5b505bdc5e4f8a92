//! Stack components for Stackweave.
//!
//! Each component is created inside its own child [`construct::Scope`] and
//! hands back the fragment for the caller to merge. Downstream components only
//! ever see upstream components through typed handles, so a reference to an
//! output that has not been declared yet cannot be written.
//!
//! | Module | Contents |
//! |--------|----------|
//! | [`network`] | `NetworkCluster` |
//! | [`service`] | `ManagedService` |
//! | [`delivery`] | `DeliveryPipeline`, stages and artifact threading |
//! | [`grants`] | Registry permission grants and least-privilege inspection |
//! | [`execution`] | Interpretation of stage outcomes from the pipeline runner |
//! | [`stack`] | `synthesize` |

pub mod delivery;
pub mod execution;
pub mod grants;
pub mod network;
pub mod outputs;
pub mod service;
pub mod stack;

pub use delivery::DeliveryPipeline;
pub use network::NetworkCluster;
pub use service::ManagedService;
pub use stack::{synthesize, synthesize_with, StackGraph};
