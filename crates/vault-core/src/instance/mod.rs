//! API instances: templates bound to an organization and a credential

mod registry;
mod types;

pub use registry::InstanceRegistry;
pub(crate) use registry::{instances_of_template, instances_referencing};
pub use types::{ApiInstance, InstanceStatus};
