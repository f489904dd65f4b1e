//! nodepack-core: shared types for node capacity planning.
//!
//! - **`resources`**: Kubernetes-style quantities and resource lists
//! - **`requirements`**: label requirement algebra (tighten, compatible)
//! - **`instance`**: instance shapes and the catalog interface
//! - **`pod`**: pending pods with their requests and requirements
//! - **`config`**: TOML scenario files (provisioner, catalog, pods)

pub mod config;
pub mod error;
pub mod instance;
pub mod pod;
pub mod requirements;
pub mod resources;

pub use config::{InstanceTypeConfig, PodConfig, ProvisionerConfig, RequirementSpec, ScenarioConfig};
pub use error::{ConfigError, QuantityParseError, RequirementError};
pub use instance::{Catalog, InstanceShape, InstanceType, SharedShape, StaticCatalog};
pub use pod::{PodId, PodRequest};
pub use requirements::{Operator, Requirement, Requirements};
pub use resources::{Quantity, ResourceList};
