//! Instance shapes and the catalog that supplies them.
//!
//! The solver never talks to a cloud API. It consumes a snapshot of
//! [`InstanceShape`]s from a [`Catalog`] and treats every shape as read-only
//! for the duration of a solve. Shapes are shared between bins through
//! [`SharedShape`].

use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};

use tracing::debug;

use crate::error::RequirementError;
use crate::requirements::{Requirement, Requirements};
use crate::resources::ResourceList;

/// Well-known label carrying the instance type name.
pub const LABEL_INSTANCE_TYPE: &str = "node.kubernetes.io/instance-type";
/// Well-known label carrying the CPU architecture.
pub const LABEL_ARCH: &str = "kubernetes.io/arch";
/// Well-known label carrying the availability zone.
pub const LABEL_ZONE: &str = "topology.kubernetes.io/zone";
/// Label carrying the purchase option (spot / on-demand).
pub const LABEL_CAPACITY_TYPE: &str = "nodepack.io/capacity-type";

/// One purchasable node shape.
pub trait InstanceShape: fmt::Debug + Send + Sync {
    fn name(&self) -> &str;

    /// Total capacity, including what [`overhead`](Self::overhead) reserves.
    fn resources(&self) -> &ResourceList;

    /// Labels every node of this shape would carry, as requirements
    /// (architecture, zones offered, capacity types offered).
    fn requirements(&self) -> &Requirements;

    /// Used for ranking only.
    fn price(&self) -> f64;

    /// Resources consumed by the node's own system agents.
    fn overhead(&self) -> &ResourceList;
}

pub type SharedShape = Arc<dyn InstanceShape>;

/// Whether `shape` can carry labels satisfying `requirements`.
pub fn compatible(shape: &dyn InstanceShape, requirements: &Requirements) -> bool {
    shape.requirements().compatible(requirements).is_ok()
}

/// The concrete shape record produced by catalogs in this workspace.
#[derive(Debug, Clone, PartialEq)]
pub struct InstanceType {
    name: String,
    resources: ResourceList,
    requirements: Requirements,
    price: f64,
    overhead: ResourceList,
}

impl InstanceType {
    /// A shape whose only label is its own instance-type name.
    pub fn new(name: impl Into<String>, resources: ResourceList, price: f64) -> Self {
        let name = name.into();
        let requirements = Requirements::from(Requirement::equals(LABEL_INSTANCE_TYPE, name.clone()));
        Self {
            name,
            resources,
            requirements,
            price,
            overhead: ResourceList::new(),
        }
    }

    /// Merge further label requirements into the shape.
    pub fn with_requirements(
        mut self,
        requirements: impl IntoIterator<Item = Requirement>,
    ) -> Result<Self, RequirementError> {
        self.requirements = self.requirements.add(requirements)?;
        Ok(self)
    }

    pub fn with_overhead(mut self, overhead: ResourceList) -> Self {
        self.overhead = overhead;
        self
    }

    pub fn into_shared(self) -> SharedShape {
        Arc::new(self)
    }
}

impl InstanceShape for InstanceType {
    fn name(&self) -> &str {
        &self.name
    }

    fn resources(&self) -> &ResourceList {
        &self.resources
    }

    fn requirements(&self) -> &Requirements {
        &self.requirements
    }

    fn price(&self) -> f64 {
        self.price
    }

    fn overhead(&self) -> &ResourceList {
        &self.overhead
    }
}

/// Source of instance shapes for a solve.
///
/// Implementations own their refresh and synchronization; `snapshot` must
/// return a consistent list that stays valid after later refreshes.
pub trait Catalog: Send + Sync {
    fn snapshot(&self) -> Vec<SharedShape>;
}

/// In-memory catalog whose contents can be swapped wholesale.
#[derive(Debug, Default)]
pub struct StaticCatalog {
    shapes: RwLock<Arc<Vec<SharedShape>>>,
}

impl StaticCatalog {
    pub fn new(shapes: Vec<SharedShape>) -> Self {
        Self {
            shapes: RwLock::new(Arc::new(shapes)),
        }
    }

    /// Replace the whole catalog. Snapshots taken earlier are unaffected.
    pub fn replace(&self, shapes: Vec<SharedShape>) {
        let count = shapes.len();
        *self.shapes.write().unwrap_or_else(PoisonError::into_inner) = Arc::new(shapes);
        debug!(count, "instance catalog replaced");
    }

    pub fn len(&self) -> usize {
        self.shapes.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Catalog for StaticCatalog {
    fn snapshot(&self) -> Vec<SharedShape> {
        let shapes = Arc::clone(&self.shapes.read().unwrap_or_else(PoisonError::into_inner));
        shapes.as_ref().clone()
    }
}
