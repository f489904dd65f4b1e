//! Pending pods as the solver sees them.

use std::collections::BTreeMap;
use std::fmt;

use crate::error::RequirementError;
use crate::requirements::{Requirement, Requirements};
use crate::resources::{Quantity, ResourceList};

/// Namespace + name of a pod.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PodId {
    pub namespace: String,
    pub name: String,
}

impl PodId {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for PodId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

/// A pod waiting for capacity: what it asks for, and where it may run.
#[derive(Debug, Clone, PartialEq)]
pub struct PodRequest {
    id: PodId,
    requests: ResourceList,
    requirements: Requirements,
}

impl PodRequest {
    pub fn new(id: PodId, requests: ResourceList, requirements: Requirements) -> Self {
        Self {
            id,
            requests,
            requirements,
        }
    }

    /// Derive scheduling requirements from a node selector and the terms of
    /// a required node affinity. Each selector entry becomes `key In [value]`
    /// and is intersected with the affinity terms on the same key.
    pub fn from_selectors(
        id: PodId,
        requests: ResourceList,
        node_selector: &BTreeMap<String, String>,
        affinity: impl IntoIterator<Item = Requirement>,
    ) -> Result<Self, RequirementError> {
        let requirements = Requirements::new(
            node_selector
                .iter()
                .map(|(key, value)| Requirement::equals(key.clone(), value.clone()))
                .chain(affinity),
        )?;
        Ok(Self::new(id, requests, requirements))
    }

    pub fn id(&self) -> &PodId {
        &self.id
    }

    pub fn requests(&self) -> &ResourceList {
        &self.requests
    }

    pub fn requirements(&self) -> &Requirements {
        &self.requirements
    }

    pub fn cpu(&self) -> Quantity {
        self.requests.cpu()
    }

    pub fn memory(&self) -> Quantity {
        self.requests.memory()
    }
}
