//! Prospective nodes.
//!
//! A [`Bin`] is a node that does not exist yet: a requirement set, the pods
//! assigned to it so far, and the instance shapes that could still host all
//! of them. Adding a pod tightens the requirements and can only ever remove
//! shapes from the candidate list.

use std::fmt;

use tracing::trace;

use nodepack_core::instance::{self, InstanceShape, SharedShape};
use nodepack_core::resources::PODS;
use nodepack_core::{PodRequest, Quantity, Requirements, ResourceList};

use crate::error::{BinError, BinResult};

/// How many shape names `Display` lists before summarizing the rest.
const DISPLAYED_SHAPES: usize = 5;

#[derive(Debug, Clone)]
pub struct Bin {
    requirements: Requirements,
    instance_shapes: Vec<SharedShape>,
    pods: Vec<PodRequest>,
    pod_resources: ResourceList,
    daemon_resources: ResourceList,
}

impl Bin {
    /// Start an empty bin.
    ///
    /// Shapes that cannot run even a zero-request pod on top of their own
    /// overhead and `daemon_resources`, or whose labels conflict with
    /// `constraints`, are dropped. The candidate list may end up empty.
    pub fn new(constraints: &Requirements, daemon_resources: &ResourceList, shapes: &[SharedShape]) -> Self {
        let mut bin = Bin {
            requirements: constraints.clone(),
            instance_shapes: Vec::new(),
            pods: Vec::new(),
            pod_resources: ResourceList::new(),
            daemon_resources: daemon_resources.clone(),
        };
        let empty = ResourceList::new();
        bin.instance_shapes = shapes
            .iter()
            .filter(|shape| bin.can_fit(&empty, shape.as_ref()) && instance::compatible(shape.as_ref(), constraints))
            .cloned()
            .collect();
        bin
    }

    pub fn requirements(&self) -> &Requirements {
        &self.requirements
    }

    /// Remaining candidates, cheapest first when the input was price-sorted.
    pub fn instance_shapes(&self) -> &[SharedShape] {
        &self.instance_shapes
    }

    pub fn pods(&self) -> &[PodRequest] {
        &self.pods
    }

    pub fn pod_resources(&self) -> &ResourceList {
        &self.pod_resources
    }

    pub fn daemon_resources(&self) -> &ResourceList {
        &self.daemon_resources
    }

    /// Resources already committed on `shape`: its overhead, the daemon
    /// reservation, and every assigned pod.
    fn reserved(&self, shape: &dyn InstanceShape) -> ResourceList {
        ResourceList::sum([shape.overhead(), &self.daemon_resources, &self.pod_resources])
    }

    /// Whether `shape` can host `extra` on top of what is reserved, plus one
    /// more pod than is currently assigned.
    fn can_fit(&self, extra: &ResourceList, shape: &dyn InstanceShape) -> bool {
        let requested = self.reserved(shape).merge(extra);
        for (name, total) in shape.resources().iter() {
            if requested.get(name) > total {
                return false;
            }
        }

        let pod_max = shape.resources().get(PODS);
        let pod_count = Quantity::from_units(self.pods.len() as u64 + 1);
        pod_max.is_zero() || pod_max >= pod_count
    }

    /// A positive request for any resource needs a shape that offers some of
    /// it; a zero request places no demand.
    fn has_compatible_resources(requests: &ResourceList, shape: &dyn InstanceShape) -> bool {
        requests
            .iter()
            .filter(|(_, quantity)| !quantity.is_zero())
            .all(|(name, _)| !shape.resources().get(name).is_zero())
    }

    fn accepts(&self, shape: &dyn InstanceShape, pod: &PodRequest, tightened: &Requirements) -> bool {
        instance::compatible(shape, tightened)
            && self.can_fit(pod.requests(), shape)
            && Self::has_compatible_resources(pod.requests(), shape)
    }

    fn no_match(pod: &PodRequest, tightened: &Requirements) -> BinError {
        BinError::NoMatchingInstanceType {
            resources: pod.requests().to_string(),
            requirements: tightened.to_string(),
        }
    }

    /// Check whether `pod` could join this bin, without changing it.
    pub fn compatible(&self, pod: &PodRequest) -> BinResult<()> {
        let tightened = self.requirements.tighten(pod.requirements())?;
        if self
            .instance_shapes
            .iter()
            .any(|shape| self.accepts(shape.as_ref(), pod, &tightened))
        {
            Ok(())
        } else {
            Err(Self::no_match(pod, &tightened))
        }
    }

    /// Add `pod`, narrowing requirements and candidates.
    ///
    /// Either the pod is committed and the candidates shrink to exactly the
    /// shapes that accept it, or an error is returned and the bin is
    /// unchanged.
    pub fn add(&mut self, pod: &PodRequest) -> BinResult<()> {
        let tightened = self.requirements.tighten(pod.requirements())?;

        // Filter before appending: the pod-count check counts this pod as
        // the (len + 1)-th.
        let remaining: Vec<SharedShape> = self
            .instance_shapes
            .iter()
            .filter(|shape| self.accepts(shape.as_ref(), pod, &tightened))
            .cloned()
            .collect();

        if remaining.is_empty() {
            return Err(Self::no_match(pod, &tightened));
        }

        trace!(
            pod = %pod.id(),
            before = self.instance_shapes.len(),
            after = remaining.len(),
            "narrowed instance types"
        );
        self.requirements = tightened;
        self.instance_shapes = remaining;
        self.pod_resources = self.pod_resources.merge(pod.requests());
        self.pods.push(pod.clone());
        Ok(())
    }
}

impl fmt::Display for Bin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let required = match self.instance_shapes.first() {
            Some(cheapest) => ResourceList::sum([&self.daemon_resources, cheapest.overhead(), &self.pod_resources]),
            None => self.daemon_resources.merge(&self.pod_resources),
        };
        write!(f, "with {} pods using resources {required} from types ", self.pods.len())?;
        for (i, shape) in self.instance_shapes.iter().enumerate() {
            if i == DISPLAYED_SHAPES {
                write!(f, " and {} others", self.instance_shapes.len() - i)?;
                break;
            }
            if i > 0 {
                f.write_str(", ")?;
            }
            f.write_str(shape.name())?;
        }
        Ok(())
    }
}
