//! The ordered collection of bins built during one solve.

use tracing::{debug, trace};

use nodepack_core::{PodRequest, Requirements, ResourceList, SharedShape};

use crate::bin::Bin;
use crate::error::BinResult;

/// Bins in creation order, plus what a new bin is seeded from.
#[derive(Debug)]
pub struct BinSet {
    constraints: Requirements,
    daemon_resources: ResourceList,
    shapes: Vec<SharedShape>,
    bins: Vec<Bin>,
}

impl BinSet {
    /// `shapes` should already be in preference order (cheapest first); new
    /// bins keep that order in their candidate lists.
    pub fn new(constraints: Requirements, daemon_resources: ResourceList, shapes: Vec<SharedShape>) -> Self {
        Self {
            constraints,
            daemon_resources,
            shapes,
            bins: Vec::new(),
        }
    }

    /// Place `pod` into the first bin that accepts it, or into a new bin.
    ///
    /// Returns the index of the bin that took the pod. When even a fresh bin
    /// rejects it, the fresh bin is discarded and its error returned.
    pub fn schedule(&mut self, pod: &PodRequest) -> BinResult<usize> {
        for (index, bin) in self.bins.iter_mut().enumerate() {
            match bin.add(pod) {
                Ok(()) => {
                    trace!(pod = %pod.id(), bin = index, "added pod to existing bin");
                    return Ok(index);
                }
                Err(err) => trace!(pod = %pod.id(), bin = index, %err, "bin rejected pod"),
            }
        }

        let mut bin = Bin::new(&self.constraints, &self.daemon_resources, &self.shapes);
        bin.add(pod)?;
        let index = self.bins.len();
        debug!(pod = %pod.id(), bin = index, candidates = bin.instance_shapes().len(), "opened new bin");
        self.bins.push(bin);
        Ok(index)
    }

    pub fn len(&self) -> usize {
        self.bins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bins.is_empty()
    }

    pub fn into_bins(self) -> Vec<Bin> {
        self.bins
    }
}
