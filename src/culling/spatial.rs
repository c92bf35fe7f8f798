//! Two-stage spatial culling over a BVH
//!
//! A traversal goes `Idle -> FrustumPass -> OcclusionPass -> Extracted`.
//! The tree itself is never rebuilt between frames: each frustum pass clears
//! the reachability bits and recomputes them, the occlusion pass only narrows
//! them further.

use crate::core::types::Mat4;
use crate::core::{Error, Result};
use crate::math::{Aabb, Plane};

use super::bvh::{Bvh, LeafId};
use super::occlusion::OcclusionOracle;

/// Where the current traversal stands
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum CullStage {
    #[default]
    Idle,
    FrustumPass,
    OcclusionPass,
    Extracted,
}

/// Leaves that survived the last traversal
#[derive(Clone, Debug)]
pub struct CullResult<T> {
    pub visible_aabbs: Vec<Aabb>,
    pub visible_entities: Vec<T>,
}

impl<T> Default for CullResult<T> {
    fn default() -> Self {
        Self { visible_aabbs: Vec::new(), visible_entities: Vec::new() }
    }
}

impl<T> CullResult<T> {
    pub fn len(&self) -> usize {
        self.visible_aabbs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.visible_aabbs.is_empty()
    }

    fn clear(&mut self) {
        self.visible_aabbs.clear();
        self.visible_entities.clear();
    }
}

/// Counters from the most recent traversal
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CullStats {
    pub frustum_tests: usize,
    pub occlusion_tests: usize,
    pub visible: usize,
}

/// BVH plus traversal state for one region.
pub struct SpatialCulling<T> {
    bvh: Bvh<T>,
    stage: CullStage,
    result: CullResult<T>,
    stats: CullStats,
}

impl<T: Clone> Default for SpatialCulling<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Clone> SpatialCulling<T> {
    pub fn new() -> Self {
        Self {
            bvh: Bvh::new(),
            stage: CullStage::Idle,
            result: CullResult::default(),
            stats: CullStats::default(),
        }
    }

    /// Replace the tree with a balanced build over `entries`.
    pub fn rebuild(&mut self, entries: Vec<(Aabb, T)>) {
        self.bvh = Bvh::build(entries);
        self.reset_traversal();
        log::debug!("Spatial culling rebuilt: {} leaves, depth {}", self.bvh.len(), self.bvh.depth());
    }

    /// Add one leaf. Any traversal in progress is abandoned.
    pub fn insert(&mut self, aabb: Aabb, item: T) -> LeafId {
        let id = self.bvh.insert(aabb, item);
        self.reset_traversal();
        id
    }

    pub fn clear(&mut self) {
        self.bvh.clear();
        self.reset_traversal();
    }

    fn reset_traversal(&mut self) {
        self.stage = CullStage::Idle;
        self.result.clear();
    }

    pub fn len(&self) -> usize {
        self.bvh.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bvh.is_empty()
    }

    pub fn stage(&self) -> CullStage {
        self.stage
    }

    pub fn stats(&self) -> CullStats {
        self.stats
    }

    pub fn bounds(&self) -> Option<Aabb> {
        self.bvh.bounds()
    }

    pub fn bvh(&self) -> &Bvh<T> {
        &self.bvh
    }

    /// First stage. Always allowed; restarts any traversal in progress.
    pub fn frustum_pass(&mut self, planes: &[Plane]) {
        self.result.clear();
        self.stats = CullStats {
            frustum_tests: self.bvh.mark_reachable(|aabb| aabb.visible(planes)),
            ..CullStats::default()
        };
        self.stage = CullStage::FrustumPass;
    }

    /// Second stage. Only nodes that survived the frustum pass are tested.
    pub fn occlusion_pass<O>(&mut self, oracle: &O, view: &Mat4, view_proj: &Mat4) -> Result<()>
    where
        O: OcclusionOracle + ?Sized,
    {
        if self.stage != CullStage::FrustumPass {
            return Err(Error::InvalidState(format!(
                "occlusion pass requested in stage {:?}",
                self.stage
            )));
        }
        self.stats.occlusion_tests = self
            .bvh
            .refine_reachable(|aabb| oracle.test_visible(aabb, view, view_proj));
        self.stage = CullStage::OcclusionPass;
        Ok(())
    }

    /// Collect reachable leaves. Valid after the frustum pass (occlusion
    /// optional); calling it again without a new pass returns the same set.
    pub fn extract(&mut self) -> Result<&CullResult<T>> {
        match self.stage {
            CullStage::Idle => {
                return Err(Error::InvalidState("extract requested before any cull pass".into()));
            }
            CullStage::Extracted => return Ok(&self.result),
            CullStage::FrustumPass | CullStage::OcclusionPass => {}
        }

        self.result.clear();
        let result = &mut self.result;
        self.bvh.for_each_reachable_leaf(|_, aabb, item| {
            result.visible_aabbs.push(*aabb);
            result.visible_entities.push(item.clone());
        });
        self.stats.visible = self.result.len();
        self.stage = CullStage::Extracted;
        Ok(&self.result)
    }

    /// Result of the last completed extraction (empty otherwise)
    pub fn last_result(&self) -> &CullResult<T> {
        &self.result
    }

    /// Full traversal: frustum, occlusion when an oracle is given, extract.
    pub fn run<O>(
        &mut self,
        planes: &[Plane],
        oracle: Option<&O>,
        view: &Mat4,
        view_proj: &Mat4,
    ) -> Result<&CullResult<T>>
    where
        O: OcclusionOracle + ?Sized,
    {
        self.frustum_pass(planes);
        if let Some(oracle) = oracle {
            self.occlusion_pass(oracle, view, view_proj)?;
        }
        self.extract()
    }
}
