//! Link-weight thresholding and scalar sweeps.
//!
//! Thresholding never touches the [`Mpg`]: each cutoff produces an owned
//! [`ThresholdResult`] from a read-only pass over the graph, so cutoffs can be
//! evaluated lazily one at a time or in parallel.

use crate::mpg::Mpg;
use crate::patches::PatchId;
use petgraph::unionfind::UnionFind;
use rayon::prelude::*;
use serde::{
    Deserialize,
    Serialize,
};
use tracing::{
    debug,
    info,
    instrument,
};

pub type ComponentId = u32;

/// A maximal set of patches joined by surviving links.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Component {
    /// 1-based, ordered by the smallest member patch id.
    pub id: ComponentId,
    pub members: Vec<PatchId>,
    pub cells: usize,
    pub area: f64,
    pub core_area: f64,
    /// Area-weighted mean of the member centroids.
    pub centroid: (f64, f64),
}

impl Component {
    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThresholdResult {
    pub cutoff: f64,
    pub components: Vec<Component>,
    /// Component of each patch, parallel to [`Mpg::patches`].
    pub component_of: Vec<ComponentId>,
    pub surviving_links: usize,
}

impl ThresholdResult {
    pub fn n_components(&self) -> usize {
        self.components.len()
    }

    /// Components holding a single patch.
    pub fn singletons(&self) -> impl Iterator<Item = &Component> + '_ {
        self.components.iter().filter(|c| c.len() == 1)
    }

    pub fn component(&self, id: ComponentId) -> Option<&Component> {
        id.checked_sub(1)
            .and_then(|i| self.components.get(i as usize))
    }
}

/// Partitions the graph after removing every link with `weight >= max_link_weight`.
pub fn threshold(mpg: &Mpg, max_link_weight: f64) -> ThresholdResult {
    let n = mpg.n_patches();
    let mut uf = UnionFind::<usize>::new(n);
    let mut surviving_links = 0;
    for link in mpg.links() {
        if link.weight < max_link_weight {
            // Endpoints were validated when the graph was built.
            if let (Some(a), Some(b)) = (mpg.slot(link.from), mpg.slot(link.to)) {
                uf.union(a, b);
                surviving_links += 1;
            }
        }
    }

    let roots = uf.into_labeling();
    let mut root_to_component = vec![0 as ComponentId; n];
    let mut component_of = vec![0 as ComponentId; n];
    let mut components: Vec<Component> = Vec::new();

    // Patches are sorted by id, so the first visit of a root is its smallest member.
    for (slot, patch) in mpg.patches().iter().enumerate() {
        let root = roots[slot];
        if root_to_component[root] == 0 {
            components.push(Component {
                id: (components.len() + 1) as ComponentId,
                members: Vec::new(),
                cells: 0,
                area: 0.0,
                core_area: 0.0,
                centroid: (0.0, 0.0),
            });
            root_to_component[root] = components.len() as ComponentId;
        }
        let cid = root_to_component[root];
        component_of[slot] = cid;

        let component = &mut components[(cid - 1) as usize];
        component.members.push(patch.id);
        component.cells += patch.cells;
        component.area += patch.area;
        component.core_area += patch.core_area;
        component.centroid.0 += patch.centroid.0 * patch.area;
        component.centroid.1 += patch.centroid.1 * patch.area;
    }

    for component in components.iter_mut() {
        if component.area > 0.0 {
            component.centroid.0 /= component.area;
            component.centroid.1 /= component.area;
        } else {
            component.centroid = (f64::NAN, f64::NAN);
        }
    }

    debug!(
        "Cutoff {}: {} links survive, {} components",
        max_link_weight,
        surviving_links,
        components.len()
    );

    ThresholdResult {
        cutoff: max_link_weight,
        components,
        component_of,
        surviving_links,
    }
}

/// Evenly spaced cutoffs covering the observed link weights.
///
/// The first cutoff equals the smallest weight (every link removed, each
/// patch isolated); the last lies just above the largest weight (graph
/// intact). Values are strictly increasing.
pub fn sweep_cutoffs(mpg: &Mpg, n_thresh: usize) -> Vec<f64> {
    if n_thresh == 0 {
        return Vec::new();
    }
    let (lo, hi) = mpg.weight_range().unwrap_or((0.0, 0.0));
    let intact = next_above(hi);
    if n_thresh == 1 {
        return vec![intact];
    }
    let span = if hi > lo { hi - lo } else { hi.abs().max(1.0) };
    let steps = (n_thresh - 1) as f64;
    let mut cutoffs: Vec<f64> = (0..n_thresh)
        .map(|i| lo + span * (i as f64 / steps))
        .collect();
    if let Some(last) = cutoffs.last_mut() {
        *last = last.max(intact);
    }
    cutoffs
}

/// Smallest float strictly greater than a non-negative finite weight.
fn next_above(x: f64) -> f64 {
    f64::from_bits(x.max(0.0).to_bits() + 1)
}

/// Ordered sequence of [`ThresholdResult`]s over increasing cutoffs.
///
/// Iterating computes one cutoff per step; stopping early costs nothing
/// beyond what was already yielded. [`ThresholdSweep::restart`] rewinds it.
#[derive(Debug, Clone)]
pub struct ThresholdSweep<'a> {
    mpg: &'a Mpg,
    cutoffs: Vec<f64>,
    next: usize,
}

impl<'a> ThresholdSweep<'a> {
    pub fn new(mpg: &'a Mpg, n_thresh: usize) -> Self {
        let cutoffs = sweep_cutoffs(mpg, n_thresh);
        info!(
            "Sweeping {} cutoffs over {:?}",
            cutoffs.len(),
            mpg.weight_range()
        );
        Self {
            mpg,
            cutoffs,
            next: 0,
        }
    }

    /// Sweep over caller supplied cutoffs (sorted, duplicates and NaN removed).
    pub fn with_cutoffs(mpg: &'a Mpg, mut cutoffs: Vec<f64>) -> Self {
        cutoffs.retain(|c| !c.is_nan());
        cutoffs.sort_by(|a, b| a.total_cmp(b));
        cutoffs.dedup();
        Self {
            mpg,
            cutoffs,
            next: 0,
        }
    }

    pub fn cutoffs(&self) -> &[f64] {
        &self.cutoffs
    }

    pub fn graph(&self) -> &'a Mpg {
        self.mpg
    }

    /// Back to the first cutoff.
    pub fn restart(&mut self) {
        self.next = 0;
    }

    /// Evaluates the remaining cutoffs on the rayon pool, preserving order.
    #[instrument(skip_all)]
    pub fn collect_parallel(self) -> Vec<ThresholdResult> {
        let mpg = self.mpg;
        self.cutoffs[self.next..]
            .par_iter()
            .map(|&cutoff| threshold(mpg, cutoff))
            .collect()
    }
}

impl Iterator for ThresholdSweep<'_> {
    type Item = ThresholdResult;

    fn next(&mut self) -> Option<Self::Item> {
        let cutoff = *self.cutoffs.get(self.next)?;
        self.next += 1;
        Some(threshold(self.mpg, cutoff))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.cutoffs.len() - self.next;
        (remaining, Some(remaining))
    }
}

impl ExactSizeIterator for ThresholdSweep<'_> {}

/// Convenience wrapper: the whole `n_thresh` sweep, evaluated in parallel.
pub fn threshold_sweep(mpg: &Mpg, n_thresh: usize) -> Vec<ThresholdResult> {
    ThresholdSweep::new(mpg, n_thresh).collect_parallel()
}
