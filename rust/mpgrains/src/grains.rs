//! Grains of connectivity.
//!
//! A grain is one threshold of the sweep made spatial: components become
//! super-nodes, pruned links between them become super-links, and every cell
//! of the Voronoi tessellation is reassigned to the component owning its
//! patch.

use crate::errors::{
    MpgError,
    Result,
};
use crate::grid::{
    Cell,
    Raster,
};
use crate::mpg::Mpg;
use crate::patches::NO_PATCH;
use crate::threshold::{
    ComponentId,
    ThresholdResult,
    ThresholdSweep,
    threshold,
};
use petgraph::algo::astar;
use petgraph::graph::{
    NodeIndex,
    UnGraph,
};
use petgraph::visit::EdgeRef;
use rayon::prelude::*;
use serde::{
    Deserialize,
    Serialize,
};
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{
    AtomicBool,
    Ordering,
};
use tracing::{
    info,
    instrument,
    warn,
};

/// Tessellation value for cells no patch can reach.
pub const NO_COMPONENT: ComponentId = 0;

/// Shared flag checked between cutoffs.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// Pruned MPG links between two components, collapsed to the cheapest.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GrainLink {
    pub from: ComponentId,
    pub to: ComponentId,
    pub weight: f64,
    /// How many MPG links join the two components.
    pub links: usize,
}

#[derive(Debug, Clone)]
pub struct Grain {
    /// 1-based position in the sweep.
    pub index: usize,
    pub result: ThresholdResult,
    pub links: Vec<GrainLink>,
    /// Cell to component, [`NO_COMPONENT`] where unreachable. Only present
    /// when the graph carries spatial layers.
    pub tessellation: Option<Raster<ComponentId>>,
}

impl Grain {
    pub fn cutoff(&self) -> f64 {
        self.result.cutoff
    }

    pub fn n_components(&self) -> usize {
        self.result.n_components()
    }

    pub fn component_at(&self, cell: Cell) -> Option<ComponentId> {
        self.tessellation
            .as_ref()?
            .get(cell)
            .copied()
            .filter(|&c| c != NO_COMPONENT)
    }

    /// Least sum of super-link weights between the components covering two
    /// cells. `Ok(None)` when either cell is unreachable or the components
    /// are not joined at all.
    pub fn distance(&self, a: Cell, b: Cell) -> Result<Option<f64>> {
        if self.tessellation.is_none() {
            return Err(MpgError::MissingSpatialLayers {
                context: "grain distance",
            });
        }
        let (Some(ca), Some(cb)) = (self.component_at(a), self.component_at(b)) else {
            return Ok(None);
        };
        if ca == cb {
            return Ok(Some(0.0));
        }

        // Node i is component i + 1.
        let mut graph: UnGraph<ComponentId, f64> =
            UnGraph::with_capacity(self.n_components(), self.links.len());
        for id in 1..=self.n_components() {
            graph.add_node(id as ComponentId);
        }
        for link in &self.links {
            graph.add_edge(
                NodeIndex::new((link.from - 1) as usize),
                NodeIndex::new((link.to - 1) as usize),
                link.weight,
            );
        }
        let target = NodeIndex::new((cb - 1) as usize);
        let found = astar(
            &graph,
            NodeIndex::new((ca - 1) as usize),
            |n| n == target,
            |e| *e.weight(),
            |_| 0.0,
        );
        Ok(found.map(|(cost, _)| cost))
    }
}

/// Materializes one grain from an already computed threshold result.
///
/// The result must come from `mpg`: one component per patch, every id within
/// the result's components.
pub fn build_grain(mpg: &Mpg, index: usize, result: ThresholdResult) -> Result<Grain> {
    if result.component_of.len() != mpg.n_patches() {
        return Err(MpgError::inconsistent(
            None,
            format!(
                "threshold result covers {} patches, graph has {}",
                result.component_of.len(),
                mpg.n_patches()
            ),
        ));
    }
    let n_components = result.n_components();
    if let Some(&bad) = result
        .component_of
        .iter()
        .find(|&&c| c == NO_COMPONENT || c as usize > n_components)
    {
        return Err(MpgError::inconsistent(
            None,
            format!("component {} outside 1..={}", bad, n_components),
        ));
    }
    Ok(assemble_grain(mpg, index, result))
}

fn assemble_grain(mpg: &Mpg, index: usize, result: ThresholdResult) -> Grain {
    let component_of = |id| mpg.slot(id).map(|slot| result.component_of[slot]);

    let mut collapsed: HashMap<(ComponentId, ComponentId), GrainLink> = HashMap::new();
    for link in mpg.links() {
        if link.weight < result.cutoff {
            continue;
        }
        let (Some(a), Some(b)) = (component_of(link.from), component_of(link.to)) else {
            continue;
        };
        if a == b {
            continue;
        }
        let key = if a < b { (a, b) } else { (b, a) };
        collapsed
            .entry(key)
            .and_modify(|g| {
                g.weight = g.weight.min(link.weight);
                g.links += 1;
            })
            .or_insert(GrainLink {
                from: key.0,
                to: key.1,
                weight: link.weight,
                links: 1,
            });
    }
    let mut links: Vec<GrainLink> = collapsed.into_values().collect();
    links.sort_by_key(|g| (g.from, g.to));

    let tessellation = mpg.spatial().map(|layers| {
        layers.voronoi.map(|&patch| {
            if patch == NO_PATCH {
                NO_COMPONENT
            } else {
                component_of(patch).unwrap_or(NO_COMPONENT)
            }
        })
    });

    Grain {
        index,
        result,
        links,
        tessellation,
    }
}

/// Grains in sweep order. May hold fewer than requested if building was cancelled.
#[derive(Debug, Clone)]
pub struct Grains {
    grains: Vec<Grain>,
    requested: usize,
}

impl Grains {
    pub fn len(&self) -> usize {
        self.grains.len()
    }

    pub fn is_empty(&self) -> bool {
        self.grains.is_empty()
    }

    pub fn requested(&self) -> usize {
        self.requested
    }

    pub fn is_complete(&self) -> bool {
        self.grains.len() == self.requested
    }

    pub fn iter(&self) -> impl Iterator<Item = &Grain> + '_ {
        self.grains.iter()
    }

    /// Grain at a 1-based sweep position.
    pub fn select(&self, index: usize) -> Result<&Grain> {
        index
            .checked_sub(1)
            .and_then(|i| self.grains.get(i))
            .ok_or(MpgError::IndexOutOfRange {
                index,
                len: self.grains.len(),
            })
    }
}

impl IntoIterator for Grains {
    type Item = Grain;
    type IntoIter = std::vec::IntoIter<Grain>;

    fn into_iter(self) -> Self::IntoIter {
        self.grains.into_iter()
    }
}

/// Collects grains built elsewhere, e.g. behind a progress bar. They must be
/// in sweep order.
impl FromIterator<Grain> for Grains {
    fn from_iter<I: IntoIterator<Item = Grain>>(iter: I) -> Self {
        let grains: Vec<Grain> = iter.into_iter().collect();
        let requested = grains.len();
        Self { grains, requested }
    }
}

/// Builds one grain per sweep cutoff, in order, checking `cancel` before each.
#[instrument(skip_all)]
pub fn build_grains_from(sweep: ThresholdSweep<'_>, cancel: &CancelToken) -> Grains {
    let mpg = sweep.graph();
    let requested = sweep.len();
    let mut grains = Vec::with_capacity(requested);
    for (i, result) in sweep.enumerate() {
        if cancel.is_cancelled() {
            warn!("Grain building cancelled after {} of {}", grains.len(), requested);
            break;
        }
        grains.push(assemble_grain(mpg, i + 1, result));
    }
    Grains { grains, requested }
}

pub fn build_grains(mpg: &Mpg, n_thresh: usize) -> Grains {
    build_grains_from(ThresholdSweep::new(mpg, n_thresh), &CancelToken::new())
}

/// Parallel variant of [`build_grains`]. On cancellation only the completed
/// prefix of the sweep is kept.
#[instrument(skip_all)]
pub fn build_grains_parallel(mpg: &Mpg, n_thresh: usize, cancel: &CancelToken) -> Grains {
    let sweep = ThresholdSweep::new(mpg, n_thresh);
    let requested = sweep.len();
    let built: Vec<Option<Grain>> = sweep
        .cutoffs()
        .par_iter()
        .enumerate()
        .map(|(i, &cutoff)| {
            if cancel.is_cancelled() {
                return None;
            }
            Some(assemble_grain(mpg, i + 1, threshold(mpg, cutoff)))
        })
        .collect();

    let grains: Vec<Grain> = built.into_iter().map_while(|g| g).collect();
    if grains.len() < requested {
        warn!("Grain building cancelled after {} of {}", grains.len(), requested);
    } else {
        info!("Built {} grains", grains.len());
    }
    Grains { grains, requested }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::{
        Adjacency,
        ResistanceGrid,
    };
    use crate::mpg::MpgConfig;
    use crate::patches::FocalRule;

    /// Three single-cell patches along a strip, gaps of increasing cost.
    fn strip() -> Mpg {
        let grid = ResistanceGrid::from_rows(vec![vec![
            1.0, 2.0, 1.0, 9.0, 9.0, 9.0, 1.0,
        ]])
        .unwrap();
        let config = MpgConfig {
            adjacency: Adjacency::Rook,
            min_patch_cells: 1,
        };
        Mpg::from_grid(&grid, &FocalRule::MinResistance, &config).unwrap()
    }

    #[test]
    fn test_grain_tessellation_follows_components() {
        let mpg = strip();
        assert_eq!(mpg.n_links(), 2);
        let grains = build_grains(&mpg, 3);
        assert_eq!(grains.len(), 3);
        assert!(grains.is_complete());

        let first = grains.select(1).unwrap();
        assert_eq!(first.n_components(), 3);
        let tess = first.tessellation.as_ref().unwrap();
        assert_eq!(tess.values()[0], 1);
        assert_eq!(tess.values()[6], 3);
        assert_eq!(first.links.len(), 2);

        let middle = grains.select(2).unwrap();
        assert_eq!(middle.n_components(), 2);
        assert_eq!(middle.component_at(Cell::new(0, 1)), Some(1));
        assert_eq!(middle.component_at(Cell::new(0, 2)), Some(1));
        assert_eq!(middle.links.len(), 1);
        assert_eq!(middle.links[0].from, 1);
        assert_eq!(middle.links[0].to, 2);

        let last = grains.select(3).unwrap();
        assert_eq!(last.n_components(), 1);
        assert!(last.links.is_empty());
        assert!(last.tessellation.as_ref().unwrap().values().iter().all(|&c| c == 1));
    }

    #[test]
    fn test_select_out_of_range() {
        let mpg = strip();
        let grains = build_grains(&mpg, 3);
        assert!(matches!(
            grains.select(0),
            Err(MpgError::IndexOutOfRange { index: 0, len: 3 })
        ));
        assert!(matches!(
            grains.select(4),
            Err(MpgError::IndexOutOfRange { index: 4, len: 3 })
        ));
        // Earlier grains are untouched by the failed lookups.
        assert_eq!(grains.select(3).unwrap().index, 3);
    }

    #[test]
    fn test_grain_distance() {
        let mpg = strip();
        let grains = build_grains(&mpg, 3);
        let first = grains.select(1).unwrap();
        let w12 = mpg.link_between(1, 2).unwrap().weight;
        let w23 = mpg.link_between(2, 3).unwrap().weight;
        let d = first
            .distance(Cell::new(0, 0), Cell::new(0, 6))
            .unwrap()
            .unwrap();
        assert!((d - (w12 + w23)).abs() < 1e-9);
        assert_eq!(
            grains
                .select(3)
                .unwrap()
                .distance(Cell::new(0, 0), Cell::new(0, 6))
                .unwrap(),
            Some(0.0)
        );
    }

    #[test]
    fn test_parallel_matches_sequential() {
        let mpg = strip();
        let sequential = build_grains(&mpg, 4);
        let parallel = build_grains_parallel(&mpg, 4, &CancelToken::new());
        assert_eq!(parallel.len(), sequential.len());
        for (a, b) in sequential.iter().zip(parallel.iter()) {
            assert_eq!(a.index, b.index);
            assert_eq!(a.result, b.result);
            assert_eq!(a.links, b.links);
            assert_eq!(a.tessellation, b.tessellation);
        }
    }

    #[test]
    fn test_cancelled_up_front_builders_agree() {
        let mpg = strip();
        let cancel = CancelToken::new();
        cancel.cancel();
        let sequential = build_grains_from(ThresholdSweep::new(&mpg, 5), &cancel);
        let parallel = build_grains_parallel(&mpg, 5, &cancel);
        for grains in [&sequential, &parallel] {
            assert!(grains.is_empty());
            assert!(!grains.is_complete());
            assert_eq!(grains.requested(), 5);
            assert!(matches!(
                grains.select(1),
                Err(MpgError::IndexOutOfRange { index: 1, len: 0 })
            ));
        }
    }

    #[test]
    fn test_cancel_mid_sweep_stops_remaining_cutoffs() {
        let mpg = strip();
        let cancel = CancelToken::new();
        let mut sweep = ThresholdSweep::new(&mpg, 5);
        let first = sweep.next().unwrap();
        let grain = build_grain(&mpg, 1, first).unwrap();
        cancel.cancel();
        let rest = build_grains_from(sweep, &cancel);
        assert_eq!(grain.n_components(), 3);
        assert!(rest.is_empty());
    }

    #[test]
    fn test_build_grain_rejects_foreign_result() {
        let mpg = strip();
        let other = Mpg::from_grid(
            &ResistanceGrid::from_rows(vec![vec![1.0, 5.0, 1.0, 5.0, 1.0, 5.0, 1.0]]).unwrap(),
            &FocalRule::MinResistance,
            &MpgConfig::default(),
        )
        .unwrap();
        assert_eq!(other.n_patches(), 4);
        let foreign = threshold(&other, 0.0);
        assert!(matches!(
            build_grain(&mpg, 1, foreign),
            Err(MpgError::InconsistentGraph { .. })
        ));

        let mut broken = threshold(&mpg, 0.0);
        broken.component_of[0] = 9;
        assert!(matches!(
            build_grain(&mpg, 1, broken),
            Err(MpgError::InconsistentGraph { .. })
        ));
    }

    #[test]
    fn test_distance_requires_spatial_layers() {
        let mpg = Mpg::build(strip().patches().to_vec(), strip().links().to_vec()).unwrap();
        let grains = build_grains(&mpg, 2);
        let grain = grains.select(1).unwrap();
        assert!(grain.tessellation.is_none());
        assert!(matches!(
            grain.distance(Cell::new(0, 0), Cell::new(0, 1)),
            Err(MpgError::MissingSpatialLayers { .. })
        ));
    }
}
