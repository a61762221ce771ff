//! Minimum planar graph assembly.
//!
//! An [`Mpg`] is an arena of patches (indexed by id) plus an arena of links
//! with an adjacency index and an endpoint-pair index. It is never mutated
//! after construction; every threshold view is derived from it.

use crate::errors::{
    MpgError,
    Result,
};
use crate::grid::{
    Adjacency,
    Cell,
    GridGeometry,
    Raster,
    ResistanceGrid,
};
use crate::lcp::{
    Link,
    shortest_paths,
};
use crate::patches::{
    FocalRule,
    NO_PATCH,
    Patch,
    PatchId,
    label_with_rule,
};
use petgraph::algo::astar;
use petgraph::graph::{
    NodeIndex,
    UnGraph,
};
use petgraph::visit::EdgeRef;
use serde::{
    Deserialize,
    Serialize,
};
use std::collections::HashMap;
use tracing::{
    info,
    instrument,
    warn,
};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MpgConfig {
    pub adjacency: Adjacency,
    /// Patches with fewer cells are dropped before path-finding.
    pub min_patch_cells: usize,
}

impl Default for MpgConfig {
    fn default() -> Self {
        Self {
            adjacency: Adjacency::Queen,
            min_patch_cells: 1,
        }
    }
}

/// Raster layers kept when the graph is built from a grid.
#[derive(Debug, Clone)]
pub struct SpatialLayers {
    pub labels: Raster<PatchId>,
    pub cores: Raster<bool>,
    pub voronoi: Raster<PatchId>,
    pub cost: Raster<f64>,
}

impl SpatialLayers {
    pub fn geometry(&self) -> &GridGeometry {
        self.labels.geometry()
    }

    /// Patch whose Voronoi region contains the cell.
    pub fn region_of(&self, cell: Cell) -> Option<PatchId> {
        self.voronoi.get(cell).copied().filter(|&id| id != NO_PATCH)
    }
}

#[derive(Debug, Clone)]
pub struct Mpg {
    patches: Vec<Patch>,
    slots: HashMap<PatchId, usize>,
    links: Vec<Link>,
    incident: Vec<Vec<usize>>,
    pairs: HashMap<(PatchId, PatchId), usize>,
    spatial: Option<SpatialLayers>,
}

impl Mpg {
    /// Assembles a graph from patches and links.
    ///
    /// Links given more than once for the same pair keep the cheapest copy.
    /// Unknown endpoints, self links and invalid weights are rejected.
    pub fn build(mut patches: Vec<Patch>, links: Vec<Link>) -> Result<Self> {
        patches.sort_by_key(|p| p.id);
        let mut slots = HashMap::with_capacity(patches.len());
        for (slot, patch) in patches.iter().enumerate() {
            if patch.id == NO_PATCH {
                return Err(MpgError::inconsistent(
                    None,
                    format!("patch id {} is reserved for 'no patch'", NO_PATCH),
                ));
            }
            if slots.insert(patch.id, slot).is_some() {
                return Err(MpgError::inconsistent(
                    None,
                    format!("patch id {} appears twice", patch.id),
                ));
            }
        }

        let mut pairs: HashMap<(PatchId, PatchId), usize> = HashMap::with_capacity(links.len());
        let mut kept: Vec<Link> = Vec::with_capacity(links.len());
        let mut n_duplicates = 0usize;
        for mut link in links {
            if link.from == link.to {
                return Err(MpgError::inconsistent(
                    Some(link.endpoints()),
                    "self link",
                ));
            }
            if !(link.weight.is_finite() && link.weight >= 0.0) {
                return Err(MpgError::inconsistent(
                    Some(link.endpoints()),
                    format!("weight must be finite and non-negative, got {}", link.weight),
                ));
            }
            for id in [link.from, link.to] {
                if !slots.contains_key(&id) {
                    return Err(MpgError::inconsistent(
                        Some(link.endpoints()),
                        format!("endpoint {} is not a known patch", id),
                    ));
                }
            }
            if link.from > link.to {
                std::mem::swap(&mut link.from, &mut link.to);
                link.path.reverse();
            }

            match pairs.get(&link.endpoints()) {
                Some(&existing) => {
                    n_duplicates += 1;
                    if link.weight < kept[existing].weight {
                        kept[existing] = link;
                    }
                }
                None => {
                    pairs.insert(link.endpoints(), kept.len());
                    kept.push(link);
                }
            }
        }
        if n_duplicates > 0 {
            warn!("Dropped {} duplicate links (kept the cheapest)", n_duplicates);
        }

        let mut incident = vec![Vec::new(); patches.len()];
        for (i, link) in kept.iter().enumerate() {
            incident[slots[&link.from]].push(i);
            incident[slots[&link.to]].push(i);
        }

        let mpg = Self {
            patches,
            slots,
            links: kept,
            incident,
            pairs,
            spatial: None,
        };

        let isolated = mpg.isolated_patches();
        if mpg.n_patches() > 1 && !isolated.is_empty() {
            warn!(
                "{} patches have no reachable neighbour and stay isolated: {:?}",
                isolated.len(),
                isolated
            );
        }
        Ok(mpg)
    }

    /// Full pipeline: label patches, expand least-cost paths, assemble.
    #[instrument(skip_all)]
    pub fn from_grid(grid: &ResistanceGrid, rule: &FocalRule, config: &MpgConfig) -> Result<Self> {
        let labels = label_with_rule(grid, rule, config.adjacency, config.min_patch_cells)?;
        let paths = shortest_paths(grid, &labels, config.adjacency)?;
        let mut mpg = Self::build(labels.patches, paths.links)?;
        mpg.spatial = Some(SpatialLayers {
            labels: labels.labels,
            cores: labels.cores,
            voronoi: paths.surface.voronoi,
            cost: paths.surface.cost,
        });
        info!(
            "Built MPG with {} nodes and {} links",
            mpg.n_patches(),
            mpg.n_links()
        );
        Ok(mpg)
    }

    pub fn patches(&self) -> &[Patch] {
        &self.patches
    }

    pub fn links(&self) -> &[Link] {
        &self.links
    }

    pub fn n_patches(&self) -> usize {
        self.patches.len()
    }

    pub fn n_links(&self) -> usize {
        self.links.len()
    }

    pub fn spatial(&self) -> Option<&SpatialLayers> {
        self.spatial.as_ref()
    }

    pub fn patch(&self, id: PatchId) -> Option<&Patch> {
        self.slot(id).map(|s| &self.patches[s])
    }

    /// Position of a patch in [`Mpg::patches`].
    pub fn slot(&self, id: PatchId) -> Option<usize> {
        self.slots.get(&id).copied()
    }

    pub fn link_between(&self, a: PatchId, b: PatchId) -> Option<&Link> {
        let key = if a < b { (a, b) } else { (b, a) };
        self.pairs.get(&key).map(|&i| &self.links[i])
    }

    /// Neighbouring patches with the link leading to each.
    pub fn neighbours(&self, id: PatchId) -> impl Iterator<Item = (PatchId, &Link)> + '_ {
        self.slot(id)
            .map(|s| self.incident[s].as_slice())
            .unwrap_or(&[])
            .iter()
            .map(move |&i| {
                let link = &self.links[i];
                let other = if link.from == id { link.to } else { link.from };
                (other, link)
            })
    }

    pub fn isolated_patches(&self) -> Vec<PatchId> {
        self.patches
            .iter()
            .zip(self.incident.iter())
            .filter(|(_, inc)| inc.is_empty())
            .map(|(p, _)| p.id)
            .collect()
    }

    /// Raises the isolated-patch condition as an error.
    pub fn ensure_connected(&self) -> Result<()> {
        if self.patches.len() < 2 {
            return Ok(());
        }
        let isolated = self.isolated_patches();
        if isolated.is_empty() {
            Ok(())
        } else {
            Err(MpgError::DisconnectedGrid { isolated })
        }
    }

    /// (min, max) link weight, `None` without links.
    pub fn weight_range(&self) -> Option<(f64, f64)> {
        let mut iter = self.links.iter().map(|l| l.weight);
        let first = iter.next()?;
        Some(iter.fold((first, first), |(lo, hi), w| (lo.min(w), hi.max(w))))
    }

    /// Patches as nodes, in [`Mpg::patches`] order, and links as weighted edges.
    pub fn to_graph(&self) -> UnGraph<PatchId, f64> {
        let mut graph = UnGraph::with_capacity(self.patches.len(), self.links.len());
        for patch in &self.patches {
            graph.add_node(patch.id);
        }
        for link in &self.links {
            graph.add_edge(
                NodeIndex::new(self.slots[&link.from]),
                NodeIndex::new(self.slots[&link.to]),
                link.weight,
            );
        }
        graph
    }

    /// Least-cost route through the graph, as total weight and visited patches.
    pub fn shortest_path(&self, from: PatchId, to: PatchId) -> Option<(f64, Vec<PatchId>)> {
        let source = NodeIndex::new(self.slot(from)?);
        let target = NodeIndex::new(self.slot(to)?);
        let graph = self.to_graph();
        let (cost, route) = astar(&graph, source, |n| n == target, |e| *e.weight(), |_| 0.0)?;
        Some((cost, route.into_iter().map(|n| graph[n]).collect()))
    }
}
