// --------------------------------------------------------------------------------
// Least-cost links between neighbouring patches
// --------------------------------------------------------------------------------
//
// All patches expand at once over the resistance surface (multi-source
// Dijkstra). Every cell ends up owned by the patch that reaches it cheapest,
// which partitions the passable grid into a cost-weighted Voronoi tessellation.
// A link exists only where two regions touch; its weight is the cheapest
// meeting across that shared boundary. Diagonal contacts only count when no
// third region holds the opposite diagonal, which keeps the graph planar.

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
use crate::patches::{
    NO_PATCH,
    PatchId,
    PatchLabels,
};
use serde::{
    Deserialize,
    Serialize,
};
use std::cmp::Ordering;
use std::collections::{
    BinaryHeap,
    HashMap,
};
use tracing::{
    debug,
    info,
    instrument,
};

const NO_PRED: usize = usize::MAX;

/// Least-cost connection between the perimeters of two patches.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Link {
    /// Always the smaller of the two patch ids.
    pub from: PatchId,
    pub to: PatchId,
    /// Accumulated resistance along the path, in resistance x cell units.
    pub weight: f64,
    /// Euclidean length of the path in ground units.
    pub length: f64,
    /// Ordered cells from the `from` perimeter to the `to` perimeter.
    pub path: Vec<Cell>,
}

impl Link {
    pub fn endpoints(&self) -> (PatchId, PatchId) {
        (self.from, self.to)
    }

    pub fn from_perimeter(&self) -> Option<Cell> {
        self.path.first().copied()
    }

    pub fn to_perimeter(&self) -> Option<Cell> {
        self.path.last().copied()
    }
}

/// Per-cell state left behind by the expansion.
#[derive(Debug, Clone)]
pub struct CostSurface {
    /// Patch reaching each cell cheapest, [`NO_PATCH`] where unreachable.
    pub voronoi: Raster<PatchId>,
    /// Cost from the owning patch perimeter, `+inf` where unreachable.
    pub cost: Raster<f64>,
}

#[derive(Debug, Clone)]
pub struct LeastCostPaths {
    pub links: Vec<Link>,
    pub surface: CostSurface,
}

#[derive(Debug, Clone, Copy)]
struct Frontier {
    cost: f64,
    seq: u64,
    index: usize,
}

impl PartialEq for Frontier {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Frontier {}

impl PartialOrd for Frontier {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Frontier {
    // BinaryHeap is a max-heap: cheapest first, then earliest discovered.
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .cost
            .total_cmp(&self.cost)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

#[derive(Debug, Clone, Copy)]
struct Meeting {
    weight: f64,
    a: usize,
    b: usize,
}

/// Cost of stepping between two neighbouring cell centres.
#[inline]
fn step_cost(r_a: f64, r_b: f64, step: f64) -> f64 {
    0.5 * (r_a + r_b) * step
}

/// Runs the simultaneous expansion from every patch and returns one link per
/// pair of patches whose regions meet.
#[instrument(skip_all)]
pub fn shortest_paths(
    grid: &ResistanceGrid,
    patches: &PatchLabels,
    adjacency: Adjacency,
) -> Result<LeastCostPaths> {
    let geometry = *grid.geometry();
    let pgeom = patches.labels.geometry();
    if pgeom.width != geometry.width || pgeom.height != geometry.height {
        return Err(MpgError::invalid_grid(
            None,
            format!(
                "patch raster is {}x{}, resistance grid is {}x{}",
                pgeom.width, pgeom.height, geometry.width, geometry.height
            ),
        ));
    }

    let n = geometry.len();
    let labels = patches.labels.values();
    let mut cost = vec![f64::INFINITY; n];
    let mut owner = vec![NO_PATCH; n];
    let mut pred = vec![NO_PRED; n];
    let mut settled = vec![false; n];
    let mut heap = BinaryHeap::new();
    let mut seq = 0u64;

    for (index, &label) in labels.iter().enumerate() {
        if label != NO_PATCH {
            cost[index] = 0.0;
            owner[index] = label;
            heap.push(Frontier {
                cost: 0.0,
                seq,
                index,
            });
            seq += 1;
        }
    }

    // Every boundary between two regions, in the order it was found. Owners
    // of settled cells are final, but the diagonal corners may not be yet.
    let mut candidates: Vec<((PatchId, PatchId), Meeting)> = Vec::new();
    let mut n_settled = 0usize;

    while let Some(Frontier { index, .. }) = heap.pop() {
        if settled[index] {
            continue;
        }
        settled[index] = true;
        n_settled += 1;

        let here = geometry.cell(index);
        let r_here = grid.value(index);
        for (next, step) in geometry.neighbours(here, adjacency) {
            let next_index = geometry.index(next);
            if !grid.is_passable(next_index) {
                continue;
            }
            let through = step_cost(r_here, grid.value(next_index), step);

            if settled[next_index] {
                let (a, b) = (owner[index], owner[next_index]);
                if a != b {
                    let key = if a < b { (a, b) } else { (b, a) };
                    candidates.push((
                        key,
                        Meeting {
                            weight: cost[index] + through + cost[next_index],
                            a: index,
                            b: next_index,
                        },
                    ));
                }
                continue;
            }

            let next_cost = cost[index] + through;
            if next_cost < cost[next_index] {
                cost[next_index] = next_cost;
                owner[next_index] = owner[index];
                pred[next_index] = index;
                heap.push(Frontier {
                    cost: next_cost,
                    seq,
                    index: next_index,
                });
                seq += 1;
            }
        }
    }

    let n_candidates = candidates.len();
    let mut meetings: HashMap<(PatchId, PatchId), Meeting> = HashMap::new();
    for (key, candidate) in candidates {
        let (u, v) = (geometry.cell(candidate.a), geometry.cell(candidate.b));
        if crosses_other_regions(u, v, key, grid, &owner, &geometry) {
            continue;
        }
        // Strictly cheaper only: the first meeting found wins ties.
        meetings
            .entry(key)
            .and_modify(|m| {
                if candidate.weight < m.weight {
                    *m = candidate;
                }
            })
            .or_insert(candidate);
    }

    let mut keys: Vec<_> = meetings.keys().copied().collect();
    keys.sort_unstable();
    let links: Vec<Link> = keys
        .into_iter()
        .map(|key| {
            let meeting = meetings[&key];
            build_link(key, meeting, &owner, &pred, &geometry)
        })
        .collect();

    info!(
        "Expansion settled {} of {} cells, found {} links",
        n_settled,
        n,
        links.len()
    );
    debug!("Heap pushes: {}, boundary meetings: {}", seq, n_candidates);

    Ok(LeastCostPaths {
        links,
        surface: CostSurface {
            voronoi: Raster::from_parts_unchecked(geometry, owner),
            cost: Raster::from_parts_unchecked(geometry, cost),
        },
    })
}

/// A diagonal meeting is ignored when the other diagonal of its 2x2 block
/// is held by a third region in the final tessellation, so that links never
/// cross.
fn crosses_other_regions(
    u: Cell,
    v: Cell,
    (a, b): (PatchId, PatchId),
    grid: &ResistanceGrid,
    owner: &[PatchId],
    geometry: &GridGeometry,
) -> bool {
    if u.row == v.row || u.col == v.col {
        return false;
    }
    [Cell::new(u.row, v.col), Cell::new(v.row, u.col)]
        .into_iter()
        .any(|corner| {
            let i = geometry.index(corner);
            grid.is_passable(i) && owner[i] != NO_PATCH && owner[i] != a && owner[i] != b
        })
}

/// Walks back from a cell to the patch perimeter cell its cost came from.
fn trace_to_source(start: usize, pred: &[usize]) -> Vec<usize> {
    let mut chain = vec![start];
    let mut current = start;
    while pred[current] != NO_PRED {
        current = pred[current];
        chain.push(current);
    }
    chain
}

fn build_link(
    (from, to): (PatchId, PatchId),
    meeting: Meeting,
    owner: &[PatchId],
    pred: &[usize],
    geometry: &GridGeometry,
) -> Link {
    let (from_side, to_side) = if owner[meeting.a] == from {
        (meeting.a, meeting.b)
    } else {
        (meeting.b, meeting.a)
    };

    let mut path_idx = trace_to_source(from_side, pred);
    path_idx.reverse();
    path_idx.extend(trace_to_source(to_side, pred));

    let path: Vec<Cell> = path_idx.iter().map(|&i| geometry.cell(i)).collect();
    let length = path
        .windows(2)
        .map(|w| {
            let dr = w[0].row.abs_diff(w[1].row) as f64;
            let dc = w[0].col.abs_diff(w[1].col) as f64;
            (dr * dr + dc * dc).sqrt()
        })
        .sum::<f64>()
        * geometry.resolution;

    Link {
        from,
        to,
        weight: meeting.weight,
        length,
        path,
    }
}
