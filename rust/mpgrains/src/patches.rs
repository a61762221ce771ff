//! Patch (node) identification.
//!
//! Patches are maximal groups of focal cells connected under the configured
//! [`Adjacency`]. Ids are dense, start at 1 and follow raster scan order of
//! each patch's first cell, so relabeling the same grid is idempotent.

use crate::errors::{
    MpgError,
    Result,
};
use crate::grid::{
    Adjacency,
    Cell,
    Raster,
    ResistanceGrid,
};
use serde::{
    Deserialize,
    Serialize,
};
use std::collections::VecDeque;
use tracing::{
    debug,
    info,
};

pub type PatchId = u32;

/// Label used in patch rasters for cells that belong to no patch.
pub const NO_PATCH: PatchId = 0;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Patch {
    pub id: PatchId,
    pub cells: usize,
    pub core_cells: usize,
    /// Area in squared ground units.
    pub area: f64,
    pub core_area: f64,
    /// Mean of the cell centres, in ground units.
    pub centroid: (f64, f64),
}

/// Which cells seed patches.
#[derive(Debug, Clone, PartialEq)]
pub enum FocalRule {
    /// Cells whose resistance equals the grid minimum.
    MinResistance,
    /// Cells with resistance lower or equal to the value.
    MaxResistance(f64),
    /// A precomputed focal mask with the same size as the grid.
    Mask(Raster<bool>),
}

#[derive(Debug, Clone)]
pub struct PatchLabels {
    /// Patch id per cell, [`NO_PATCH`] outside patches.
    pub labels: Raster<PatchId>,
    pub cores: Raster<bool>,
    pub patches: Vec<Patch>,
}

impl PatchLabels {
    pub fn len(&self) -> usize {
        self.patches.len()
    }

    pub fn is_empty(&self) -> bool {
        self.patches.is_empty()
    }

    pub fn patch_at(&self, cell: Cell) -> Option<PatchId> {
        self.labels.get(cell).copied().filter(|&id| id != NO_PATCH)
    }
}

/// Labels patches over every cell where `is_focal` holds.
pub fn label<F>(grid: &ResistanceGrid, is_focal: F, adjacency: Adjacency) -> Result<PatchLabels>
where
    F: Fn(Cell, f64) -> bool,
{
    label_filtered(grid, is_focal, adjacency, 1)
}

/// Same as [`label`] but drops patches smaller than `min_cells`; their cells
/// are treated as ordinary matrix cells afterwards.
pub fn label_filtered<F>(
    grid: &ResistanceGrid,
    is_focal: F,
    adjacency: Adjacency,
    min_cells: usize,
) -> Result<PatchLabels>
where
    F: Fn(Cell, f64) -> bool,
{
    let geometry = *grid.geometry();
    let n = geometry.len();

    let mut focal = vec![false; n];
    let mut n_focal = 0;
    for (idx, is_focal_cell) in focal.iter_mut().enumerate() {
        let cell = geometry.cell(idx);
        let value = grid.value(idx);
        if is_focal(cell, value) {
            if !value.is_finite() {
                return Err(MpgError::invalid_grid(
                    Some(cell),
                    "focal cell has infinite resistance",
                ));
            }
            *is_focal_cell = true;
            n_focal += 1;
        }
    }
    if n_focal == 0 {
        return Err(MpgError::invalid_grid(None, "no focal cells"));
    }

    let mut labels = vec![NO_PATCH; n];
    let mut visited = vec![false; n];
    let mut queue = VecDeque::new();
    let mut members = Vec::new();
    let mut component_sizes = Vec::new();
    let mut dropped = 0usize;

    for start in 0..n {
        if !focal[start] || visited[start] {
            continue;
        }
        visited[start] = true;
        queue.push_back(start);
        members.clear();

        while let Some(idx) = queue.pop_front() {
            members.push(idx);
            for (next, _) in geometry.neighbours(geometry.cell(idx), adjacency) {
                let next_idx = geometry.index(next);
                if focal[next_idx] && !visited[next_idx] {
                    visited[next_idx] = true;
                    queue.push_back(next_idx);
                }
            }
        }

        if members.len() < min_cells {
            dropped += 1;
            continue;
        }
        component_sizes.push(members.len());
        let id = component_sizes.len() as PatchId;
        for &idx in &members {
            labels[idx] = id;
        }
    }

    if component_sizes.is_empty() {
        return Err(MpgError::invalid_grid(
            None,
            format!(
                "all {} candidate patches are smaller than {} cells",
                dropped, min_cells
            ),
        ));
    }

    let neighbourhood = adjacency.neighbour_count();
    let mut cores = vec![false; n];
    let mut core_counts = vec![0usize; component_sizes.len()];
    let mut centroid_sums = vec![(0.0, 0.0); component_sizes.len()];
    for idx in 0..n {
        let id = labels[idx];
        if id == NO_PATCH {
            continue;
        }
        let cell = geometry.cell(idx);
        let (x, y) = geometry.cell_center(cell);
        let slot = (id - 1) as usize;
        centroid_sums[slot].0 += x;
        centroid_sums[slot].1 += y;

        let same = geometry
            .neighbours(cell, adjacency)
            .filter(|(next, _)| labels[geometry.index(*next)] == id)
            .count();
        // Cells on the grid edge have a truncated neighbourhood and are never core.
        if same == neighbourhood {
            cores[idx] = true;
            core_counts[slot] += 1;
        }
    }

    let cell_area = geometry.cell_area();
    let patches: Vec<Patch> = component_sizes
        .iter()
        .zip(core_counts.iter())
        .zip(centroid_sums.iter())
        .enumerate()
        .map(|(slot, ((&cells, &core_cells), &(sx, sy)))| Patch {
            id: (slot + 1) as PatchId,
            cells,
            core_cells,
            area: cells as f64 * cell_area,
            core_area: core_cells as f64 * cell_area,
            centroid: (sx / cells as f64, sy / cells as f64),
        })
        .collect();

    info!(
        "Labeled {} patches from {} focal cells ({} dropped below {} cells)",
        patches.len(),
        n_focal,
        dropped,
        min_cells
    );
    debug!("Patch sizes: {:?}", component_sizes);

    Ok(PatchLabels {
        labels: Raster::from_parts_unchecked(geometry, labels),
        cores: Raster::from_parts_unchecked(geometry, cores),
        patches,
    })
}

/// Resolves a [`FocalRule`] against a grid and labels the resulting patches.
pub fn label_with_rule(
    grid: &ResistanceGrid,
    rule: &FocalRule,
    adjacency: Adjacency,
    min_cells: usize,
) -> Result<PatchLabels> {
    match rule {
        FocalRule::MinResistance => {
            let min = grid
                .min_resistance()
                .ok_or_else(|| MpgError::invalid_grid(None, "every cell is impassable"))?;
            label_filtered(grid, |_, v| v == min, adjacency, min_cells)
        }
        FocalRule::MaxResistance(max) => {
            let max = *max;
            label_filtered(grid, |_, v| v <= max, adjacency, min_cells)
        }
        FocalRule::Mask(mask) => {
            if mask.width() != grid.geometry().width || mask.height() != grid.geometry().height {
                return Err(MpgError::invalid_grid(
                    None,
                    format!(
                        "focal mask is {}x{}, grid is {}x{}",
                        mask.width(),
                        mask.height(),
                        grid.geometry().width,
                        grid.geometry().height
                    ),
                ));
            }
            label_filtered(
                grid,
                |cell, _| mask.get(cell).copied().unwrap_or(false),
                adjacency,
                min_cells,
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grid(rows: &[&str]) -> ResistanceGrid {
        // '#' = focal (resistance 1), '.' = matrix (resistance 5), 'X' = impassable
        let rows = rows
            .iter()
            .map(|r| {
                r.chars()
                    .map(|c| match c {
                        '#' => 1.0,
                        'X' => f64::INFINITY,
                        _ => 5.0,
                    })
                    .collect()
            })
            .collect();
        ResistanceGrid::from_rows(rows).unwrap()
    }

    #[test]
    fn test_adjacency_changes_patch_count() {
        let g = grid(&["#..", ".#.", "..#"]);
        let rook = label_with_rule(&g, &FocalRule::MinResistance, Adjacency::Rook, 1).unwrap();
        let queen = label_with_rule(&g, &FocalRule::MinResistance, Adjacency::Queen, 1).unwrap();
        assert_eq!(rook.len(), 3);
        assert_eq!(queen.len(), 1);
        assert_eq!(queen.patches[0].cells, 3);
    }

    #[test]
    fn test_ids_follow_scan_order() {
        let g = grid(&["..#", "#..", "..."]);
        let labels = label_with_rule(&g, &FocalRule::MinResistance, Adjacency::Rook, 1).unwrap();
        assert_eq!(labels.patch_at(Cell::new(0, 2)), Some(1));
        assert_eq!(labels.patch_at(Cell::new(1, 0)), Some(2));
        assert_eq!(labels.patch_at(Cell::new(1, 1)), None);
    }

    #[test]
    fn test_core_cells() {
        let g = grid(&[".....", ".###.", ".###.", ".###.", "....."]);
        let labels = label_with_rule(&g, &FocalRule::MinResistance, Adjacency::Queen, 1).unwrap();
        assert_eq!(labels.len(), 1);
        let patch = labels.patches[0];
        assert_eq!(patch.cells, 9);
        assert_eq!(patch.core_cells, 1);
        assert!(labels.cores.get(Cell::new(2, 2)).copied().unwrap());
        assert_eq!(patch.centroid, (2.5, 2.5));
    }

    #[test]
    fn test_single_cell_patch_has_no_core() {
        let g = grid(&["...", ".#.", "..."]);
        let labels = label_with_rule(&g, &FocalRule::MinResistance, Adjacency::Rook, 1).unwrap();
        assert_eq!(labels.patches[0].core_cells, 0);
        assert_eq!(labels.patches[0].core_area, 0.0);
    }

    #[test]
    fn test_edge_cells_are_not_core() {
        let g = grid(&["###", "###", "###"]);
        let labels = label(&g, |_, _| true, Adjacency::Rook).unwrap();
        assert_eq!(labels.patches[0].core_cells, 1);
    }

    #[test]
    fn test_no_focal_cells_is_invalid() {
        let g = grid(&["...", "..."]);
        let result = label(&g, |_, v| v < 1.0, Adjacency::Queen);
        assert!(matches!(result, Err(MpgError::InvalidGrid { .. })));
    }

    #[test]
    fn test_min_cells_filter_relabels_densely() {
        let g = grid(&["#.##", "....", "##.#"]);
        let labels = label_with_rule(&g, &FocalRule::MinResistance, Adjacency::Rook, 2).unwrap();
        assert_eq!(labels.len(), 2);
        assert_eq!(labels.patch_at(Cell::new(0, 0)), None);
        assert_eq!(labels.patch_at(Cell::new(0, 2)), Some(1));
        assert_eq!(labels.patch_at(Cell::new(2, 0)), Some(2));
    }

    #[test]
    fn test_labeling_is_idempotent() {
        let g = grid(&["#.#.#", ".....", "##..#", "...##"]);
        let a = label_with_rule(&g, &FocalRule::MinResistance, Adjacency::Queen, 1).unwrap();
        let b = label_with_rule(&g, &FocalRule::MinResistance, Adjacency::Queen, 1).unwrap();
        assert_eq!(a.labels, b.labels);
        assert_eq!(a.patches, b.patches);
    }

    #[test]
    fn test_mask_rule_and_impassable_focal() {
        let g = grid(&["#X", ".."]);
        let mask = Raster::from_rows(vec![vec![false, true], vec![false, false]]).unwrap();
        let result = label_with_rule(&g, &FocalRule::Mask(mask), Adjacency::Rook, 1);
        assert!(matches!(
            result,
            Err(MpgError::InvalidGrid {
                cell: Some(Cell { row: 0, col: 1 }),
                ..
            })
        ));

        let bad_size = Raster::from_rows(vec![vec![true]]).unwrap();
        assert!(label_with_rule(&g, &FocalRule::Mask(bad_size), Adjacency::Rook, 1).is_err());
    }
}
