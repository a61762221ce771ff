//! Flat row views of graphs and grains, for reporting.

use crate::errors::Result;
use crate::grains::Grain;
use crate::mpg::Mpg;
use crate::threshold::ThresholdResult;
use serde::{
    Deserialize,
    Serialize,
};
use std::io::Write;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeRow {
    pub id: u32,
    pub cells: usize,
    pub area: f64,
    pub core_area: f64,
    pub centroid_x: f64,
    pub centroid_y: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinkRow {
    pub from: u32,
    pub to: u32,
    pub weight: f64,
    pub length: f64,
    pub path_cells: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThresholdRow {
    pub index: usize,
    pub cutoff: f64,
    pub n_components: usize,
    pub surviving_links: usize,
    pub largest_area: f64,
    pub largest_core_area: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComponentRow {
    pub grain: usize,
    pub cutoff: f64,
    pub component: u32,
    pub n_patches: usize,
    pub cells: usize,
    pub area: f64,
    pub core_area: f64,
    pub centroid_x: f64,
    pub centroid_y: f64,
}

pub fn node_table(mpg: &Mpg) -> Vec<NodeRow> {
    mpg.patches()
        .iter()
        .map(|p| NodeRow {
            id: p.id,
            cells: p.cells,
            area: p.area,
            core_area: p.core_area,
            centroid_x: p.centroid.0,
            centroid_y: p.centroid.1,
        })
        .collect()
}

pub fn link_table(mpg: &Mpg) -> Vec<LinkRow> {
    mpg.links()
        .iter()
        .map(|l| LinkRow {
            from: l.from,
            to: l.to,
            weight: l.weight,
            length: l.length,
            path_cells: l.path.len(),
        })
        .collect()
}

/// One summary row per result, `index` is the 1-based sweep position.
pub fn threshold_table<'a>(results: impl IntoIterator<Item = &'a ThresholdResult>) -> Vec<ThresholdRow> {
    results
        .into_iter()
        .enumerate()
        .map(|(i, r)| ThresholdRow {
            index: i + 1,
            cutoff: r.cutoff,
            n_components: r.n_components(),
            surviving_links: r.surviving_links,
            largest_area: r.components.iter().map(|c| c.area).fold(0.0, f64::max),
            largest_core_area: r.components.iter().map(|c| c.core_area).fold(0.0, f64::max),
        })
        .collect()
}

pub fn component_table(grain: &Grain) -> Vec<ComponentRow> {
    grain
        .result
        .components
        .iter()
        .map(|c| ComponentRow {
            grain: grain.index,
            cutoff: grain.cutoff(),
            component: c.id,
            n_patches: c.len(),
            cells: c.cells,
            area: c.area,
            core_area: c.core_area,
            centroid_x: c.centroid.0,
            centroid_y: c.centroid.1,
        })
        .collect()
}

/// Writes rows as CSV with a header line.
pub fn write_csv<T: Serialize, W: Write>(rows: &[T], writer: W) -> Result<()> {
    let mut wtr = csv::Writer::from_writer(writer);
    for row in rows {
        wtr.serialize(row)?;
    }
    wtr.flush()?;
    Ok(())
}
