//! Landscape connectivity graphs over resistance surfaces.
//!
//! The pipeline runs leaves first:
//!
//! 1. [`grid`]: resistance grid (optionally reclassified from land cover).
//! 2. [`patches`]: focal patches labeled under 4- or 8-connectivity.
//! 3. [`lcp`]: simultaneous least-cost expansion from all patches, giving the
//!    Voronoi tessellation and one link per pair of touching regions.
//! 4. [`mpg`]: the minimum planar graph (MPG) assembled from both.
//! 5. [`threshold`] / [`grains`]: scalar sweeps over link weight and the
//!    multi-scale "grains of connectivity" derived from them.
//!
//! # Example
//! ```
//! use mpgrains::{FocalRule, Mpg, MpgConfig, ResistanceGrid, build_grains};
//!
//! let grid = ResistanceGrid::from_rows(vec![
//!     vec![1.0, 5.0, 5.0, 1.0],
//!     vec![5.0, 5.0, 5.0, 5.0],
//!     vec![1.0, 5.0, 5.0, 1.0],
//! ])
//! .unwrap();
//! let mpg = Mpg::from_grid(&grid, &FocalRule::MinResistance, &MpgConfig::default()).unwrap();
//! assert_eq!(mpg.n_patches(), 4);
//!
//! let grains = build_grains(&mpg, 5);
//! assert_eq!(grains.select(5).unwrap().n_components(), 1);
//! assert!(grains.select(6).is_err());
//! ```

pub mod errors;
pub mod grains;
pub mod grid;
pub mod lcp;
pub mod mpg;
pub mod patches;
pub mod render;
pub mod tables;
pub mod threshold;

#[doc(inline)]
pub use errors::{
    MpgError,
    Result,
};

#[doc(inline)]
pub use grid::{
    Adjacency,
    Cell,
    GridGeometry,
    Raster,
    ReclassRow,
    ReclassTable,
    ResistanceGrid,
};

#[doc(inline)]
pub use patches::{
    FocalRule,
    Patch,
    PatchId,
    PatchLabels,
    label,
};

#[doc(inline)]
pub use lcp::{
    Link,
    shortest_paths,
};

#[doc(inline)]
pub use mpg::{
    Mpg,
    MpgConfig,
};

#[doc(inline)]
pub use threshold::{
    Component,
    ThresholdResult,
    ThresholdSweep,
    threshold,
    threshold_sweep,
};

#[doc(inline)]
pub use grains::{
    CancelToken,
    Grain,
    Grains,
    build_grains,
};

#[doc(inline)]
pub use render::{
    RenderConfig,
    View,
    render,
};
