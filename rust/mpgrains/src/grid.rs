use crate::errors::{
    MpgError,
    Result,
};
use serde::{
    Deserialize,
    Serialize,
};
use std::collections::HashMap;
use std::fmt;
use tracing::info;

/// A (row, col) position in a grid. Row 0 is the northern edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Cell {
    pub row: usize,
    pub col: usize,
}

impl Cell {
    pub fn new(row: usize, col: usize) -> Self {
        Self { row, col }
    }
}

impl fmt::Display for Cell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "(row {}, col {})", self.row, self.col)
    }
}

/// Neighbourhood rule used both for patch labeling and for path-finding.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum Adjacency {
    /// 4-connectivity (orthogonal neighbours only).
    Rook,
    /// 8-connectivity, diagonal steps cost sqrt(2) times more.
    #[default]
    Queen,
}

const ROOK_OFFSETS: [(isize, isize, f64); 4] =
    [(-1, 0, 1.0), (0, -1, 1.0), (0, 1, 1.0), (1, 0, 1.0)];

const QUEEN_OFFSETS: [(isize, isize, f64); 8] = [
    (-1, -1, std::f64::consts::SQRT_2),
    (-1, 0, 1.0),
    (-1, 1, std::f64::consts::SQRT_2),
    (0, -1, 1.0),
    (0, 1, 1.0),
    (1, -1, std::f64::consts::SQRT_2),
    (1, 0, 1.0),
    (1, 1, std::f64::consts::SQRT_2),
];

impl Adjacency {
    /// Neighbour offsets as (drow, dcol, step length in cells), in row-major
    /// order.
    pub fn offsets(&self) -> &'static [(isize, isize, f64)] {
        match self {
            Adjacency::Rook => &ROOK_OFFSETS,
            Adjacency::Queen => &QUEEN_OFFSETS,
        }
    }

    pub fn neighbour_count(&self) -> usize {
        self.offsets().len()
    }
}

impl TryFrom<u8> for Adjacency {
    type Error = String;

    fn try_from(value: u8) -> std::result::Result<Self, Self::Error> {
        match value {
            4 => Ok(Adjacency::Rook),
            8 => Ok(Adjacency::Queen),
            other => Err(format!("adjacency must be 4 or 8, got {}", other)),
        }
    }
}

impl From<Adjacency> for u8 {
    fn from(value: Adjacency) -> Self {
        match value {
            Adjacency::Rook => 4,
            Adjacency::Queen => 8,
        }
    }
}

/// Placement of a grid on the ground.
///
/// The origin is the lower-left corner (ESRI convention) and `resolution`
/// is the side of a square cell in linear ground units.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GridGeometry {
    pub width: usize,
    pub height: usize,
    pub resolution: f64,
    pub origin_x: f64,
    pub origin_y: f64,
}

impl GridGeometry {
    pub fn new(width: usize, height: usize, resolution: f64) -> Self {
        Self {
            width,
            height,
            resolution,
            origin_x: 0.0,
            origin_y: 0.0,
        }
    }

    pub fn with_origin(mut self, origin_x: f64, origin_y: f64) -> Self {
        self.origin_x = origin_x;
        self.origin_y = origin_y;
        self
    }

    pub fn len(&self) -> usize {
        self.width * self.height
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[inline]
    pub fn index(&self, cell: Cell) -> usize {
        cell.row * self.width + cell.col
    }

    #[inline]
    pub fn cell(&self, index: usize) -> Cell {
        Cell {
            row: index / self.width,
            col: index % self.width,
        }
    }

    pub fn contains(&self, cell: Cell) -> bool {
        cell.row < self.height && cell.col < self.width
    }

    /// Area of one cell in squared ground units.
    pub fn cell_area(&self) -> f64 {
        self.resolution * self.resolution
    }

    /// Ground coordinates of the centre of a cell.
    pub fn cell_center(&self, cell: Cell) -> (f64, f64) {
        let x = self.origin_x + (cell.col as f64 + 0.5) * self.resolution;
        let y = self.origin_y + (self.height as f64 - cell.row as f64 - 0.5) * self.resolution;
        (x, y)
    }

    /// Neighbours of a cell that fall inside the grid, with the step length
    /// in cells (1 or sqrt(2)).
    pub fn neighbours(
        &self,
        cell: Cell,
        adjacency: Adjacency,
    ) -> impl Iterator<Item = (Cell, f64)> + '_ {
        adjacency
            .offsets()
            .iter()
            .filter_map(move |&(dr, dc, step)| {
                let row = cell.row.checked_add_signed(dr)?;
                let col = cell.col.checked_add_signed(dc)?;
                let next = Cell { row, col };
                self.contains(next).then_some((next, step))
            })
    }

    fn validate(&self) -> Result<()> {
        let Some(n_cells) = self.width.checked_mul(self.height) else {
            return Err(MpgError::invalid_grid(
                None,
                format!("{}x{} cells overflow the address space", self.width, self.height),
            ));
        };
        if n_cells == 0 {
            return Err(MpgError::invalid_grid(None, "grid has zero width or height"));
        }
        if !(self.resolution.is_finite() && self.resolution > 0.0) {
            return Err(MpgError::invalid_grid(
                None,
                format!("cell resolution must be positive, got {}", self.resolution),
            ));
        }
        Ok(())
    }
}

/// Row-major 2D array with a ground geometry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RasterParts<T>")]
pub struct Raster<T> {
    geometry: GridGeometry,
    values: Vec<T>,
}

#[derive(Deserialize)]
struct RasterParts<T> {
    geometry: GridGeometry,
    values: Vec<T>,
}

impl<T> TryFrom<RasterParts<T>> for Raster<T> {
    type Error = MpgError;

    fn try_from(parts: RasterParts<T>) -> Result<Self> {
        Raster::new(parts.geometry, parts.values)
    }
}

impl<T> Raster<T> {
    pub fn new(geometry: GridGeometry, values: Vec<T>) -> Result<Self> {
        geometry.validate()?;
        if values.len() != geometry.len() {
            return Err(MpgError::invalid_grid(
                None,
                format!(
                    "expected {}x{} = {} values, got {}",
                    geometry.width,
                    geometry.height,
                    geometry.len(),
                    values.len()
                ),
            ));
        }
        Ok(Self { geometry, values })
    }

    /// Builds a raster from rows of equal length with a unit resolution.
    pub fn from_rows(rows: Vec<Vec<T>>) -> Result<Self> {
        let height = rows.len();
        let width = rows.first().map(|r| r.len()).unwrap_or(0);
        if let Some((row, _)) = rows.iter().enumerate().find(|(_, r)| r.len() != width) {
            return Err(MpgError::invalid_grid(
                Some(Cell::new(row, 0)),
                "ragged rows",
            ));
        }
        let values = rows.into_iter().flatten().collect();
        Self::new(GridGeometry::new(width, height, 1.0), values)
    }

    pub fn geometry(&self) -> &GridGeometry {
        &self.geometry
    }

    pub fn with_geometry(mut self, geometry: GridGeometry) -> Result<Self> {
        if geometry.width != self.geometry.width || geometry.height != self.geometry.height {
            return Err(MpgError::invalid_grid(None, "geometry does not match raster size"));
        }
        geometry.validate()?;
        self.geometry = geometry;
        Ok(self)
    }

    pub fn width(&self) -> usize {
        self.geometry.width
    }

    pub fn height(&self) -> usize {
        self.geometry.height
    }

    pub fn values(&self) -> &[T] {
        &self.values
    }

    pub fn get(&self, cell: Cell) -> Option<&T> {
        if self.geometry.contains(cell) {
            self.values.get(self.geometry.index(cell))
        } else {
            None
        }
    }

    pub fn iter_cells(&self) -> impl Iterator<Item = (Cell, &T)> + '_ {
        self.values
            .iter()
            .enumerate()
            .map(|(i, v)| (self.geometry.cell(i), v))
    }

    pub fn map<U>(&self, f: impl FnMut(&T) -> U) -> Raster<U> {
        Raster {
            geometry: self.geometry,
            values: self.values.iter().map(f).collect(),
        }
    }

    pub(crate) fn from_parts_unchecked(geometry: GridGeometry, values: Vec<T>) -> Self {
        debug_assert_eq!(geometry.len(), values.len());
        Self { geometry, values }
    }
}

impl<T: Clone> Raster<T> {
    pub fn filled(geometry: GridGeometry, value: T) -> Result<Self> {
        geometry.validate()?;
        Self::new(geometry, vec![value; geometry.len()])
    }
}

/// Per-cell movement cost.
///
/// Every value is finite and non-negative, or `+inf` for impassable cells.
#[derive(Debug, Clone, PartialEq)]
pub struct ResistanceGrid {
    raster: Raster<f64>,
}

impl ResistanceGrid {
    pub fn new(raster: Raster<f64>) -> Result<Self> {
        for (cell, &value) in raster.iter_cells() {
            if value.is_nan() || value < 0.0 {
                return Err(MpgError::invalid_grid(
                    Some(cell),
                    format!("resistance must be non-negative or +inf, got {}", value),
                ));
            }
        }
        Ok(Self { raster })
    }

    pub fn from_rows(rows: Vec<Vec<f64>>) -> Result<Self> {
        Self::new(Raster::from_rows(rows)?)
    }

    pub fn raster(&self) -> &Raster<f64> {
        &self.raster
    }

    pub fn geometry(&self) -> &GridGeometry {
        self.raster.geometry()
    }

    #[inline]
    pub fn value(&self, index: usize) -> f64 {
        self.raster.values[index]
    }

    #[inline]
    pub fn is_passable(&self, index: usize) -> bool {
        self.raster.values[index].is_finite()
    }

    /// Smallest finite resistance, `None` if every cell is impassable.
    pub fn min_resistance(&self) -> Option<f64> {
        self.raster
            .values
            .iter()
            .copied()
            .filter(|v| v.is_finite())
            .min_by(|a, b| a.total_cmp(b))
    }
}

/// Maps land-cover classes to resistance values.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReclassTable {
    pub rows: Vec<ReclassRow>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ReclassRow {
    pub class: i32,
    /// `None` marks the class as impassable.
    pub resistance: Option<f64>,
}

impl ReclassTable {
    pub fn new(rows: Vec<ReclassRow>) -> Self {
        Self { rows }
    }

    /// Reclassifies a categorical raster. `None` cells (no data) are impassable.
    pub fn apply(&self, landcover: &Raster<Option<i32>>) -> Result<ResistanceGrid> {
        let mut lookup = HashMap::with_capacity(self.rows.len());
        for row in &self.rows {
            let value = row.resistance.unwrap_or(f64::INFINITY);
            if lookup.insert(row.class, value).is_some() {
                return Err(MpgError::invalid_grid(
                    None,
                    format!("class {} appears twice in the reclassification table", row.class),
                ));
            }
        }

        let mut values = Vec::with_capacity(landcover.geometry().len());
        for (cell, class) in landcover.iter_cells() {
            let value = match class {
                None => f64::INFINITY,
                Some(class) => *lookup.get(class).ok_or_else(|| {
                    MpgError::invalid_grid(
                        Some(cell),
                        format!("class {} missing from the reclassification table", class),
                    )
                })?,
            };
            values.push(value);
        }

        let grid = ResistanceGrid::new(Raster::new(*landcover.geometry(), values)?)?;
        info!(
            "Reclassified {}x{} landcover with {} classes",
            landcover.width(),
            landcover.height(),
            lookup.len()
        );
        Ok(grid)
    }
}
