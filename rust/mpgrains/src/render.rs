// ANSI color codes
const COLOR_GRAY: &str = "\x1b[90m";
const COLOR_CYAN: &str = "\x1b[96m";
const COLOR_RESET: &str = "\x1b[0m";

const PALETTE: [&str; 6] = [
    "\x1b[91m", // red
    "\x1b[92m", // green
    "\x1b[93m", // yellow
    "\x1b[94m", // blue
    "\x1b[95m", // magenta
    "\x1b[97m", // white
];

use crate::errors::{
    MpgError,
    Result,
};
use crate::grains::{
    Grain,
    NO_COMPONENT,
};
use crate::mpg::Mpg;
use crate::patches::NO_PATCH;

/// What to draw.
#[derive(Debug, Clone, Copy)]
pub enum View<'a> {
    Patches,
    /// Core cells solid, the rest of each patch shaded.
    Cores,
    /// Patches plus the least-cost path of every link.
    Links,
    /// Components of one grain over the Voronoi tessellation.
    Tessellation(&'a Grain),
}

#[derive(Debug, Clone, Copy)]
pub struct RenderConfig {
    /// Maximum (columns, rows) of the drawing, larger grids are downscaled.
    pub max_size: (usize, usize),
    pub color: bool,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            max_size: (60, 30),
            color: true,
        }
    }
}

/// Per-cell symbol. Variants are ordered by drawing priority when several
/// cells collapse into one character.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum Mark {
    Barrier,
    Matrix,
    Region(u32),
    Path,
    Patch(u32),
    Core(u32),
}

impl Mark {
    fn glyph(&self) -> char {
        match self {
            Mark::Barrier => '▓',
            Mark::Matrix => '·',
            Mark::Region(_) => '░',
            Mark::Path => '•',
            Mark::Patch(_) => '▒',
            Mark::Core(_) => '█',
        }
    }

    fn color(&self) -> &'static str {
        match self {
            Mark::Barrier | Mark::Matrix => COLOR_GRAY,
            Mark::Path => COLOR_CYAN,
            Mark::Region(id) | Mark::Patch(id) | Mark::Core(id) => {
                PALETTE[*id as usize % PALETTE.len()]
            }
        }
    }
}

/// Renders a view of the graph as a terminal map.
pub fn render(mpg: &Mpg, view: View<'_>, config: &RenderConfig) -> Result<String> {
    let layers = mpg.spatial().ok_or(MpgError::MissingSpatialLayers {
        context: "rendering",
    })?;
    let geometry = *layers.geometry();
    let labels = layers.labels.values();
    let cores = layers.cores.values();
    let voronoi = layers.voronoi.values();

    let background = |i: usize| {
        if voronoi[i] == NO_PATCH {
            Mark::Barrier
        } else {
            Mark::Matrix
        }
    };

    let (marks, legend): (Vec<Mark>, String) = match view {
        View::Patches => (
            (0..geometry.len())
                .map(|i| match labels[i] {
                    NO_PATCH => background(i),
                    id => Mark::Core(id),
                })
                .collect(),
            format!("{} patches", mpg.n_patches()),
        ),
        View::Cores => (
            (0..geometry.len())
                .map(|i| match (labels[i], cores[i]) {
                    (NO_PATCH, _) => background(i),
                    (id, true) => Mark::Core(id),
                    (id, false) => Mark::Patch(id),
                })
                .collect(),
            format!(
                "{} core cells in {} patches",
                cores.iter().filter(|&&c| c).count(),
                mpg.n_patches()
            ),
        ),
        View::Links => {
            let mut marks: Vec<Mark> = (0..geometry.len())
                .map(|i| match labels[i] {
                    NO_PATCH => background(i),
                    id => Mark::Core(id),
                })
                .collect();
            for link in mpg.links() {
                for &cell in &link.path {
                    let i = geometry.index(cell);
                    if labels[i] == NO_PATCH {
                        marks[i] = Mark::Path;
                    }
                }
            }
            (marks, format!("{} patches, {} links", mpg.n_patches(), mpg.n_links()))
        }
        View::Tessellation(grain) => {
            let tessellation =
                grain
                    .tessellation
                    .as_ref()
                    .ok_or(MpgError::MissingSpatialLayers {
                        context: "rendering a grain",
                    })?;
            if tessellation.geometry() != &geometry {
                return Err(MpgError::inconsistent(
                    None,
                    format!(
                        "grain {} tessellation is {}x{}, graph grid is {}x{}",
                        grain.index,
                        tessellation.width(),
                        tessellation.height(),
                        geometry.width,
                        geometry.height
                    ),
                ));
            }
            let components = tessellation.values();
            (
                (0..geometry.len())
                    .map(|i| match (components[i], labels[i]) {
                        (NO_COMPONENT, _) => Mark::Barrier,
                        (c, NO_PATCH) => Mark::Region(c),
                        (c, _) => Mark::Core(c),
                    })
                    .collect(),
                format!(
                    "grain {} (cutoff {:.2}): {} components",
                    grain.index,
                    grain.cutoff(),
                    grain.n_components()
                ),
            )
        }
    };

    let x_scale = calculate_scale_factor(geometry.width, config.max_size.0);
    let y_scale = calculate_scale_factor(geometry.height, config.max_size.1);
    let display_cols = geometry.width.div_ceil(x_scale);
    let display_rows = geometry.height.div_ceil(y_scale);

    let mut output = String::new();
    output.push('╔');
    output.push_str(&"═".repeat(display_cols));
    output.push_str("╗\n");

    for display_r in 0..display_rows {
        output.push('║');
        for display_c in 0..display_cols {
            // Max pooling by priority over the x_scale × y_scale block
            let mut best = Mark::Barrier;
            let rows = display_r * y_scale..((display_r + 1) * y_scale).min(geometry.height);
            for r in rows {
                let cols = display_c * x_scale..((display_c + 1) * x_scale).min(geometry.width);
                for c in cols {
                    best = best.max(marks[r * geometry.width + c]);
                }
            }
            if config.color {
                output.push_str(best.color());
                output.push(best.glyph());
                output.push_str(COLOR_RESET);
            } else {
                output.push(best.glyph());
            }
        }
        output.push_str("║\n");
    }

    output.push('╚');
    output.push_str(&"═".repeat(display_cols));
    output.push_str("╝\n");

    let scale_info = if x_scale > 1 || y_scale > 1 {
        format!(" (Scale: {}x × {}y)", x_scale, y_scale)
    } else {
        String::new()
    };
    output.push_str(&format!("\n  {}{}\n", legend, scale_info));
    Ok(output)
}

/// Smallest power of 2 that brings `size` within `max_size`.
fn calculate_scale_factor(size: usize, max_size: usize) -> usize {
    let max_size = max_size.max(1);
    let mut scale = 1;
    while size.div_ceil(scale) > max_size {
        scale *= 2;
    }
    scale
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grains::build_grains;
    use crate::grid::ResistanceGrid;
    use crate::mpg::MpgConfig;
    use crate::patches::FocalRule;

    fn mpg() -> Mpg {
        let inf = f64::INFINITY;
        let grid = ResistanceGrid::from_rows(vec![
            vec![1.0, 4.0, 4.0, 4.0, 1.0],
            vec![4.0, 4.0, inf, 4.0, 4.0],
        ])
        .unwrap();
        Mpg::from_grid(&grid, &FocalRule::MinResistance, &MpgConfig::default()).unwrap()
    }

    fn plain() -> RenderConfig {
        RenderConfig {
            max_size: (60, 30),
            color: false,
        }
    }

    #[test]
    fn test_render_patches_plain() {
        let out = render(&mpg(), View::Patches, &plain()).unwrap();
        let rows: Vec<&str> = out.lines().collect();
        assert_eq!(rows[0], "╔═════╗");
        assert_eq!(rows[1], "║█···█║");
        assert_eq!(rows[2], "║··▓··║");
        assert_eq!(rows[3], "╚═════╝");
        assert!(out.contains("2 patches"));
    }

    #[test]
    fn test_render_links_marks_path() {
        let out = render(&mpg(), View::Links, &plain()).unwrap();
        assert!(out.contains('•'));
        assert!(out.contains("1 links"));
    }

    #[test]
    fn test_render_tessellation() {
        let m = mpg();
        let grains = build_grains(&m, 2);
        let out = render(&m, View::Tessellation(grains.select(2).unwrap()), &plain()).unwrap();
        assert!(out.contains("1 components"));
        assert!(out.contains('░'));
    }

    #[test]
    fn test_render_grain_from_other_graph() {
        let small = Mpg::from_grid(
            &ResistanceGrid::from_rows(vec![vec![1.0, 4.0, 1.0]]).unwrap(),
            &FocalRule::MinResistance,
            &MpgConfig::default(),
        )
        .unwrap();
        let grains = build_grains(&small, 2);
        let grain = grains.select(1).unwrap();
        assert!(matches!(
            render(&mpg(), View::Tessellation(grain), &plain()),
            Err(MpgError::InconsistentGraph { .. })
        ));
    }

    #[test]
    fn test_downscaling() {
        let grid = ResistanceGrid::from_rows(vec![vec![1.0; 200]; 10]).unwrap();
        let m = Mpg::from_grid(&grid, &FocalRule::MinResistance, &MpgConfig::default()).unwrap();
        let out = render(&m, View::Cores, &plain()).unwrap();
        assert!(out.contains("Scale: 4x × 1y"));
        assert_eq!(out.lines().next().unwrap().chars().count(), 52);
    }

    #[test]
    fn test_scale_factor() {
        assert_eq!(calculate_scale_factor(10, 60), 1);
        assert_eq!(calculate_scale_factor(120, 60), 2);
        assert_eq!(calculate_scale_factor(121, 60), 4);
    }
}
