use indicatif::{
    ProgressIterator,
    ProgressStyle,
};
use mpgrains::grains::{
    CancelToken,
    Grain,
    Grains,
    build_grain,
    build_grains_parallel,
};
use mpgrains::tables::{
    component_table,
    link_table,
    node_table,
    threshold_table,
    write_csv,
};
use mpgrains::{
    Mpg,
    RenderConfig,
    ThresholdSweep,
    View,
    render,
};
use serde::Serialize;
use std::fs::File;
use std::io::BufWriter;
use std::path::Path;
use std::time::Instant;
use tracing::{
    info,
    instrument,
    warn,
};

use crate::cli::{
    BuildArgs,
    GrainsArgs,
    WriteTemplateArgs,
};
use crate::config::Config;
use crate::error::CliError;
use crate::io::{
    read_ascii_grid,
    write_ascii_grid_file,
};

/// Reads the land cover, reclassifies it and builds the graph.
#[instrument(skip_all)]
pub fn load_graph(config: &Config) -> Result<Mpg, CliError> {
    let landcover = read_ascii_grid(config.landcover_path()?)?;
    let grid = config.reclass_table().apply(&landcover)?;
    let rule = config.input.focal.to_rule(&landcover);
    info!("Using focal rule: {:?}", config.input.focal);
    let mpg = Mpg::from_grid(&grid, &rule, &config.mpg_config())?;
    if let Err(e) = mpg.ensure_connected() {
        warn!("{}", e);
    }
    Ok(mpg)
}

fn write_table<T: Serialize>(rows: &[T], path: &Path) -> Result<(), CliError> {
    write_csv(rows, BufWriter::new(File::create(path)?))?;
    info!("Wrote {} rows to {}", rows.len(), path.display());
    Ok(())
}

/// Main function for the 'build' subcommand.
#[instrument]
pub fn main_build(args: BuildArgs) -> Result<(), CliError> {
    let start = Instant::now();
    let config = Config::with_cli_args(&args)?;
    let output_dir = config.output_dir()?;
    std::fs::create_dir_all(output_dir)?;

    let mpg = load_graph(&config)?;
    write_table(&node_table(&mpg), &output_dir.join("nodes.csv"))?;
    write_table(&link_table(&mpg), &output_dir.join("links.csv"))?;
    if let Some(layers) = mpg.spatial() {
        write_ascii_grid_file(&layers.voronoi, &output_dir.join("voronoi.asc"))?;
    }

    println!(
        "Built graph with {} patches and {} links in {:?}",
        mpg.n_patches(),
        mpg.n_links(),
        start.elapsed()
    );
    if let Some((lo, hi)) = mpg.weight_range() {
        println!("Link weights range from {:.3} to {:.3}", lo, hi);
    }
    Ok(())
}

/// Runs the sweep, one grain per cutoff.
fn sweep_grains(mpg: &Mpg, n_thresh: usize, parallel: bool) -> Result<Grains, CliError> {
    if parallel {
        return Ok(build_grains_parallel(mpg, n_thresh, &CancelToken::new()));
    }
    let style = ProgressStyle::with_template(
        "{spinner:.green} [{elapsed_precise}] [{wide_bar:.cyan/blue}] {pos}/{len} ({eta})",
    )
    .map_err(|e| CliError::Config(format!("Bad progress template: {}", e)))?;
    let grains = ThresholdSweep::new(mpg, n_thresh)
        .progress_with_style(style)
        .enumerate()
        .map(|(i, result)| build_grain(mpg, i + 1, result))
        .collect::<Result<Grains, _>>()?;
    Ok(grains)
}

/// Main function for the 'grains' subcommand.
#[instrument]
pub fn main_grains(args: GrainsArgs) -> Result<(), CliError> {
    let start = Instant::now();
    let mut config = Config::with_cli_args(&args.build)?;
    if let Some(n_thresh) = args.n_thresh {
        config.analysis.n_thresh = n_thresh;
    }
    let output_dir = config.output_dir()?;
    std::fs::create_dir_all(output_dir)?;

    let mpg = load_graph(&config)?;
    let grains = sweep_grains(&mpg, config.analysis.n_thresh, config.analysis.parallel)?;
    write_table(
        &threshold_table(grains.iter().map(|g| &g.result)),
        &output_dir.join("thresholds.csv"),
    )?;

    let chosen: Vec<&Grain> = match args.select {
        Some(index) => vec![grains.select(index)?],
        None => grains.iter().collect(),
    };
    let components: Vec<_> = chosen.iter().flat_map(|g| component_table(g)).collect();
    write_table(&components, &output_dir.join("components.csv"))?;
    for grain in &chosen {
        if let Some(tessellation) = &grain.tessellation {
            let path = output_dir.join(format!("grain_{}.asc", grain.index));
            write_ascii_grid_file(tessellation, &path)?;
        }
    }

    if args.render {
        if let Some(grain) = chosen.last() {
            let map = render(&mpg, View::Tessellation(grain), &RenderConfig::default())?;
            println!("{}", map);
        }
    }

    println!(
        "Wrote {} of {} grains to {} in {:?}",
        chosen.len(),
        grains.len(),
        output_dir.display(),
        start.elapsed()
    );
    Ok(())
}

const CONFIG_TEMPLATE: &str = r#"{
  "input": {
    "landcover": "landcover_template.asc",
    "reclass": [
      { "class": 1, "resistance": 1.0 },
      { "class": 2, "resistance": 5.0 },
      { "class": 3, "resistance": 20.0 },
      { "class": 4, "resistance": null }
    ],
    "focal": { "type": "min_resistance" }
  },
  "analysis": {
    "adjacency": 8,
    "n_thresh": 20,
    "min_patch_cells": 1,
    "parallel": true
  },
  "output": { "directory": "mpgrains_out" }
}"#;

const LANDCOVER_TEMPLATE: &str = "ncols 8
nrows 6
xllcorner 0.0
yllcorner 0.0
cellsize 30.0
NODATA_value -9999
1 1 2 2 3 2 1 1
1 2 2 3 3 2 2 1
2 2 4 4 3 2 2 2
2 3 4 -9999 2 2 3 2
1 2 3 2 2 1 1 2
1 1 2 2 3 1 1 2
";

/// Main function for the 'write-template' subcommand.
pub fn main_write_template(args: WriteTemplateArgs) -> Result<(), CliError> {
    let target_dir = args.output_path;
    std::fs::create_dir_all(&target_dir)?;

    let config_path = target_dir.join("config_template.json");
    let landcover_path = target_dir.join("landcover_template.asc");
    std::fs::write(&config_path, CONFIG_TEMPLATE)?;
    std::fs::write(&landcover_path, LANDCOVER_TEMPLATE)?;
    println!(
        "Wrote templates to:\n- {}\n- {}",
        config_path.display(),
        landcover_path.display()
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn templates(dir: &Path) -> BuildArgs {
        main_write_template(WriteTemplateArgs {
            output_path: dir.to_path_buf(),
        })
        .unwrap();
        BuildArgs {
            config: dir.join("config_template.json"),
            landcover: Some(dir.join("landcover_template.asc")),
            output_dir: Some(dir.join("out")),
        }
    }

    #[test]
    fn test_template_config_parses() {
        let dir = tempfile::tempdir().unwrap();
        let args = templates(dir.path());
        let config = Config::with_cli_args(&args).unwrap();
        assert_eq!(config.analysis.n_thresh, 20);
        assert_eq!(config.input.reclass.len(), 4);
        assert_eq!(config.output_dir().unwrap(), dir.path().join("out"));

        // Without the override the land cover resolves next to the config.
        let from_file = Config::from_path(&args.config).unwrap();
        assert_eq!(
            from_file.landcover_path().unwrap(),
            dir.path().join("landcover_template.asc")
        );
    }

    #[test]
    fn test_build_writes_tables() {
        let dir = tempfile::tempdir().unwrap();
        let args = templates(dir.path());
        main_build(args).unwrap();

        let out = dir.path().join("out");
        let nodes = std::fs::read_to_string(out.join("nodes.csv")).unwrap();
        assert!(nodes.starts_with("id,cells,area,core_area,centroid_x,centroid_y"));
        assert!(nodes.lines().count() > 2);
        let links = std::fs::read_to_string(out.join("links.csv")).unwrap();
        assert!(links.lines().count() > 1);
        let voronoi = std::fs::read_to_string(out.join("voronoi.asc")).unwrap();
        assert!(voronoi.starts_with("ncols 8\nnrows 6\n"));
    }

    #[test]
    fn test_grains_selected_only() {
        let dir = tempfile::tempdir().unwrap();
        let build = templates(dir.path());
        main_grains(GrainsArgs {
            build,
            n_thresh: Some(4),
            select: Some(2),
            render: false,
        })
        .unwrap();

        let out = dir.path().join("out");
        let thresholds = std::fs::read_to_string(out.join("thresholds.csv")).unwrap();
        assert_eq!(thresholds.lines().count(), 5);
        assert!(out.join("grain_2.asc").exists());
        assert!(!out.join("grain_1.asc").exists());
        let components = std::fs::read_to_string(out.join("components.csv")).unwrap();
        assert!(components.lines().skip(1).all(|l| l.starts_with("2,")));
    }

    #[test]
    fn test_grains_selection_out_of_range() {
        let dir = tempfile::tempdir().unwrap();
        let build = templates(dir.path());
        let err = main_grains(GrainsArgs {
            build,
            n_thresh: Some(3),
            select: Some(9),
            render: false,
        })
        .unwrap_err();
        assert!(matches!(
            err,
            CliError::Mpg(mpgrains::MpgError::IndexOutOfRange { index: 9, len: 3 })
        ));
    }

    #[test]
    fn test_missing_config_file() {
        let args = BuildArgs {
            config: PathBuf::from("/nonexistent/config.json"),
            landcover: None,
            output_dir: None,
        };
        assert!(matches!(main_build(args), Err(CliError::Io(_))));
    }
}
