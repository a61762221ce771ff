use mpgrains::{
    Adjacency,
    FocalRule,
    MpgConfig,
    Raster,
    ReclassRow,
    ReclassTable,
};
use serde::{
    Deserialize,
    Serialize,
};
use std::path::{
    Path,
    PathBuf,
};

use crate::cli::BuildArgs;
use crate::error::CliError;

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Config {
    pub input: InputConfig,
    #[serde(default)]
    pub analysis: AnalysisConfig,
    pub output: Option<OutputConfig>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct InputConfig {
    /// ESRI ASCII grid of land-cover classes.
    pub landcover: Option<PathBuf>,
    pub reclass: Vec<ReclassRow>,
    #[serde(default)]
    pub focal: FocalConfig,
}

#[derive(Debug, Default, Serialize, Deserialize, Clone, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FocalConfig {
    #[default]
    MinResistance,
    MaxResistance {
        value: f64,
    },
    /// Land-cover classes that are habitat regardless of resistance.
    Classes {
        classes: Vec<i32>,
    },
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct AnalysisConfig {
    pub adjacency: Adjacency,
    pub n_thresh: usize,
    pub min_patch_cells: usize,
    pub parallel: bool,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            adjacency: Adjacency::Queen,
            n_thresh: 20,
            min_patch_cells: 1,
            parallel: true,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct OutputConfig {
    pub directory: PathBuf,
}

impl Config {
    /// Relative input paths are taken from the config file's directory.
    pub fn from_path(path: &Path) -> Result<Self, CliError> {
        let file = std::fs::File::open(path)?;
        let mut config: Self = serde_json::from_reader(std::io::BufReader::new(file))?;
        if let (Some(landcover), Some(base)) = (&config.input.landcover, path.parent()) {
            if landcover.is_relative() {
                config.input.landcover = Some(base.join(landcover));
            }
        }
        Ok(config)
    }

    /// Loads the config file and applies the command line overrides.
    pub fn with_cli_args(args: &BuildArgs) -> Result<Self, CliError> {
        let mut config = Self::from_path(&args.config)?;
        if let Some(landcover) = &args.landcover {
            config.input.landcover = Some(landcover.clone());
        }
        if let Some(output_dir) = &args.output_dir {
            config.output = Some(OutputConfig {
                directory: output_dir.clone(),
            });
        }
        Ok(config)
    }

    pub fn landcover_path(&self) -> Result<&Path, CliError> {
        self.input.landcover.as_deref().ok_or_else(|| {
            CliError::Config(
                "No land-cover grid provided, please provide one in either the config file or with the --landcover flag"
                    .to_string(),
            )
        })
    }

    pub fn output_dir(&self) -> Result<&Path, CliError> {
        self.output
            .as_ref()
            .map(|o| o.directory.as_path())
            .ok_or_else(|| {
                CliError::Config(
                    "No output directory provided, please provide one in either the config file or with the --output-dir flag"
                        .to_string(),
                )
            })
    }

    pub fn reclass_table(&self) -> ReclassTable {
        ReclassTable::new(self.input.reclass.clone())
    }

    pub fn mpg_config(&self) -> MpgConfig {
        MpgConfig {
            adjacency: self.analysis.adjacency,
            min_patch_cells: self.analysis.min_patch_cells,
        }
    }
}

impl FocalConfig {
    pub fn to_rule(&self, landcover: &Raster<Option<i32>>) -> FocalRule {
        match self {
            FocalConfig::MinResistance => FocalRule::MinResistance,
            FocalConfig::MaxResistance { value } => FocalRule::MaxResistance(*value),
            FocalConfig::Classes { classes } => FocalRule::Mask(
                landcover.map(|class| class.is_some_and(|c| classes.contains(&c))),
            ),
        }
    }
}
