use clap::{
    Parser,
    Subcommand,
};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Number of worker threads (defaults to one per core)
    #[arg(short = 'j', long, global = true)]
    pub threads: Option<usize>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Build the minimum planar graph and write its node and link tables.
    Build(BuildArgs),
    /// Sweep link-weight thresholds and write the grains of connectivity.
    Grains(GrainsArgs),
    /// Write template configuration files.
    WriteTemplate(WriteTemplateArgs),
}

#[derive(Parser, Debug, Clone)]
pub struct BuildArgs {
    /// Path to the JSON configuration file
    #[arg(short, long)]
    pub config: PathBuf,

    /// Path to the land-cover grid (will over-write the config file)
    #[arg(short, long)]
    pub landcover: Option<PathBuf>,

    /// Path to the output directory (will over-write the config file)
    #[arg(short, long)]
    pub output_dir: Option<PathBuf>,
}

#[derive(Parser, Debug, Clone)]
pub struct GrainsArgs {
    #[command(flatten)]
    pub build: BuildArgs,

    /// Number of thresholds in the sweep (will over-write the config file)
    #[arg(short, long)]
    pub n_thresh: Option<usize>,

    /// Only write the grain at this 1-based position of the sweep
    #[arg(short, long)]
    pub select: Option<usize>,

    /// Print a terminal map of the selected (or last) grain
    #[arg(short, long)]
    pub render: bool,
}

#[derive(Parser, Debug)]
pub struct WriteTemplateArgs {
    /// The path to the output files.
    #[arg(short, long)]
    pub output_path: PathBuf,
}
