use mpgrains::MpgError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CliError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Graph error: {0}")]
    Mpg(#[from] MpgError),

    #[error("Error interpreting the config: {0}")]
    Config(String),

    #[error("Malformed raster {path}: {msg}")]
    RasterFormat { path: String, msg: String },
}
