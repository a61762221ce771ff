use crate::grid::Cell;
use crate::patches::PatchId;
use std::fmt;

#[derive(Debug)]
pub enum MpgError {
    /// The grid cannot be turned into a graph (no focal cells, bad values ...).
    InvalidGrid {
        cell: Option<Cell>,
        reason: String,
    },
    /// Raised only on request (see [`crate::Mpg::ensure_connected`]),
    /// isolated patches are otherwise reported in the results.
    DisconnectedGrid {
        isolated: Vec<PatchId>,
    },
    InconsistentGraph {
        link: Option<(PatchId, PatchId)>,
        reason: String,
    },
    IndexOutOfRange {
        index: usize,
        len: usize,
    },
    MissingSpatialLayers {
        context: &'static str,
    },
    Io(std::io::Error),
    Csv(csv::Error),
}

impl MpgError {
    pub(crate) fn invalid_grid(cell: Option<Cell>, reason: impl fmt::Display) -> Self {
        Self::InvalidGrid {
            cell,
            reason: reason.to_string(),
        }
    }

    pub(crate) fn inconsistent(link: Option<(PatchId, PatchId)>, reason: impl fmt::Display) -> Self {
        Self::InconsistentGraph {
            link,
            reason: reason.to_string(),
        }
    }
}

impl fmt::Display for MpgError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidGrid { cell, reason } => match cell {
                Some(cell) => write!(f, "Invalid grid at {}: {}", cell, reason),
                None => write!(f, "Invalid grid: {}", reason),
            },
            Self::DisconnectedGrid { isolated } => {
                write!(f, "Patches without any reachable neighbour: {:?}", isolated)
            }
            Self::InconsistentGraph { link, reason } => match link {
                Some((a, b)) => write!(f, "Inconsistent link {}-{}: {}", a, b, reason),
                None => write!(f, "Inconsistent graph: {}", reason),
            },
            Self::IndexOutOfRange { index, len } => {
                write!(f, "Index {} is outside the valid range [1, {}]", index, len)
            }
            Self::MissingSpatialLayers { context } => {
                write!(
                    f,
                    "{} requires a graph built from a grid (no spatial layers attached)",
                    context
                )
            }
            Self::Io(e) => write!(f, "I/O error: {}", e),
            Self::Csv(e) => write!(f, "CSV error: {}", e),
        }
    }
}

impl std::error::Error for MpgError {}

impl From<std::io::Error> for MpgError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e)
    }
}

impl From<csv::Error> for MpgError {
    fn from(e: csv::Error) -> Self {
        Self::Csv(e)
    }
}

pub type Result<T> = std::result::Result<T, MpgError>;
