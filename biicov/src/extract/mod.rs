use geo::MultiPolygon;
use std::path::{Path, PathBuf};

use crate::error::Result;
use crate::geometric::grid::Grid;
use crate::geometric::image::{LayerBundle, Reducer};

pub mod dispatcher;
pub mod local;

pub use dispatcher::ExtractionDispatcher;
pub use local::LocalExtractor;

pub const DEFAULT_WORKERS: usize = 25;
/// Edge of the square tiles cells are grouped into, projection units
pub const DEFAULT_TILE_SIZE: f64 = 100_000.0;
/// Rows written between two flushes of the output table
pub const DEFAULT_BATCH_SIZE: usize = 5000;

/// One grid-based extraction job
#[derive(Debug, Clone)]
pub struct ExtractionRequest {
    pub bundle: LayerBundle,
    /// Effective area of interest; cells outside it are skipped
    pub region: MultiPolygon<f64>,
    pub grid: Grid,
    /// Pixel size of the sampling lattice
    pub scale: f64,
    pub tile_size: f64,
    pub batch_size: usize,
    pub reducer: Reducer,
    /// One row per cell when true, one row per sampled pixel otherwise
    pub reduce: bool,
    pub filename: String,
    pub workers: usize,
}

/// Samples a bundle over a grid and writes the table
pub trait ExtractionService: Send + Sync {
    /// Write `{output_directory}/{request.filename}` and return its path
    fn extract_by_grid(&self, request: &ExtractionRequest, output_directory: &Path)
        -> Result<PathBuf>;
}
