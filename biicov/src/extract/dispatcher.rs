use geo::MultiPolygon;
use std::path::PathBuf;

use crate::error::Result;
use crate::extract::{ExtractionRequest, ExtractionService, DEFAULT_WORKERS};
use crate::geometric::grid::Grid;
use crate::geometric::image::LayerBundle;

/// Turns a bundle into an extraction request; reducer and scale follow the
/// bundle kind.
pub struct ExtractionDispatcher<'a, E: ?Sized> {
    service: &'a E,
    output_directory: PathBuf,
    workers: usize,
}

impl<'a, E> ExtractionDispatcher<'a, E>
where
    E: ExtractionService + ?Sized,
{
    pub fn new(service: &'a E, output_directory: impl Into<PathBuf>) -> Self {
        ExtractionDispatcher {
            service,
            output_directory: output_directory.into(),
            workers: DEFAULT_WORKERS,
        }
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    pub fn request(
        &self,
        bundle: LayerBundle,
        grid: &Grid,
        region: &MultiPolygon<f64>,
        tile_size: f64,
        batch_size: usize,
        filename: &str,
    ) -> ExtractionRequest {
        let kind = bundle.kind;
        ExtractionRequest {
            bundle,
            region: region.clone(),
            grid: grid.clone(),
            scale: kind.scale(),
            tile_size,
            batch_size,
            reducer: kind.reducer(),
            reduce: true,
            filename: filename.to_string(),
            workers: self.workers,
        }
    }

    pub fn dispatch(
        &self,
        bundle: LayerBundle,
        grid: &Grid,
        region: &MultiPolygon<f64>,
        tile_size: f64,
        batch_size: usize,
        filename: &str,
    ) -> Result<PathBuf> {
        let request = self.request(bundle, grid, region, tile_size, batch_size, filename);
        tracing::info!(
            file = filename,
            reducer = request.reducer.name(),
            scale = request.scale,
            cells = grid.len(),
            "Extracting data"
        );
        self.service
            .extract_by_grid(&request, &self.output_directory)
    }
}
