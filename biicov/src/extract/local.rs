use geo::{Area, BoundingRect, Centroid, Intersects, Point};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

#[cfg(feature = "rayon")]
use rayon::prelude::*;

#[cfg(feature = "indicatif")]
use crate::commons::progress::progress_bar;
use crate::error::{BiiError, Result};
use crate::extract::{ExtractionRequest, ExtractionService};
use crate::geometric::grid::GridCell;
use crate::geometric::image::{Accumulator, Sample};

type Row = Vec<String>;

/// In-process extraction service.
///
/// Cells are grouped into square tiles by centroid, tiles are sampled in
/// parallel and rows are written in tile order, then grid order within a
/// tile, so the same request always produces the same file.
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalExtractor;

impl LocalExtractor {
    pub fn new() -> Self {
        LocalExtractor
    }
}

/// Pixel centres of the global `scale` lattice inside `cell`, north to south
/// then west to east
pub fn cell_samples(cell: &GridCell, scale: f64) -> Vec<Sample> {
    let Some(rect) = cell.polygon.bounding_rect() else {
        return Vec::new();
    };
    let span = |min: f64, max: f64| {
        let first = (min / scale - 0.5).ceil() as i64;
        let last = (max / scale - 0.5).ceil() as i64 - 1;
        first..=last
    };
    let columns = span(rect.min().x, rect.max().x);
    let rows = span(rect.min().y, rect.max().y);

    let mut samples = Vec::new();
    for row in rows.rev() {
        for column in columns.clone() {
            let x = (column as f64 + 0.5) * scale;
            let y = (row as f64 + 0.5) * scale;
            if cell.polygon.intersects(&Point::new(x, y)) {
                samples.push(Sample { x, y, scale });
            }
        }
    }
    samples
}

/// Lattice pixels overlapping `cell`, each weighted by the fraction of
/// its area inside the cell. Cells that are not axis-aligned rectangles
/// fall back to whole pixels whose centre is inside.
pub fn cell_pixels(cell: &GridCell, scale: f64) -> Vec<(Sample, f64)> {
    let Some(rect) = cell.polygon.bounding_rect() else {
        return Vec::new();
    };
    let rect_area = rect.width() * rect.height();
    if (cell.polygon.unsigned_area() - rect_area).abs() > rect_area * 1e-9 {
        return cell_samples(cell, scale)
            .into_iter()
            .map(|s| (s, 1.0))
            .collect();
    }

    let span = |min: f64, max: f64| (min / scale).floor() as i64..=(max / scale).ceil() as i64 - 1;
    let overlap = |index: i64, min: f64, max: f64| {
        let lo = index as f64 * scale;
        (((lo + scale).min(max) - lo.max(min)) / scale).clamp(0.0, 1.0)
    };
    let (min, max) = (rect.min(), rect.max());

    let mut pixels = Vec::new();
    for row in span(min.y, max.y).rev() {
        let wy = overlap(row, min.y, max.y);
        for column in span(min.x, max.x) {
            let weight = wy * overlap(column, min.x, max.x);
            if weight > 0.0 {
                let sample = Sample {
                    x: (column as f64 + 0.5) * scale,
                    y: (row as f64 + 0.5) * scale,
                    scale,
                };
                pixels.push((sample, weight));
            }
        }
    }
    pixels
}

/// Group cells into tiles keyed by (tile row, tile column), tile rows from
/// north to south
fn partition<'a>(cells: &[&'a GridCell], tile_size: f64) -> Vec<Vec<&'a GridCell>> {
    let mut tiles: BTreeMap<(i64, i64), Vec<&GridCell>> = BTreeMap::new();
    for &cell in cells {
        let Some(centre) = cell.polygon.centroid() else {
            tracing::warn!(cell = %cell.id, "skipping degenerate cell");
            continue;
        };
        let key = (
            -((centre.y() / tile_size).floor() as i64),
            (centre.x() / tile_size).floor() as i64,
        );
        tiles.entry(key).or_default().push(cell);
    }
    tiles.into_values().collect()
}

fn format_value(value: Option<f64>) -> String {
    value.map(|v| v.to_string()).unwrap_or_default()
}

fn extract_tile(request: &ExtractionRequest, tile: &[&GridCell]) -> Vec<Row> {
    let bands = &request.bundle.bands;
    let mut rows = Vec::new();
    for cell in tile {
        if request.reduce {
            let pixels = if request.reducer.is_weighted() {
                cell_pixels(cell, request.scale)
            } else {
                cell_samples(cell, request.scale)
                    .into_iter()
                    .map(|s| (s, 1.0))
                    .collect()
            };
            let mut accumulators = vec![Accumulator::new(request.reducer); bands.len()];
            for (sample, weight) in &pixels {
                for (acc, band) in accumulators.iter_mut().zip(bands) {
                    if let Some(v) = band.expr.eval(sample) {
                        acc.push(v, *weight);
                    }
                }
            }
            let mut row = Vec::with_capacity(bands.len() + 1);
            row.push(cell.id.clone());
            row.extend(accumulators.iter().map(|acc| format_value(acc.finish())));
            rows.push(row);
        } else {
            for sample in &cell_samples(cell, request.scale) {
                let mut row = Vec::with_capacity(bands.len() + 3);
                row.push(cell.id.clone());
                row.push(sample.x.to_string());
                row.push(sample.y.to_string());
                row.extend(bands.iter().map(|b| format_value(b.expr.eval(sample))));
                rows.push(row);
            }
        }
    }
    rows
}

fn validate(request: &ExtractionRequest) -> Result<()> {
    if request.scale.is_nan() || request.scale <= 0.0 {
        return Err(BiiError::Configuration(format!(
            "sampling scale must be positive, got {}",
            request.scale
        )));
    }
    if request.tile_size.is_nan() || request.tile_size <= 0.0 {
        return Err(BiiError::Configuration(format!(
            "tile size must be positive, got {}",
            request.tile_size
        )));
    }
    if request.batch_size == 0 {
        return Err(BiiError::Configuration(
            "batch size must be at least 1".to_string(),
        ));
    }
    Ok(())
}

fn write_table(path: &Path, header: Row, tiles: Vec<Vec<Row>>, batch_size: usize) -> Result<usize> {
    let csv_error = |e: csv::Error| BiiError::filesystem(path, std::io::Error::from(e));
    let mut writer = csv::Writer::from_path(path).map_err(csv_error)?;
    writer.write_record(&header).map_err(csv_error)?;

    let rows: Vec<Row> = tiles.into_iter().flatten().collect();
    for batch in rows.chunks(batch_size) {
        for row in batch {
            writer.write_record(row).map_err(csv_error)?;
        }
        writer.flush().map_err(|e| BiiError::filesystem(path, e))?;
        tracing::debug!(rows = batch.len(), "batch written");
    }
    writer.flush().map_err(|e| BiiError::filesystem(path, e))?;
    Ok(rows.len())
}

impl ExtractionService for LocalExtractor {
    fn extract_by_grid(
        &self,
        request: &ExtractionRequest,
        output_directory: &Path,
    ) -> Result<PathBuf> {
        validate(request)?;

        let cells: Vec<&GridCell> = request
            .grid
            .cells
            .iter()
            .filter(|cell| request.region.intersects(&cell.polygon))
            .collect();
        if cells.len() < request.grid.len() {
            tracing::debug!(
                skipped = request.grid.len() - cells.len(),
                "cells outside the extraction region"
            );
        }
        let tiles = partition(&cells, request.tile_size);

        #[cfg(feature = "indicatif")]
        let pb = progress_bar(tiles.len() as u64, &request.filename);

        let run = |tile: &Vec<&GridCell>| {
            let rows = extract_tile(request, tile);
            #[cfg(feature = "indicatif")]
            pb.inc(1);
            rows
        };

        #[cfg(feature = "rayon")]
        let results: Vec<Vec<Row>> = {
            let pool = rayon::ThreadPoolBuilder::new()
                .num_threads(request.workers.max(1))
                .build()
                .map_err(|e| {
                    BiiError::Configuration(format!(
                        "cannot start {} extraction workers: {}",
                        request.workers, e
                    ))
                })?;
            pool.install(|| tiles.par_iter().map(run).collect())
        };

        #[cfg(not(feature = "rayon"))]
        let results: Vec<Vec<Row>> = tiles.iter().map(run).collect();

        #[cfg(feature = "indicatif")]
        pb.finish_with_message(format!("{} done", request.filename));

        let mut header = vec!["id".to_string()];
        if !request.reduce {
            header.push("x".to_string());
            header.push("y".to_string());
        }
        header.extend(request.bundle.band_names().into_iter().map(str::to_string));

        let path = output_directory.join(&request.filename);
        let written = write_table(&path, header, results, request.batch_size)?;
        tracing::info!(rows = written, path = ?path, "Table written");
        Ok(path)
    }
}
