use geo::{unary_union, Buffer, Intersects, MultiPolygon};

use crate::error::{BiiError, Result};
use crate::geo_core::{rect_polygon, BoundingBox, Projection};
use crate::geometric::grid::{GeometryService, Grid, GridCell, GridMetadata, GridService};

/// Metres per degree of arc at the equator
const METRES_PER_DEGREE: f64 = 111_320.0;

/// In-process grid and geometry services built on the `geo` crate.
///
/// All geometries are in one working CRS and nothing is reprojected. A
/// geographic covering-grid scale is converted to metres at the equator.
#[derive(Debug, Clone)]
pub struct LocalPlatform {
    crs: String,
}

impl LocalPlatform {
    pub fn new() -> Self {
        LocalPlatform {
            crs: Projection::default().crs,
        }
    }

    pub fn with_crs(crs: impl Into<String>) -> Self {
        LocalPlatform { crs: crs.into() }
    }

    pub fn crs(&self) -> &str {
        &self.crs
    }

    /// Cell edge of a covering grid in working units
    fn lattice_size(&self, projection: &Projection) -> Result<f64> {
        if projection.crs == self.crs {
            Ok(projection.scale_x)
        } else if projection.crs == "EPSG:4326" {
            Ok(projection.scale_x * METRES_PER_DEGREE)
        } else {
            Err(BiiError::Configuration(format!(
                "local platform works in {} and cannot build a grid in {}",
                self.crs, projection.crs
            )))
        }
    }
}

impl Default for LocalPlatform {
    fn default() -> Self {
        LocalPlatform::new()
    }
}

impl GridService for LocalPlatform {
    fn create_grid(
        &self,
        cell_size: f64,
        aoi: &MultiPolygon<f64>,
        projection: &Projection,
    ) -> Result<(Grid, GridMetadata)> {
        if cell_size.is_nan() || cell_size <= 0.0 {
            return Err(BiiError::Configuration(format!(
                "grid cell size must be positive, got {}",
                cell_size
            )));
        }
        let bbox = BoundingBox::of(aoi).ok_or_else(|| {
            BiiError::Configuration("cannot create a grid over an empty area".to_string())
        })?;

        let first_col = (bbox.min_x / cell_size).floor() as i64;
        let last_col = ((bbox.max_x / cell_size).ceil() as i64 - 1).max(first_col);
        let first_row = (bbox.min_y / cell_size).floor() as i64;
        let last_row = ((bbox.max_y / cell_size).ceil() as i64 - 1).max(first_row);

        let mut cells = Vec::new();
        // north to south, west to east
        for row in (first_row..=last_row).rev() {
            for column in first_col..=last_col {
                let min_x = column as f64 * cell_size;
                let min_y = row as f64 * cell_size;
                let polygon = rect_polygon(min_x, min_y, min_x + cell_size, min_y + cell_size);
                if aoi.intersects(&polygon) {
                    cells.push(GridCell {
                        id: format!("{}_{}", column, row),
                        column,
                        row,
                        polygon,
                    });
                }
            }
        }

        let metadata = GridMetadata {
            cell_size,
            crs: projection.crs.clone(),
            columns: (first_col, last_col),
            rows: (first_row, last_row),
            count: cells.len(),
        };
        Ok((Grid { cell_size, cells }, metadata))
    }
}

impl GeometryService for LocalPlatform {
    fn union(&self, grid: &Grid) -> Result<MultiPolygon<f64>> {
        Ok(unary_union(grid.cells.iter().map(|c| &c.polygon)))
    }

    fn buffer(&self, geometry: &MultiPolygon<f64>, distance: f64) -> Result<MultiPolygon<f64>> {
        Ok(geometry.buffer(distance))
    }

    fn covering_grid(&self, aoi: &MultiPolygon<f64>, projection: &Projection) -> Result<Grid> {
        let (grid, _) = self.create_grid(self.lattice_size(projection)?, aoi, projection)?;
        Ok(grid)
    }
}
