use geo::{Area, MultiPolygon, Polygon};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{BiiError, Result};
use crate::geo_core::Projection;

/// Buffer closing the seams of the dissolved coarse tiling, projection units
pub const COARSE_SEAM_MARGIN: f64 = 500.0;
/// Outward buffer of the country boundary at fine resolution, projection units
pub const FINE_AOI_BUFFER: f64 = 1500.0;

/// Tiling resolution of an extraction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Resolution {
    #[serde(rename = "8km")]
    Coarse,
    #[serde(rename = "1km")]
    Fine,
}

impl Resolution {
    /// Grid cell edge in projection units
    pub fn cell_size(&self) -> f64 {
        match self {
            Resolution::Coarse => 8000.0,
            Resolution::Fine => 1000.0,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Resolution::Coarse => "8km",
            Resolution::Fine => "1km",
        }
    }
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for Resolution {
    type Err = BiiError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "8km" => Ok(Resolution::Coarse),
            "1km" => Ok(Resolution::Fine),
            other => Err(BiiError::Configuration(format!(
                "unknown resolution `{}`, expected `8km` or `1km`",
                other
            ))),
        }
    }
}

/// Area of interest policy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AoiMode {
    /// The country boundary as is
    Country,
    /// Extend the boundary to the grid cells intersecting it
    #[default]
    Grid,
}

impl fmt::Display for AoiMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AoiMode::Country => f.write_str("country"),
            AoiMode::Grid => f.write_str("grid"),
        }
    }
}

impl FromStr for AoiMode {
    type Err = BiiError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "country" => Ok(AoiMode::Country),
            "grid" => Ok(AoiMode::Grid),
            other => Err(BiiError::Configuration(format!(
                "unknown AOI mode `{}`, expected `country` or `grid`",
                other
            ))),
        }
    }
}

/// One square grid cell; `id` is `{column}_{row}` on the global lattice
#[derive(Debug, Clone, PartialEq)]
pub struct GridCell {
    pub id: String,
    pub column: i64,
    pub row: i64,
    pub polygon: Polygon<f64>,
}

/// Ordered set of cells of one size
#[derive(Debug, Clone, PartialEq)]
pub struct Grid {
    pub cell_size: f64,
    pub cells: Vec<GridCell>,
}

impl Grid {
    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    pub fn area(&self) -> f64 {
        self.cells.iter().map(|c| c.polygon.unsigned_area()).sum()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct GridMetadata {
    pub cell_size: f64,
    pub crs: String,
    /// Inclusive column span
    pub columns: (i64, i64),
    /// Inclusive row span
    pub rows: (i64, i64),
    pub count: usize,
}

/// Tiling of an area of interest
pub trait GridService: Send + Sync {
    fn create_grid(
        &self,
        cell_size: f64,
        aoi: &MultiPolygon<f64>,
        projection: &Projection,
    ) -> Result<(Grid, GridMetadata)>;
}

/// Geometry operations executed by the platform
pub trait GeometryService: Send + Sync {
    /// Dissolve all cells of a grid into one geometry
    fn union(&self, grid: &Grid) -> Result<MultiPolygon<f64>>;

    fn buffer(&self, geometry: &MultiPolygon<f64>, distance: f64) -> Result<MultiPolygon<f64>>;

    /// Cells of the projection's nominal scale covering `aoi`
    fn covering_grid(&self, aoi: &MultiPolygon<f64>, projection: &Projection) -> Result<Grid>;
}

/// Tiling plus the area of interest extraction runs over
#[derive(Debug, Clone)]
pub struct GridSelection {
    pub grid: Grid,
    pub metadata: GridMetadata,
    /// Effective AOI: extraction region and pixel-area clip
    pub aoi: MultiPolygon<f64>,
    /// AOI that catalog sources are filtered by. Differs from `aoi` only for
    /// a fine grid, where the buffer applies to the area raster alone.
    pub source_aoi: MultiPolygon<f64>,
}

/// Chooses the tiling and the effective area of interest
pub struct GridSelector<'a, S: ?Sized> {
    service: &'a S,
}

impl<'a, S> GridSelector<'a, S>
where
    S: GridService + GeometryService + ?Sized,
{
    pub fn new(service: &'a S) -> Self {
        GridSelector { service }
    }

    /// Tile `aoi` at `resolution` and derive the effective AOI.
    ///
    /// With `AoiMode::Grid`, coarse tilings replace the AOI by the dissolved
    /// tiles grown by [`COARSE_SEAM_MARGIN`]; fine tilings keep the tiles and
    /// grow the original AOI by [`FINE_AOI_BUFFER`].
    pub fn select(
        &self,
        resolution: Resolution,
        mode: AoiMode,
        aoi: &MultiPolygon<f64>,
        projection: &Projection,
    ) -> Result<GridSelection> {
        tracing::info!("Creating {} grid", resolution);
        let (grid, metadata) = self
            .service
            .create_grid(resolution.cell_size(), aoi, projection)?;
        tracing::info!(cells = grid.len(), "Grid created");

        let effective = match (mode, resolution) {
            (AoiMode::Country, _) => aoi.clone(),
            (AoiMode::Grid, Resolution::Coarse) => {
                let dissolved = self.service.union(&grid)?;
                self.service.buffer(&dissolved, COARSE_SEAM_MARGIN)?
            }
            (AoiMode::Grid, Resolution::Fine) => self.service.buffer(aoi, FINE_AOI_BUFFER)?,
        };

        let source_aoi = match (mode, resolution) {
            (AoiMode::Grid, Resolution::Fine) => aoi.clone(),
            _ => effective.clone(),
        };
        Ok(GridSelection {
            grid,
            metadata,
            aoi: effective,
            source_aoi,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geo_core::rect_polygon;
    use crate::geometric::local_platform::LocalPlatform;
    use geo::{Centroid, Contains};

    fn aoi() -> MultiPolygon<f64> {
        // 20 km x 12 km, off the lattice
        MultiPolygon::new(vec![rect_polygon(500.0, 300.0, 20_500.0, 12_300.0)])
    }

    #[test]
    fn test_parse_labels() {
        assert_eq!("8km".parse::<Resolution>().unwrap(), Resolution::Coarse);
        assert_eq!("1km".parse::<Resolution>().unwrap(), Resolution::Fine);
        assert!("2km".parse::<Resolution>().is_err());
        assert_eq!("grid".parse::<AoiMode>().unwrap(), AoiMode::Grid);
        assert!("tile".parse::<AoiMode>().is_err());
        assert_eq!(Resolution::Fine.to_string(), "1km");
    }

    #[test]
    fn test_coarse_grid_union_replaces_aoi() {
        let platform = LocalPlatform::new();
        let proj = Projection::default();
        let selection = GridSelector::new(&platform)
            .select(Resolution::Coarse, AoiMode::Grid, &aoi(), &proj)
            .unwrap();

        let expected = platform
            .buffer(&platform.union(&selection.grid).unwrap(), COARSE_SEAM_MARGIN)
            .unwrap();
        let diff = (selection.aoi.unsigned_area() - expected.unsigned_area()).abs();
        assert!(diff < 1e-6 * expected.unsigned_area());
        assert!(selection.aoi.unsigned_area() > selection.grid.area());
        assert!(selection.aoi.unsigned_area() > aoi().unsigned_area());
        assert_eq!(selection.source_aoi, selection.aoi);
        for cell in &selection.grid.cells {
            assert!(selection.aoi.contains(&cell.polygon.centroid().unwrap()));
        }
    }

    #[test]
    fn test_fine_grid_buffers_original_aoi() {
        let platform = LocalPlatform::new();
        let proj = Projection::default();
        let selection = GridSelector::new(&platform)
            .select(Resolution::Fine, AoiMode::Grid, &aoi(), &proj)
            .unwrap();

        let expected = platform.buffer(&aoi(), FINE_AOI_BUFFER).unwrap();
        let diff = (selection.aoi.unsigned_area() - expected.unsigned_area()).abs();
        assert!(diff < 1e-6 * expected.unsigned_area());

        let (plain, _) = platform.create_grid(1000.0, &aoi(), &proj).unwrap();
        assert_eq!(selection.grid, plain);
        // sources are still filtered by the unbuffered boundary
        assert_eq!(selection.source_aoi, aoi());
    }

    #[test]
    fn test_country_mode_keeps_aoi() {
        let platform = LocalPlatform::new();
        let selection = GridSelector::new(&platform)
            .select(
                Resolution::Coarse,
                AoiMode::Country,
                &aoi(),
                &Projection::default(),
            )
            .unwrap();
        assert_eq!(selection.aoi, aoi());
        assert_eq!(selection.source_aoi, aoi());
    }
}
