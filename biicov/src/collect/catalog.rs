use chrono::NaiveDate;
use geo::{unary_union, BoundingRect, Geometry, Intersects, MultiPolygon, Point};
use geojson::GeoJson;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::collect::raster_file::{read_geotiff, RASTER_EXTENSIONS};
use crate::error::{BiiError, Result};
use crate::geo_core::{polygonal, BoundingBox};
use crate::geometric::image::ImageExpr;

/// Read-only source of named vector and raster datasets.
///
/// Identifiers are the fixed catalog ids listed in
/// [`crate::collect::global_variables`].
pub trait Catalog: Send + Sync {
    fn feature_collection(&self, id: &str) -> Result<FeatureCollection>;
    fn image(&self, id: &str) -> Result<Arc<Raster>>;
    fn image_collection(&self, id: &str) -> Result<ImageCollection>;
}

/// A vector feature: geometry plus its attribute table row
#[derive(Debug, Clone)]
pub struct VectorFeature {
    pub geometry: Geometry<f64>,
    pub properties: Map<String, Value>,
}

impl VectorFeature {
    pub fn new(geometry: impl Into<Geometry<f64>>) -> Self {
        VectorFeature {
            geometry: geometry.into(),
            properties: Map::new(),
        }
    }

    pub fn with_property(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.properties.insert(key.to_string(), value.into());
        self
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.properties.get(key)
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.properties.get(key).and_then(Value::as_str)
    }

    /// Representative point: the point itself, or nothing for areal features
    pub fn point(&self) -> Option<Point<f64>> {
        match &self.geometry {
            Geometry::Point(p) => Some(*p),
            Geometry::MultiPoint(mp) => mp.0.first().copied(),
            _ => None,
        }
    }

    fn bbox(&self) -> Option<BoundingBox> {
        self.geometry.bounding_rect().map(BoundingBox::from_rect)
    }
}

/// Ordered collection of vector features loaded from one dataset
#[derive(Debug, Clone, Default)]
pub struct FeatureCollection {
    pub id: String,
    pub features: Vec<VectorFeature>,
}

impl FeatureCollection {
    pub fn new(id: impl Into<String>, features: Vec<VectorFeature>) -> Self {
        FeatureCollection {
            id: id.into(),
            features,
        }
    }

    /// Parse a GeoJSON document; features without geometry are skipped
    pub fn from_geojson(id: &str, geojson: &GeoJson) -> Result<Self> {
        let raw = match geojson {
            GeoJson::FeatureCollection(fc) => fc.features.clone(),
            GeoJson::Feature(f) => vec![f.clone()],
            GeoJson::Geometry(g) => vec![geojson::Feature::from(g.clone())],
        };

        let mut features = Vec::with_capacity(raw.len());
        for feature in raw {
            let Some(ref geom) = feature.geometry else {
                tracing::debug!(dataset = id, "skipping feature without geometry");
                continue;
            };
            let geometry: Geometry<f64> = geom
                .try_into()
                .map_err(|e| BiiError::data_source(id, format!("invalid geometry: {}", e)))?;
            features.push(VectorFeature {
                geometry,
                properties: feature.properties.unwrap_or_default(),
            });
        }

        Ok(FeatureCollection::new(id, features))
    }

    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    pub fn filter<F>(&self, predicate: F) -> Self
    where
        F: Fn(&VectorFeature) -> bool,
    {
        FeatureCollection {
            id: self.id.clone(),
            features: self
                .features
                .iter()
                .filter(|f| predicate(f))
                .cloned()
                .collect(),
        }
    }

    /// Features whose string attribute `key` equals `value`
    pub fn filter_eq(&self, key: &str, value: &str) -> Self {
        self.filter(|f| f.get_str(key) == Some(value))
    }

    /// Features whose string attribute `key` is one of `values`
    pub fn filter_in(&self, key: &str, values: &[String]) -> Self {
        self.filter(|f| {
            f.get_str(key)
                .map(|v| values.iter().any(|x| x == v))
                .unwrap_or(false)
        })
    }

    /// Features intersecting `region`
    pub fn filter_bounds(&self, region: &MultiPolygon<f64>) -> Self {
        let Some(region_bbox) = BoundingBox::of(region) else {
            return FeatureCollection::new(self.id.clone(), Vec::new());
        };
        self.filter(|f| {
            f.bbox()
                .map(|b| b.intersects(&region_bbox))
                .unwrap_or(false)
                && f.geometry.intersects(region)
        })
    }

    /// Values of a string attribute, in feature order
    pub fn aggregate_array(&self, key: &str) -> Vec<String> {
        self.features
            .iter()
            .filter_map(|f| f.get_str(key).map(str::to_string))
            .collect()
    }

    /// Union of the polygonal parts of every feature
    pub fn geometry(&self) -> MultiPolygon<f64> {
        let parts: Vec<MultiPolygon<f64>> = self
            .features
            .iter()
            .map(|f| polygonal(f.geometry.clone()))
            .collect();
        unary_union(parts.iter())
    }

    /// Polygonal parts of every feature, without dissolving them
    pub fn polygons(&self) -> MultiPolygon<f64> {
        MultiPolygon::new(
            self.features
                .iter()
                .flat_map(|f| polygonal(f.geometry.clone()).0)
                .collect(),
        )
    }
}

/// One named band of a raster
#[derive(Debug, Clone)]
pub struct RasterBand {
    pub name: String,
    /// Row-major values, top row first
    pub values: Vec<f64>,
}

/// North-up raster with square pixels.
///
/// `NaN` and `nodata` values are masked.
#[derive(Debug, Clone)]
pub struct Raster {
    /// Upper-left corner x
    pub origin_x: f64,
    /// Upper-left corner y
    pub origin_y: f64,
    pub pixel_size: f64,
    pub width: usize,
    pub height: usize,
    pub nodata: Option<f64>,
    /// Acquisition date for time series members
    pub date: Option<NaiveDate>,
    pub bands: Vec<RasterBand>,
}

impl Raster {
    pub fn single_band(
        name: &str,
        origin: (f64, f64),
        pixel_size: f64,
        width: usize,
        height: usize,
        values: Vec<f64>,
    ) -> Self {
        Raster {
            origin_x: origin.0,
            origin_y: origin.1,
            pixel_size,
            width,
            height,
            nodata: None,
            date: None,
            bands: vec![RasterBand {
                name: name.to_string(),
                values,
            }],
        }
    }

    pub fn with_date(mut self, date: NaiveDate) -> Self {
        self.date = Some(date);
        self
    }

    pub fn band_index(&self, name: &str) -> Option<usize> {
        self.bands.iter().position(|b| b.name == name)
    }

    pub fn bounds(&self) -> BoundingBox {
        BoundingBox::new(
            self.origin_x,
            self.origin_y - self.height as f64 * self.pixel_size,
            self.origin_x + self.width as f64 * self.pixel_size,
            self.origin_y,
        )
    }

    /// Value of `band` at (x, y), `None` outside the extent or when masked
    pub fn value_at(&self, band: usize, x: f64, y: f64) -> Option<f64> {
        let col = ((x - self.origin_x) / self.pixel_size).floor();
        let row = ((self.origin_y - y) / self.pixel_size).floor();
        if col < 0.0 || row < 0.0 || col >= self.width as f64 || row >= self.height as f64 {
            return None;
        }
        let idx = row as usize * self.width + col as usize;
        let value = *self.bands.get(band)?.values.get(idx)?;
        if value.is_nan() || self.nodata == Some(value) {
            None
        } else {
            Some(value)
        }
    }

    pub(crate) fn validate(&self, id: &str) -> Result<()> {
        if !(self.pixel_size.is_finite() && self.pixel_size > 0.0) {
            return Err(BiiError::data_source(
                id,
                format!("pixel size must be positive, got {}", self.pixel_size),
            ));
        }
        if !(self.origin_x.is_finite() && self.origin_y.is_finite()) {
            return Err(BiiError::data_source(id, "raster origin is not finite"));
        }
        if self.bands.is_empty() {
            return Err(BiiError::data_source(id, "raster has no bands"));
        }
        let pixels = self.width.checked_mul(self.height).ok_or_else(|| {
            BiiError::data_source(
                id,
                format!("raster size {}x{} overflows", self.width, self.height),
            )
        })?;
        for band in &self.bands {
            if band.values.len() != pixels {
                return Err(BiiError::data_source(
                    id,
                    format!(
                        "band `{}` has {} values, expected {}x{}",
                        band.name,
                        band.values.len(),
                        self.width,
                        self.height
                    ),
                ));
            }
        }
        Ok(())
    }
}

/// Ordered set of rasters from one dataset
#[derive(Debug, Clone, Default)]
pub struct ImageCollection {
    pub id: String,
    pub images: Vec<Arc<Raster>>,
}

impl ImageCollection {
    pub fn len(&self) -> usize {
        self.images.len()
    }

    pub fn is_empty(&self) -> bool {
        self.images.is_empty()
    }

    /// Images whose footprint intersects the region's bounding box
    pub fn filter_bounds(&self, region: &MultiPolygon<f64>) -> Self {
        let images = match BoundingBox::of(region) {
            Some(bbox) => self
                .images
                .iter()
                .filter(|img| img.bounds().intersects(&bbox))
                .cloned()
                .collect(),
            None => Vec::new(),
        };
        ImageCollection {
            id: self.id.clone(),
            images,
        }
    }

    /// Images dated in `[start, end)`; undated images are dropped
    pub fn filter_date(&self, start: NaiveDate, end: NaiveDate) -> Self {
        ImageCollection {
            id: self.id.clone(),
            images: self
                .images
                .iter()
                .filter(|img| img.date.map(|d| d >= start && d < end).unwrap_or(false))
                .cloned()
                .collect(),
        }
    }

    /// Per-image source expressions for the first band
    pub fn sources(&self) -> Vec<ImageExpr> {
        self.images
            .iter()
            .map(|img| ImageExpr::source(img.clone(), 0))
            .collect()
    }

    /// Per-image source expressions for a named band; every image must carry it
    pub fn select(&self, band: &str) -> Result<Vec<ImageExpr>> {
        self.images
            .iter()
            .map(|img| {
                img.band_index(band)
                    .map(|idx| ImageExpr::source(img.clone(), idx))
                    .ok_or_else(|| {
                        BiiError::data_source(&self.id, format!("band `{}` not found", band))
                    })
            })
            .collect()
    }

    /// First non-masked image per pixel, in collection order
    pub fn mosaic(&self) -> ImageExpr {
        ImageExpr::mosaic(self.sources())
    }
}

/// Catalog backed by a directory tree and/or datasets inserted in memory.
///
/// Layout under `root`: `{id}.geojson` for vectors, `{id}.tif` for single
/// images and `{id}/*.tif` for collections (file name order). `.tiff` is
/// accepted wherever `.tif` is.
#[derive(Debug, Default)]
pub struct LocalCatalog {
    root: Option<PathBuf>,
    features: HashMap<String, FeatureCollection>,
    images: HashMap<String, Arc<Raster>>,
    collections: HashMap<String, Vec<Arc<Raster>>>,
}

impl LocalCatalog {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        LocalCatalog {
            root: Some(root.into()),
            ..Default::default()
        }
    }

    pub fn in_memory() -> Self {
        LocalCatalog::default()
    }

    pub fn insert_features(&mut self, id: &str, features: Vec<VectorFeature>) {
        self.features
            .insert(id.to_string(), FeatureCollection::new(id, features));
    }

    pub fn insert_image(&mut self, id: &str, raster: Raster) {
        self.images.insert(id.to_string(), Arc::new(raster));
    }

    pub fn insert_collection(&mut self, id: &str, rasters: Vec<Raster>) {
        self.collections
            .insert(id.to_string(), rasters.into_iter().map(Arc::new).collect());
    }

    fn dataset_path(&self, id: &str, suffix: &str) -> Option<PathBuf> {
        self.root
            .as_ref()
            .map(|root| root.join(format!("{}{}", id, suffix)))
    }

    fn raster_path(&self, id: &str) -> Option<PathBuf> {
        RASTER_EXTENSIONS
            .iter()
            .filter_map(|ext| self.dataset_path(id, &format!(".{}", ext)))
            .find(|p| p.is_file())
    }
}

fn is_raster_file(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| RASTER_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

fn read_text(path: &Path) -> Result<String> {
    std::fs::read_to_string(path).map_err(|e| BiiError::filesystem(path, e))
}

fn not_found(id: &str) -> BiiError {
    BiiError::data_source(id, "dataset not found in catalog")
}

impl Catalog for LocalCatalog {
    fn feature_collection(&self, id: &str) -> Result<FeatureCollection> {
        if let Some(fc) = self.features.get(id) {
            return Ok(fc.clone());
        }
        let path = self
            .dataset_path(id, ".geojson")
            .filter(|p| p.is_file())
            .ok_or_else(|| not_found(id))?;
        tracing::debug!(dataset = id, path = ?path, "reading vector dataset");

        let geojson: GeoJson = read_text(&path)?
            .parse()
            .map_err(|e| BiiError::data_source(id, format!("invalid GeoJSON: {}", e)))?;
        FeatureCollection::from_geojson(id, &geojson)
    }

    fn image(&self, id: &str) -> Result<Arc<Raster>> {
        if let Some(raster) = self.images.get(id) {
            return Ok(raster.clone());
        }
        let path = self.raster_path(id).ok_or_else(|| not_found(id))?;
        tracing::debug!(dataset = id, path = ?path, "reading raster");
        Ok(Arc::new(read_geotiff(id, &path)?))
    }

    fn image_collection(&self, id: &str) -> Result<ImageCollection> {
        if let Some(images) = self.collections.get(id) {
            return Ok(ImageCollection {
                id: id.to_string(),
                images: images.clone(),
            });
        }
        let dir = self
            .dataset_path(id, "")
            .filter(|p| p.is_dir())
            .ok_or_else(|| not_found(id))?;
        tracing::debug!(dataset = id, path = ?dir, "reading image collection");

        let mut paths = Vec::new();
        for entry in std::fs::read_dir(&dir).map_err(|e| BiiError::filesystem(&dir, e))? {
            let path = entry.map_err(|e| BiiError::filesystem(&dir, e))?.path();
            if path.is_file() && is_raster_file(&path) {
                paths.push(path);
            }
        }
        paths.sort();

        let images = paths
            .iter()
            .map(|p| read_geotiff(id, p).map(Arc::new))
            .collect::<Result<Vec<_>>>()?;
        Ok(ImageCollection {
            id: id.to_string(),
            images,
        })
    }
}
