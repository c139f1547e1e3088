use geo::{Contains, MultiPolygon, Point, Polygon};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;

use crate::collect::catalog::Raster;
use crate::error::{BiiError, Result};
use crate::geo_core::BoundingBox;

/// Sampling scale for 30 m sources, projection units
pub const FINE_SCALE: f64 = 30.0;
/// Sampling scale for 1 km sources, projection units
pub const COARSE_SCALE: f64 = 1000.0;

/// Aggregation applied per grid cell, or across a collection per pixel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Reducer {
    Sum,
    Mean,
    First,
}

impl Reducer {
    pub fn name(&self) -> &'static str {
        match self {
            Reducer::Sum => "sum",
            Reducer::Mean => "mean",
            Reducer::First => "first",
        }
    }

    /// Sum and mean weight pixels by the fraction inside the region
    pub fn is_weighted(&self) -> bool {
        matches!(self, Reducer::Sum | Reducer::Mean)
    }

    /// Per-pixel reduction across a stack; masked when every input is
    pub fn reduce<I>(&self, values: I) -> Option<f64>
    where
        I: IntoIterator<Item = f64>,
    {
        let mut acc = Accumulator::new(*self);
        for v in values {
            acc.push(v, 1.0);
        }
        if acc.count == 0 {
            None
        } else {
            acc.finish()
        }
    }
}

/// Streaming state of a [`Reducer`] over one region
#[derive(Debug, Clone, Copy)]
pub struct Accumulator {
    reducer: Reducer,
    total: f64,
    weight: f64,
    count: usize,
    first: Option<f64>,
}

impl Accumulator {
    pub fn new(reducer: Reducer) -> Self {
        Accumulator {
            reducer,
            total: 0.0,
            weight: 0.0,
            count: 0,
            first: None,
        }
    }

    pub fn push(&mut self, value: f64, weight: f64) {
        if self.first.is_none() {
            self.first = Some(value);
        }
        self.total += value * weight;
        self.weight += weight;
        self.count += 1;
    }

    /// A sum over no valid pixels is 0; mean and first are masked
    pub fn finish(&self) -> Option<f64> {
        match self.reducer {
            Reducer::Sum => Some(self.total),
            Reducer::Mean if self.weight > 0.0 => Some(self.total / self.weight),
            Reducer::Mean => None,
            Reducer::First => self.first,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Axis {
    X,
    Y,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Multiply,
    Divide,
    Equals,
    GreaterThan,
    LessThan,
    And,
    Or,
}

impl BinaryOp {
    fn apply(self, a: f64, b: f64) -> Option<f64> {
        let flag = |c: bool| if c { 1.0 } else { 0.0 };
        match self {
            BinaryOp::Multiply => Some(a * b),
            BinaryOp::Divide => (b != 0.0).then(|| a / b),
            BinaryOp::Equals => Some(flag(a == b)),
            BinaryOp::GreaterThan => Some(flag(a > b)),
            BinaryOp::LessThan => Some(flag(a < b)),
            BinaryOp::And => Some(flag(a != 0.0 && b != 0.0)),
            BinaryOp::Or => Some(flag(a != 0.0 || b != 0.0)),
        }
    }
}

/// Polygonal mask with a cached bounding box
#[derive(Debug, Clone)]
pub struct ClipRegion {
    shape: MultiPolygon<f64>,
    bbox: Option<BoundingBox>,
}

impl ClipRegion {
    pub fn new(shape: MultiPolygon<f64>) -> Self {
        let bbox = BoundingBox::of(&shape);
        ClipRegion { shape, bbox }
    }

    pub fn contains(&self, x: f64, y: f64) -> bool {
        match self.bbox {
            Some(b) if b.contains(x, y) => self.shape.contains(&Point::new(x, y)),
            _ => false,
        }
    }
}

/// Polygons carrying a value; the first polygon containing a pixel wins
#[derive(Debug, Clone)]
pub struct ValuedRegions {
    regions: Vec<(ClipRegion, f64)>,
}

impl ValuedRegions {
    pub fn new(regions: Vec<(Polygon<f64>, f64)>) -> Self {
        ValuedRegions {
            regions: regions
                .into_iter()
                .map(|(p, v)| (ClipRegion::new(MultiPolygon::new(vec![p])), v))
                .collect(),
        }
    }

    pub fn value_at(&self, x: f64, y: f64) -> Option<f64> {
        self.regions
            .iter()
            .find(|(region, _)| region.contains(x, y))
            .map(|(_, v)| *v)
    }
}

/// Pixel position and size at which an expression is evaluated
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sample {
    pub x: f64,
    pub y: f64,
    pub scale: f64,
}

/// Lazy single-band image description.
///
/// Nothing is computed while a bundle is assembled; an extraction service
/// evaluates the tree per sampled pixel. `None` is a masked pixel, and a
/// masked operand masks the result of every operation except `Unmask`,
/// `Mosaic` and collection reductions.
#[derive(Debug, Clone)]
pub enum ImageExpr {
    Constant(f64),
    /// Area of the sampled pixel in squared projection units
    PixelArea,
    PixelCoordinate(Axis),
    Source {
        raster: Arc<Raster>,
        band: usize,
    },
    Mosaic(Vec<ImageExpr>),
    Binary {
        op: BinaryOp,
        lhs: Box<ImageExpr>,
        rhs: Box<ImageExpr>,
    },
    UpdateMask {
        image: Box<ImageExpr>,
        mask: Box<ImageExpr>,
    },
    Unmask {
        image: Box<ImageExpr>,
        value: f64,
    },
    Clip {
        image: Box<ImageExpr>,
        region: Arc<ClipRegion>,
    },
    /// Per-pixel reduction across images, masked members skipped
    Reduce {
        reducer: Reducer,
        images: Vec<ImageExpr>,
    },
    Regions(Arc<ValuedRegions>),
    ToInt(Box<ImageExpr>),
}

impl ImageExpr {
    pub fn constant(value: f64) -> Self {
        ImageExpr::Constant(value)
    }

    pub fn pixel_area() -> Self {
        ImageExpr::PixelArea
    }

    pub fn pixel_coordinate(axis: Axis) -> Self {
        ImageExpr::PixelCoordinate(axis)
    }

    pub fn source(raster: Arc<Raster>, band: usize) -> Self {
        ImageExpr::Source { raster, band }
    }

    pub fn mosaic(images: Vec<ImageExpr>) -> Self {
        ImageExpr::Mosaic(images)
    }

    pub fn reduce(reducer: Reducer, images: Vec<ImageExpr>) -> Self {
        ImageExpr::Reduce { reducer, images }
    }

    /// Rasterize valued polygons, first match per pixel
    pub fn regions(regions: Vec<(Polygon<f64>, f64)>) -> Self {
        ImageExpr::Regions(Arc::new(ValuedRegions::new(regions)))
    }

    fn binary(self, op: BinaryOp, rhs: ImageExpr) -> Self {
        ImageExpr::Binary {
            op,
            lhs: Box::new(self),
            rhs: Box::new(rhs),
        }
    }

    pub fn multiply(self, rhs: ImageExpr) -> Self {
        self.binary(BinaryOp::Multiply, rhs)
    }

    /// Division by zero is masked
    pub fn divide(self, rhs: ImageExpr) -> Self {
        self.binary(BinaryOp::Divide, rhs)
    }

    pub fn equals(self, value: f64) -> Self {
        self.binary(BinaryOp::Equals, ImageExpr::Constant(value))
    }

    pub fn greater_than(self, value: f64) -> Self {
        self.binary(BinaryOp::GreaterThan, ImageExpr::Constant(value))
    }

    pub fn less_than(self, value: f64) -> Self {
        self.binary(BinaryOp::LessThan, ImageExpr::Constant(value))
    }

    pub fn and(self, rhs: ImageExpr) -> Self {
        self.binary(BinaryOp::And, rhs)
    }

    pub fn or(self, rhs: ImageExpr) -> Self {
        self.binary(BinaryOp::Or, rhs)
    }

    /// Mask pixels where `mask` is zero or masked
    pub fn update_mask(self, mask: ImageExpr) -> Self {
        ImageExpr::UpdateMask {
            image: Box::new(self),
            mask: Box::new(mask),
        }
    }

    /// Replace masked pixels with `value`
    pub fn unmask(self, value: f64) -> Self {
        ImageExpr::Unmask {
            image: Box::new(self),
            value,
        }
    }

    /// Mask pixels outside `region`
    pub fn clip(self, region: MultiPolygon<f64>) -> Self {
        ImageExpr::Clip {
            image: Box::new(self),
            region: Arc::new(ClipRegion::new(region)),
        }
    }

    pub fn to_int(self) -> Self {
        ImageExpr::ToInt(Box::new(self))
    }

    pub fn rename(self, name: &str) -> Band {
        Band {
            name: name.to_string(),
            expr: self,
        }
    }

    /// Evaluate at one pixel; `None` when masked
    pub fn eval(&self, sample: &Sample) -> Option<f64> {
        match self {
            ImageExpr::Constant(v) => Some(*v),
            ImageExpr::PixelArea => Some(sample.scale * sample.scale),
            ImageExpr::PixelCoordinate(Axis::X) => Some(sample.x),
            ImageExpr::PixelCoordinate(Axis::Y) => Some(sample.y),
            ImageExpr::Source { raster, band } => raster.value_at(*band, sample.x, sample.y),
            ImageExpr::Mosaic(images) => images.iter().find_map(|img| img.eval(sample)),
            ImageExpr::Binary { op, lhs, rhs } => {
                let a = lhs.eval(sample)?;
                let b = rhs.eval(sample)?;
                op.apply(a, b)
            }
            ImageExpr::UpdateMask { image, mask } => match mask.eval(sample) {
                Some(m) if m != 0.0 => image.eval(sample),
                _ => None,
            },
            ImageExpr::Unmask { image, value } => Some(image.eval(sample).unwrap_or(*value)),
            ImageExpr::Clip { image, region } => {
                if region.contains(sample.x, sample.y) {
                    image.eval(sample)
                } else {
                    None
                }
            }
            ImageExpr::Reduce { reducer, images } => {
                reducer.reduce(images.iter().filter_map(|img| img.eval(sample)))
            }
            ImageExpr::Regions(regions) => regions.value_at(sample.x, sample.y),
            ImageExpr::ToInt(image) => image.eval(sample).map(f64::trunc),
        }
    }
}

/// An image tagged with its output column name
#[derive(Debug, Clone)]
pub struct Band {
    pub name: String,
    pub expr: ImageExpr,
}

/// Covariate category; fixes the reducer, sampling scale and file name
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BundleKind {
    Sum,
    Coords,
    Mean,
}

impl BundleKind {
    pub fn reducer(&self) -> Reducer {
        match self {
            BundleKind::Sum => Reducer::Sum,
            BundleKind::Coords => Reducer::First,
            BundleKind::Mean => Reducer::Mean,
        }
    }

    pub fn scale(&self) -> f64 {
        match self {
            BundleKind::Sum => FINE_SCALE,
            BundleKind::Coords | BundleKind::Mean => COARSE_SCALE,
        }
    }

    pub fn file_stem(&self) -> &'static str {
        match self {
            BundleKind::Sum => "sum",
            BundleKind::Coords => "coords",
            BundleKind::Mean => "mean",
        }
    }
}

/// Co-registered bands extracted together with one reducer
#[derive(Debug, Clone)]
pub struct LayerBundle {
    pub kind: BundleKind,
    pub bands: Vec<Band>,
}

impl LayerBundle {
    pub fn new(kind: BundleKind, bands: Vec<Band>) -> Result<Self> {
        if bands.is_empty() {
            return Err(BiiError::Configuration(format!(
                "{} bundle has no bands",
                kind.file_stem()
            )));
        }
        let mut seen = HashSet::new();
        for band in &bands {
            if !seen.insert(band.name.as_str()) {
                return Err(BiiError::Configuration(format!(
                    "duplicate band `{}` in {} bundle",
                    band.name,
                    kind.file_stem()
                )));
            }
        }
        Ok(LayerBundle { kind, bands })
    }

    pub fn band_names(&self) -> Vec<&str> {
        self.bands.iter().map(|b| b.name.as_str()).collect()
    }

    pub fn eval(&self, sample: &Sample) -> Vec<Option<f64>> {
        self.bands.iter().map(|b| b.expr.eval(sample)).collect()
    }
}
