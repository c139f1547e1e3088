use geo::{BoundingRect, Coord, Geometry, LineString, MultiPolygon, Polygon, Rect};
use serde::{Deserialize, Serialize};

/// Coordinate reference system of a request, with an optional nominal scale.
///
/// All catalog data handed to the local platform is expected in the same
/// CRS; `scale` only sizes lattices such as the nitrogen covering grid.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Projection {
    /// CRS identifier, e.g. `EPSG:3857` or `ESRI:102022`
    pub crs: String,
    /// Pixel size along x in projection units
    #[serde(default = "unit_scale")]
    pub scale_x: f64,
    /// Pixel size along y in projection units
    #[serde(default = "unit_scale")]
    pub scale_y: f64,
}

fn unit_scale() -> f64 {
    1.0
}

impl Projection {
    pub fn new(crs: impl Into<String>) -> Self {
        Projection {
            crs: crs.into(),
            scale_x: 1.0,
            scale_y: 1.0,
        }
    }

    /// Create a projection from an EPSG code
    pub fn epsg(code: u32) -> Self {
        Projection::new(format!("EPSG:{}", code))
    }

    /// Same CRS with a different nominal pixel size
    pub fn scale(&self, scale_x: f64, scale_y: f64) -> Self {
        Projection {
            crs: self.crs.clone(),
            scale_x,
            scale_y,
        }
    }
}

impl Default for Projection {
    /// Africa Albers Equal Area Conic, metres
    fn default() -> Self {
        Projection::new("ESRI:102022")
    }
}

/// Bounding box structure
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    pub min_x: f64,
    pub min_y: f64,
    pub max_x: f64,
    pub max_y: f64,
}

impl BoundingBox {
    pub fn new(min_x: f64, min_y: f64, max_x: f64, max_y: f64) -> Self {
        BoundingBox {
            min_x,
            min_y,
            max_x,
            max_y,
        }
    }

    pub fn from_rect(rect: Rect<f64>) -> Self {
        BoundingBox::new(rect.min().x, rect.min().y, rect.max().x, rect.max().y)
    }

    /// Bounding box of a polygonal geometry, `None` when it is empty
    pub fn of(geometry: &MultiPolygon<f64>) -> Option<Self> {
        geometry.bounding_rect().map(BoundingBox::from_rect)
    }

    pub fn intersects(&self, other: &BoundingBox) -> bool {
        self.min_x <= other.max_x
            && other.min_x <= self.max_x
            && self.min_y <= other.max_y
            && other.min_y <= self.max_y
    }

    pub fn contains(&self, x: f64, y: f64) -> bool {
        x >= self.min_x && x <= self.max_x && y >= self.min_y && y <= self.max_y
    }

    pub fn to_polygon(&self) -> Polygon<f64> {
        rect_polygon(self.min_x, self.min_y, self.max_x, self.max_y)
    }
}

/// Closed axis-aligned polygon
pub fn rect_polygon(min_x: f64, min_y: f64, max_x: f64, max_y: f64) -> Polygon<f64> {
    Polygon::new(
        LineString::from(vec![
            Coord { x: min_x, y: min_y },
            Coord { x: max_x, y: min_y },
            Coord { x: max_x, y: max_y },
            Coord { x: min_x, y: max_y },
            Coord { x: min_x, y: min_y },
        ]),
        vec![],
    )
}

/// Keep the polygonal part of a geometry.
///
/// Points and lines carry no area and are dropped; collections are
/// flattened.
pub fn polygonal(geometry: Geometry<f64>) -> MultiPolygon<f64> {
    let mut polygons = Vec::new();
    collect_polygons(geometry, &mut polygons);
    MultiPolygon::new(polygons)
}

fn collect_polygons(geometry: Geometry<f64>, out: &mut Vec<Polygon<f64>>) {
    match geometry {
        Geometry::Polygon(p) => out.push(p),
        Geometry::MultiPolygon(mp) => out.extend(mp.0),
        Geometry::Rect(r) => out.push(r.to_polygon()),
        Geometry::Triangle(t) => out.push(t.to_polygon()),
        Geometry::GeometryCollection(gc) => {
            for g in gc.0 {
                collect_polygons(g, out);
            }
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::{point, Area};

    #[test]
    fn test_projection_scale() {
        let proj = Projection::epsg(4326).scale(0.25, 0.25);
        assert_eq!(proj.crs, "EPSG:4326");
        assert_eq!(proj.scale_x, 0.25);
        assert_eq!(proj.scale_y, 0.25);
    }

    #[test]
    fn test_bounding_box() {
        let bbox = BoundingBox::new(0.0, 0.0, 1.0, 1.0);
        assert_eq!(bbox.min_x, 0.0);
        assert_eq!(bbox.max_x, 1.0);
        assert!(bbox.intersects(&BoundingBox::new(1.0, 1.0, 2.0, 2.0)));
        assert!(!bbox.intersects(&BoundingBox::new(1.5, 0.0, 2.0, 1.0)));
        assert_eq!(bbox.to_polygon().unsigned_area(), 1.0);
    }

    #[test]
    fn test_polygonal_drops_points() {
        let gc = Geometry::GeometryCollection(geo::GeometryCollection::new_from(vec![
            Geometry::Point(point!(x: 0.0, y: 0.0)),
            Geometry::Polygon(rect_polygon(0.0, 0.0, 2.0, 2.0)),
        ]));
        let mp = polygonal(gc);
        assert_eq!(mp.0.len(), 1);
        assert_eq!(mp.unsigned_area(), 4.0);
    }
}
