use geo::{Intersects, Point};

use crate::collect::catalog::FeatureCollection;
use crate::commons::numeric::NumericValue;
use crate::geo_core::Projection;
use crate::geometric::grid::Grid;
use crate::geometric::image::ImageExpr;

/// Fertilizer attribute of the nitrogen input points, kg/ha
pub const FERTILIZER_FIELD: &str = "Nfer_kgha_";
/// Edge of the nitrogen lattice in degrees
pub const NITROGEN_GRID_DEGREES: f64 = 0.25;

/// Quarter-degree lattice the fertilizer points are snapped onto
pub fn nitrogen_grid_projection() -> Projection {
    Projection::epsg(4326).scale(NITROGEN_GRID_DEGREES, NITROGEN_GRID_DEGREES)
}

#[derive(Debug, Clone, PartialEq)]
pub struct FertilizerRecord {
    pub point: Point<f64>,
    pub value: f64,
}

/// Fertilizer points after normalization
#[derive(Debug, Clone, Default)]
pub struct FertilizerRecords {
    pub records: Vec<FertilizerRecord>,
    /// Records dropped for a missing point, a missing value or an unparseable value
    pub rejected: usize,
}

/// Normalize every record's fertilizer value to a number.
///
/// Text and numeric inputs are merged into one set; rejected records are
/// left out, never zero-filled.
pub fn normalize_records(points: &FeatureCollection) -> FertilizerRecords {
    let mut out = FertilizerRecords::default();
    for feature in &points.features {
        let Some(point) = feature.point() else {
            tracing::warn!(dataset = %points.id, "fertilizer record without a point geometry");
            out.rejected += 1;
            continue;
        };
        let Some(raw) = feature.get(FERTILIZER_FIELD) else {
            tracing::warn!(dataset = %points.id, "fertilizer record without `{}`", FERTILIZER_FIELD);
            out.rejected += 1;
            continue;
        };
        match NumericValue::from_json(&points.id, FERTILIZER_FIELD, raw)
            .and_then(|v| v.normalize(&points.id))
        {
            Ok(value) => out.records.push(FertilizerRecord { point, value }),
            Err(e) => {
                tracing::warn!("excluding fertilizer record: {}", e);
                out.rejected += 1;
            }
        }
    }
    out
}

/// Rasterize fertilizer points onto the covering grid.
///
/// Cells holding no point are dropped; every other cell takes the value of
/// the first point it holds. Pixels outside kept cells read 0.
pub fn nitrogen_image(records: &[FertilizerRecord], grid: &Grid) -> ImageExpr {
    let regions = grid
        .cells
        .iter()
        .filter_map(|cell| {
            records
                .iter()
                .find(|r| cell.polygon.intersects(&r.point))
                .map(|r| (cell.polygon.clone(), r.value))
        })
        .collect();
    ImageExpr::regions(regions).unmask(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collect::catalog::VectorFeature;
    use crate::geo_core::rect_polygon;
    use crate::geometric::grid::GridCell;
    use crate::geometric::image::Sample;
    use geo::point;
    use serde_json::json;

    fn fertilizer(x: f64, y: f64, value: serde_json::Value) -> VectorFeature {
        VectorFeature::new(point!(x: x, y: y)).with_property(FERTILIZER_FIELD, value)
    }

    #[test]
    fn test_normalize_mixed_inputs() {
        let fc = FeatureCollection::new(
            "nfer",
            vec![
                fertilizer(0.5, 0.5, json!("12.5")),
                fertilizer(1.5, 0.5, json!(30)),
                fertilizer(2.5, 0.5, json!("not a number")),
                fertilizer(3.5, 0.5, json!(null)),
                VectorFeature::new(point!(x: 4.5, y: 0.5)),
                VectorFeature::new(rect_polygon(0.0, 0.0, 1.0, 1.0))
                    .with_property(FERTILIZER_FIELD, 1.0),
            ],
        );
        let normalized = normalize_records(&fc);
        let values: Vec<f64> = normalized.records.iter().map(|r| r.value).collect();
        assert_eq!(values, vec![12.5, 30.0]);
        assert_eq!(normalized.rejected, 4);
    }

    #[test]
    fn test_nitrogen_image_first_point_per_cell() {
        let cell = |column: i64, min_x: f64| GridCell {
            id: format!("{}_0", column),
            column,
            row: 0,
            polygon: rect_polygon(min_x, 0.0, min_x + 1.0, 1.0),
        };
        let grid = Grid {
            cell_size: 1.0,
            cells: vec![cell(0, 0.0), cell(1, 1.0), cell(2, 2.0)],
        };
        let records = vec![
            FertilizerRecord {
                point: point!(x: 0.2, y: 0.2),
                value: 5.0,
            },
            FertilizerRecord {
                point: point!(x: 0.8, y: 0.8),
                value: 9.0,
            },
            FertilizerRecord {
                point: point!(x: 2.5, y: 0.5),
                value: 3.0,
            },
        ];
        let image = nitrogen_image(&records, &grid);
        let at = |x: f64| Sample { x, y: 0.5, scale: 0.1 };
        assert_eq!(image.eval(&at(0.5)), Some(5.0));
        assert_eq!(image.eval(&at(1.5)), Some(0.0));
        assert_eq!(image.eval(&at(2.5)), Some(3.0));
        assert_eq!(image.eval(&at(7.5)), Some(0.0));
    }
}
