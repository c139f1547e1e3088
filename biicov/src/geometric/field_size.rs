use serde::Serialize;
use std::path::{Path, PathBuf};

use crate::collect::catalog::FeatureCollection;
use crate::commons::numeric::NumericValue;
use crate::error::{BiiError, Result};

pub const FIELD_SIZE_FIELD: &str = "field_size";
const MISSING: &str = "NA";

/// Dominant field size survey point
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FieldSizePoint {
    pub x: f64,
    pub y: f64,
    #[serde(rename = "fieldSize")]
    pub field_size: f64,
}

/// Survey points with a numeric field size; `NA` and unparseable values are dropped
pub fn field_size_points(survey: &FeatureCollection) -> Vec<FieldSizePoint> {
    survey
        .features
        .iter()
        .filter(|f| f.get_str(FIELD_SIZE_FIELD) != Some(MISSING))
        .filter_map(|f| {
            let point = f.point()?;
            let value = f.get(FIELD_SIZE_FIELD)?;
            match NumericValue::from_json(&survey.id, FIELD_SIZE_FIELD, value)
                .and_then(|v| v.normalize(&survey.id))
            {
                Ok(field_size) => Some(FieldSizePoint {
                    x: point.x(),
                    y: point.y(),
                    field_size,
                }),
                Err(e) => {
                    tracing::warn!("excluding field size point: {}", e);
                    None
                }
            }
        })
        .collect()
}

/// Write points as `x,y,fieldSize` rows
pub fn write_field_sizes(points: &[FieldSizePoint], path: &Path) -> Result<PathBuf> {
    let mut writer = csv::Writer::from_path(path)
        .map_err(|e| BiiError::filesystem(path, std::io::Error::from(e)))?;
    for point in points {
        writer
            .serialize(point)
            .map_err(|e| BiiError::filesystem(path, std::io::Error::from(e)))?;
    }
    writer
        .flush()
        .map_err(|e| BiiError::filesystem(path, e))?;
    Ok(path.to_path_buf())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collect::catalog::VectorFeature;
    use geo::point;

    #[test]
    fn test_field_size_points_drop_na() {
        let survey = FeatureCollection::new(
            "fields",
            vec![
                VectorFeature::new(point!(x: 1.0, y: 2.0)).with_property(FIELD_SIZE_FIELD, "3"),
                VectorFeature::new(point!(x: 3.0, y: 4.0)).with_property(FIELD_SIZE_FIELD, "NA"),
                VectorFeature::new(point!(x: 5.0, y: 6.0)).with_property(FIELD_SIZE_FIELD, "large"),
                VectorFeature::new(point!(x: 7.0, y: 8.0)).with_property(FIELD_SIZE_FIELD, 2.0),
            ],
        );
        let points = field_size_points(&survey);
        assert_eq!(
            points,
            vec![
                FieldSizePoint {
                    x: 1.0,
                    y: 2.0,
                    field_size: 3.0
                },
                FieldSizePoint {
                    x: 7.0,
                    y: 8.0,
                    field_size: 2.0
                },
            ]
        );
    }

    #[test]
    fn test_write_field_sizes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fieldSize_1km.csv");
        let points = vec![FieldSizePoint {
            x: 1.5,
            y: -2.0,
            field_size: 4.0,
        }];
        write_field_sizes(&points, &path).unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        assert_eq!(text, "x,y,fieldSize\n1.5,-2.0,4.0\n");
    }
}
