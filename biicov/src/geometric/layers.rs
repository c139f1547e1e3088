use geo::MultiPolygon;

use crate::collect::catalog::Catalog;
use crate::collect::global_variables::FIELD_SIZES;
use crate::error::Result;
use crate::geo_core::Projection;
use crate::geometric::covariates::mean_bands;
use crate::geometric::field_size::{field_size_points, FieldSizePoint};
use crate::geometric::grid::GeometryService;
use crate::geometric::image::{Axis, BundleKind, ImageExpr, LayerBundle};
use crate::geometric::land_cover::sum_bands;

/// Assembles the covariate bundles of one area of interest.
///
/// Every source is looked up eagerly, so a missing dataset or band fails the
/// whole bundle before anything is extracted.
pub struct LayerBuilder<'a> {
    catalog: &'a dyn Catalog,
    geometry: &'a dyn GeometryService,
}

impl<'a> LayerBuilder<'a> {
    pub fn new(catalog: &'a dyn Catalog, geometry: &'a dyn GeometryService) -> Self {
        LayerBuilder { catalog, geometry }
    }

    /// Area sums; the pixel area is clipped to `aoi`, sources are filtered
    /// by `sources`
    pub fn build_sum_layers(
        &self,
        aoi: &MultiPolygon<f64>,
        sources: &MultiPolygon<f64>,
    ) -> Result<LayerBundle> {
        LayerBundle::new(BundleKind::Sum, sum_bands(self.catalog, aoi, sources)?)
    }

    pub fn build_mean_layers(&self, aoi: &MultiPolygon<f64>) -> Result<LayerBundle> {
        LayerBundle::new(
            BundleKind::Mean,
            mean_bands(self.catalog, self.geometry, aoi)?,
        )
    }

    /// Pixel centre coordinates in the working projection
    pub fn build_coord_layers(&self, projection: &Projection) -> Result<LayerBundle> {
        tracing::debug!(crs = %projection.crs, "building coordinate layers");
        LayerBundle::new(
            BundleKind::Coords,
            vec![
                ImageExpr::pixel_coordinate(Axis::X).rename("x"),
                ImageExpr::pixel_coordinate(Axis::Y).rename("y"),
            ],
        )
    }

    /// Field size survey points inside the AOI
    pub fn build_field_size_points(&self, aoi: &MultiPolygon<f64>) -> Result<Vec<FieldSizePoint>> {
        let survey = self.catalog.feature_collection(FIELD_SIZES)?.filter_bounds(aoi);
        let points = field_size_points(&survey);
        tracing::info!("There are {} field points", points.len());
        Ok(points)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collect::catalog::{LocalCatalog, VectorFeature};
    use crate::geo_core::rect_polygon;
    use crate::geometric::field_size::FIELD_SIZE_FIELD;
    use crate::geometric::image::Sample;
    use crate::geometric::local_platform::LocalPlatform;
    use geo::point;

    #[test]
    fn test_coord_layers() {
        let catalog = LocalCatalog::in_memory();
        let platform = LocalPlatform::new();
        let bundle = LayerBuilder::new(&catalog, &platform)
            .build_coord_layers(&Projection::default())
            .unwrap();
        assert_eq!(bundle.kind, BundleKind::Coords);
        assert_eq!(bundle.band_names(), vec!["x", "y"]);
        let sample = Sample {
            x: 1500.0,
            y: -500.0,
            scale: 1000.0,
        };
        assert_eq!(bundle.eval(&sample), vec![Some(1500.0), Some(-500.0)]);
    }

    #[test]
    fn test_missing_dataset_fails_bundle() {
        let catalog = LocalCatalog::in_memory();
        let platform = LocalPlatform::new();
        let builder = LayerBuilder::new(&catalog, &platform);
        let aoi = MultiPolygon::new(vec![rect_polygon(0.0, 0.0, 10.0, 10.0)]);
        assert!(builder.build_sum_layers(&aoi, &aoi).is_err());
        assert!(builder.build_mean_layers(&aoi).is_err());
    }

    #[test]
    fn test_field_size_points_in_aoi() {
        let mut catalog = LocalCatalog::in_memory();
        catalog.insert_features(
            FIELD_SIZES,
            vec![
                VectorFeature::new(point!(x: 5.0, y: 5.0)).with_property(FIELD_SIZE_FIELD, "12"),
                VectorFeature::new(point!(x: 50.0, y: 5.0)).with_property(FIELD_SIZE_FIELD, "3"),
            ],
        );
        let platform = LocalPlatform::new();
        let aoi = MultiPolygon::new(vec![rect_polygon(0.0, 0.0, 10.0, 10.0)]);
        let points = LayerBuilder::new(&catalog, &platform)
            .build_field_size_points(&aoi)
            .unwrap();
        assert_eq!(points.len(), 1);
        assert_eq!(points[0].field_size, 12.0);
    }
}
