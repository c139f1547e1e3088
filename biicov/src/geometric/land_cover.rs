use geo::MultiPolygon;

use crate::collect::catalog::Catalog;
use crate::collect::global_variables::{
    CROPLAND_2019, DESCALES_OIL_PALM, SDPT_CHINA, SDPT_NAME, SDPT_PLANTAG, SDPT_PLANTYEAR,
    SOIL_NUTRIENTS, WDPA_STRICT, WSF_2019,
};
use crate::error::Result;
use crate::geometric::image::{Band, ImageExpr};

/// WSF 2019 value of a settlement pixel
pub const URBAN_CLASS: f64 = 255.0;
/// Soil nutrient class attribute of the Bell 1982 map
pub const NUTRIENT_FIELD: &str = "Nut_status";
/// Planting years at or before this one are not trusted
pub const PLANTING_YEAR_FLOOR: f64 = 1980.0;

/// SDPT plantation type codes
pub const PLANTAG_PLANTATION: f64 = 1.0;
pub const PLANTAG_TREE_CROP: f64 = 2.0;

/// Output names of the area-sum bands, in column order
pub const SUM_BANDS: [&str; 8] = [
    "areakm2_urban",
    "areakm2_cropCover",
    "areakm2_protArea",
    "areakm2_slowNutrArea",
    "areakm2_sMedNutriArea",
    "areakm2_sHighNutriArea",
    "areakm2_plantation",
    "areakm2_treeCrop",
];

/// Pixel area in km², masked outside `region`
pub fn area_km2(region: &MultiPolygon<f64>) -> ImageExpr {
    ImageExpr::pixel_area()
        .divide(ImageExpr::constant(1e6))
        .clip(region.clone())
}

/// Planting year layers of the Spatial Database of Planted Trees plus the
/// China and oil palm supplements.
#[derive(Debug, Clone)]
pub struct PlantationSources {
    pub plantyear: ImageExpr,
    pub plantag: ImageExpr,
    pub sdpt_name: ImageExpr,
    pub china_year: ImageExpr,
    pub oil_palm_year: ImageExpr,
}

impl PlantationSources {
    pub fn load(catalog: &dyn Catalog) -> Result<Self> {
        Ok(PlantationSources {
            plantyear: catalog.image_collection(SDPT_PLANTYEAR)?.mosaic(),
            plantag: ImageExpr::source(catalog.image(SDPT_PLANTAG)?, 0),
            sdpt_name: ImageExpr::source(catalog.image(SDPT_NAME)?, 0),
            china_year: catalog.image_collection(SDPT_CHINA)?.mosaic(),
            oil_palm_year: catalog.image_collection(DESCALES_OIL_PALM)?.mosaic(),
        })
    }

    /// SDPT planting year where the source id is in (0, 120) or above 129
    pub fn valid_plantyear(&self) -> ImageExpr {
        let name = &self.sdpt_name;
        let valid_id = name
            .clone()
            .less_than(120.0)
            .and(name.clone().greater_than(0.0))
            .or(name.clone().greater_than(129.0));
        self.plantyear.clone().update_mask(valid_id).to_int()
    }

    fn recent(year: &ImageExpr) -> ImageExpr {
        year.clone()
            .update_mask(year.clone().greater_than(PLANTING_YEAR_FLOOR))
    }

    /// 1 on plantation forest, 0 elsewhere
    pub fn plantation(&self) -> ImageExpr {
        let sdpt = self
            .valid_plantyear()
            .update_mask(self.plantag.clone().equals(PLANTAG_PLANTATION));
        ImageExpr::mosaic(vec![sdpt, Self::recent(&self.china_year)])
            .greater_than(0.0)
            .unmask(0.0)
    }

    /// 1 on tree crops, 0 elsewhere
    pub fn tree_crop(&self) -> ImageExpr {
        let sdpt = self
            .valid_plantyear()
            .multiply(self.plantag.clone().equals(PLANTAG_TREE_CROP));
        ImageExpr::mosaic(vec![sdpt, Self::recent(&self.oil_palm_year)])
            .greater_than(0.0)
            .unmask(0.0)
    }
}

/// Land area bands summed per cell at 30 m, in [`SUM_BANDS`] order.
///
/// The area raster is clipped to `aoi`; sources are filtered by `sources`.
pub fn sum_bands(
    catalog: &dyn Catalog,
    aoi: &MultiPolygon<f64>,
    sources: &MultiPolygon<f64>,
) -> Result<Vec<Band>> {
    let area = area_km2(aoi);

    let urban = catalog
        .image_collection(WSF_2019)?
        .filter_bounds(sources)
        .mosaic()
        .equals(URBAN_CLASS)
        .unmask(0.0);
    let cropland = catalog.image_collection(CROPLAND_2019)?.filter_bounds(sources).mosaic();

    let protected = catalog
        .feature_collection(WDPA_STRICT)?
        .filter_bounds(sources)
        .polygons();
    tracing::debug!(polygons = protected.0.len(), "protected areas in AOI");

    let soils = catalog.feature_collection(SOIL_NUTRIENTS)?;
    let nutrient_area = |status: &str| {
        area.clone()
            .clip(soils.filter_eq(NUTRIENT_FIELD, status).polygons())
            .unmask(0.0)
    };

    let plantations = PlantationSources::load(catalog)?;

    let images = [
        area.clone().multiply(urban),
        area.clone().multiply(cropland),
        area.clone().clip(protected).unmask(0.0),
        nutrient_area("Low"),
        nutrient_area("Medium"),
        nutrient_area("High"),
        area.clone().multiply(plantations.plantation()),
        area.multiply(plantations.tree_crop()),
    ];
    Ok(images
        .into_iter()
        .zip(SUM_BANDS)
        .map(|(image, name)| image.rename(name))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collect::catalog::{LocalCatalog, Raster, VectorFeature};
    use crate::geo_core::rect_polygon;
    use crate::geometric::image::Sample;

    const NAN: f64 = f64::NAN;

    // one row of seven 10-unit pixels covering [0,70]x[0,10]
    fn row(values: [f64; 7]) -> Raster {
        Raster::single_band("b1", (0.0, 10.0), 10.0, 7, 1, values.to_vec())
    }

    fn plantation_catalog() -> LocalCatalog {
        let mut catalog = LocalCatalog::in_memory();
        catalog.insert_collection(
            SDPT_PLANTYEAR,
            vec![row([2005.0, 2010.0, 2000.0, NAN, NAN, NAN, NAN])],
        );
        catalog.insert_image(SDPT_PLANTAG, row([1.0, 2.0, 1.0, NAN, NAN, NAN, NAN]));
        catalog.insert_image(SDPT_NAME, row([50.0, 130.0, 125.0, NAN, NAN, NAN, NAN]));
        catalog.insert_collection(SDPT_CHINA, vec![row([NAN, NAN, NAN, NAN, 1995.0, 1970.0, NAN])]);
        catalog.insert_collection(
            DESCALES_OIL_PALM,
            vec![row([NAN, NAN, NAN, NAN, NAN, NAN, 2001.0])],
        );
        catalog
    }

    fn pixels(image: &ImageExpr) -> Vec<Option<f64>> {
        (0..7)
            .map(|i| {
                image.eval(&Sample {
                    x: i as f64 * 10.0 + 5.0,
                    y: 5.0,
                    scale: 10.0,
                })
            })
            .collect()
    }

    #[test]
    fn test_plantation_classification() {
        let sources = PlantationSources::load(&plantation_catalog()).unwrap();
        assert_eq!(
            pixels(&sources.plantation()),
            vec![
                Some(1.0),
                Some(0.0),
                Some(0.0),
                Some(0.0),
                Some(1.0),
                Some(0.0),
                Some(0.0)
            ]
        );
        assert_eq!(
            pixels(&sources.tree_crop()),
            vec![
                Some(0.0),
                Some(1.0),
                Some(0.0),
                Some(0.0),
                Some(0.0),
                Some(0.0),
                Some(1.0)
            ]
        );
    }

    #[test]
    fn test_valid_plantyear_masks_excluded_ids() {
        let sources = PlantationSources::load(&plantation_catalog()).unwrap();
        let years = pixels(&sources.valid_plantyear());
        assert_eq!(&years[..4], &[Some(2005.0), Some(2010.0), None, None]);
    }

    #[test]
    fn test_missing_plantation_dataset() {
        let mut catalog = LocalCatalog::in_memory();
        catalog.insert_image(SDPT_PLANTAG, row([1.0; 7]));
        assert!(matches!(
            PlantationSources::load(&catalog),
            Err(crate::error::BiiError::DataSource { .. })
        ));
    }

    #[test]
    fn test_sum_bands() {
        let mut catalog = plantation_catalog();
        catalog.insert_collection(WSF_2019, vec![row([255.0, 0.0, 255.0, NAN, 0.0, 0.0, 0.0])]);
        catalog.insert_collection(CROPLAND_2019, vec![row([1.0, 1.0, 0.0, 0.0, 0.0, 0.0, 0.0])]);
        catalog.insert_features(
            WDPA_STRICT,
            vec![
                VectorFeature::new(rect_polygon(0.0, 0.0, 20.0, 10.0)),
                VectorFeature::new(rect_polygon(40.0, 0.0, 50.0, 10.0)),
            ],
        );
        catalog.insert_features(
            SOIL_NUTRIENTS,
            vec![
                VectorFeature::new(rect_polygon(0.0, 0.0, 10.0, 10.0))
                    .with_property(NUTRIENT_FIELD, "Low"),
                VectorFeature::new(rect_polygon(10.0, 0.0, 70.0, 10.0))
                    .with_property(NUTRIENT_FIELD, "High"),
            ],
        );

        // area over the first six pixels, sources filtered by the first three
        let aoi = MultiPolygon::new(vec![rect_polygon(0.0, 0.0, 60.0, 10.0)]);
        let sources = MultiPolygon::new(vec![rect_polygon(0.0, 0.0, 30.0, 10.0)]);
        let bands = sum_bands(&catalog, &aoi, &sources).unwrap();
        let names: Vec<&str> = bands.iter().map(|b| b.name.as_str()).collect();
        assert_eq!(
            names,
            vec![
                "areakm2_urban",
                "areakm2_cropCover",
                "areakm2_protArea",
                "areakm2_slowNutrArea",
                "areakm2_sMedNutriArea",
                "areakm2_sHighNutriArea",
                "areakm2_plantation",
                "areakm2_treeCrop",
            ]
        );

        let km2 = 100.0 / 1e6;
        let at = |band: usize, x: f64| {
            bands[band].expr.eval(&Sample {
                x,
                y: 5.0,
                scale: 10.0,
            })
        };
        assert_eq!(at(0, 5.0), Some(km2));
        assert_eq!(at(0, 15.0), Some(0.0));
        // outside the AOI the area itself is masked
        assert_eq!(at(0, 65.0), None);
        assert_eq!(at(1, 15.0), Some(km2));
        assert_eq!(at(2, 15.0), Some(km2));
        assert_eq!(at(2, 25.0), Some(0.0));
        // protected polygon outside the source AOI is not counted
        assert_eq!(at(2, 45.0), Some(0.0));
        assert_eq!(at(3, 5.0), Some(km2));
        assert_eq!(at(4, 5.0), Some(0.0));
        assert_eq!(at(5, 5.0), Some(0.0));
        assert_eq!(at(5, 35.0), Some(km2));
        assert_eq!(at(6, 45.0), Some(km2));
        assert_eq!(at(7, 15.0), Some(km2));
        assert_eq!(at(7, 25.0), Some(0.0));
    }
}
