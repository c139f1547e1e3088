use chrono::NaiveDate;
use geo::MultiPolygon;

use crate::collect::catalog::{Catalog, ImageCollection};
use crate::collect::global_variables::{
    CHIRPS_DAILY, GPW_DENSITY, GPW_DENSITY_BAND, GRAZING_AREA, GRAZING_CATTLE, GRAZING_GOAT,
    GRAZING_SHEEP, NITROGEN_FERTILIZER,
};
use crate::error::{BiiError, Result};
use crate::geometric::grid::GeometryService;
use crate::geometric::image::{Band, ImageExpr, Reducer};
use crate::geometric::nitrogen::{nitrogen_grid_projection, nitrogen_image, normalize_records};

/// Climatology window of the precipitation band, inclusive
pub const PRECIPITATION_FIRST_YEAR: i32 = 1991;
pub const PRECIPITATION_LAST_YEAR: i32 = 2020;

/// Output names of the mean bands, in column order
pub const MEAN_BANDS: [&str; 6] = [
    "mm_precipitation",
    "Nfer_kgha",
    "popDensity",
    "sheepDensity",
    "goatDensity",
    "cattleDensity",
];

fn new_year(year: i32) -> Result<NaiveDate> {
    NaiveDate::from_ymd_opt(year, 1, 1)
        .ok_or_else(|| BiiError::Configuration(format!("invalid year {}", year)))
}

/// Mean of the calendar-year precipitation totals, 0 where no year has data
pub fn mean_annual_precipitation(daily: &ImageCollection) -> Result<ImageExpr> {
    let mut yearly = Vec::new();
    for year in PRECIPITATION_FIRST_YEAR..=PRECIPITATION_LAST_YEAR {
        let days = daily.filter_date(new_year(year)?, new_year(year + 1)?);
        yearly.push(ImageExpr::reduce(Reducer::Sum, days.sources()));
    }
    Ok(ImageExpr::reduce(Reducer::Mean, yearly).unmask(0.0))
}

/// Heads per km² of grazing reference area; 0 where the area is missing or zero
pub fn grazing_density(heads: ImageExpr, reference_area: &ImageExpr) -> ImageExpr {
    heads
        .divide(reference_area.clone().unmask(0.0))
        .unmask(0.0)
}

/// Continuous covariates averaged per cell at 1 km, in [`MEAN_BANDS`] order
pub fn mean_bands(
    catalog: &dyn Catalog,
    geometry: &dyn GeometryService,
    aoi: &MultiPolygon<f64>,
) -> Result<Vec<Band>> {
    let daily = catalog.image_collection(CHIRPS_DAILY)?.filter_bounds(aoi);
    tracing::debug!(images = daily.len(), "daily precipitation images in AOI");
    let precipitation = mean_annual_precipitation(&daily)?;

    let fertilizer = catalog
        .feature_collection(NITROGEN_FERTILIZER)?
        .filter_bounds(aoi);
    let normalized = normalize_records(&fertilizer);
    tracing::info!(
        records = normalized.records.len(),
        rejected = normalized.rejected,
        "Nitrogen input records normalized"
    );
    let cells = geometry.covering_grid(aoi, &nitrogen_grid_projection())?;
    let nitrogen = nitrogen_image(&normalized.records, &cells);

    let population = ImageExpr::mosaic(
        catalog
            .image_collection(GPW_DENSITY)?
            .filter_bounds(aoi)
            .select(GPW_DENSITY_BAND)?,
    )
    .unmask(0.0);

    let reference_area = ImageExpr::source(catalog.image(GRAZING_AREA)?, 0);
    let density = |id: &str| -> Result<ImageExpr> {
        Ok(grazing_density(
            ImageExpr::source(catalog.image(id)?, 0),
            &reference_area,
        ))
    };

    let images = [
        precipitation,
        nitrogen,
        population,
        density(GRAZING_SHEEP)?,
        density(GRAZING_GOAT)?,
        density(GRAZING_CATTLE)?,
    ];
    Ok(images
        .into_iter()
        .zip(MEAN_BANDS)
        .map(|(image, name)| image.rename(name))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collect::catalog::{LocalCatalog, Raster, VectorFeature};
    use crate::geo_core::rect_polygon;
    use crate::geometric::image::Sample;
    use crate::geometric::local_platform::LocalPlatform;
    use crate::geometric::nitrogen::FERTILIZER_FIELD;
    use geo::point;
    use std::sync::Arc;

    const NAN: f64 = f64::NAN;

    // two 1000-unit pixels covering [0,2000]x[0,1000]
    fn pair(values: [f64; 2]) -> Raster {
        Raster::single_band("b1", (0.0, 1000.0), 1000.0, 2, 1, values.to_vec())
    }

    fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn at(x: f64) -> Sample {
        Sample {
            x,
            y: 500.0,
            scale: 1000.0,
        }
    }

    #[test]
    fn test_mean_annual_precipitation() {
        let daily = ImageCollection {
            id: CHIRPS_DAILY.to_string(),
            images: vec![
                Arc::new(pair([100.0, NAN]).with_date(day(1990, 12, 31))),
                Arc::new(pair([2.0, NAN]).with_date(day(1991, 3, 1))),
                Arc::new(pair([3.0, NAN]).with_date(day(1991, 6, 1))),
                Arc::new(pair([10.0, NAN]).with_date(day(1992, 1, 1))),
                Arc::new(pair([100.0, NAN]).with_date(day(2021, 1, 1))),
            ],
        };
        let image = mean_annual_precipitation(&daily).unwrap();
        assert_eq!(image.eval(&at(500.0)), Some(7.5));
        assert_eq!(image.eval(&at(1500.0)), Some(0.0));
    }

    #[test]
    fn test_grazing_density_masks_zero_area() {
        let heads = ImageExpr::source(Arc::new(pair([50.0, 50.0])), 0);
        let area = ImageExpr::source(Arc::new(pair([25.0, 0.0])), 0);
        let density = grazing_density(heads, &area);
        assert_eq!(density.eval(&at(500.0)), Some(2.0));
        assert_eq!(density.eval(&at(1500.0)), Some(0.0));
    }

    #[test]
    fn test_mean_bands() {
        let mut catalog = LocalCatalog::in_memory();
        catalog.insert_collection(
            CHIRPS_DAILY,
            vec![pair([4.0, 4.0]).with_date(day(2000, 5, 5))],
        );
        catalog.insert_features(
            NITROGEN_FERTILIZER,
            vec![
                VectorFeature::new(point!(x: 500.0, y: 500.0))
                    .with_property(FERTILIZER_FIELD, "42.0"),
                VectorFeature::new(point!(x: 900.0, y: 500.0))
                    .with_property(FERTILIZER_FIELD, "n/a"),
            ],
        );
        let mut gpw = pair([120.0, NAN]);
        gpw.bands[0].name = GPW_DENSITY_BAND.to_string();
        catalog.insert_collection(GPW_DENSITY, vec![gpw]);
        catalog.insert_image(GRAZING_AREA, pair([10.0, NAN]));
        catalog.insert_image(GRAZING_SHEEP, pair([20.0, 5.0]));
        catalog.insert_image(GRAZING_GOAT, pair([30.0, 5.0]));
        catalog.insert_image(GRAZING_CATTLE, pair([40.0, 5.0]));

        let aoi = MultiPolygon::new(vec![rect_polygon(0.0, 0.0, 2000.0, 1000.0)]);
        let bands = mean_bands(&catalog, &LocalPlatform::new(), &aoi).unwrap();
        let names: Vec<&str> = bands.iter().map(|b| b.name.as_str()).collect();
        assert_eq!(names, MEAN_BANDS.to_vec());

        let values: Vec<Option<f64>> = bands.iter().map(|b| b.expr.eval(&at(500.0))).collect();
        assert_eq!(
            values,
            vec![
                Some(4.0),
                Some(42.0),
                Some(120.0),
                Some(2.0),
                Some(3.0),
                Some(4.0)
            ]
        );
        let values: Vec<Option<f64>> = bands.iter().map(|b| b.expr.eval(&at(1500.0))).collect();
        // one 27.83 km nitrogen cell spans both pixels
        assert_eq!(
            values,
            vec![
                Some(4.0),
                Some(42.0),
                Some(0.0),
                Some(0.0),
                Some(0.0),
                Some(0.0)
            ]
        );
    }

    #[test]
    fn test_mean_bands_missing_band() {
        let mut catalog = LocalCatalog::in_memory();
        catalog.insert_collection(CHIRPS_DAILY, Vec::new());
        catalog.insert_features(NITROGEN_FERTILIZER, Vec::new());
        catalog.insert_collection(GPW_DENSITY, vec![pair([1.0, 1.0])]);
        let aoi = MultiPolygon::new(vec![rect_polygon(0.0, 0.0, 2000.0, 1000.0)]);
        let err = mean_bands(&catalog, &LocalPlatform::new(), &aoi).unwrap_err();
        assert!(err.to_string().contains(GPW_DENSITY_BAND));
    }
}
