use geo::MultiPolygon;
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use crate::collect::catalog::Catalog;
use crate::collect::global_variables::{AFROTROPICS, EXCLUDED_COUNTRIES, LSIB_FULL, LSIB_SIMPLE};
use crate::error::{BiiError, Result};

/// Country name attribute of the boundary datasets
pub const COUNTRY_FIELD: &str = "COUNTRY_NA";
/// World region attribute of the simplified boundary dataset
pub const REGION_FIELD: &str = "wld_rgn";

/// Boundary and output location of one country
#[derive(Debug, Clone)]
pub struct CountryConfig {
    pub name: String,
    pub output_directory: PathBuf,
    pub aoi: MultiPolygon<f64>,
}

/// Sub-Saharan countries keyed by name
#[derive(Debug, Clone, Default)]
pub struct CountryRegistry {
    countries: BTreeMap<String, CountryConfig>,
}

impl CountryRegistry {
    /// Countries of the full LSIB boundaries intersecting the Afrotropics,
    /// minus the fixed exclusion list
    pub fn build(catalog: &dyn Catalog, base_path: &Path) -> Result<Self> {
        let africa = catalog
            .feature_collection(LSIB_SIMPLE)?
            .filter_eq(REGION_FIELD, "Africa");
        tracing::info!("{} African boundaries in the simplified dataset", africa.len());

        let boundaries = catalog.feature_collection(LSIB_FULL)?;
        let afrotropics = catalog.feature_collection(AFROTROPICS)?.geometry();

        let names: BTreeSet<String> = boundaries
            .filter_bounds(&afrotropics)
            .aggregate_array(COUNTRY_FIELD)
            .into_iter()
            .filter(|name| !EXCLUDED_COUNTRIES.contains(&name.as_str()))
            .collect();

        let mut countries = BTreeMap::new();
        for name in names {
            let aoi = boundaries.filter_eq(COUNTRY_FIELD, &name).geometry();
            countries.insert(
                name.clone(),
                CountryConfig {
                    output_directory: base_path.join(&name),
                    name,
                    aoi,
                },
            );
        }
        tracing::debug!(countries = countries.len(), "country registry built");
        Ok(CountryRegistry { countries })
    }

    pub fn get(&self, name: &str) -> Result<&CountryConfig> {
        self.countries.get(name).ok_or_else(|| {
            BiiError::Configuration(format!("unknown country `{}`", name))
        })
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.countries.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.countries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.countries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collect::catalog::{LocalCatalog, VectorFeature};
    use crate::geo_core::rect_polygon;
    use geo::Area;

    fn country(name: &str, x: f64, y: f64) -> VectorFeature {
        VectorFeature::new(rect_polygon(x, y, x + 10.0, y + 10.0)).with_property(COUNTRY_FIELD, name)
    }

    fn catalog() -> LocalCatalog {
        let mut catalog = LocalCatalog::in_memory();
        catalog.insert_features(
            LSIB_FULL,
            vec![
                country("Kenya", 0.0, 0.0),
                country("Kenya", 10.0, 0.0),
                country("Egypt", 0.0, 10.0),
                country("Uganda", -10.0, 0.0),
                country("France", 100.0, 100.0),
            ],
        );
        catalog.insert_features(
            LSIB_SIMPLE,
            vec![
                VectorFeature::new(rect_polygon(0.0, 0.0, 1.0, 1.0)).with_property(REGION_FIELD, "Africa"),
                VectorFeature::new(rect_polygon(0.0, 0.0, 1.0, 1.0)).with_property(REGION_FIELD, "Europe"),
            ],
        );
        catalog.insert_features(
            AFROTROPICS,
            vec![VectorFeature::new(rect_polygon(-5.0, -5.0, 25.0, 15.0))],
        );
        catalog
    }

    #[test]
    fn test_registry_excludes_listed_countries() {
        let registry = CountryRegistry::build(&catalog(), Path::new("/data/out")).unwrap();
        assert_eq!(registry.names().collect::<Vec<_>>(), vec!["Kenya", "Uganda"]);
        for name in EXCLUDED_COUNTRIES {
            assert!(registry.get(name).is_err());
        }
        assert!(registry.get("France").is_err());
    }

    #[test]
    fn test_country_config() {
        let registry = CountryRegistry::build(&catalog(), Path::new("/data/out")).unwrap();
        let kenya = registry.get("Kenya").unwrap();
        assert_eq!(kenya.output_directory, Path::new("/data/out/Kenya"));
        // both Kenya features are dissolved into one boundary
        assert_eq!(kenya.aoi.unsigned_area(), 200.0);
        assert!(matches!(
            registry.get("Atlantis"),
            Err(BiiError::Configuration(_))
        ));
    }

    #[test]
    fn test_registry_requires_boundaries() {
        let mut catalog = LocalCatalog::in_memory();
        catalog.insert_features(LSIB_SIMPLE, Vec::new());
        assert!(matches!(
            CountryRegistry::build(&catalog, Path::new("out")),
            Err(BiiError::DataSource { .. })
        ));
    }
}
