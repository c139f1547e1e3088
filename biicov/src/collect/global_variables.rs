use std::path::PathBuf;

pub const DEFAULT_OUTPUT_PATH: &str = "./output";
pub const DEFAULT_CATALOG_PATH: &str = "./catalog";

// Boundaries
pub const LSIB_FULL: &str = "USDOS/LSIB/2017";
pub const LSIB_SIMPLE: &str = "USDOS/LSIB_SIMPLE/2017";
pub const AFROTROPICS: &str = "projects/ee-geethensingh/assets/Afrotropics";

// Sum covariates (30 m)
pub const WSF_2019: &str = "projects/sat-io/open-datasets/WSF/WSF_2019";
pub const CROPLAND_2019: &str = "users/potapovpeter/Global_cropland_2019";
pub const WDPA_STRICT: &str = "projects/ee-geethensingh/assets/WDPA_strict_032023";
pub const SDPT_PLANTYEAR: &str = "users/liuzhujun/SDPT_NEW";
pub const SDPT_PLANTAG: &str = "users/duzhenrong/SDPT/sdpt_plantag";
pub const SDPT_NAME: &str = "users/duzhenrong/SDPT/sdpt_name";
pub const SDPT_CHINA: &str = "users/liuzhujun/SDPT_China";
pub const DESCALES_OIL_PALM: &str = "users/liuzhujun/Descales";
pub const SOIL_NUTRIENTS: &str = "projects/ee-geethensingh/assets/Bell_1982_nutrient_map";

// Mean covariates (1 km)
pub const CHIRPS_DAILY: &str = "UCSB-CHG/CHIRPS/DAILY";
pub const GPW_DENSITY: &str = "CIESIN/GPWv411/GPW_UNWPP-Adjusted_Population_Density";
pub const GPW_DENSITY_BAND: &str = "unwpp-adjusted_population_density";
pub const GRAZING_AREA: &str = "projects/ee-geethensingh/assets/GrazingDensity/GI_8_Areakm";
pub const GRAZING_CATTLE: &str = "projects/ee-geethensingh/assets/GrazingDensity/5_Ct_2010_Da";
pub const GRAZING_SHEEP: &str = "projects/ee-geethensingh/assets/GrazingDensity/5_Sh_2010_Da";
pub const GRAZING_GOAT: &str = "projects/ee-geethensingh/assets/GrazingDensity/5_Gt_2010_Da";
pub const NITROGEN_FERTILIZER: &str = "projects/ee-geethensingh/assets/Nfur_15arcmins_transformed";
pub const FIELD_SIZES: &str = "projects/ee-geethensingh/assets/dominant_field_sizes";

/// Territories intersecting the Afrotropics that are not sub-Saharan countries
pub const EXCLUDED_COUNTRIES: [&str; 11] = [
    "Gaza Strip (disp)",
    "Israel",
    "Algeria",
    "Egypt",
    "Libya",
    "Morocco",
    "Tunisia",
    "Mayotte (Fr)",
    "Spain [Canary Is]",
    "Spain [Plazas de Soberania]",
    "Portugal [Madeira Is]",
];

pub fn get_output_path() -> PathBuf {
    PathBuf::from(DEFAULT_OUTPUT_PATH)
}

pub fn get_catalog_path() -> PathBuf {
    PathBuf::from(DEFAULT_CATALOG_PATH)
}
