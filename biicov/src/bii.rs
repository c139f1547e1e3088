use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::collect::catalog::{Catalog, LocalCatalog};
use crate::collect::country::{CountryConfig, CountryRegistry};
use crate::collect::global_variables::get_output_path;
use crate::error::{BiiError, Result};
use crate::extract::{
    ExtractionDispatcher, ExtractionService, LocalExtractor, DEFAULT_BATCH_SIZE,
    DEFAULT_TILE_SIZE, DEFAULT_WORKERS,
};
use crate::geo_core::Projection;
use crate::geometric::field_size::write_field_sizes;
use crate::geometric::grid::{AoiMode, GeometryService, GridService, GridSelector, Resolution};
use crate::geometric::image::LayerBundle;
use crate::geometric::layers::LayerBuilder;
use crate::geometric::local_platform::LocalPlatform;

/// Run options, readable from a JSON file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BiiOptions {
    pub country: String,
    pub resolution: Resolution,
    pub aoi_mode: AoiMode,
    /// Base directory; each country writes into `{out_path}/{country}`
    pub out_path: PathBuf,
    pub projection: Projection,
    pub batch_size: usize,
    pub tile_size: f64,
    pub workers: usize,
}

impl Default for BiiOptions {
    fn default() -> Self {
        BiiOptions {
            country: String::new(),
            resolution: Resolution::Coarse,
            aoi_mode: AoiMode::Grid,
            out_path: get_output_path(),
            projection: Projection::default(),
            batch_size: DEFAULT_BATCH_SIZE,
            tile_size: DEFAULT_TILE_SIZE,
            workers: DEFAULT_WORKERS,
        }
    }
}

impl BiiOptions {
    pub fn new(country: impl Into<String>, resolution: Resolution, out_path: impl Into<PathBuf>) -> Self {
        BiiOptions {
            country: country.into(),
            resolution,
            out_path: out_path.into(),
            ..Default::default()
        }
    }

    pub fn from_json_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| BiiError::filesystem(path, e))?;
        serde_json::from_str(&text).map_err(|e| {
            BiiError::Configuration(format!("invalid options file {:?}: {}", path, e))
        })
    }

    fn validate(&self) -> Result<()> {
        if self.out_path.as_os_str().is_empty() {
            return Err(BiiError::Configuration("output path is missing".to_string()));
        }
        if self.batch_size == 0 || self.workers == 0 {
            return Err(BiiError::Configuration(
                "batch size and worker count must be at least 1".to_string(),
            ));
        }
        if self.tile_size.is_nan() || self.tile_size <= 0.0 {
            return Err(BiiError::Configuration(format!(
                "tile size must be positive, got {}",
                self.tile_size
            )));
        }
        Ok(())
    }
}

/// Which tables `extract_data` writes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExtractFlags {
    pub sum: bool,
    pub coords: bool,
    pub mean: bool,
    pub field_size: bool,
}

impl Default for ExtractFlags {
    fn default() -> Self {
        ExtractFlags {
            sum: true,
            coords: true,
            mean: true,
            field_size: false,
        }
    }
}

impl ExtractFlags {
    pub fn sum_only() -> Self {
        ExtractFlags {
            sum: true,
            coords: false,
            mean: false,
            field_size: false,
        }
    }
}

/// Covariate extraction for one country at one resolution
pub struct Bii<C = LocalCatalog, P = LocalPlatform, E = LocalExtractor> {
    catalog: C,
    platform: P,
    extractor: E,
    options: BiiOptions,
    country: CountryConfig,
}

impl Bii {
    /// Catalog under `catalog_root`, local grid services and extractor
    pub fn local(catalog_root: impl Into<PathBuf>, options: BiiOptions) -> Result<Self> {
        let platform = LocalPlatform::with_crs(options.projection.crs.clone());
        Bii::new(LocalCatalog::new(catalog_root), platform, LocalExtractor::new(), options)
    }
}

impl<C, P, E> Bii<C, P, E>
where
    C: Catalog,
    P: GridService + GeometryService,
    E: ExtractionService,
{
    /// Resolve the country and make sure its output directory exists
    pub fn new(catalog: C, platform: P, extractor: E, options: BiiOptions) -> Result<Self> {
        options.validate()?;
        let registry = CountryRegistry::build(&catalog, &options.out_path)?;
        let country = registry.get(&options.country)?.clone();

        let dir = &country.output_directory;
        if dir.is_dir() {
            tracing::info!("Directory already exists: {}", dir.display());
        } else {
            std::fs::create_dir_all(dir).map_err(|e| BiiError::filesystem(dir, e))?;
            tracing::info!("Created directory: {}", dir.display());
        }

        Ok(Bii {
            catalog,
            platform,
            extractor,
            options,
            country,
        })
    }

    pub fn country(&self) -> &CountryConfig {
        &self.country
    }

    pub fn options(&self) -> &BiiOptions {
        &self.options
    }

    pub fn output_directory(&self) -> &Path {
        &self.country.output_directory
    }

    fn table_name(&self, bundle: &LayerBundle) -> String {
        format!("{}_{}.csv", bundle.kind.file_stem(), self.options.resolution)
    }

    /// Build and extract the requested bundles; returns the written files.
    ///
    /// The grid and effective AOI are recomputed from the country boundary
    /// on every call.
    pub fn extract_data(&self, flags: ExtractFlags) -> Result<Vec<PathBuf>> {
        let opts = &self.options;
        let selection = GridSelector::new(&self.platform).select(
            opts.resolution,
            opts.aoi_mode,
            &self.country.aoi,
            &opts.projection,
        )?;

        let builder = LayerBuilder::new(&self.catalog, &self.platform);
        let dispatcher = ExtractionDispatcher::new(&self.extractor, self.output_directory())
            .with_workers(opts.workers);
        let mut written = Vec::new();

        let field_sizes = builder.build_field_size_points(&selection.source_aoi)?;

        let mut run = |bundle: LayerBundle| -> Result<()> {
            let filename = self.table_name(&bundle);
            let path = dispatcher.dispatch(
                bundle,
                &selection.grid,
                &selection.aoi,
                opts.tile_size,
                opts.batch_size,
                &filename,
            )?;
            tracing::info!("Written {}", path.display());
            written.push(path);
            Ok(())
        };

        if flags.sum {
            run(builder.build_sum_layers(&selection.aoi, &selection.source_aoi)?)?;
        }
        if flags.coords {
            run(builder.build_coord_layers(&opts.projection)?)?;
        }
        if flags.mean {
            run(builder.build_mean_layers(&selection.source_aoi)?)?;
        }

        if flags.field_size && !field_sizes.is_empty() {
            let path = self
                .output_directory()
                .join(format!("fieldSize_{}.csv", opts.resolution));
            written.push(write_field_sizes(&field_sizes, &path)?);
            tracing::info!("Written {}", path.display());
        }

        Ok(written)
    }
}
