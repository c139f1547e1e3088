//! biicov CLI - per-grid-cell covariate tables for sub-Saharan countries

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use biicov::collect::catalog::LocalCatalog;
use biicov::collect::country::CountryRegistry;
use biicov::collect::global_variables::{get_catalog_path, get_output_path};
use biicov::geo_core::Projection;
use biicov::geometric::grid::{AoiMode, Resolution};
use biicov::{Bii, BiiOptions, ExtractFlags};

#[derive(Parser)]
#[command(name = "biicov")]
#[command(author, version, about = "Covariate extraction for biodiversity intactness modelling", long_about = None)]
struct Cli {
    /// Debug output (overridden by RUST_LOG)
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Catalog root directory
    #[arg(long, global = true)]
    catalog: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Extract covariate tables for one country
    Extract {
        /// JSON options file; flags below override it
        #[arg(long)]
        config: Option<PathBuf>,
        /// Country name as listed by `countries`
        #[arg(long)]
        country: Option<String>,
        /// Grid resolution: 8km or 1km
        #[arg(long)]
        resolution: Option<Resolution>,
        /// Area of interest: country or grid
        #[arg(long)]
        aoi_mode: Option<AoiMode>,
        /// Base output directory
        #[arg(long)]
        out_path: Option<PathBuf>,
        /// Working CRS, e.g. ESRI:102022
        #[arg(long)]
        crs: Option<String>,
        #[arg(long)]
        batch_size: Option<usize>,
        #[arg(long)]
        tile_size: Option<f64>,
        #[arg(long)]
        workers: Option<usize>,
        /// Skip the area-sum table
        #[arg(long)]
        no_sum: bool,
        /// Skip the coordinate table
        #[arg(long)]
        no_coords: bool,
        /// Skip the mean covariate table
        #[arg(long)]
        no_mean: bool,
        /// Also write field size survey points
        #[arg(long)]
        field_size: bool,
    },
    /// List the countries that can be extracted
    Countries,
}

fn setup_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    setup_logging(cli.verbose);
    let catalog_root = cli.catalog.unwrap_or_else(get_catalog_path);

    match cli.command {
        Commands::Countries => {
            let catalog = LocalCatalog::new(&catalog_root);
            let registry = CountryRegistry::build(&catalog, &get_output_path())
                .with_context(|| format!("Failed to read boundaries from {:?}", catalog_root))?;
            for name in registry.names() {
                println!("{}", name);
            }
        }

        Commands::Extract {
            config,
            country,
            resolution,
            aoi_mode,
            out_path,
            crs,
            batch_size,
            tile_size,
            workers,
            no_sum,
            no_coords,
            no_mean,
            field_size,
        } => {
            let mut options = match config {
                Some(path) => BiiOptions::from_json_file(&path)
                    .with_context(|| format!("Failed to load options from {:?}", path))?,
                None => BiiOptions::default(),
            };
            if let Some(country) = country {
                options.country = country;
            }
            if let Some(resolution) = resolution {
                options.resolution = resolution;
            }
            if let Some(aoi_mode) = aoi_mode {
                options.aoi_mode = aoi_mode;
            }
            if let Some(out_path) = out_path {
                options.out_path = out_path;
            }
            if let Some(crs) = crs {
                options.projection = Projection::new(crs);
            }
            if let Some(batch_size) = batch_size {
                options.batch_size = batch_size;
            }
            if let Some(tile_size) = tile_size {
                options.tile_size = tile_size;
            }
            if let Some(workers) = workers {
                options.workers = workers;
            }

            let flags = ExtractFlags {
                sum: !no_sum,
                coords: !no_coords,
                mean: !no_mean,
                field_size,
            };

            let country = options.country.clone();
            let bii = Bii::local(&catalog_root, options)
                .with_context(|| format!("Failed to prepare extraction for {}", country))?;
            let written = bii
                .extract_data(flags)
                .with_context(|| format!("Extraction failed for {}", country))?;
            for path in written {
                println!("{}", path.display());
            }
        }
    }

    Ok(())
}
