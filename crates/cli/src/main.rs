//! Rainband CLI - precipitation band extraction

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use rainband_algorithms::classify::{reclassify, ClassTable};
use rainband_algorithms::measure::{class_areas, AreaUnit};
use rainband_algorithms::pipeline::{run_with_progress, PipelineConfig, PipelineReport};
use rainband_algorithms::projection::Resampling;
use rainband_core::io::{read_geotiff, ExportPolicy, WriteOutcome};
use rainband_core::Raster;

// ─── CLI structure ──────────────────────────────────────────────────────

#[derive(Parser)]
#[command(name = "rainband")]
#[command(
    author,
    version,
    about = "Extract precipitation bands from gridded rainfall",
    long_about = None
)]
struct Cli {
    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show information about a raster file
    Info {
        /// Input raster file
        input: PathBuf,
    },
    /// Classify a projected raster and print the area of every class
    Classes {
        /// Input raster file (linear CRS units)
        input: PathBuf,
        /// Class table as min:max:code,...
        #[arg(long, default_value = "0:200:1,200:400:2,400:5000:3")]
        classes: ClassTable,
        /// Area units: m2, km2, ha, acres, mi2
        #[arg(short, long, value_delimiter = ',', default_value = "km2")]
        units: Vec<AreaUnit>,
    },
    /// Crop, reproject, classify, measure and polygonize in one run
    Run(RunArgs),
}

/// Flags left unset fall back to the config file, then to the study defaults
#[derive(Args)]
struct RunArgs {
    /// JSON pipeline config
    #[arg(short, long)]
    config: Option<PathBuf>,
    /// Input precipitation GeoTIFF
    #[arg(short, long)]
    raster: Option<PathBuf>,
    /// Boundary GeoJSON
    #[arg(short, long)]
    boundary: Option<PathBuf>,
    /// Output GeoTIFF for the reprojected, cropped raster
    #[arg(short, long)]
    output_raster: Option<PathBuf>,
    /// Output GeoJSON for the band polygons
    #[arg(long)]
    output_vector: Option<PathBuf>,
    /// Also write the classified raster here
    #[arg(long)]
    classified_output: Option<PathBuf>,
    /// Target CRS, e.g. EPSG:5070 [default: EPSG:5070]
    #[arg(short, long)]
    target_crs: Option<String>,
    /// Target cell size in target CRS units [default: 4000]
    #[arg(long)]
    resolution: Option<f64>,
    /// Resampling: nearest, bilinear [default: bilinear]
    #[arg(long)]
    resampling: Option<Resampling>,
    /// Class table as min:max:code,... [default: 0:200:1,200:400:2,400:5000:3]
    #[arg(long)]
    classes: Option<ClassTable>,
    /// Code of the band to measure and polygonize [default: 2]
    #[arg(long)]
    band_code: Option<i32>,
    /// Label for the band polygons [default: 200-400mm]
    #[arg(long)]
    label: Option<String>,
    /// Area units: m2, km2, ha, acres, mi2 [default: km2]
    #[arg(short, long, value_delimiter = ',')]
    units: Option<Vec<AreaUnit>>,
    /// Existing outputs: skip, overwrite, error [default: skip]
    #[arg(short, long)]
    policy: Option<ExportPolicy>,
    /// Write a JSON run report here
    #[arg(long)]
    report: Option<PathBuf>,
}

impl RunArgs {
    fn into_config(self) -> Result<(PipelineConfig, Option<PathBuf>)> {
        let mut config = match &self.config {
            Some(path) => PipelineConfig::from_json_file(path)
                .with_context(|| format!("Failed to load config {}", path.display()))?,
            None => PipelineConfig::default(),
        };

        if let Some(v) = self.raster {
            config.raster = v;
        }
        if let Some(v) = self.boundary {
            config.boundary = v;
        }
        if let Some(v) = self.output_raster {
            config.output_raster = v;
        }
        if let Some(v) = self.output_vector {
            config.output_vector = v;
        }
        if self.classified_output.is_some() {
            config.classified_output = self.classified_output;
        }
        if let Some(v) = self.target_crs {
            config.target_crs = v;
        }
        if let Some(v) = self.resolution {
            config.resolution = v;
        }
        if let Some(v) = self.resampling {
            config.resampling = v;
        }
        if let Some(v) = self.classes {
            config.classes = v;
        }
        if let Some(v) = self.band_code {
            config.band_code = v;
        }
        if let Some(v) = self.label {
            config.band_label = v;
        }
        if let Some(v) = self.units {
            config.area_units = v;
        }
        if let Some(v) = self.policy {
            config.policy = v;
        }

        Ok((config, self.report))
    }
}

// ─── Helpers ────────────────────────────────────────────────────────────

fn setup_logging(verbose: bool) -> Result<()> {
    let level = if verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber).context("Failed to install log subscriber")
}

fn spinner(msg: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.green} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    pb.set_message(msg.to_string());
    pb.enable_steady_tick(std::time::Duration::from_millis(100));
    pb
}

fn read_raster(path: &Path) -> Result<Raster<f64>> {
    let pb = spinner("Reading raster...");
    let raster: Raster<f64> = read_geotiff(path).context("Failed to read raster")?;
    pb.finish_and_clear();
    info!("Input: {} x {}", raster.cols(), raster.rows());
    Ok(raster)
}

fn outcome(path: &Path, outcome: WriteOutcome) {
    match outcome {
        WriteOutcome::Written => println!("  {} written", path.display()),
        WriteOutcome::Skipped => println!("  {} exists, skipped", path.display()),
    }
}

fn print_report(config: &PipelineConfig, report: &PipelineReport, elapsed: std::time::Duration) {
    println!(
        "Band {} ({}) in {} at {}:",
        report.band_code, report.band_label, report.target_crs, report.resolution
    );
    println!("  Cells: {}", report.band_cells);
    for unit in &config.area_units {
        if let Some(value) = report.band_area.get(unit.symbol()) {
            println!("  Area: {:.3} {}", value, unit);
        }
    }
    println!("  Polygons: {}", report.polygons);

    println!("\nOutputs:");
    outcome(&config.output_raster, report.raster_output);
    outcome(&config.output_vector, report.vector_output);
    if let (Some(path), Some(o)) = (&config.classified_output, report.classified_output) {
        outcome(path, o);
    }
    println!("  Processing time: {:.2?}", elapsed);
}

// ─── Main ───────────────────────────────────────────────────────────────

fn main() -> Result<()> {
    let cli = Cli::parse();
    setup_logging(cli.verbose)?;

    match cli.command {
        Commands::Info { input } => {
            let raster = read_raster(&input)?;
            let (rows, cols) = raster.shape();
            let bounds = raster.bounds();
            let (res_x, res_y) = raster.resolution();
            let stats = raster.statistics();

            println!("File: {}", input.display());
            println!("Dimensions: {} x {} ({} cells)", cols, rows, raster.len());
            println!("Resolution: {} x {}", res_x, res_y);
            println!(
                "Bounds: ({:.6}, {:.6}) - ({:.6}, {:.6})",
                bounds.0, bounds.1, bounds.2, bounds.3
            );
            match raster.crs() {
                Some(crs) => match crs.unit() {
                    Some(unit) => println!("CRS: {} ({:?})", crs, unit),
                    None => println!("CRS: {}", crs),
                },
                None => println!("CRS: none"),
            }
            if let Some(nodata) = raster.nodata() {
                println!("NoData: {}", nodata);
            }
            println!("\nStatistics:");
            if let Some(min) = stats.min {
                println!("  Min: {:.4}", min);
            }
            if let Some(max) = stats.max {
                println!("  Max: {:.4}", max);
            }
            if let Some(mean) = stats.mean {
                println!("  Mean: {:.4}", mean);
            }
            println!(
                "  Valid cells: {} ({:.1}%)",
                stats.valid_count,
                100.0 * stats.valid_count as f64 / raster.len().max(1) as f64
            );
        }

        Commands::Classes { input, classes, units } => {
            let raster = read_raster(&input)?;
            let start = Instant::now();
            let classified = reclassify(&raster, &classes).context("Classification failed")?;
            let areas = class_areas(&classified).context("Area calculation failed")?;

            println!("Classes of {} ({}):", input.display(), classes);
            for class in &areas {
                let values: Vec<String> = units
                    .iter()
                    .map(|u| format!("{:.3} {}", class.area.to(*u), u))
                    .collect();
                println!("  {:>4}: {:>8} cells  {}", class.code, class.cells, values.join("  "));
            }
            println!("  Processing time: {:.2?}", start.elapsed());
        }

        Commands::Run(args) => {
            let (config, report_path) = args.into_config()?;
            let start = Instant::now();

            let pb = spinner("Starting...");
            let result =
                run_with_progress(&config, |stage| pb.set_message(format!("{}...", stage)));
            pb.finish_and_clear();
            let report = result.context("Pipeline failed")?;

            print_report(&config, &report, start.elapsed());

            if let Some(path) = report_path {
                let json =
                    serde_json::to_string_pretty(&report).context("Failed to encode report")?;
                fs::write(&path, json)
                    .with_context(|| format!("Failed to write report {}", path.display()))?;
                println!("Report saved to: {}", path.display());
            }
        }
    }

    Ok(())
}
