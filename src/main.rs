use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use log::info;
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use phototrail::config::Config;
use phototrail::exif::ExifReader;
use phototrail::extract::Extractor;
use phototrail::grouping::group_photos_by_day;
use phototrail::headless::HeadlessSurface;
use phototrail::photo::PhotoFile;
use phototrail::preview::ObjectUrlPreviews;
use phototrail::report::ScanReport;
use phototrail::session::Session;
use phototrail::surface::SurfaceSize;
use phototrail::sync::MapLifecycle;

#[derive(Parser)]
#[command(author, version, about = "Turn geotagged photos into day albums and a map track")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize with a default config file
    Init {
        /// Force overwrite existing config
        #[arg(short, long)]
        force: bool,

        /// Path to config file
        #[arg(short, long, value_name = "FILE")]
        config: Option<PathBuf>,
    },

    /// Extract metadata and print the day albums
    Scan {
        /// Path to config file
        #[arg(short, long, value_name = "FILE")]
        config: Option<PathBuf>,

        /// Print JSON instead of YAML
        #[arg(long)]
        json: bool,

        /// Photos to read
        #[arg(required = true, value_name = "PHOTO")]
        files: Vec<PathBuf>,
    },

    /// Render the photo track and markers to GeoJSON
    Map {
        /// Path to config file
        #[arg(short, long, value_name = "FILE")]
        config: Option<PathBuf>,

        /// Output file (defaults to `overlay_file` from the config)
        #[arg(short, long, value_name = "FILE")]
        out: Option<PathBuf>,

        /// Photos to read
        #[arg(required = true, value_name = "PHOTO")]
        files: Vec<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Init { force, config } => init_config(&config, force),
        Commands::Scan {
            config,
            json,
            files,
        } => {
            let config_data = load_config(&config)?;
            scan(config_data, files, json).await
        }
        Commands::Map { config, out, files } => {
            let config_data = load_config(&config)?;
            render_map(config_data, files, out).await
        }
    }
}

fn init_config(config_path_opt: &Option<PathBuf>, force: bool) -> Result<()> {
    let config_path = Config::get_config_path(config_path_opt);

    if config_path.exists() && !force {
        println!("Config file already exists at {}", config_path.display());
        println!("Use --force to overwrite");
        return Ok(());
    }

    let config = Config::default();
    config
        .save_to_file(&config_path)
        .with_context(|| format!("Failed to write config to {}", config_path.display()))?;

    println!("Created config file at {}", config_path.display());
    Ok(())
}

/// An explicit `--config` must exist; the default location falls back to defaults
fn load_config(config_path_opt: &Option<PathBuf>) -> Result<Config> {
    let config_path = Config::get_config_path(config_path_opt);

    if config_path_opt.is_some() && !config_path.exists() {
        anyhow::bail!(
            "Config file not found at {}. Run 'phototrail init' to create one.",
            config_path.display()
        );
    }

    Config::load_or_default(&config_path)
}

async fn scan(config: Config, files: Vec<PathBuf>, json: bool) -> Result<()> {
    let extractor = Extractor::new(Arc::new(ExifReader), config.concurrency);
    let result = extractor
        .parse_files(files.into_iter().map(PhotoFile::new).collect())
        .await;

    let albums = group_photos_by_day(&result.points);
    let report = ScanReport::build(&result, &albums, &config.day_title_format);

    let rendered = if json {
        report.to_json()?
    } else {
        report.to_yaml()?
    };
    println!("{}", rendered);

    Ok(())
}

async fn render_map(config: Config, files: Vec<PathBuf>, out: Option<PathBuf>) -> Result<()> {
    let out_path = out.unwrap_or_else(|| PathBuf::from(&config.overlay_file));
    let title_format = config.day_title_format.clone();
    let size = SurfaceSize::new(config.map.surface_width, config.map.surface_height);

    let previews = Arc::new(ObjectUrlPreviews::new());
    let mut session = Session::new(config, Arc::new(ExifReader), previews, |handle| {
        HeadlessSurface::new(size).with_events(handle)
    });

    session.submit_files(files.into_iter().map(PhotoFile::new).collect());
    session.run_until_idle().await;

    if session.map().lifecycle() != MapLifecycle::Ready {
        anyhow::bail!("Map surface is unavailable ({:?})", session.map().lifecycle());
    }

    let timeline = session.timeline();
    println!(
        "Mapped {} photos across {} days ({} skipped)",
        timeline.len(),
        timeline.albums().len(),
        timeline.skipped().len()
    );
    for album in timeline.albums() {
        println!(
            "  {} - {}",
            album.title_with(&title_format),
            album.photo_count_label()
        );
    }
    for skip in timeline.skipped() {
        println!("  Skipped {}: {}", skip.file.name(), skip.reason);
    }

    let geojson = session.map().surface().to_geojson();
    let body = serde_json::to_string_pretty(&geojson)?;
    if let Some(parent) = out_path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    fs::write(&out_path, body)
        .with_context(|| format!("Failed to write overlay to {}", out_path.display()))?;

    info!("Overlay has {} markers", session.map().overlay().markers.len());
    println!("Wrote overlay to {}", out_path.display());

    session.dispose();
    Ok(())
}
