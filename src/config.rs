use anyhow::{Context, Result, bail};
use chrono::format::{Item, StrftimeItems};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::grouping::DEFAULT_TITLE_FORMAT;
use crate::surface::{CameraFit, TrackStyle};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Maximum number of files read at once
    pub concurrency: usize,
    /// strftime pattern for day album titles
    pub day_title_format: String,
    /// Where `phototrail map` writes the rendered overlay
    pub overlay_file: String,
    pub map: MapConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MapConfig {
    pub tile_url: String,
    pub tile_size: u32,
    pub min_zoom: f64,
    pub max_zoom: f64,
    /// [longitude, latitude]
    pub center: [f64; 2],
    pub zoom: f64,
    pub fit_padding: u32,
    pub fit_duration_ms: u64,
    /// Frames to wait for a non-zero layout before giving up; `null` waits forever
    pub layout_retry_limit: Option<u32>,
    pub frame_interval_ms: u64,
    pub track_color: String,
    pub track_width: f64,
    /// Size reported by the headless surface
    pub surface_width: u32,
    pub surface_height: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            concurrency: 8,
            day_title_format: DEFAULT_TITLE_FORMAT.to_string(),
            overlay_file: "timeline.geojson".to_string(),
            map: MapConfig::default(),
        }
    }
}

impl Default for MapConfig {
    fn default() -> Self {
        Self {
            tile_url: "https://tile.openstreetmap.org/{z}/{x}/{y}.png".to_string(),
            tile_size: 256,
            min_zoom: 0.0,
            max_zoom: 19.0,
            center: [0.0, 0.0],
            zoom: 1.5,
            fit_padding: 80,
            fit_duration_ms: 600,
            layout_retry_limit: Some(600),
            frame_interval_ms: 16,
            track_color: "#1976d2".to_string(),
            track_width: 3.0,
            surface_width: 1280,
            surface_height: 800,
        }
    }
}

impl MapConfig {
    pub fn camera_fit(&self) -> CameraFit {
        CameraFit {
            padding: self.fit_padding,
            duration: Duration::from_millis(self.fit_duration_ms),
        }
    }

    pub fn track_style(&self) -> TrackStyle {
        TrackStyle {
            color: self.track_color.clone(),
            width: self.track_width,
        }
    }

    pub fn frame_interval(&self) -> Duration {
        Duration::from_millis(self.frame_interval_ms.max(1))
    }
}

impl Config {
    pub fn save_to_file(&self, path: &Path) -> Result<()> {
        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let yaml = serde_yaml::to_string(self)?;
        fs::write(path, yaml)?;

        Ok(())
    }

    pub fn load_from_file(path: &Path) -> Result<Self> {
        let yaml = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config from {}", path.display()))?;

        let config: Config = serde_yaml::from_str(&yaml)
            .with_context(|| format!("Failed to parse config from {}", path.display()))?;

        config
            .validate()
            .with_context(|| format!("Invalid config in {}", path.display()))?;

        Ok(config)
    }

    /// Rejects values that would only fail later, while rendering
    pub fn validate(&self) -> Result<()> {
        if StrftimeItems::new(&self.day_title_format).any(|item| matches!(item, Item::Error)) {
            bail!(
                "day_title_format '{}' is not a valid strftime pattern",
                self.day_title_format
            );
        }
        Ok(())
    }

    /// Loads the config if it exists, otherwise falls back to defaults
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::load_from_file(path)
        } else {
            Ok(Self::default())
        }
    }

    pub fn get_config_path(config_arg: &Option<PathBuf>) -> PathBuf {
        config_arg
            .clone()
            .unwrap_or_else(|| PathBuf::from("phototrail.yaml"))
    }
}
