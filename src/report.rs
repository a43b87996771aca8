//! Serializable summary of an extraction batch, printed by `phototrail scan`.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::grouping::DayAlbum;
use crate::photo::{ParseResult, SkipReason};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScanReport {
    pub accepted: usize,
    pub skipped: usize,
    pub days: Vec<DayReport>,
    pub skipped_files: Vec<SkippedReport>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DayReport {
    /// `YYYY-MM-DD`
    pub day: String,
    pub title: String,
    pub count: String,
    pub photos: Vec<PointReport>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PointReport {
    /// Position in the whole track
    pub index: usize,
    pub name: String,
    pub path: String,
    pub captured_at: DateTime<Utc>,
    pub longitude: f64,
    pub latitude: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SkippedReport {
    pub name: String,
    pub path: String,
    pub reason: SkipReason,
    pub message: String,
}

impl ScanReport {
    /// Builds a report from a batch result and the albums grouped from it
    pub fn build(result: &ParseResult, albums: &[DayAlbum], title_format: &str) -> Self {
        let mut index = 0;
        let days = albums
            .iter()
            .map(|album| DayReport {
                day: album.day_key(),
                title: album.title_with(title_format),
                count: album.photo_count_label(),
                photos: album
                    .photos
                    .iter()
                    .map(|photo| {
                        let point = PointReport {
                            index,
                            name: photo.name.clone(),
                            path: photo.file.path().display().to_string(),
                            captured_at: photo.captured_at,
                            longitude: photo.coordinate.longitude,
                            latitude: photo.coordinate.latitude,
                        };
                        index += 1;
                        point
                    })
                    .collect(),
            })
            .collect();

        let skipped_files = result
            .skipped
            .iter()
            .map(|skip| SkippedReport {
                name: skip.file.name().to_string(),
                path: skip.file.path().display().to_string(),
                reason: skip.reason,
                message: skip.reason.to_string(),
            })
            .collect();

        Self {
            accepted: result.points.len(),
            skipped: result.skipped.len(),
            days,
            skipped_files,
        }
    }

    pub fn to_yaml(&self) -> Result<String> {
        serde_yaml::to_string(self).context("Failed to render report as YAML")
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).context("Failed to render report as JSON")
    }
}
