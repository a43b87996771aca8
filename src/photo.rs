//! Photo records produced by metadata extraction.
//!
//! A `PhotoFile` is a cheap, shared handle to a file on disk. Extraction turns
//! each handle into either a `GeotaggedPhoto` (both a coordinate and a capture
//! time were resolved) or a `SkippedFile` carrying the reason it was rejected.

use chrono::{DateTime, Utc};
use serde::{Serialize, Serializer};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Opaque handle to an uploaded photo. Cloning shares the handle, never the bytes.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PhotoFile {
    path: Arc<Path>,
    name: Arc<str>,
}

impl PhotoFile {
    /// Creates a handle for the file at `path`, using its file name for display
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path: PathBuf = path.into();
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| path.display().to_string());

        Self {
            path: Arc::from(path),
            name: Arc::from(name),
        }
    }

    /// Creates a handle with an explicit display name
    pub fn with_name(path: impl Into<PathBuf>, name: &str) -> Self {
        let path: PathBuf = path.into();
        Self {
            path: Arc::from(path),
            name: Arc::from(name),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl Serialize for PhotoFile {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.path.display().to_string())
    }
}

/// A (longitude, latitude) pair in decimal degrees
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Coordinate {
    pub longitude: f64,
    pub latitude: f64,
}

impl Coordinate {
    /// Returns `None` unless both values are finite and within WGS84 ranges
    pub fn new(longitude: f64, latitude: f64) -> Option<Self> {
        let valid = longitude.is_finite()
            && latitude.is_finite()
            && (-180.0..=180.0).contains(&longitude)
            && (-90.0..=90.0).contains(&latitude);

        valid.then_some(Self {
            longitude,
            latitude,
        })
    }

    /// GeoJSON position order
    pub fn to_lng_lat(self) -> [f64; 2] {
        [self.longitude, self.latitude]
    }
}

/// A photo with both a capture time and a GPS position
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GeotaggedPhoto {
    pub file: PhotoFile,
    /// Original filename, for display only
    pub name: String,
    pub captured_at: DateTime<Utc>,
    pub coordinate: Coordinate,
}

impl GeotaggedPhoto {
    pub fn new(file: PhotoFile, captured_at: DateTime<Utc>, coordinate: Coordinate) -> Self {
        Self {
            name: file.name().to_string(),
            file,
            captured_at,
            coordinate,
        }
    }
}

/// Why a file was left out of the timeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// The metadata container could not be opened or parsed
    Unreadable,
    /// No coordinate, or no timestamp candidate at all
    MissingGpsOrTimestamp,
    /// A timestamp was present but does not describe a real point in time
    InvalidTimestamp,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let reason = match self {
            SkipReason::Unreadable => "failed to read metadata",
            SkipReason::MissingGpsOrTimestamp => "missing GPS or timestamp",
            SkipReason::InvalidTimestamp => "invalid timestamp",
        };
        f.write_str(reason)
    }
}

/// A file that failed extraction
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SkippedFile {
    pub file: PhotoFile,
    pub reason: SkipReason,
}

/// Output of one extraction batch
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ParseResult {
    /// Accepted photos, ascending by capture time
    pub points: Vec<GeotaggedPhoto>,
    pub skipped: Vec<SkippedFile>,
}

impl ParseResult {
    pub fn is_empty(&self) -> bool {
        self.points.is_empty() && self.skipped.is_empty()
    }
}
