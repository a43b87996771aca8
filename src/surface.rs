//! The rendering surface the map synchronizer drives.
//!
//! A `RenderSurface` is whatever actually draws tiles, the track line and the
//! photo markers. The synchronizer never assumes it is ready synchronously:
//! readiness, marker clicks and animation frames arrive later as `SurfaceEvent`s.

use anyhow::Result;
use serde::Serialize;
use std::time::Duration;

use crate::config::MapConfig;
use crate::photo::Coordinate;

/// Measured size of the surface in pixels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SurfaceSize {
    pub width: u32,
    pub height: u32,
}

impl SurfaceSize {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// A surface that has not been laid out yet measures zero in some dimension
    pub fn is_laid_out(&self) -> bool {
        self.width > 0 && self.height > 0
    }
}

/// Construction options for the map
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MapOptions {
    pub tile_url: String,
    pub tile_size: u32,
    pub min_zoom: f64,
    pub max_zoom: f64,
    pub center: Coordinate,
    pub zoom: f64,
}

impl From<&MapConfig> for MapOptions {
    fn from(config: &MapConfig) -> Self {
        Self {
            tile_url: config.tile_url.clone(),
            tile_size: config.tile_size,
            min_zoom: config.min_zoom,
            max_zoom: config.max_zoom,
            center: Coordinate {
                longitude: config.center[0],
                latitude: config.center[1],
            },
            zoom: config.zoom,
        }
    }
}

/// Paint for the track line
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrackStyle {
    pub color: String,
    pub width: f64,
}

/// Ordered path through every point; empty is a valid (degenerate) track
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TrackGeometry {
    pub coordinates: Vec<Coordinate>,
}

impl TrackGeometry {
    pub fn is_empty(&self) -> bool {
        self.coordinates.is_empty()
    }
}

/// Bounding box as west/south/east/north
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Bounds {
    pub west: f64,
    pub south: f64,
    pub east: f64,
    pub north: f64,
}

impl Bounds {
    /// Smallest box covering every coordinate; `None` when there are none
    pub fn covering<'a>(coordinates: impl IntoIterator<Item = &'a Coordinate>) -> Option<Self> {
        coordinates.into_iter().fold(None, |bounds, c| {
            Some(match bounds {
                None => Bounds {
                    west: c.longitude,
                    south: c.latitude,
                    east: c.longitude,
                    north: c.latitude,
                },
                Some(b) => Bounds {
                    west: b.west.min(c.longitude),
                    south: b.south.min(c.latitude),
                    east: b.east.max(c.longitude),
                    north: b.north.max(c.latitude),
                },
            })
        })
    }
}

/// Camera animation settings for fitting bounds
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CameraFit {
    pub padding: u32,
    pub duration: Duration,
}

/// What a marker shows
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum MarkerContent {
    /// URI of the photo's preview handle
    Preview(String),
    /// 1-based position in the timeline
    Label(String),
}

/// Where the marker element is pinned relative to its coordinate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MarkerAnchor {
    Center,
    Bottom,
}

/// One clickable photo marker
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MarkerSpec {
    /// Position in the point sequence; reported back on click
    pub index: usize,
    pub coordinate: Coordinate,
    pub content: MarkerContent,
    pub active: bool,
    pub anchor: MarkerAnchor,
}

/// Identifier a surface hands out for a placed marker
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct MarkerId(pub u64);

/// Signals a surface delivers asynchronously
#[derive(Debug, Clone, PartialEq)]
pub enum SurfaceEvent {
    /// Next animation frame
    Frame,
    /// The map style finished loading; the surface is usable
    StyleLoaded,
    /// A marker was clicked
    MarkerClicked(usize),
    /// Internal surface error, reported for logging only
    Error(String),
}

/// Operations the synchronizer needs from a map renderer
pub trait RenderSurface {
    /// Current laid-out size of the host element
    fn measure(&self) -> SurfaceSize;

    /// Starts building the map. Completion is signalled by `SurfaceEvent::StyleLoaded`.
    fn construct(&mut self, options: &MapOptions) -> Result<()>;

    /// Adds zoom controls once the map is ready
    fn attach_controls(&mut self) -> Result<()>;

    fn add_track_source(&mut self, geometry: &TrackGeometry) -> Result<()>;

    fn add_track_layer(&mut self, style: &TrackStyle) -> Result<()>;

    /// Replaces the track geometry in place
    fn set_track_data(&mut self, geometry: &TrackGeometry) -> Result<()>;

    fn remove_track(&mut self);

    fn add_marker(&mut self, marker: &MarkerSpec) -> Result<MarkerId>;

    fn remove_marker(&mut self, id: MarkerId);

    /// Starts a camera animation; not awaited
    fn fit_bounds(&mut self, bounds: Bounds, fit: CameraFit) -> Result<()>;

    /// Destroys the map and everything it owns
    fn teardown(&mut self);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bounds_covering() {
        let coords = vec![
            Coordinate::new(2.35, 48.85).unwrap(),
            Coordinate::new(-0.12, 51.5).unwrap(),
            Coordinate::new(4.9, 52.37).unwrap(),
        ];

        let bounds = Bounds::covering(&coords).unwrap();
        assert_eq!(bounds.west, -0.12);
        assert_eq!(bounds.east, 4.9);
        assert_eq!(bounds.south, 48.85);
        assert_eq!(bounds.north, 52.37);
    }

    #[test]
    fn test_bounds_of_nothing() {
        assert_eq!(Bounds::covering(&Vec::<Coordinate>::new()), None);
    }

    #[test]
    fn test_surface_size() {
        assert!(!SurfaceSize::new(0, 600).is_laid_out());
        assert!(!SurfaceSize::default().is_laid_out());
        assert!(SurfaceSize::new(800, 600).is_laid_out());
    }
}
