//! Keeps a map surface in step with the timeline.
//!
//! The `MapSynchronizer` owns a `RenderSurface` and walks it through its
//! lifecycle:
//! - Uninitialized: waiting for the host element to be laid out, retried once per frame
//! - Initializing: construction issued, waiting for the style to load
//! - Ready: reconciliation passes are applied
//! - Unavailable: layout never settled within the retry limit, or construction failed
//! - Disposed: everything released, no further updates accepted
//!
//! Inputs arrive as whole `TimelineSnapshot`s. Before the map is ready only the
//! latest snapshot is kept; the first pass after readiness applies it.

use anyhow::{Result, bail};
use log::{debug, info, warn};
use std::collections::BTreeMap;

use crate::config::MapConfig;
use crate::photo::Coordinate;
use crate::surface::{
    Bounds, CameraFit, MapOptions, MarkerAnchor, MarkerContent, MarkerId, MarkerSpec,
    RenderSurface, SurfaceEvent, TrackGeometry, TrackStyle,
};

/// Lifecycle of the map surface
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MapLifecycle {
    /// Waiting for a non-zero layout; `attempts` counts zero-size measurements
    Uninitialized { attempts: u32 },
    Initializing,
    Ready,
    Unavailable,
    Disposed,
}

/// One point on the map with its own preview, if any
#[derive(Debug, Clone, PartialEq)]
pub struct TrackPoint {
    pub coordinate: Coordinate,
    pub preview: Option<String>,
}

/// Everything a reconciliation pass reads, captured at one moment
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TimelineSnapshot {
    pub points: Vec<TrackPoint>,
    pub active: Option<usize>,
}

impl TimelineSnapshot {
    pub fn track(&self) -> TrackGeometry {
        TrackGeometry {
            coordinates: self.points.iter().map(|p| p.coordinate).collect(),
        }
    }
}

/// What the synchronizer has put on the surface
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MapOverlayState {
    /// Geometry of the track source, once it exists
    pub track: Option<TrackGeometry>,
    /// Placed markers keyed by point index
    pub markers: BTreeMap<usize, MarkerId>,
    /// Bounds of the last camera fit that was started
    pub camera: Option<Bounds>,
}

pub struct MapSynchronizer<S: RenderSurface> {
    surface: S,
    options: MapOptions,
    track_style: TrackStyle,
    camera_fit: CameraFit,
    layout_retry_limit: Option<u32>,
    lifecycle: MapLifecycle,
    overlay: MapOverlayState,
    latest: TimelineSnapshot,
    applied: Option<TimelineSnapshot>,
    passes: u64,
}

impl<S: RenderSurface> MapSynchronizer<S> {
    pub fn new(surface: S, config: &MapConfig) -> Self {
        Self {
            surface,
            options: MapOptions::from(config),
            track_style: config.track_style(),
            camera_fit: config.camera_fit(),
            layout_retry_limit: config.layout_retry_limit,
            lifecycle: MapLifecycle::Uninitialized { attempts: 0 },
            overlay: MapOverlayState::default(),
            latest: TimelineSnapshot::default(),
            applied: None,
            passes: 0,
        }
    }

    pub fn lifecycle(&self) -> MapLifecycle {
        self.lifecycle
    }

    pub fn is_ready(&self) -> bool {
        self.lifecycle == MapLifecycle::Ready
    }

    /// True while construction is deferred until the next animation frame
    pub fn needs_frame(&self) -> bool {
        matches!(self.lifecycle, MapLifecycle::Uninitialized { .. })
    }

    /// True once no further lifecycle progress will happen on its own
    pub fn is_settled(&self) -> bool {
        match self.lifecycle {
            MapLifecycle::Ready => self.applied.as_ref() == Some(&self.latest),
            MapLifecycle::Unavailable | MapLifecycle::Disposed => true,
            _ => false,
        }
    }

    pub fn overlay(&self) -> &MapOverlayState {
        &self.overlay
    }

    pub fn surface(&self) -> &S {
        &self.surface
    }

    pub fn surface_mut(&mut self) -> &mut S {
        &mut self.surface
    }

    /// Number of reconciliation passes applied so far
    pub fn passes(&self) -> u64 {
        self.passes
    }

    /// Makes the first construction attempt (mount)
    pub fn start(&mut self) {
        self.try_construct();
    }

    fn try_construct(&mut self) {
        let MapLifecycle::Uninitialized { attempts } = self.lifecycle else {
            return;
        };

        let size = self.surface.measure();
        if !size.is_laid_out() {
            let attempts = attempts + 1;
            match self.layout_retry_limit {
                Some(limit) if attempts > limit => {
                    warn!("Map surface still has no size after {limit} frames; giving up");
                    self.lifecycle = MapLifecycle::Unavailable;
                }
                _ => {
                    debug!("Map surface not laid out yet (attempt {attempts}), waiting a frame");
                    self.lifecycle = MapLifecycle::Uninitialized { attempts };
                }
            }
            return;
        }

        match self.surface.construct(&self.options) {
            Ok(()) => {
                debug!("Map construction issued at {}x{}", size.width, size.height);
                self.lifecycle = MapLifecycle::Initializing;
            }
            Err(e) => {
                warn!("Map initialization failed: {:#}", e);
                self.lifecycle = MapLifecycle::Unavailable;
            }
        }
    }

    /// Feeds a surface signal in. Returns the point index when a marker was clicked.
    pub fn handle_event(&mut self, event: SurfaceEvent) -> Option<usize> {
        match event {
            SurfaceEvent::Frame => {
                self.try_construct();
                None
            }
            SurfaceEvent::StyleLoaded => {
                if self.lifecycle != MapLifecycle::Initializing {
                    debug!("Ignoring style load in state {:?}", self.lifecycle);
                    return None;
                }

                self.lifecycle = MapLifecycle::Ready;
                if let Err(e) = self.surface.attach_controls() {
                    warn!("Failed to attach map controls: {:#}", e);
                }
                info!("Map ready");

                self.reconcile();
                None
            }
            SurfaceEvent::MarkerClicked(index) => {
                if self.is_ready() && index < self.latest.points.len() {
                    Some(index)
                } else {
                    debug!("Ignoring click on marker {index}");
                    None
                }
            }
            SurfaceEvent::Error(message) => {
                warn!("Map surface error: {message}");
                None
            }
        }
    }

    /// Records the latest inputs and reconciles if the map is ready and they changed
    pub fn update(&mut self, snapshot: TimelineSnapshot) -> Result<()> {
        if self.lifecycle == MapLifecycle::Disposed {
            bail!("map surface has been disposed");
        }

        self.latest = snapshot;

        if self.is_ready() && self.applied.as_ref() != Some(&self.latest) {
            self.reconcile();
        }

        Ok(())
    }

    /// One reconciliation pass over the latest snapshot
    fn reconcile(&mut self) {
        let snapshot = self.latest.clone();

        self.sync_track(&snapshot);
        self.rebuild_markers(&snapshot);
        self.frame_camera(&snapshot);

        self.applied = Some(snapshot);
        self.passes += 1;
    }

    fn sync_track(&mut self, snapshot: &TimelineSnapshot) {
        let geometry = snapshot.track();

        if self.overlay.track.is_some() {
            match self.surface.set_track_data(&geometry) {
                Ok(()) => self.overlay.track = Some(geometry),
                Err(e) => warn!("Failed to update track source: {:#}", e),
            }
            return;
        }

        if let Err(e) = self.surface.add_track_source(&geometry) {
            warn!("Failed to add track source: {:#}", e);
            return;
        }
        self.overlay.track = Some(geometry);

        if let Err(e) = self.surface.add_track_layer(&self.track_style) {
            warn!("Failed to add track layer: {:#}", e);
        }
    }

    fn rebuild_markers(&mut self, snapshot: &TimelineSnapshot) {
        for (_, id) in std::mem::take(&mut self.overlay.markers) {
            self.surface.remove_marker(id);
        }

        let mut failures = 0;
        for (index, point) in snapshot.points.iter().enumerate() {
            let content = match &point.preview {
                Some(uri) => MarkerContent::Preview(uri.clone()),
                None => MarkerContent::Label((index + 1).to_string()),
            };
            let marker = MarkerSpec {
                index,
                coordinate: point.coordinate,
                content,
                active: snapshot.active == Some(index),
                anchor: MarkerAnchor::Bottom,
            };

            match self.surface.add_marker(&marker) {
                Ok(id) => {
                    self.overlay.markers.insert(index, id);
                }
                Err(e) => {
                    failures += 1;
                    warn!("Failed to add marker {}: {:#}", index + 1, e);
                }
            }
        }

        if failures > 0 && failures == snapshot.points.len() {
            warn!("None of the {failures} markers could be placed");
        }
    }

    fn frame_camera(&mut self, snapshot: &TimelineSnapshot) {
        let Some(bounds) = Bounds::covering(snapshot.points.iter().map(|p| &p.coordinate)) else {
            return;
        };

        match self.surface.fit_bounds(bounds, self.camera_fit) {
            Ok(()) => self.overlay.camera = Some(bounds),
            Err(e) => debug!("Camera fit failed, keeping current view: {:#}", e),
        }
    }

    /// Releases markers, the track and the surface itself
    pub fn dispose(&mut self) {
        if self.lifecycle == MapLifecycle::Disposed {
            return;
        }

        for (_, id) in std::mem::take(&mut self.overlay.markers) {
            self.surface.remove_marker(id);
        }
        if self.overlay.track.take().is_some() {
            self.surface.remove_track();
        }
        if matches!(
            self.lifecycle,
            MapLifecycle::Initializing | MapLifecycle::Ready
        ) {
            self.surface.teardown();
        }

        self.overlay = MapOverlayState::default();
        self.latest = TimelineSnapshot::default();
        self.applied = None;
        self.lifecycle = MapLifecycle::Disposed;
        debug!("Map surface disposed");
    }
}
