//! In-memory map surface.
//!
//! `HeadlessSurface` keeps the track, markers and camera it is given instead of
//! drawing them, and signals readiness through the session's event channel
//! just like a real renderer would. `to_geojson` exports what is on the map.

use anyhow::{Result, anyhow, bail};
use log::debug;
use serde_json::{Value, json};
use std::collections::BTreeMap;

use crate::session::SessionHandle;
use crate::surface::{
    Bounds, CameraFit, MapOptions, MarkerContent, MarkerId, MarkerSpec, RenderSurface,
    SurfaceEvent, SurfaceSize, TrackGeometry, TrackStyle,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stage {
    Blank,
    Constructed,
    TornDown,
}

pub struct HeadlessSurface {
    size: SurfaceSize,
    events: Option<SessionHandle>,
    stage: Stage,
    options: Option<MapOptions>,
    controls: bool,
    track: Option<TrackGeometry>,
    track_style: Option<TrackStyle>,
    markers: BTreeMap<MarkerId, MarkerSpec>,
    camera: Option<Bounds>,
    next_id: u64,
}

impl HeadlessSurface {
    pub fn new(size: SurfaceSize) -> Self {
        Self {
            size,
            events: None,
            stage: Stage::Blank,
            options: None,
            controls: false,
            track: None,
            track_style: None,
            markers: BTreeMap::new(),
            camera: None,
            next_id: 0,
        }
    }

    /// Delivers readiness and clicks to `events`
    pub fn with_events(mut self, events: SessionHandle) -> Self {
        self.events = Some(events);
        self
    }

    /// Simulates the host element being laid out (or collapsed)
    pub fn resize(&mut self, size: SurfaceSize) {
        self.size = size;
    }

    pub fn is_constructed(&self) -> bool {
        self.stage == Stage::Constructed
    }

    pub fn is_torn_down(&self) -> bool {
        self.stage == Stage::TornDown
    }

    pub fn has_controls(&self) -> bool {
        self.controls
    }

    pub fn options(&self) -> Option<&MapOptions> {
        self.options.as_ref()
    }

    pub fn track(&self) -> Option<&TrackGeometry> {
        self.track.as_ref()
    }

    pub fn camera(&self) -> Option<Bounds> {
        self.camera
    }

    /// Markers currently placed, ordered by point index
    pub fn markers(&self) -> Vec<&MarkerSpec> {
        let mut markers: Vec<_> = self.markers.values().collect();
        markers.sort_by_key(|m| m.index);
        markers
    }

    /// Index of the highlighted marker, if any
    pub fn active_marker(&self) -> Option<usize> {
        self.markers.values().find(|m| m.active).map(|m| m.index)
    }

    /// Clicks the marker for point `index`
    pub fn click(&self, index: usize) -> Result<()> {
        if !self.markers.values().any(|m| m.index == index) {
            bail!("no marker for point {}", index);
        }
        self.emit(SurfaceEvent::MarkerClicked(index))
    }

    fn emit(&self, event: SurfaceEvent) -> Result<()> {
        let events = self
            .events
            .as_ref()
            .ok_or_else(|| anyhow!("surface has no event channel"))?;
        events.surface_event(event)
    }

    fn ensure_constructed(&self) -> Result<()> {
        match self.stage {
            Stage::Constructed => Ok(()),
            Stage::Blank => bail!("map has not been constructed"),
            Stage::TornDown => bail!("map has been torn down"),
        }
    }

    /// The rendered overlay as a GeoJSON FeatureCollection
    pub fn to_geojson(&self) -> Value {
        let mut features = Vec::new();

        if let Some(track) = &self.track {
            let coordinates: Vec<_> = track.coordinates.iter().map(|c| c.to_lng_lat()).collect();
            let (color, width) = match &self.track_style {
                Some(style) => (json!(style.color), json!(style.width)),
                None => (Value::Null, Value::Null),
            };
            features.push(json!({
                "type": "Feature",
                "geometry": { "type": "LineString", "coordinates": coordinates },
                "properties": { "kind": "track", "color": color, "width": width },
            }));
        }

        for marker in self.markers() {
            let (preview, label) = match &marker.content {
                MarkerContent::Preview(uri) => (json!(uri), Value::Null),
                MarkerContent::Label(text) => (Value::Null, json!(text)),
            };
            features.push(json!({
                "type": "Feature",
                "geometry": { "type": "Point", "coordinates": marker.coordinate.to_lng_lat() },
                "properties": {
                    "kind": "marker",
                    "index": marker.index,
                    "number": marker.index + 1,
                    "active": marker.active,
                    "anchor": marker.anchor,
                    "preview": preview,
                    "label": label,
                },
            }));
        }

        let mut collection = json!({
            "type": "FeatureCollection",
            "features": features,
        });
        if let Some(b) = self.camera {
            collection["bbox"] = json!([b.west, b.south, b.east, b.north]);
        }
        collection
    }
}

impl RenderSurface for HeadlessSurface {
    fn measure(&self) -> SurfaceSize {
        self.size
    }

    fn construct(&mut self, options: &MapOptions) -> Result<()> {
        match self.stage {
            Stage::Blank => {}
            Stage::Constructed => bail!("map already constructed"),
            Stage::TornDown => bail!("map has been torn down"),
        }

        self.options = Some(options.clone());
        self.stage = Stage::Constructed;
        debug!("Headless map constructed with tiles from {}", options.tile_url);

        // Style loading finishes "later", on the session's next turn
        self.emit(SurfaceEvent::StyleLoaded)
    }

    fn attach_controls(&mut self) -> Result<()> {
        self.ensure_constructed()?;
        self.controls = true;
        Ok(())
    }

    fn add_track_source(&mut self, geometry: &TrackGeometry) -> Result<()> {
        self.ensure_constructed()?;
        if self.track.is_some() {
            bail!("track source already exists");
        }
        self.track = Some(geometry.clone());
        Ok(())
    }

    fn add_track_layer(&mut self, style: &TrackStyle) -> Result<()> {
        self.ensure_constructed()?;
        if self.track.is_none() {
            bail!("track layer needs a track source");
        }
        if self.track_style.is_some() {
            bail!("track layer already exists");
        }
        self.track_style = Some(style.clone());
        Ok(())
    }

    fn set_track_data(&mut self, geometry: &TrackGeometry) -> Result<()> {
        self.ensure_constructed()?;
        let track = self
            .track
            .as_mut()
            .ok_or_else(|| anyhow!("no track source to update"))?;
        *track = geometry.clone();
        Ok(())
    }

    fn remove_track(&mut self) {
        self.track = None;
        self.track_style = None;
    }

    fn add_marker(&mut self, marker: &MarkerSpec) -> Result<MarkerId> {
        self.ensure_constructed()?;
        self.next_id += 1;
        let id = MarkerId(self.next_id);
        self.markers.insert(id, marker.clone());
        Ok(id)
    }

    fn remove_marker(&mut self, id: MarkerId) {
        if self.markers.remove(&id).is_none() {
            debug!("Marker {:?} was already gone", id);
        }
    }

    fn fit_bounds(&mut self, bounds: Bounds, fit: CameraFit) -> Result<()> {
        self.ensure_constructed()?;
        debug!(
            "Fitting camera to {:?} (padding {}px over {:?})",
            bounds, fit.padding, fit.duration
        );
        self.camera = Some(bounds);
        Ok(())
    }

    fn teardown(&mut self) {
        self.markers.clear();
        self.remove_track();
        self.controls = false;
        self.camera = None;
        self.stage = Stage::TornDown;
    }
}
