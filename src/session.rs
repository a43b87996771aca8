//! The event loop tying extraction, selection and the map together.
//!
//! A `Session` owns the current timeline, the selection and the map
//! synchronizer. Everything that happens later than "now" (extraction results,
//! map readiness, marker clicks, animation frames) comes back in as a
//! `SessionEvent` on one channel, and the session applies events one at a time.
//!
//! Uploads are last-write-wins: every submission gets a new `BatchId`, and
//! results for any batch other than the latest are dropped unseen.

use anyhow::{Result, anyhow};
use log::{debug, info, warn};
use std::collections::BTreeSet;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;

use crate::config::Config;
use crate::exif::MetadataReader;
use crate::extract::Extractor;
use crate::grouping::DayAlbum;
use crate::photo::{ParseResult, PhotoFile};
use crate::preview::PreviewProvider;
use crate::selection::SelectionState;
use crate::surface::{RenderSurface, SurfaceEvent};
use crate::sync::MapSynchronizer;
use crate::timeline::Timeline;

/// Identifies one submission; strictly increasing per session
pub type BatchId = u64;

#[derive(Debug)]
pub enum SessionEvent {
    /// A new set of files was uploaded
    Submit(Vec<PhotoFile>),
    /// Extraction for `batch` finished
    Parsed { batch: BatchId, result: ParseResult },
    SelectDay(usize),
    SelectPoint(usize),
    Surface(SurfaceEvent),
    Shutdown,
}

/// Cloneable sender for posting events to a session
#[derive(Debug, Clone)]
pub struct SessionHandle {
    tx: mpsc::UnboundedSender<SessionEvent>,
}

impl SessionHandle {
    /// Creates a handle together with the receiving end of its channel
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<SessionEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    pub fn send(&self, event: SessionEvent) -> Result<()> {
        self.tx
            .send(event)
            .map_err(|_| anyhow!("session is no longer running"))
    }

    pub fn submit_files(&self, files: Vec<PhotoFile>) -> Result<()> {
        self.send(SessionEvent::Submit(files))
    }

    pub fn select_day(&self, index: usize) -> Result<()> {
        self.send(SessionEvent::SelectDay(index))
    }

    pub fn select_point(&self, index: usize) -> Result<()> {
        self.send(SessionEvent::SelectPoint(index))
    }

    pub fn surface_event(&self, event: SurfaceEvent) -> Result<()> {
        self.send(SessionEvent::Surface(event))
    }

    pub fn shutdown(&self) -> Result<()> {
        self.send(SessionEvent::Shutdown)
    }
}

pub struct Session<S: RenderSurface> {
    config: Config,
    extractor: Arc<Extractor>,
    previews: Arc<dyn PreviewProvider>,
    handle: SessionHandle,
    inbox: mpsc::UnboundedReceiver<SessionEvent>,
    timeline: Timeline,
    selection: SelectionState,
    map: MapSynchronizer<S>,
    latest_batch: BatchId,
    /// Batches submitted whose results have not come back yet
    pending: BTreeSet<BatchId>,
    disposed: bool,
}

impl<S: RenderSurface> Session<S> {
    /// Creates a session and mounts its map.
    ///
    /// `make_surface` receives the session's handle so the surface can report
    /// readiness and clicks back.
    pub fn new(
        config: Config,
        reader: Arc<dyn MetadataReader>,
        previews: Arc<dyn PreviewProvider>,
        make_surface: impl FnOnce(SessionHandle) -> S,
    ) -> Self {
        let (handle, inbox) = SessionHandle::channel();
        let surface = make_surface(handle.clone());

        let mut map = MapSynchronizer::new(surface, &config.map);
        map.start();

        Self {
            extractor: Arc::new(Extractor::new(reader, config.concurrency)),
            config,
            previews,
            handle,
            inbox,
            timeline: Timeline::default(),
            selection: SelectionState::default(),
            map,
            latest_batch: 0,
            pending: BTreeSet::new(),
            disposed: false,
        }
    }

    pub fn handle(&self) -> SessionHandle {
        self.handle.clone()
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn timeline(&self) -> &Timeline {
        &self.timeline
    }

    pub fn albums(&self) -> &[DayAlbum] {
        self.timeline.albums()
    }

    pub fn selection(&self) -> SelectionState {
        self.selection
    }

    pub fn map(&self) -> &MapSynchronizer<S> {
        &self.map
    }

    pub fn map_mut(&mut self) -> &mut MapSynchronizer<S> {
        &mut self.map
    }

    /// Id of the most recent submission, 0 before the first one
    pub fn latest_batch(&self) -> BatchId {
        self.latest_batch
    }

    /// Album of the active day
    pub fn active_day_album(&self) -> Option<&DayAlbum> {
        self.selection
            .active_day
            .and_then(|day| self.timeline.albums().get(day))
    }

    /// Scrubber caption for the active point, e.g. "Point 3 of 12"
    pub fn scrub_label(&self) -> Option<String> {
        self.selection.scrub_label(&self.timeline)
    }

    /// Starts extracting a new upload in the background.
    ///
    /// Must be called from within a tokio runtime.
    pub fn submit_files(&mut self, files: Vec<PhotoFile>) -> BatchId {
        self.latest_batch += 1;
        let batch = self.latest_batch;
        self.pending.insert(batch);

        info!("Batch {}: extracting {} files", batch, files.len());

        let extractor = Arc::clone(&self.extractor);
        let handle = self.handle.clone();
        tokio::spawn(async move {
            let result = extractor.parse_files(files).await;
            if handle.send(SessionEvent::Parsed { batch, result }).is_err() {
                debug!("Batch {} finished after the session closed", batch);
            }
        });

        batch
    }

    /// Replaces the timeline with the result of `batch`, unless a newer batch exists
    pub fn apply_parsed(&mut self, batch: BatchId, result: ParseResult) {
        if !self.pending.remove(&batch) {
            debug!("Ignoring duplicate result for batch {}", batch);
            return;
        }

        if self.disposed {
            return;
        }
        if batch != self.latest_batch {
            info!(
                "Discarding results of batch {} (batch {} is newer)",
                batch, self.latest_batch
            );
            return;
        }

        let timeline = Timeline::build(result, self.previews.as_ref());
        info!(
            "Batch {}: {} photos across {} days, {} skipped",
            batch,
            timeline.len(),
            timeline.albums().len(),
            timeline.skipped().len()
        );

        let previous = std::mem::replace(&mut self.timeline, timeline);
        self.selection = SelectionState::initial(&self.timeline);
        self.push_snapshot();

        // Old markers are gone once the new snapshot has been pushed
        previous.release_previews(self.previews.as_ref());
    }

    /// Selects an album; out-of-range indices are ignored
    pub fn select_day(&mut self, index: usize) -> bool {
        let changed = self.selection.select_day(&self.timeline, index);
        if changed {
            debug!("Selected day {}", index);
            self.push_snapshot();
        }
        changed
    }

    /// Selects a point and the album containing it
    pub fn select_point(&mut self, index: usize) -> bool {
        let changed = self.selection.select_point(&self.timeline, index);
        if changed {
            debug!("Selected point {}", index);
            self.push_snapshot();
        }
        changed
    }

    /// Moves the active point by `delta`, clamped to the timeline
    pub fn step(&mut self, delta: isize) -> bool {
        let changed = self.selection.step(&self.timeline, delta);
        if changed {
            self.push_snapshot();
        }
        changed
    }

    fn push_snapshot(&mut self) {
        let snapshot = self.timeline.snapshot(self.selection.active_point);
        if let Err(e) = self.map.update(snapshot) {
            debug!("Map not updated: {:#}", e);
        }
    }

    /// Applies one event. Returns `false` once the session should stop.
    pub fn handle_event(&mut self, event: SessionEvent) -> bool {
        match event {
            SessionEvent::Submit(files) => {
                self.submit_files(files);
            }
            SessionEvent::Parsed { batch, result } => self.apply_parsed(batch, result),
            SessionEvent::SelectDay(index) => {
                self.select_day(index);
            }
            SessionEvent::SelectPoint(index) => {
                self.select_point(index);
            }
            SessionEvent::Surface(event) => {
                if let Some(index) = self.map.handle_event(event) {
                    self.select_point(index);
                }
            }
            SessionEvent::Shutdown => {
                info!("Session shutting down");
                return false;
            }
        }
        true
    }

    /// True when no extraction is pending and the map has nothing left to do on its own
    pub fn is_idle(&self) -> bool {
        self.pending.is_empty() && self.map.is_settled()
    }

    /// Processes events until the session is idle or shut down
    pub async fn run_until_idle(&mut self) {
        self.run_loop(true).await;
    }

    /// Processes events until `Shutdown` is received
    pub async fn run(&mut self) {
        self.run_loop(false).await;
    }

    async fn run_loop(&mut self, stop_when_idle: bool) {
        let mut frames = tokio::time::interval(self.config.map.frame_interval());
        frames.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            while let Ok(event) = self.inbox.try_recv() {
                if !self.handle_event(event) {
                    return;
                }
            }

            if stop_when_idle && self.is_idle() {
                return;
            }

            tokio::select! {
                event = self.inbox.recv() => {
                    // The session holds a sender itself, so the channel never closes
                    let Some(event) = event else { return };
                    if !self.handle_event(event) {
                        return;
                    }
                }
                _ = frames.tick(), if self.map.needs_frame() => {
                    self.map.handle_event(SurfaceEvent::Frame);
                }
            }
        }
    }

    /// Tears down the map, then revokes every preview. Safe to call twice.
    pub fn dispose(&mut self) {
        if self.disposed {
            return;
        }
        self.disposed = true;

        self.map.dispose();
        let timeline = std::mem::take(&mut self.timeline);
        timeline.release_previews(self.previews.as_ref());
        self.selection = SelectionState::default();

        if !self.pending.is_empty() {
            warn!(
                "Session disposed with {} extraction(s) still running",
                self.pending.len()
            );
        }
        debug!("Session disposed");
    }
}

impl<S: RenderSurface> Drop for Session<S> {
    fn drop(&mut self) {
        self.dispose();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::headless::HeadlessSurface;
    use crate::mock::MockMetadataReader;
    use crate::preview::ObjectUrlPreviews;
    use crate::surface::SurfaceSize;
    use crate::sync::MapLifecycle;

    fn session(
        reader: MockMetadataReader,
        previews: Arc<ObjectUrlPreviews>,
    ) -> Session<HeadlessSurface> {
        Session::new(Config::default(), Arc::new(reader), previews, |handle| {
            HeadlessSurface::new(SurfaceSize::new(800, 600)).with_events(handle)
        })
    }

    fn trip() -> MockMetadataReader {
        MockMetadataReader::new()
            .with_photo("a.jpg", 48.85, 2.35, "2024-06-01T12:00:00Z")
            .with_photo("b.jpg", 48.86, 2.29, "2024-06-01T13:00:00Z")
            .with_photo("c.jpg", 51.50, -0.12, "2024-06-05T12:00:00Z")
            .with_missing_gps("d.jpg", "2024-06-05T13:00:00Z")
    }

    #[tokio::test]
    async fn test_submit_builds_timeline_and_map() {
        let reader = trip();
        let files = reader.files();
        let previews = Arc::new(ObjectUrlPreviews::new());
        let mut session = session(reader, previews.clone());

        session.submit_files(files);
        session.run_until_idle().await;

        assert_eq!(session.timeline().len(), 3);
        assert_eq!(session.albums().len(), 2);
        assert_eq!(session.timeline().skipped().len(), 1);
        assert_eq!(session.selection().active_point, Some(0));
        assert_eq!(session.selection().active_day, Some(0));
        assert_eq!(session.scrub_label().as_deref(), Some("Point 1 of 3"));

        assert_eq!(session.map().lifecycle(), MapLifecycle::Ready);
        let surface = session.map().surface();
        assert_eq!(surface.markers().len(), 3);
        assert_eq!(surface.active_marker(), Some(0));
        assert_eq!(previews.live_count(), 3);
    }

    #[tokio::test]
    async fn test_stale_batch_is_discarded() {
        let previews = Arc::new(ObjectUrlPreviews::new());
        let mut session = session(trip(), previews.clone());
        session.run_until_idle().await;

        let first = session.submit_files(Vec::new());
        let second = session.submit_files(Vec::new());
        assert!(second > first);

        let stale = ParseResult {
            points: vec![crate::photo::GeotaggedPhoto::new(
                PhotoFile::new("/stale.jpg"),
                chrono::Utc::now(),
                crate::photo::Coordinate::new(0.0, 0.0).unwrap(),
            )],
            skipped: Vec::new(),
        };
        session.apply_parsed(first, stale);
        assert!(session.timeline().is_empty());
        assert_eq!(previews.live_count(), 0);

        session.run_until_idle().await;
        assert!(session.timeline().is_empty());
        assert_eq!(session.selection(), SelectionState::default());
    }

    #[tokio::test]
    async fn test_dispose_releases_previews() {
        let reader = trip();
        let files = reader.files();
        let previews = Arc::new(ObjectUrlPreviews::new());
        let mut session = session(reader, previews.clone());

        session.submit_files(files);
        session.run_until_idle().await;
        assert_eq!(previews.live_count(), 3);

        session.dispose();
        assert_eq!(previews.live_count(), 0);
        assert!(session.map().surface().is_torn_down());
        assert_eq!(session.map().lifecycle(), MapLifecycle::Disposed);

        session.dispose();
        assert_eq!(previews.live_count(), 0);
    }
}
