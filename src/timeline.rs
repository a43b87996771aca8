//! The current upload's derived state: points paired with previews, plus day albums.

use chrono::{Local, NaiveDate, TimeZone};
use log::debug;
use std::collections::HashMap;

use crate::grouping::{DayAlbum, group_photos_by_day_in};
use crate::photo::{GeotaggedPhoto, ParseResult, SkippedFile};
use crate::preview::{PreviewHandle, PreviewProvider};
use crate::sync::{TimelineSnapshot, TrackPoint};

/// A point together with the preview made for it
#[derive(Debug)]
pub struct TimelineEntry {
    pub photo: GeotaggedPhoto,
    pub preview: Option<PreviewHandle>,
}

/// Everything derived from one `ParseResult`
#[derive(Debug, Default)]
pub struct Timeline {
    entries: Vec<TimelineEntry>,
    albums: Vec<DayAlbum>,
    /// Album index of every entry, looked up from the entry's own local date
    day_of_point: Vec<usize>,
    /// Entry index of the earliest entry in each album
    day_starts: Vec<usize>,
    skipped: Vec<SkippedFile>,
}

impl Timeline {
    /// Builds the timeline, grouping days in the local time zone
    pub fn build(result: ParseResult, previews: &dyn PreviewProvider) -> Self {
        Self::build_in(result, previews, &Local)
    }

    pub fn build_in<Tz: TimeZone>(
        result: ParseResult,
        previews: &dyn PreviewProvider,
        zone: &Tz,
    ) -> Self {
        let albums = group_photos_by_day_in(&result.points, zone);

        // Local dates need not rise with capture time (a DST fall-back at midnight)
        let day_index: HashMap<NaiveDate, usize> = albums
            .iter()
            .enumerate()
            .map(|(day, album)| (album.day, day))
            .collect();

        let mut day_of_point = Vec::with_capacity(result.points.len());
        let mut day_starts = vec![usize::MAX; albums.len()];
        for (position, photo) in result.points.iter().enumerate() {
            let date = photo.captured_at.with_timezone(zone).date_naive();
            let Some(&day) = day_index.get(&date) else {
                continue;
            };
            day_of_point.push(day);
            if day_starts[day] == usize::MAX {
                day_starts[day] = position;
            }
        }

        let entries: Vec<_> = result
            .points
            .into_iter()
            .map(|photo| TimelineEntry {
                preview: previews.create(&photo.file),
                photo,
            })
            .collect();

        debug!(
            "Timeline built: {} points over {} days",
            entries.len(),
            albums.len()
        );

        Self {
            entries,
            albums,
            day_of_point,
            day_starts,
            skipped: result.skipped,
        }
    }

    pub fn entries(&self) -> &[TimelineEntry] {
        &self.entries
    }

    pub fn points(&self) -> impl Iterator<Item = &GeotaggedPhoto> {
        self.entries.iter().map(|entry| &entry.photo)
    }

    pub fn albums(&self) -> &[DayAlbum] {
        &self.albums
    }

    pub fn skipped(&self) -> &[SkippedFile] {
        &self.skipped
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Album containing the point at `point`
    pub fn day_of(&self, point: usize) -> Option<usize> {
        self.day_of_point.get(point).copied()
    }

    /// Point index of the first photo of album `day`
    pub fn first_point_of(&self, day: usize) -> Option<usize> {
        let album = self.albums.get(day)?;
        if album.photos.is_empty() {
            return None;
        }
        self.day_starts.get(day).copied()
    }

    /// Map inputs for the given active point
    pub fn snapshot(&self, active: Option<usize>) -> TimelineSnapshot {
        TimelineSnapshot {
            points: self
                .entries
                .iter()
                .map(|entry| TrackPoint {
                    coordinate: entry.photo.coordinate,
                    preview: entry.preview.as_ref().map(|p| p.uri().to_string()),
                })
                .collect(),
            active,
        }
    }

    /// Revokes every preview; consuming the timeline makes a second release impossible
    pub fn release_previews(self, provider: &dyn PreviewProvider) {
        for handle in self.entries.into_iter().filter_map(|entry| entry.preview) {
            provider.release(handle);
        }
    }
}
