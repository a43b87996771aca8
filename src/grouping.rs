//! Groups a chronological point list into per-day albums.

use chrono::{Local, NaiveDate, TimeZone};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt::Write;

use crate::photo::GeotaggedPhoto;

/// Long-form day title, e.g. "Saturday, June 1, 2024"
pub const DEFAULT_TITLE_FORMAT: &str = "%A, %B %-d, %Y";

/// One calendar day's worth of photos
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DayAlbum {
    /// Calendar date in the viewer's time zone
    pub day: NaiveDate,
    /// Photos captured that day, in chronological order
    pub photos: Vec<GeotaggedPhoto>,
}

impl DayAlbum {
    /// Stable grouping key in `YYYY-MM-DD` form
    pub fn day_key(&self) -> String {
        self.day.format("%Y-%m-%d").to_string()
    }

    pub fn title(&self) -> String {
        self.title_with(DEFAULT_TITLE_FORMAT)
    }

    /// Renders the day with a strftime pattern; an invalid pattern falls back to `day_key`
    pub fn title_with(&self, format: &str) -> String {
        let mut title = String::new();
        if write!(title, "{}", self.day.format(format)).is_err() {
            return self.day_key();
        }
        title
    }

    pub fn photo_count_label(&self) -> String {
        match self.photos.len() {
            1 => "1 Photo".to_string(),
            n => format!("{n} Photos"),
        }
    }
}

/// Groups photos by calendar day in the local time zone
pub fn group_photos_by_day(points: &[GeotaggedPhoto]) -> Vec<DayAlbum> {
    group_photos_by_day_in(points, &Local)
}

/// Groups photos by calendar day in `zone`.
///
/// Albums come back ascending by day. Within a day, photos keep their input
/// order, so a sorted input concatenates back to itself.
pub fn group_photos_by_day_in<Tz: TimeZone>(points: &[GeotaggedPhoto], zone: &Tz) -> Vec<DayAlbum> {
    let mut days: BTreeMap<NaiveDate, Vec<GeotaggedPhoto>> = BTreeMap::new();

    for photo in points {
        let day = photo.captured_at.with_timezone(zone).date_naive();
        days.entry(day).or_default().push(photo.clone());
    }

    days.into_iter()
        .map(|(day, photos)| DayAlbum { day, photos })
        .collect()
}

/// Concatenates album photos back into a single sequence
pub fn flatten(albums: &[DayAlbum]) -> Vec<GeotaggedPhoto> {
    albums
        .iter()
        .flat_map(|album| album.photos.iter().cloned())
        .collect()
}
