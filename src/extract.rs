//! Metadata extraction for an upload batch.
//!
//! Every file is read independently on tokio's blocking pool, with at most
//! `concurrency` reads in flight. Outcomes are collected in completion order and
//! then sorted, so the `ParseResult` never depends on which read finished first.

use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use log::{debug, info, warn};
use std::sync::Arc;

use crate::exif::{MetadataReader, MetadataTags, TagValue, parse_timestamp, parse_utc_offset, tags};
use crate::photo::{Coordinate, GeotaggedPhoto, ParseResult, PhotoFile, SkipReason, SkippedFile};

/// Timestamp tags in priority order; the first present value wins
pub const TIMESTAMP_CANDIDATES: [&str; 4] = [
    tags::DATE_TIME_ORIGINAL,
    tags::CREATE_DATE,
    tags::MODIFY_DATE,
    tags::DATE_CREATED,
];

/// Outcome of looking up a capture time in a tag map
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TimestampLookup {
    Missing,
    Invalid,
    Valid(DateTime<Utc>),
}

/// Finds the capture time among the candidate tags.
///
/// Only the first present candidate is considered; an unparseable value there
/// makes the whole lookup invalid rather than falling through to later tags.
pub fn resolve_timestamp(tags: &MetadataTags) -> TimestampLookup {
    let offset = tags
        .text(tags::OFFSET_TIME_ORIGINAL)
        .and_then(parse_utc_offset);

    for name in TIMESTAMP_CANDIDATES {
        let parsed = match tags.get(name) {
            Some(TagValue::Time(dt)) => Some(*dt),
            Some(TagValue::Text(text)) if !text.trim().is_empty() => parse_timestamp(text, offset),
            Some(TagValue::Number(_)) => None,
            _ => continue,
        };

        return match parsed {
            Some(dt) => TimestampLookup::Valid(dt),
            None => TimestampLookup::Invalid,
        };
    }

    TimestampLookup::Missing
}

/// Finds the GPS position; out-of-range values count as absent
pub fn resolve_coordinate(tags: &MetadataTags) -> Option<Coordinate> {
    let latitude = tags.number(tags::LATITUDE)?;
    let longitude = tags.number(tags::LONGITUDE)?;
    Coordinate::new(longitude, latitude)
}

/// Classifies one file from its tag map
pub fn classify(file: PhotoFile, tags: &MetadataTags) -> Result<GeotaggedPhoto, SkippedFile> {
    let coordinate = resolve_coordinate(tags);
    let timestamp = resolve_timestamp(tags);

    match (coordinate, timestamp) {
        (Some(coordinate), TimestampLookup::Valid(captured_at)) => {
            Ok(GeotaggedPhoto::new(file, captured_at, coordinate))
        }
        (Some(_), TimestampLookup::Invalid) => Err(SkippedFile {
            file,
            reason: SkipReason::InvalidTimestamp,
        }),
        _ => Err(SkippedFile {
            file,
            reason: SkipReason::MissingGpsOrTimestamp,
        }),
    }
}

/// Reads and classifies a single file
pub fn extract_one(reader: &dyn MetadataReader, file: PhotoFile) -> Result<GeotaggedPhoto, SkippedFile> {
    match reader.read_tags(&file) {
        Ok(tags) => classify(file, &tags),
        Err(e) => {
            debug!("Could not read metadata from {}: {:#}", file.path().display(), e);
            Err(SkippedFile {
                file,
                reason: SkipReason::Unreadable,
            })
        }
    }
}

/// Runs extraction for a whole batch
pub struct Extractor {
    reader: Arc<dyn MetadataReader>,
    concurrency: usize,
}

impl Extractor {
    pub fn new(reader: Arc<dyn MetadataReader>, concurrency: usize) -> Self {
        Self {
            reader,
            concurrency: concurrency.max(1),
        }
    }

    /// Extracts every file in the batch and returns accepted points sorted by capture time
    pub async fn parse_files(&self, files: Vec<PhotoFile>) -> ParseResult {
        info!("Extracting metadata from {} files", files.len());

        let jobs = files.into_iter().enumerate().map(|(position, file)| {
            let reader = Arc::clone(&self.reader);
            let task_file = file.clone();
            async move {
                let outcome =
                    tokio::task::spawn_blocking(move || extract_one(reader.as_ref(), task_file))
                        .await;
                (position, file, outcome)
            }
        });

        // Completion order
        let completed: Vec<_> = stream::iter(jobs)
            .buffer_unordered(self.concurrency)
            .collect()
            .await;

        let mut points = Vec::new();
        let mut skipped = Vec::new();

        for (position, file, outcome) in completed {
            match outcome {
                Ok(Ok(photo)) => points.push((position, photo)),
                Ok(Err(skip)) => skipped.push((position, skip)),
                Err(e) => {
                    warn!("Metadata task for {} did not complete: {}", file.name(), e);
                    skipped.push((
                        position,
                        SkippedFile {
                            file,
                            reason: SkipReason::Unreadable,
                        },
                    ));
                }
            }
        }

        // Ties on capture time fall back to upload order
        points.sort_by(|(pa, a), (pb, b)| a.captured_at.cmp(&b.captured_at).then(pa.cmp(pb)));
        skipped.sort_by_key(|(position, _)| *position);

        let result = ParseResult {
            points: points.into_iter().map(|(_, photo)| photo).collect(),
            skipped: skipped.into_iter().map(|(_, skip)| skip).collect(),
        };

        info!(
            "Accepted {} photos, skipped {}",
            result.points.len(),
            result.skipped.len()
        );
        for skip in &result.skipped {
            debug!("Skipped {}: {}", skip.file.name(), skip.reason);
        }

        result
    }
}
