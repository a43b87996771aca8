//! EXIF metadata reading for phototrail.
//!
//! This module turns a photo file into a flat map of tag name to value. The
//! extractor only cares about a handful of tags (GPS position and the candidate
//! capture timestamps), so the map is deliberately loose: a reader reports what
//! it found and the extractor decides what is usable.
//!
//! `ExifReader` is the production reader built on `kamadak-exif`. Tests and
//! other front ends can plug in their own `MetadataReader`.

use anyhow::{Context, Result};
use chrono::{DateTime, FixedOffset, Local, NaiveDateTime, TimeZone, Utc};
use exif::{Exif, In, Tag, Value};
use std::collections::BTreeMap;
use std::fs::File;
use std::io::BufReader;

use crate::photo::PhotoFile;

/// Tag names understood by the extractor
pub mod tags {
    /// Signed decimal degrees
    pub const LATITUDE: &str = "latitude";
    /// Signed decimal degrees
    pub const LONGITUDE: &str = "longitude";
    pub const DATE_TIME_ORIGINAL: &str = "DateTimeOriginal";
    pub const CREATE_DATE: &str = "CreateDate";
    pub const MODIFY_DATE: &str = "ModifyDate";
    pub const DATE_CREATED: &str = "DateCreated";
    pub const OFFSET_TIME_ORIGINAL: &str = "OffsetTimeOriginal";
    pub const MAKE: &str = "Make";
    pub const MODEL: &str = "Model";
}

/// A single metadata value
#[derive(Debug, Clone, PartialEq)]
pub enum TagValue {
    Text(String),
    Number(f64),
    Time(DateTime<Utc>),
}

/// Best-effort mapping of tag name to value
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MetadataTags {
    values: BTreeMap<String, TagValue>,
}

impl MetadataTags {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: &str, value: TagValue) {
        self.values.insert(name.to_string(), value);
    }

    /// Builder-style insert
    pub fn with(mut self, name: &str, value: TagValue) -> Self {
        self.insert(name, value);
        self
    }

    pub fn get(&self, name: &str) -> Option<&TagValue> {
        self.values.get(name)
    }

    /// Numeric value of a tag, if it holds a number
    pub fn number(&self, name: &str) -> Option<f64> {
        match self.values.get(name) {
            Some(TagValue::Number(n)) => Some(*n),
            _ => None,
        }
    }

    /// Text value of a tag, ignoring blank strings
    pub fn text(&self, name: &str) -> Option<&str> {
        match self.values.get(name) {
            Some(TagValue::Text(s)) if !s.trim().is_empty() => Some(s.as_str()),
            _ => None,
        }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Capability to read metadata tags from a photo file
pub trait MetadataReader: Send + Sync + 'static {
    /// Fails only when the metadata container itself cannot be read
    fn read_tags(&self, file: &PhotoFile) -> Result<MetadataTags>;
}

/// Reads EXIF containers (JPEG, HEIF, PNG, TIFF, WebP) from disk
#[derive(Debug, Clone, Copy, Default)]
pub struct ExifReader;

impl MetadataReader for ExifReader {
    fn read_tags(&self, file: &PhotoFile) -> Result<MetadataTags> {
        let path = file.path();
        let handle = File::open(path)
            .with_context(|| format!("Failed to open image file at {}", path.display()))?;

        let mut bufreader = BufReader::new(handle);
        let exif = exif::Reader::new()
            .read_from_container(&mut bufreader)
            .with_context(|| format!("Failed to read EXIF data from {}", path.display()))?;

        Ok(tags_from_exif(&exif))
    }
}

/// Flattens the fields the extractor cares about into a tag map
pub fn tags_from_exif(exif: &Exif) -> MetadataTags {
    let mut tags = MetadataTags::new();

    let text_fields = [
        (Tag::DateTimeOriginal, tags::DATE_TIME_ORIGINAL),
        (Tag::DateTimeDigitized, tags::CREATE_DATE),
        (Tag::DateTime, tags::MODIFY_DATE),
        (Tag::OffsetTimeOriginal, tags::OFFSET_TIME_ORIGINAL),
        (Tag::Make, tags::MAKE),
        (Tag::Model, tags::MODEL),
    ];
    for (tag, name) in text_fields {
        if let Some(value) = get_exif_string(exif, tag) {
            tags.insert(name, TagValue::Text(value));
        }
    }

    if let Some(latitude) = gps_decimal(exif, Tag::GPSLatitude, Tag::GPSLatitudeRef) {
        tags.insert(tags::LATITUDE, TagValue::Number(latitude));
    }
    if let Some(longitude) = gps_decimal(exif, Tag::GPSLongitude, Tag::GPSLongitudeRef) {
        tags.insert(tags::LONGITUDE, TagValue::Number(longitude));
    }

    tags
}

/// Helper function to extract a string from EXIF data
fn get_exif_string(exif: &Exif, tag: Tag) -> Option<String> {
    let field = exif.get_field(tag, In::PRIMARY)?;
    if let Value::Ascii(ref vec) = field.value {
        if let Some(bytes) = vec.first() {
            let text = String::from_utf8_lossy(bytes).trim().to_string();
            return (!text.is_empty()).then_some(text);
        }
    }
    None
}

/// Reads a DMS rational triple plus its hemisphere reference as signed degrees
fn gps_decimal(exif: &Exif, value_tag: Tag, ref_tag: Tag) -> Option<f64> {
    let field = exif.get_field(value_tag, In::PRIMARY)?;
    let dms: Vec<f64> = match field.value {
        Value::Rational(ref vec) if !vec.is_empty() => vec.iter().map(|r| r.to_f64()).collect(),
        _ => return None,
    };

    let direction = get_exif_string(exif, ref_tag)?;

    let degrees = dms[0];
    let minutes = dms.get(1).copied().unwrap_or(0.0);
    let seconds = dms.get(2).copied().unwrap_or(0.0);

    dms_to_decimal(degrees, minutes, seconds, &direction)
}

/// Converts degrees/minutes/seconds and a N/S/E/W reference into decimal degrees
pub fn dms_to_decimal(degrees: f64, minutes: f64, seconds: f64, direction: &str) -> Option<f64> {
    let decimal = degrees + minutes / 60.0 + seconds / 3600.0;
    match direction.trim().to_ascii_uppercase().as_str() {
        "N" | "E" => Some(decimal),
        "S" | "W" => Some(-decimal),
        _ => None,
    }
}

/// Formats accepted for zone-less timestamps, tried in order
const NAIVE_FORMATS: &[&str] = &[
    "%Y:%m:%d %H:%M:%S",
    "%Y:%m:%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S",
];

/// Parses a timestamp string into an instant.
///
/// RFC 3339 values carry their own offset. Zone-less values (the EXIF
/// `YYYY:MM:DD HH:MM:SS` form and plain ISO) use `offset` when given and the
/// local time zone otherwise. Returns `None` for anything that is not a real
/// point in time, such as `2023:02:30 10:00:00` or the all-zero EXIF placeholder.
pub fn parse_timestamp(text: &str, offset: Option<FixedOffset>) -> Option<DateTime<Utc>> {
    let text = text.trim();

    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Some(dt.with_timezone(&Utc));
    }

    let naive = NAIVE_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(text, format).ok())?;

    match offset {
        Some(offset) => resolve_in_zone(&naive, &offset),
        None => resolve_in_zone(&naive, &Local),
    }
}

/// Resolves a wall-clock time in `zone`, taking the earlier instant on DST overlaps
pub fn resolve_in_zone<Tz: TimeZone>(naive: &NaiveDateTime, zone: &Tz) -> Option<DateTime<Utc>> {
    zone.from_local_datetime(naive)
        .earliest()
        .map(|dt| dt.with_timezone(&Utc))
}

/// Parses an EXIF offset string such as `+02:00` or `-0530`
pub fn parse_utc_offset(text: &str) -> Option<FixedOffset> {
    let text = text.trim();
    let (sign, rest) = match text.chars().next()? {
        '+' => (1, &text[1..]),
        '-' => (-1, &text[1..]),
        'Z' | 'z' if text.len() == 1 => return FixedOffset::east_opt(0),
        _ => return None,
    };

    let digits: String = rest.chars().filter(|c| *c != ':').collect();
    if digits.len() != 4 || !digits.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }

    let hours: i32 = digits[..2].parse().ok()?;
    let minutes: i32 = digits[2..].parse().ok()?;
    if minutes >= 60 {
        return None;
    }

    FixedOffset::east_opt(sign * (hours * 3600 + minutes * 60))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Datelike, Timelike};
    use exif::experimental::Writer;
    use exif::{Field, Rational};
    use std::io::{Cursor, Write};
    use std::path::Path;
    use tempfile::tempdir;

    /// Creates a placeholder file that is not a valid image container
    fn create_placeholder_jpeg(path: &Path) -> Result<()> {
        let test_data = b"JFIF\0EXIF\0Test JPEG with EXIF data";
        let mut file = File::create(path)?;
        file.write_all(test_data)?;
        Ok(())
    }

    fn ascii(tag: Tag, text: &str) -> Field {
        Field {
            tag,
            ifd_num: In::PRIMARY,
            value: Value::Ascii(vec![text.as_bytes().to_vec()]),
        }
    }

    fn dms(tag: Tag, degrees: u32, minutes: u32, seconds_x100: u32) -> Field {
        Field {
            tag,
            ifd_num: In::PRIMARY,
            value: Value::Rational(vec![
                Rational::from((degrees, 1)),
                Rational::from((minutes, 1)),
                Rational::from((seconds_x100, 100)),
            ]),
        }
    }

    /// Writes a bare TIFF container holding GPS and timestamp fields
    fn create_tagged_tiff(path: &Path) -> Result<()> {
        let fields = [
            ascii(Tag::DateTimeOriginal, "2024:06:01 09:00:00"),
            ascii(Tag::OffsetTimeOriginal, "+02:00"),
            ascii(Tag::Make, "Apple"),
            dms(Tag::GPSLatitude, 48, 51, 2400),
            ascii(Tag::GPSLatitudeRef, "N"),
            dms(Tag::GPSLongitude, 2, 21, 0),
            ascii(Tag::GPSLongitudeRef, "E"),
        ];

        let mut writer = Writer::new();
        for field in &fields {
            writer.push_field(field);
        }
        let mut buf = Cursor::new(Vec::new());
        writer.write(&mut buf, false)?;

        std::fs::write(path, buf.into_inner())?;
        Ok(())
    }

    #[test]
    fn test_read_tags_with_missing_file() {
        let file = PhotoFile::new("/nonexistent/path.jpg");
        assert!(ExifReader.read_tags(&file).is_err());
    }

    #[test]
    fn test_read_tags_with_placeholder_file() -> Result<()> {
        let temp_dir = tempdir()?;
        let image_path = temp_dir.path().join("test.jpg");
        create_placeholder_jpeg(&image_path)?;

        let result = ExifReader.read_tags(&PhotoFile::new(&image_path));
        assert!(result.is_err());

        Ok(())
    }

    #[test]
    fn test_read_tags_from_tiff() -> Result<()> {
        let temp_dir = tempdir()?;
        let image_path = temp_dir.path().join("tagged.tif");
        create_tagged_tiff(&image_path)?;

        let tags = ExifReader.read_tags(&PhotoFile::new(&image_path))?;

        assert_eq!(tags.text(tags::DATE_TIME_ORIGINAL), Some("2024:06:01 09:00:00"));
        assert_eq!(tags.text(tags::OFFSET_TIME_ORIGINAL), Some("+02:00"));
        assert_eq!(tags.text(tags::MAKE), Some("Apple"));

        let latitude = tags.number(tags::LATITUDE).expect("latitude");
        let longitude = tags.number(tags::LONGITUDE).expect("longitude");
        assert!((latitude - 48.8566).abs() < 1e-4);
        assert!((longitude - 2.35).abs() < 1e-4);

        Ok(())
    }

    #[test]
    fn test_dms_to_decimal() {
        assert_eq!(dms_to_decimal(10.0, 30.0, 0.0, "N"), Some(10.5));
        assert_eq!(dms_to_decimal(10.0, 30.0, 0.0, "W"), Some(-10.5));
        assert_eq!(dms_to_decimal(10.0, 30.0, 0.0, "s"), Some(-10.5));
        assert_eq!(dms_to_decimal(10.0, 30.0, 0.0, ""), None);
    }

    #[test]
    fn test_parse_timestamp_formats() {
        let utc = FixedOffset::east_opt(0);

        let exif_style = parse_timestamp("2023:12:25 15:30:00", utc).expect("exif format");
        assert_eq!(exif_style.year(), 2023);
        assert_eq!(exif_style.month(), 12);
        assert_eq!(exif_style.day(), 25);
        assert_eq!(exif_style.hour(), 15);
        assert_eq!(exif_style.minute(), 30);

        let iso = parse_timestamp("2023-12-25T15:30:00", utc).expect("iso format");
        assert_eq!(iso, exif_style);

        let rfc = parse_timestamp("2023-12-25T17:30:00+02:00", None).expect("rfc3339");
        assert_eq!(rfc, exif_style);
    }

    #[test]
    fn test_parse_timestamp_applies_offset() {
        let plus_two = parse_utc_offset("+02:00");
        let dt = parse_timestamp("2024:06:01 09:00:00", plus_two).expect("valid");
        assert_eq!(dt.hour(), 7);
    }

    #[test]
    fn test_parse_timestamp_rejects_invalid() {
        assert!(parse_timestamp("2023-12-25", None).is_none());
        assert!(parse_timestamp("2023:02:30 10:00:00", None).is_none());
        assert!(parse_timestamp("0000:00:00 00:00:00", None).is_none());
        assert!(parse_timestamp("not a date", None).is_none());
    }

    #[test]
    fn test_parse_utc_offset() {
        assert_eq!(parse_utc_offset("+02:00"), FixedOffset::east_opt(7200));
        assert_eq!(parse_utc_offset("-0530"), FixedOffset::east_opt(-19800));
        assert_eq!(parse_utc_offset("Z"), FixedOffset::east_opt(0));
        assert_eq!(parse_utc_offset("+2"), None);
        assert_eq!(parse_utc_offset("+02:75"), None);
    }

    #[test]
    fn test_metadata_tags_ignore_blank_text() {
        let tags = MetadataTags::new()
            .with(tags::DATE_TIME_ORIGINAL, TagValue::Text("   ".to_string()))
            .with(tags::LATITUDE, TagValue::Number(1.5));

        assert_eq!(tags.text(tags::DATE_TIME_ORIGINAL), None);
        assert_eq!(tags.number(tags::LATITUDE), Some(1.5));
        assert_eq!(tags.number(tags::DATE_TIME_ORIGINAL), None);
        assert_eq!(tags.len(), 2);
    }
}
