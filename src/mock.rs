use anyhow::{Result, anyhow};
use rand::Rng;
use std::collections::HashMap;
use std::time::Duration;

use crate::exif::{MetadataReader, MetadataTags, TagValue, tags};
use crate::photo::PhotoFile;

/// In-memory metadata reader keyed by file name, for tests
#[derive(Debug, Default)]
pub struct MockMetadataReader {
    order: Vec<String>,
    entries: HashMap<String, Option<MetadataTags>>,
    max_delay_ms: u64,
}

impl MockMetadataReader {
    pub fn new() -> Self {
        Self::default()
    }

    fn insert(mut self, name: &str, tags: Option<MetadataTags>) -> Self {
        if !self.entries.contains_key(name) {
            self.order.push(name.to_string());
        }
        self.entries.insert(name.to_string(), tags);
        self
    }

    /// A photo with GPS and a timestamp
    pub fn with_photo(self, name: &str, latitude: f64, longitude: f64, timestamp: &str) -> Self {
        let tags = MetadataTags::new()
            .with(tags::LATITUDE, TagValue::Number(latitude))
            .with(tags::LONGITUDE, TagValue::Number(longitude))
            .with(tags::DATE_TIME_ORIGINAL, TagValue::Text(timestamp.to_string()));
        self.insert(name, Some(tags))
    }

    /// A photo with a timestamp but no GPS tags
    pub fn with_missing_gps(self, name: &str, timestamp: &str) -> Self {
        let tags = MetadataTags::new()
            .with(tags::DATE_TIME_ORIGINAL, TagValue::Text(timestamp.to_string()));
        self.insert(name, Some(tags))
    }

    /// A photo with GPS and an unparseable timestamp
    pub fn with_invalid_timestamp(self, name: &str, timestamp: &str) -> Self {
        let tags = MetadataTags::new()
            .with(tags::LATITUDE, TagValue::Number(0.0))
            .with(tags::LONGITUDE, TagValue::Number(0.0))
            .with(tags::DATE_TIME_ORIGINAL, TagValue::Text(timestamp.to_string()));
        self.insert(name, Some(tags))
    }

    /// A file whose metadata container cannot be read
    pub fn with_unreadable(self, name: &str) -> Self {
        self.insert(name, None)
    }

    /// Sleeps a random time up to `max_ms` on every read to shuffle completion order
    pub fn with_random_delays(mut self, max_ms: u64) -> Self {
        self.max_delay_ms = max_ms;
        self
    }

    /// Handles for every registered file, in registration order
    pub fn files(&self) -> Vec<PhotoFile> {
        self.order
            .iter()
            .map(|name| PhotoFile::new(format!("/mock/{name}")))
            .collect()
    }
}

impl MetadataReader for MockMetadataReader {
    fn read_tags(&self, file: &PhotoFile) -> Result<MetadataTags> {
        if self.max_delay_ms > 0 {
            let delay = rand::thread_rng().gen_range(0..=self.max_delay_ms);
            std::thread::sleep(Duration::from_millis(delay));
        }

        match self.entries.get(file.name()) {
            Some(Some(tags)) => Ok(tags.clone()),
            Some(None) => Err(anyhow!("corrupt metadata container in {}", file.name())),
            None => Err(anyhow!("no such mock file: {}", file.name())),
        }
    }
}
