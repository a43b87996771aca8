//! Lightweight preview handles for map markers.
//!
//! A preview is an opaque URI standing in for a photo's bytes, in the spirit of
//! a browser object URL. Handles belong to the timeline entry they were made
//! for and must be released exactly once, after every marker showing them is gone.

use log::warn;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Mutex;
use uuid::Uuid;

use crate::photo::PhotoFile;

/// URI scheme used by `ObjectUrlPreviews`
pub const PREVIEW_SCHEME: &str = "preview:";

/// A live preview reference; not `Clone`, so only its owner can release it
#[derive(Debug, PartialEq, Eq, Hash)]
pub struct PreviewHandle {
    uri: String,
}

impl PreviewHandle {
    pub fn new(uri: String) -> Self {
        Self { uri }
    }

    pub fn uri(&self) -> &str {
        &self.uri
    }
}

/// Capability to create and revoke preview handles
pub trait PreviewProvider: Send + Sync {
    /// Returns `None` when no preview can be made; markers then fall back to a number
    fn create(&self, file: &PhotoFile) -> Option<PreviewHandle>;

    fn release(&self, handle: PreviewHandle);
}

/// Issues `preview:<uuid>` URIs that resolve back to the file on disk
#[derive(Debug, Default)]
pub struct ObjectUrlPreviews {
    live: Mutex<HashMap<String, PathBuf>>,
}

impl ObjectUrlPreviews {
    pub fn new() -> Self {
        Self::default()
    }

    /// Looks up the file behind a live URI
    pub fn resolve(&self, uri: &str) -> Option<PathBuf> {
        self.live.lock().ok()?.get(uri).cloned()
    }

    /// Number of handles created and not yet released
    pub fn live_count(&self) -> usize {
        self.live.lock().map(|live| live.len()).unwrap_or(0)
    }
}

impl PreviewProvider for ObjectUrlPreviews {
    fn create(&self, file: &PhotoFile) -> Option<PreviewHandle> {
        let uri = format!("{}{}", PREVIEW_SCHEME, Uuid::new_v4());
        let mut live = self.live.lock().ok()?;
        live.insert(uri.clone(), file.path().to_path_buf());
        Some(PreviewHandle::new(uri))
    }

    fn release(&self, handle: PreviewHandle) {
        let removed = self
            .live
            .lock()
            .map(|mut live| live.remove(handle.uri()).is_some())
            .unwrap_or(false);

        if !removed {
            warn!("Released unknown preview {}", handle.uri());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_resolve_release() {
        let previews = ObjectUrlPreviews::new();

        let a = previews.create(&PhotoFile::new("/trip/a.jpg")).unwrap();
        let b = previews.create(&PhotoFile::new("/trip/b.jpg")).unwrap();
        assert_eq!(previews.live_count(), 2);
        assert_ne!(a.uri(), b.uri());

        let uri = b.uri().to_string();
        assert!(uri.starts_with(PREVIEW_SCHEME));
        assert_eq!(previews.resolve(&uri), Some(PathBuf::from("/trip/b.jpg")));

        previews.release(a);
        previews.release(b);
        assert_eq!(previews.live_count(), 0);
        assert_eq!(previews.resolve(&uri), None);
    }

    #[test]
    fn test_release_unknown_handle() {
        let previews = ObjectUrlPreviews::new();
        previews.release(PreviewHandle::new("preview:missing".to_string()));
        assert_eq!(previews.live_count(), 0);
    }
}
