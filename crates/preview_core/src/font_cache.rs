use std::collections::{BTreeMap, BTreeSet};

use preview_logging::{preview_debug, preview_info, preview_warn};
use thiserror::Error;

use crate::Fingerprint;

/// Handle returned by a successful font registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FontHandle(pub u32);

/// Application-level font registration primitive.
pub trait FontRegistrar {
    /// Registers a font payload; `None` means the payload was rejected.
    fn register(&mut self, bytes: &[u8]) -> Option<FontHandle>;
    fn families(&self, handle: FontHandle) -> Vec<String>;
    fn unregister(&mut self, handle: FontHandle);
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FontRegistrationError {
    #[error("font registrar rejected {length} byte payload")]
    Rejected { length: usize },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FontCacheEntry {
    pub byte_length: usize,
    pub content_hash: u64,
    pub registered_families: BTreeSet<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FontCacheStats {
    pub lookups: u64,
    pub registrations: u64,
}

/// Registers each distinct font payload once, keyed by content fingerprint.
///
/// Entries are never evicted individually; `release_all` drops them together
/// when the preview surface goes away.
pub struct FontRegistrationCache {
    registrar: Box<dyn FontRegistrar>,
    entries: BTreeMap<FontHandle, FontCacheEntry>,
    stats: FontCacheStats,
}

impl FontRegistrationCache {
    pub fn new(registrar: Box<dyn FontRegistrar>) -> Self {
        Self {
            registrar,
            entries: BTreeMap::new(),
            stats: FontCacheStats::default(),
        }
    }

    pub fn register_font(&mut self, bytes: &[u8]) -> Result<FontHandle, FontRegistrationError> {
        self.stats.lookups += 1;
        let fingerprint = Fingerprint::of(bytes);
        let existing = self.entries.iter().find_map(|(handle, entry)| {
            (entry.byte_length == fingerprint.length && entry.content_hash == fingerprint.hash)
                .then_some(*handle)
        });
        if let Some(handle) = existing {
            preview_debug!("Font payload already registered as {:?}", handle);
            return Ok(handle);
        }

        self.stats.registrations += 1;
        let Some(handle) = self.registrar.register(bytes) else {
            preview_warn!("Font registration failed for {} byte payload", bytes.len());
            return Err(FontRegistrationError::Rejected {
                length: bytes.len(),
            });
        };
        let registered_families = self
            .registrar
            .families(handle)
            .into_iter()
            .map(|family| family.to_lowercase())
            .collect();
        self.entries.insert(
            handle,
            FontCacheEntry {
                byte_length: fingerprint.length,
                content_hash: fingerprint.hash,
                registered_families,
            },
        );
        Ok(handle)
    }

    pub fn release_all(&mut self) {
        if self.entries.is_empty() {
            return;
        }
        preview_info!("Releasing {} registered fonts", self.entries.len());
        for handle in std::mem::take(&mut self.entries).into_keys() {
            self.registrar.unregister(handle);
        }
    }

    pub fn entry(&self, handle: FontHandle) -> Option<&FontCacheEntry> {
        self.entries.get(&handle)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Whether any registered font supplies `family` (case-insensitive).
    pub fn has_family(&self, family: &str) -> bool {
        let family = family.to_lowercase();
        self.entries
            .values()
            .any(|entry| entry.registered_families.contains(&family))
    }

    pub fn stats(&self) -> FontCacheStats {
        self.stats
    }
}

impl Drop for FontRegistrationCache {
    fn drop(&mut self) {
        self.release_all();
    }
}
