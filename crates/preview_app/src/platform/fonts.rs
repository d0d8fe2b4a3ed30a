use std::collections::HashMap;

use preview_core::{FontHandle, FontRegistrar};
use preview_logging::{preview_debug, preview_warn};
use ttf_parser::{name_id, Face};

/// Registrar that accepts any font `ttf-parser` can read and reports the
/// family names from its `name` table.
#[derive(Debug, Default)]
pub(crate) struct TtfFontRegistrar {
    next_handle: u32,
    families: HashMap<FontHandle, Vec<String>>,
}

impl FontRegistrar for TtfFontRegistrar {
    fn register(&mut self, data: &[u8]) -> Option<FontHandle> {
        let face = match Face::parse(data, 0) {
            Ok(face) => face,
            Err(err) => {
                preview_warn!("Font data rejected: {}", err);
                return None;
            }
        };
        let families = family_names(&face);
        self.next_handle += 1;
        let handle = FontHandle(self.next_handle);
        preview_debug!("Registered font {:?} as {:?}", families, handle);
        self.families.insert(handle, families);
        Some(handle)
    }

    fn families(&self, handle: FontHandle) -> Vec<String> {
        self.families.get(&handle).cloned().unwrap_or_default()
    }

    fn unregister(&mut self, handle: FontHandle) {
        self.families.remove(&handle);
    }
}

fn family_names(face: &Face<'_>) -> Vec<String> {
    let mut names: Vec<String> = face
        .names()
        .into_iter()
        .filter(|name| name.name_id == name_id::FAMILY && name.is_unicode())
        .filter_map(|name| name.to_string())
        .collect();
    names.sort();
    names.dedup();
    names
}
