use std::cell::RefCell;
use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};

use preview_core::is_textual_mime;
use thiserror::Error;

use crate::decode::{decode_text, DecodeError};

/// Current content of a resource: text for textual types, bytes otherwise.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResourceData {
    Text(String),
    Binary(Vec<u8>),
}

impl ResourceData {
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            ResourceData::Text(text) => text.as_bytes(),
            ResourceData::Binary(bytes) => bytes,
        }
    }

    pub fn into_bytes(self) -> Vec<u8> {
        match self {
            ResourceData::Text(text) => text.into_bytes(),
            ResourceData::Binary(bytes) => bytes,
        }
    }
}

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("unknown resource {0}")]
    UnknownName(String),
    #[error("path {0:?} is outside the container")]
    OutsideRoot(PathBuf),
    #[error("failed to read {name}: {source}")]
    Io {
        name: String,
        #[source]
        source: io::Error,
    },
    #[error("failed to decode {name}: {source}")]
    Decode {
        name: String,
        #[source]
        source: DecodeError,
    },
}

/// The editing session's view of the book: names, types and live content.
pub trait ResourceSource {
    /// Live editor buffer if one is open, else stored content.
    fn raw_data(&self, name: &str) -> Result<ResourceData, SourceError>;
    fn mime_type_of(&self, name: &str) -> Option<String>;
    fn has_name(&self, name: &str) -> bool;
    fn resolve_path(&self, path: &Path) -> Result<String, SourceError>;
    fn name_to_path(&self, name: &str) -> PathBuf;
}

/// A directory on disk with in-memory edit buffers layered on top.
///
/// Names are `/`-separated paths relative to the root.
#[derive(Debug)]
pub struct DirectoryContainer {
    root: PathBuf,
    buffers: RefCell<HashMap<String, String>>,
}

impl DirectoryContainer {
    pub fn open(root: impl AsRef<Path>) -> Result<Self, SourceError> {
        let root = root.as_ref();
        let root = root.canonicalize().map_err(|source| SourceError::Io {
            name: root.display().to_string(),
            source,
        })?;
        Ok(Self {
            root,
            buffers: RefCell::new(HashMap::new()),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Replaces the live content of `name` without touching the disk.
    pub fn set_buffer(&self, name: impl Into<String>, text: impl Into<String>) {
        self.buffers.borrow_mut().insert(name.into(), text.into());
    }

    pub fn discard_buffer(&self, name: &str) -> bool {
        self.buffers.borrow_mut().remove(name).is_some()
    }

    fn read_stored(&self, name: &str) -> Result<ResourceData, SourceError> {
        let path = self.name_to_path(name);
        let bytes = fs::read(&path).map_err(|source| {
            if source.kind() == io::ErrorKind::NotFound {
                SourceError::UnknownName(name.to_string())
            } else {
                SourceError::Io {
                    name: name.to_string(),
                    source,
                }
            }
        })?;
        match self.mime_type_of(name) {
            Some(mime) if is_textual_mime(&mime) => {
                let decoded =
                    decode_text(&bytes, Some(&mime)).map_err(|source| SourceError::Decode {
                        name: name.to_string(),
                        source,
                    })?;
                Ok(ResourceData::Text(decoded.text))
            }
            _ => Ok(ResourceData::Binary(bytes)),
        }
    }
}

impl ResourceSource for DirectoryContainer {
    fn raw_data(&self, name: &str) -> Result<ResourceData, SourceError> {
        if let Some(text) = self.buffers.borrow().get(name) {
            return Ok(ResourceData::Text(text.clone()));
        }
        self.read_stored(name)
    }

    fn mime_type_of(&self, name: &str) -> Option<String> {
        let ext = Path::new(name).extension()?.to_str()?.to_ascii_lowercase();
        mime_for_extension(&ext).map(str::to_string)
    }

    fn has_name(&self, name: &str) -> bool {
        !name.is_empty()
            && (self.buffers.borrow().contains_key(name) || self.name_to_path(name).is_file())
    }

    fn resolve_path(&self, path: &Path) -> Result<String, SourceError> {
        let normalized = path
            .canonicalize()
            .unwrap_or_else(|_| normalize_lexically(path));
        let relative = normalized
            .strip_prefix(&self.root)
            .map_err(|_| SourceError::OutsideRoot(path.to_path_buf()))?;
        let parts: Vec<&str> = relative
            .components()
            .filter_map(|component| match component {
                Component::Normal(part) => part.to_str(),
                _ => None,
            })
            .collect();
        if parts.is_empty() {
            return Err(SourceError::OutsideRoot(path.to_path_buf()));
        }
        Ok(parts.join("/"))
    }

    fn name_to_path(&self, name: &str) -> PathBuf {
        name.split('/')
            .filter(|part| !part.is_empty())
            .fold(self.root.clone(), |path, part| path.join(part))
    }
}

fn normalize_lexically(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

fn mime_for_extension(ext: &str) -> Option<&'static str> {
    let mime = match ext {
        "html" | "htm" => "text/html",
        "xhtml" | "xhtm" => "application/xhtml+xml",
        "css" => "text/css",
        "js" => "application/javascript",
        "svg" => "image/svg+xml",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "ttf" => "application/x-font-ttf",
        "otf" => "application/vnd.ms-opentype",
        "woff" => "application/font-woff",
        "woff2" => "font/woff2",
        "opf" => "application/oebps-package+xml",
        "ncx" => "application/x-dtbncx+xml",
        "xml" => "application/xml",
        "txt" => "text/plain",
        _ => return None,
    };
    Some(mime)
}
