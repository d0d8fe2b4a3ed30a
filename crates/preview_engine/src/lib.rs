//! Preview engine: background parsing and virtual resource serving.
mod annotate;
mod decode;
mod event_loop;
mod parse_cache;
mod router;
mod session;
mod settings;
mod source;

pub use annotate::{
    annotate_line_numbers, AnnotateError, Annotator, LineNumberAnnotator, ProcessAnnotator,
};
pub use decode::{decode_text, DecodeError, DecodedText};
pub use event_loop::{EventLoop, TimerId};
pub use parse_cache::{ParseCache, ParseEntry};
pub use router::{Intercept, Operation, ReplyHandle, ResourceRouter};
pub use session::PreviewSession;
pub use settings::PreviewSettings;
pub use source::{DirectoryContainer, ResourceData, ResourceSource, SourceError};
