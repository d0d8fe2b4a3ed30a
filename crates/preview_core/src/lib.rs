//! Preview core: UI-thread state machines and content-addressed caches.
mod fingerprint;
mod font_cache;
mod lines;
mod mime;
mod reply;

pub use fingerprint::Fingerprint;
pub use font_cache::{
    FontCacheEntry, FontCacheStats, FontHandle, FontRegistrar, FontRegistrationCache,
    FontRegistrationError,
};
pub use lines::{LineIndex, LINE_NUMBER_ATTRIBUTE};
pub use mime::{is_textual_mime, MimeKind, DEFAULT_MIME};
pub use reply::{Reply, ReplySignal, ReplyState, ReplyStatus, HTML_CONTENT_TYPE};
