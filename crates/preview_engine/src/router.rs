use std::cell::RefCell;
use std::rc::{Rc, Weak};
use std::time::Duration;

use preview_core::{
    FontRegistrationCache, MimeKind, Reply, DEFAULT_MIME, HTML_CONTENT_TYPE,
};
use preview_logging::{preview_debug, preview_trace, preview_warn};
use url::Url;

use crate::event_loop::EventLoop;
use crate::parse_cache::ParseCache;
use crate::source::{ResourceData, ResourceSource, SourceError};
use crate::PreviewSettings;

/// Shared handle to a virtual reply; the fetch that created it owns it.
pub type ReplyHandle = Rc<RefCell<Reply>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Head,
    Get,
    Put,
    Post,
    Delete,
    Custom,
}

/// Outcome of intercepting a fetch.
pub enum Intercept {
    /// Not ours; the caller hands the request to its default network stack.
    NotHandled,
    Virtual(ReplyHandle),
}

impl Intercept {
    pub fn into_reply(self) -> Option<ReplyHandle> {
        match self {
            Intercept::Virtual(reply) => Some(reply),
            Intercept::NotHandled => None,
        }
    }
}

/// Answers the renderer's local reads from the editing session.
///
/// Documents are served from the parse cache once their annotated form is
/// ready; everything else is served from the source on the next tick.
#[derive(Clone)]
pub struct ResourceRouter {
    source: Rc<dyn ResourceSource>,
    parse_cache: ParseCache,
    fonts: Rc<RefCell<FontRegistrationCache>>,
    event_loop: EventLoop,
    poll_interval: Duration,
}

impl ResourceRouter {
    pub fn new(
        source: Rc<dyn ResourceSource>,
        parse_cache: ParseCache,
        fonts: Rc<RefCell<FontRegistrationCache>>,
        event_loop: EventLoop,
        settings: &PreviewSettings,
    ) -> Self {
        Self {
            source,
            parse_cache,
            fonts,
            event_loop,
            poll_interval: settings.poll_interval,
        }
    }

    pub fn create_request(&self, operation: Operation, url: &Url) -> Intercept {
        if operation != Operation::Get || url.scheme() != "file" {
            return Intercept::NotHandled;
        }
        let Some(name) = self.resolve(url) else {
            return Intercept::NotHandled;
        };
        match self.create_reply(&name) {
            Ok(reply) => Intercept::Virtual(reply),
            Err(err) => {
                preview_warn!("Falling back to default handling for {}: {}", name, err);
                Intercept::NotHandled
            }
        }
    }

    fn resolve(&self, url: &Url) -> Option<String> {
        // to_file_path drops the leading slash of Windows drive paths.
        let Ok(path) = url.to_file_path() else {
            preview_debug!("Not a local path: {}", url);
            return None;
        };
        match self.source.resolve_path(&path) {
            Ok(name) if self.source.has_name(&name) => Some(name),
            Ok(name) => {
                preview_debug!("No resource named {}", name);
                None
            }
            Err(err) => {
                preview_debug!("Could not resolve {}: {}", url, err);
                None
            }
        }
    }

    fn create_reply(&self, name: &str) -> Result<ReplyHandle, SourceError> {
        let mime = self
            .source
            .mime_type_of(name)
            .unwrap_or_else(|| DEFAULT_MIME.to_string());
        let kind = MimeKind::from_mime(&mime);

        if kind.is_document() {
            let reply = Rc::new(RefCell::new(Reply::new(name, kind)));
            self.schedule_poll(Rc::downgrade(&reply), Duration::ZERO);
            return Ok(reply);
        }

        let (mut payload, content_type) = match self.source.raw_data(name)? {
            ResourceData::Text(text) => (text.into_bytes(), format!("{mime}; charset=utf-8")),
            ResourceData::Binary(bytes) => (bytes, mime),
        };
        if kind == MimeKind::Font {
            if let Err(err) = self.fonts.borrow_mut().register_font(&payload) {
                preview_warn!("Font {} unavailable: {}", name, err);
            }
            // Embedded fonts are registered application-wide but never handed
            // to the renderer, which mishandles aliased font names.
            payload = Vec::new();
        }

        let mut ready = Reply::new(name, kind);
        ready.set_headers(content_type.clone(), payload.len() as u64);
        let reply = Rc::new(RefCell::new(ready));
        let weak = Rc::downgrade(&reply);
        self.event_loop.single_shot(Duration::ZERO, move || {
            let Some(reply) = weak.upgrade() else {
                return;
            };
            let mut reply = reply.borrow_mut();
            if reply.is_aborted() {
                return;
            }
            reply.finish(payload, content_type);
        });
        Ok(reply)
    }

    fn schedule_poll(&self, reply: Weak<RefCell<Reply>>, delay: Duration) {
        let router = self.clone();
        self.event_loop
            .single_shot(delay, move || router.poll_document(reply));
    }

    fn poll_document(&self, weak: Weak<RefCell<Reply>>) {
        // A dropped handle means the fetch is gone; stop polling.
        let Some(reply) = weak.upgrade() else {
            return;
        };
        if reply.borrow().is_aborted() {
            return;
        }
        let name = reply.borrow().resource_name().to_string();
        match self.parse_cache.fetch(&name) {
            Some(data) => {
                reply.borrow_mut().finish(data.to_vec(), HTML_CONTENT_TYPE);
            }
            None => {
                preview_trace!("{} not parsed yet", name);
                self.schedule_poll(weak, self.poll_interval);
            }
        }
    }
}
