use std::cell::RefCell;
use std::rc::{Rc, Weak};
use std::time::Duration;

use preview_core::{FontRegistrationCache, LineIndex};
use preview_logging::{preview_debug, preview_info, preview_trace, preview_warn};
use url::Url;

use crate::event_loop::{EventLoop, TimerId};
use crate::parse_cache::ParseCache;
use crate::router::ResourceRouter;
use crate::source::ResourceSource;
use crate::PreviewSettings;

#[derive(Debug, Default)]
struct SessionState {
    current_name: Option<String>,
    refresh_timer: Option<TimerId>,
    pending_reload: Option<Url>,
    sync_request: Option<(String, u32)>,
    sync_timer: Option<TimerId>,
    scroll_target: Option<u32>,
}

/// Delay between attempts to honor a postponed editor sync.
const SYNC_RETRY: Duration = Duration::from_millis(100);

/// Tracks which document is previewed and keeps its parse up to date.
///
/// All methods run on the UI thread.
pub struct PreviewSession {
    me: Weak<PreviewSession>,
    source: Rc<dyn ResourceSource>,
    parse_cache: ParseCache,
    fonts: Rc<RefCell<FontRegistrationCache>>,
    event_loop: EventLoop,
    router: ResourceRouter,
    refresh_interval: Duration,
    state: RefCell<SessionState>,
}

impl PreviewSession {
    pub fn new(
        source: Rc<dyn ResourceSource>,
        parse_cache: ParseCache,
        fonts: Rc<RefCell<FontRegistrationCache>>,
        event_loop: EventLoop,
        settings: &PreviewSettings,
    ) -> Rc<Self> {
        let router = ResourceRouter::new(
            source.clone(),
            parse_cache.clone(),
            fonts.clone(),
            event_loop.clone(),
            settings,
        );
        Rc::new_cyclic(|me| Self {
            me: me.clone(),
            source,
            parse_cache,
            fonts,
            event_loop,
            router,
            refresh_interval: settings.refresh_interval,
            state: RefCell::new(SessionState::default()),
        })
    }

    pub fn router(&self) -> &ResourceRouter {
        &self.router
    }

    pub fn current_name(&self) -> Option<String> {
        self.state.borrow().current_name.clone()
    }

    /// Switches the preview to `name`. Returns the URL to load, or `None` if
    /// `name` is already shown.
    pub fn show(&self, name: &str) -> Option<Url> {
        if self.state.borrow().current_name.as_deref() == Some(name) {
            return None;
        }
        self.stop_refresh_timer();
        self.state.borrow_mut().current_name = Some(name.to_string());
        self.submit(name);
        self.url_for(name)
    }

    /// Re-submits the current document. Unchanged content costs nothing.
    pub fn refresh(&self) -> Option<Url> {
        let name = self.current_name()?;
        self.stop_refresh_timer();
        self.submit(&name);
        self.url_for(&name)
    }

    pub fn clear(&self) {
        self.stop_refresh_timer();
        self.cancel_sync();
        let mut state = self.state.borrow_mut();
        state.current_name = None;
        state.pending_reload = None;
        state.scroll_target = None;
    }

    /// Arms a one-shot refresh, replacing any armed one.
    pub fn start_refresh_timer(&self) {
        if self.current_name().is_none() {
            return;
        }
        self.stop_refresh_timer();
        let me = self.me.clone();
        let id = self.event_loop.single_shot(self.refresh_interval, move || {
            let Some(session) = me.upgrade() else {
                return;
            };
            session.state.borrow_mut().refresh_timer = None;
            if let Some(url) = session.refresh() {
                session.state.borrow_mut().pending_reload = Some(url);
            }
        });
        self.state.borrow_mut().refresh_timer = Some(id);
    }

    pub fn stop_refresh_timer(&self) {
        let timer = self.state.borrow_mut().refresh_timer.take();
        if let Some(id) = timer {
            self.event_loop.cancel(id);
        }
    }

    pub fn is_refresh_pending(&self) -> bool {
        self.state.borrow().refresh_timer.is_some()
    }

    /// URL the renderer should reload after an automatic refresh fired.
    pub fn take_reload(&self) -> Option<Url> {
        self.state.borrow_mut().pending_reload.take()
    }

    /// Line marker to scroll to for editor line `line`, once parsed.
    pub fn go_to_line(&self, line: u32) -> Option<u32> {
        let name = self.current_name()?;
        let parsed = self.parse_cache.fetch(&name)?;
        LineIndex::from_annotated(&parsed).find(line)
    }

    /// Scrolls the preview to editor line `line` of `name` once the preview
    /// can follow: `name` is shown, no refresh is armed and its parse is in.
    /// Until then the request is retried, and a newer request replaces it.
    pub fn sync_to_line(&self, name: &str, line: u32) {
        self.cancel_sync();
        self.state.borrow_mut().sync_request = Some((name.to_string(), line));
        self.schedule_sync();
    }

    /// Marker the renderer should scroll to after a sync went through.
    pub fn take_scroll_target(&self) -> Option<u32> {
        self.state.borrow_mut().scroll_target.take()
    }

    pub fn is_sync_pending(&self) -> bool {
        self.state.borrow().sync_request.is_some()
    }

    fn schedule_sync(&self) {
        let me = self.me.clone();
        let id = self.event_loop.single_shot(SYNC_RETRY, move || {
            if let Some(session) = me.upgrade() {
                session.state.borrow_mut().sync_timer = None;
                session.attempt_sync();
            }
        });
        self.state.borrow_mut().sync_timer = Some(id);
    }

    fn attempt_sync(&self) {
        let (ready, line) = {
            let state = self.state.borrow();
            let Some((name, line)) = state.sync_request.clone() else {
                return;
            };
            let ready = state.refresh_timer.is_none()
                && state.current_name.as_deref() == Some(name.as_str())
                && self.parse_cache.fetch(&name).is_some();
            (ready, line)
        };
        if !ready {
            preview_trace!("Editor sync to line {} postponed", line);
            self.schedule_sync();
            return;
        }
        self.state.borrow_mut().sync_request = None;
        let target = self.go_to_line(line);
        self.state.borrow_mut().scroll_target = target;
    }

    fn cancel_sync(&self) {
        let mut state = self.state.borrow_mut();
        state.sync_request = None;
        if let Some(id) = state.sync_timer.take() {
            self.event_loop.cancel(id);
        }
    }

    /// Releases every font and forgets every parse. The session stays usable.
    pub fn teardown(&self) {
        self.clear();
        self.fonts.borrow_mut().release_all();
        self.parse_cache.clear();
        preview_info!("Preview session torn down");
    }

    fn submit(&self, name: &str) {
        match self.source.raw_data(name) {
            Ok(data) => {
                if self.parse_cache.submit(name, data.as_bytes()) {
                    preview_debug!("Queued parse of {}", name);
                }
            }
            Err(err) => preview_warn!("Cannot preview {}: {}", name, err),
        }
    }

    fn url_for(&self, name: &str) -> Option<Url> {
        let path = self.source.name_to_path(name);
        match Url::from_file_path(&path) {
            Ok(url) => Some(url),
            Err(()) => {
                preview_warn!("No file URL for {:?}", path);
                None
            }
        }
    }
}
