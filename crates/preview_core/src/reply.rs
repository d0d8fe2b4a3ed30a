use crate::MimeKind;

/// Content type of every annotated document served to the renderer.
pub const HTML_CONTENT_TYPE: &str = "text/html; charset=utf-8";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplyState {
    Pending,
    Ready,
    Aborted,
}

/// Completion notifications, emitted once and in declaration order when a
/// reply becomes ready.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplySignal {
    MetaDataChanged,
    DownloadProgress { received: u64, total: u64 },
    ReadyRead,
    Finished,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplyStatus {
    pub code: u16,
    pub reason: &'static str,
}

/// An in-flight virtual response for one resource fetch.
///
/// Transitions are one-way: `Pending -> Ready` or `Pending | Ready -> Aborted`.
/// Once aborted nothing else changes and no signal is emitted.
#[derive(Debug)]
pub struct Reply {
    resource_name: String,
    mime_kind: MimeKind,
    state: ReplyState,
    aborted: bool,
    payload: Option<Vec<u8>>,
    content_type: Option<String>,
    content_length: Option<u64>,
    status: Option<ReplyStatus>,
    signals: Vec<ReplySignal>,
}

impl Reply {
    pub fn new(resource_name: impl Into<String>, mime_kind: MimeKind) -> Self {
        Self {
            resource_name: resource_name.into(),
            mime_kind,
            state: ReplyState::Pending,
            aborted: false,
            payload: None,
            content_type: None,
            content_length: None,
            status: None,
            signals: Vec::new(),
        }
    }

    pub fn resource_name(&self) -> &str {
        &self.resource_name
    }

    pub fn mime_kind(&self) -> MimeKind {
        self.mime_kind
    }

    pub fn state(&self) -> ReplyState {
        self.state
    }

    pub fn is_aborted(&self) -> bool {
        self.aborted
    }

    pub fn is_finished(&self) -> bool {
        self.state == ReplyState::Ready
    }

    pub fn content_type(&self) -> Option<&str> {
        self.content_type.as_deref()
    }

    pub fn content_length(&self) -> Option<u64> {
        self.content_length
    }

    pub fn status(&self) -> Option<&ReplyStatus> {
        self.status.as_ref()
    }

    /// Declares the headers ahead of the payload. Emits nothing; only a
    /// pending reply accepts them.
    pub fn set_headers(&mut self, content_type: impl Into<String>, content_length: u64) -> bool {
        if self.aborted || self.state != ReplyState::Pending {
            return false;
        }
        self.content_type = Some(content_type.into());
        self.content_length = Some(content_length);
        true
    }

    /// Sets headers and payload, moves to `Ready` and queues the completion
    /// signals. Returns `false` without touching anything unless pending.
    pub fn finish(&mut self, payload: Vec<u8>, content_type: impl Into<String>) -> bool {
        if self.aborted || self.state != ReplyState::Pending {
            return false;
        }
        let total = payload.len() as u64;
        self.content_type = Some(content_type.into());
        self.content_length = Some(total);
        self.payload = Some(payload);
        self.status = Some(ReplyStatus {
            code: 200,
            reason: "Ok",
        });
        self.state = ReplyState::Ready;
        self.signals.extend([
            ReplySignal::MetaDataChanged,
            ReplySignal::DownloadProgress {
                received: total,
                total,
            },
            ReplySignal::ReadyRead,
            ReplySignal::Finished,
        ]);
        true
    }

    pub fn abort(&mut self) {
        self.aborted = true;
        self.state = ReplyState::Aborted;
    }

    pub fn is_sequential(&self) -> bool {
        true
    }

    pub fn bytes_available(&self) -> usize {
        self.payload.as_ref().map_or(0, Vec::len)
    }

    /// Consumes up to `max_len` bytes from the front of the payload.
    pub fn read(&mut self, max_len: usize) -> Vec<u8> {
        match self.payload.as_mut() {
            Some(payload) => {
                let take = max_len.min(payload.len());
                payload.drain(..take).collect()
            }
            None => Vec::new(),
        }
    }

    pub fn read_all(&mut self) -> Vec<u8> {
        self.read(usize::MAX)
    }

    /// Drains the signals emitted since the last call.
    pub fn take_signals(&mut self) -> Vec<ReplySignal> {
        std::mem::take(&mut self.signals)
    }
}

#[cfg(test)]
mod tests {
    use super::{Reply, ReplySignal, ReplyState, HTML_CONTENT_TYPE};
    use crate::MimeKind;

    #[test]
    fn finish_emits_signals_once_in_order() {
        let mut reply = Reply::new("doc.html", MimeKind::Document);
        assert!(reply.finish(b"<p>a</p>".to_vec(), HTML_CONTENT_TYPE));
        assert!(!reply.finish(b"again".to_vec(), HTML_CONTENT_TYPE));

        assert_eq!(
            reply.take_signals(),
            vec![
                ReplySignal::MetaDataChanged,
                ReplySignal::DownloadProgress {
                    received: 8,
                    total: 8
                },
                ReplySignal::ReadyRead,
                ReplySignal::Finished,
            ]
        );
        assert!(reply.take_signals().is_empty());
        assert_eq!(reply.content_length(), Some(8));
        assert_eq!(reply.status().map(|s| s.code), Some(200));
    }

    #[test]
    fn headers_can_precede_the_payload() {
        let mut reply = Reply::new("cover.png", MimeKind::Image);
        assert!(reply.set_headers("image/png", 4));
        assert_eq!(reply.content_type(), Some("image/png"));
        assert_eq!(reply.content_length(), Some(4));
        assert_eq!(reply.state(), ReplyState::Pending);
        assert!(reply.take_signals().is_empty());

        reply.abort();
        assert!(!reply.set_headers("text/plain", 1));
        assert_eq!(reply.content_type(), Some("image/png"));
    }

    #[test]
    fn read_consumes_prefix() {
        let mut reply = Reply::new("style.css", MimeKind::Stylesheet);
        reply.finish(b"abcdef".to_vec(), "text/css; charset=utf-8");
        assert_eq!(reply.read(4), b"abcd");
        assert_eq!(reply.bytes_available(), 2);
        assert_eq!(reply.read(10), b"ef");
        assert_eq!(reply.bytes_available(), 0);
        assert!(reply.read(10).is_empty());
    }

    #[test]
    fn pending_reply_has_nothing_to_read() {
        let mut reply = Reply::new("doc.html", MimeKind::Document);
        assert!(reply.is_sequential());
        assert_eq!(reply.bytes_available(), 0);
        assert!(reply.read(16).is_empty());
        assert_eq!(reply.content_type(), None);
    }

    #[test]
    fn abort_blocks_finish() {
        let mut reply = Reply::new("doc.html", MimeKind::Document);
        reply.abort();
        assert!(!reply.finish(b"late".to_vec(), HTML_CONTENT_TYPE));
        assert_eq!(reply.state(), ReplyState::Aborted);
        assert!(reply.take_signals().is_empty());
        assert_eq!(reply.bytes_available(), 0);
    }
}
