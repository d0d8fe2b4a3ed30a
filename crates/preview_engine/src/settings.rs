use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreviewSettings {
    /// Coalescing window the parse worker sleeps before draining requests.
    pub debounce_interval: Duration,
    /// Delay between readiness checks of a pending document reply.
    pub poll_interval: Duration,
    /// Delay before an auto-refresh re-submits the current document.
    pub refresh_interval: Duration,
}

impl Default for PreviewSettings {
    fn default() -> Self {
        Self {
            debounce_interval: Duration::from_secs(1),
            poll_interval: Duration::from_millis(10),
            refresh_interval: Duration::from_secs(2),
        }
    }
}
