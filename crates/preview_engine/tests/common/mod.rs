#![allow(dead_code)]

use std::sync::{mpsc, Arc, Mutex, Once};
use std::thread;
use std::time::{Duration, Instant};

use preview_engine::{annotate_line_numbers, AnnotateError, Annotator, PreviewSettings};

pub fn init_logging() {
    static INIT: Once = Once::new();
    INIT.call_once(preview_logging::initialize_for_tests);
}

pub fn settings(debounce_ms: u64) -> PreviewSettings {
    PreviewSettings {
        debounce_interval: Duration::from_millis(debounce_ms),
        poll_interval: Duration::from_millis(5),
        refresh_interval: Duration::from_millis(30),
    }
}

/// Line-number annotator that records every payload it is handed.
#[derive(Clone, Default)]
pub struct RecordingAnnotator {
    pub calls: Arc<Mutex<Vec<Vec<u8>>>>,
    pub fail_on: Option<Vec<u8>>,
    pub refuse_connect: bool,
}

impl RecordingAnnotator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Calls other than the start-up warm-up document.
    pub fn parses(&self) -> Vec<Vec<u8>> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .skip(1)
            .cloned()
            .collect()
    }
}

impl Annotator for RecordingAnnotator {
    fn connect(&mut self) -> Result<(), AnnotateError> {
        if self.refuse_connect {
            return Err(AnnotateError::Remote {
                status: "refused".to_string(),
                stderr: "no worker process".to_string(),
            });
        }
        Ok(())
    }

    fn annotate(&mut self, raw: &[u8]) -> Result<Vec<u8>, AnnotateError> {
        self.calls.lock().unwrap().push(raw.to_vec());
        if self.fail_on.as_deref() == Some(raw) {
            return Err(AnnotateError::Remote {
                status: "exit status: 1".to_string(),
                stderr: "parser error".to_string(),
            });
        }
        Ok(annotate_line_numbers(std::str::from_utf8(raw).unwrap()))
    }
}

/// Line-number annotator that blocks on one payload until released.
pub struct GatedAnnotator {
    gate_on: Vec<u8>,
    entered: mpsc::Sender<()>,
    release: mpsc::Receiver<()>,
}

/// Returns the annotator, a receiver told when the gated payload arrives,
/// and a sender that lets it through.
pub fn gated_annotator(gate_on: &[u8]) -> (GatedAnnotator, mpsc::Receiver<()>, mpsc::Sender<()>) {
    let (entered, entered_rx) = mpsc::channel();
    let (release_tx, release) = mpsc::channel();
    let annotator = GatedAnnotator {
        gate_on: gate_on.to_vec(),
        entered,
        release,
    };
    (annotator, entered_rx, release_tx)
}

impl Annotator for GatedAnnotator {
    fn annotate(&mut self, raw: &[u8]) -> Result<Vec<u8>, AnnotateError> {
        if raw == self.gate_on.as_slice() {
            let _ = self.entered.send(());
            let _ = self.release.recv();
        }
        Ok(annotate_line_numbers(std::str::from_utf8(raw).unwrap()))
    }
}

pub fn wait_for(timeout: Duration, mut done: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if done() {
            return true;
        }
        thread::sleep(Duration::from_millis(5));
    }
    done()
}
