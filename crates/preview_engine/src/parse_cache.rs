//! Cache of annotated documents, fed by a single debounced parse worker.
//!
//! The worker wakes once per debounce window, drains everything queued and
//! parses only the most recently submitted request, whatever resource it
//! names. This assumes a single resource is being previewed at a time: with
//! several live documents, all but the most recently touched one would be
//! starved until it is submitted again.

use std::collections::HashMap;
use std::io;
use std::sync::{mpsc, Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use preview_core::Fingerprint;
use preview_logging::{preview_debug, preview_error, preview_info, preview_warn};

use crate::annotate::Annotator;
use crate::PreviewSettings;

/// Sent once when the worker starts, to bring the annotator up.
const WARM_UP_DOCUMENT: &[u8] = b"<p></p>";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseEntry {
    pub name: String,
    pub fingerprint: Fingerprint,
    /// Annotated markup for exactly the bytes `fingerprint` describes.
    pub parsed_data: Option<Arc<[u8]>>,
    id: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct EntryRef {
    name: String,
    id: u64,
    fingerprint: Fingerprint,
}

#[derive(Debug)]
struct QueuedRequest {
    sequence: u64,
    entry: EntryRef,
    data: Vec<u8>,
}

impl QueuedRequest {
    fn name(&self) -> &str {
        &self.entry.name
    }
}

#[derive(Debug)]
enum WorkerCommand {
    Parse(QueuedRequest),
    Shutdown,
}

/// What the worker does with one drained batch.
#[derive(Debug)]
enum Batch {
    Shutdown,
    Parse {
        request: QueuedRequest,
        skipped: usize,
    },
}

#[derive(Debug, Default)]
struct Entries {
    items: HashMap<String, ParseEntry>,
    next_sequence: u64,
    next_id: u64,
}

struct Shared {
    entries: Arc<Mutex<Entries>>,
    requests: mpsc::Sender<WorkerCommand>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

/// Handle to the parse cache and its background worker.
///
/// Cheap to clone; every clone talks to the same worker.
#[derive(Clone)]
pub struct ParseCache {
    shared: Arc<Shared>,
}

impl ParseCache {
    pub fn start(annotator: Box<dyn Annotator>, settings: &PreviewSettings) -> io::Result<Self> {
        let (requests, rx) = mpsc::channel();
        let entries = Arc::new(Mutex::new(Entries::default()));
        let worker_entries = entries.clone();
        let debounce = settings.debounce_interval;

        let handle = thread::Builder::new()
            .name("preview-parse".to_string())
            .spawn(move || run_worker(annotator, rx, worker_entries, debounce))?;

        Ok(Self {
            shared: Arc::new(Shared {
                entries,
                requests,
                worker: Mutex::new(Some(handle)),
            }),
        })
    }

    /// Records the current bytes of `name` and queues a parse if they changed.
    ///
    /// Returns whether a request was queued. A queued request is not a
    /// promise of a parse: the worker may coalesce it away.
    pub fn submit(&self, name: &str, raw: &[u8]) -> bool {
        let fingerprint = Fingerprint::of(raw);
        let mut entries = lock(&self.shared.entries);
        let Entries {
            items,
            next_sequence,
            next_id,
        } = &mut *entries;

        if items
            .get(name)
            .is_some_and(|entry| entry.fingerprint == fingerprint)
        {
            return false;
        }
        let entry = items.entry(name.to_string()).or_insert_with(|| {
            *next_id += 1;
            ParseEntry {
                name: name.to_string(),
                fingerprint,
                parsed_data: None,
                id: *next_id,
            }
        });
        entry.parsed_data = None;
        entry.fingerprint = fingerprint;

        let sequence = *next_sequence;
        *next_sequence += 1;
        let request = QueuedRequest {
            sequence,
            entry: EntryRef {
                name: entry.name.clone(),
                id: entry.id,
                fingerprint,
            },
            data: raw.to_vec(),
        };
        // Sent under the lock so queue order always matches sequence order.
        if self
            .shared
            .requests
            .send(WorkerCommand::Parse(request))
            .is_err()
        {
            preview_debug!("Parse worker gone; request {} for {} dropped", sequence, name);
        }
        true
    }

    pub fn fetch(&self, name: &str) -> Option<Arc<[u8]>> {
        lock(&self.shared.entries)
            .items
            .get(name)
            .and_then(|entry| entry.parsed_data.clone())
    }

    pub fn entry(&self, name: &str) -> Option<ParseEntry> {
        lock(&self.shared.entries).items.get(name).cloned()
    }

    pub fn len(&self) -> usize {
        lock(&self.shared.entries).items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Forgets every entry. Results still in flight for them are discarded.
    pub fn clear(&self) {
        lock(&self.shared.entries).items.clear();
    }

    /// Asks the worker to tear down its annotator and exit after its current batch.
    pub fn shutdown(&self) {
        let _ = self.shared.requests.send(WorkerCommand::Shutdown);
    }

    /// Waits for the worker thread to exit. Call `shutdown` first.
    pub fn join(&self) {
        let handle = lock(&self.shared.worker).take();
        if let Some(handle) = handle {
            if handle.join().is_err() {
                preview_error!("Parse worker panicked");
            }
        }
    }

    pub fn is_alive(&self) -> bool {
        lock(&self.shared.worker)
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn run_worker(
    mut annotator: Box<dyn Annotator>,
    rx: mpsc::Receiver<WorkerCommand>,
    entries: Arc<Mutex<Entries>>,
    debounce: Duration,
) {
    let started = annotator
        .connect()
        .and_then(|()| annotator.annotate(WARM_UP_DOCUMENT).map(drop));
    if let Err(err) = started {
        preview_error!("Parse worker failed to start annotator: {}", err);
        return;
    }
    preview_info!("Parse worker started (debounce {:?})", debounce);

    loop {
        thread::sleep(debounce);
        let Ok(first) = rx.recv() else {
            preview_debug!("Parse cache dropped; worker exiting");
            annotator.shutdown();
            return;
        };
        let mut batch = vec![first];
        batch.extend(rx.try_iter());

        let (request, skipped) = match coalesce(batch) {
            Batch::Shutdown => {
                preview_info!("Parse worker shutting down");
                annotator.shutdown();
                return;
            }
            Batch::Parse { request, skipped } => (request, skipped),
        };
        if skipped > 0 {
            preview_debug!(
                "Coalesced {} older requests into #{} ({})",
                skipped,
                request.sequence,
                request.name()
            );
        }

        match annotator.annotate(&request.data) {
            Ok(parsed) => store_result(&entries, &request.entry, parsed),
            Err(err) => preview_warn!("Parse of {} failed: {}", request.name(), err),
        }
    }
}

/// Keeps the newest request of a batch, or shuts down if asked to.
fn coalesce(batch: Vec<WorkerCommand>) -> Batch {
    let mut newest: Option<QueuedRequest> = None;
    let mut skipped = 0;
    for command in batch {
        match command {
            WorkerCommand::Shutdown => return Batch::Shutdown,
            WorkerCommand::Parse(request) => {
                if newest
                    .as_ref()
                    .is_some_and(|current| current.sequence > request.sequence)
                {
                    skipped += 1;
                    continue;
                }
                if newest.replace(request).is_some() {
                    skipped += 1;
                }
            }
        }
    }
    match newest {
        Some(request) => Batch::Parse { request, skipped },
        None => Batch::Shutdown,
    }
}

fn store_result(entries: &Mutex<Entries>, target: &EntryRef, parsed: Vec<u8>) {
    let mut entries = lock(entries);
    match entries.items.get_mut(&target.name) {
        Some(entry) if entry.id == target.id && entry.fingerprint == target.fingerprint => {
            preview_debug!("Parsed {} ({} bytes)", target.name, parsed.len());
            entry.parsed_data = Some(Arc::from(parsed));
        }
        Some(_) => preview_debug!("Discarding stale parse of {}", target.name),
        None => preview_debug!("Discarding parse of cleared {}", target.name),
    }
}

#[cfg(test)]
mod tests {
    use super::{coalesce, Batch, EntryRef, QueuedRequest, WorkerCommand};
    use preview_core::Fingerprint;

    fn request(sequence: u64, name: &str) -> WorkerCommand {
        WorkerCommand::Parse(QueuedRequest {
            sequence,
            entry: EntryRef {
                name: name.to_string(),
                id: 1,
                fingerprint: Fingerprint::of(name.as_bytes()),
            },
            data: name.as_bytes().to_vec(),
        })
    }

    #[test]
    fn newest_request_wins_across_names() {
        let batch = vec![request(3, "a.html"), request(7, "b.html"), request(5, "a.html")];
        match coalesce(batch) {
            Batch::Parse { request, skipped } => {
                assert_eq!(request.sequence, 7);
                assert_eq!(request.name(), "b.html");
                assert_eq!(skipped, 2);
            }
            Batch::Shutdown => panic!("unexpected shutdown"),
        }
    }

    #[test]
    fn shutdown_anywhere_in_batch_wins() {
        let batch = vec![request(1, "a.html"), WorkerCommand::Shutdown, request(2, "a.html")];
        assert!(matches!(coalesce(batch), Batch::Shutdown));
    }

    #[test]
    fn single_request_is_kept() {
        match coalesce(vec![request(0, "a.html")]) {
            Batch::Parse { request, skipped } => {
                assert_eq!(request.sequence, 0);
                assert_eq!(skipped, 0);
            }
            Batch::Shutdown => panic!("unexpected shutdown"),
        }
    }
}
