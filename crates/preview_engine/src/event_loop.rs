use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::Rc;
use std::thread;
use std::time::{Duration, Instant};

pub type TimerId = u64;

type Callback = Box<dyn FnOnce()>;

#[derive(Default)]
struct Timers {
    next_id: TimerId,
    queue: BTreeMap<(Instant, TimerId), Callback>,
}

/// Single-threaded timer queue standing in for the UI thread's event loop.
///
/// Callbacks run on whichever thread drives the loop and may schedule
/// further callbacks. Timers with equal deadlines fire in scheduling order.
#[derive(Clone, Default)]
pub struct EventLoop {
    timers: Rc<RefCell<Timers>>,
}

impl EventLoop {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn single_shot(&self, delay: Duration, callback: impl FnOnce() + 'static) -> TimerId {
        let mut timers = self.timers.borrow_mut();
        timers.next_id += 1;
        let id = timers.next_id;
        timers
            .queue
            .insert((Instant::now() + delay, id), Box::new(callback));
        id
    }

    pub fn cancel(&self, id: TimerId) -> bool {
        let mut timers = self.timers.borrow_mut();
        let key = timers.queue.keys().find(|(_, timer)| *timer == id).copied();
        key.and_then(|key| timers.queue.remove(&key)).is_some()
    }

    pub fn pending(&self) -> usize {
        self.timers.borrow().queue.len()
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        self.timers.borrow().queue.keys().next().map(|(at, _)| *at)
    }

    /// Runs every callback already due. Returns how many ran.
    pub fn run_pending(&self) -> usize {
        let now = Instant::now();
        let mut ran = 0;
        loop {
            let due = {
                let mut timers = self.timers.borrow_mut();
                let is_due = timers
                    .queue
                    .first_key_value()
                    .is_some_and(|(&(at, _), _)| at <= now);
                if is_due {
                    timers.queue.pop_first()
                } else {
                    None
                }
            };
            let Some((_, callback)) = due else {
                return ran;
            };
            callback();
            ran += 1;
        }
    }

    /// Drives the loop for `duration`, sleeping between deadlines.
    pub fn run_for(&self, duration: Duration) {
        self.run_until(duration, || false);
    }

    /// Drives the loop until `done` holds or `timeout` elapses.
    pub fn run_until(&self, timeout: Duration, mut done: impl FnMut() -> bool) -> bool {
        let deadline = Instant::now() + timeout;
        loop {
            self.run_pending();
            if done() {
                return true;
            }
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            let wake = self
                .next_deadline()
                .map_or(deadline, |next| next.min(deadline));
            thread::sleep(wake.saturating_duration_since(now));
        }
    }
}
