use std::cell::RefCell;
use std::rc::Rc;
use std::sync::Once;

use preview_core::{
    FontCacheStats, FontHandle, FontRegistrar, FontRegistrationCache, FontRegistrationError,
};

fn init_logging() {
    static INIT: Once = Once::new();
    INIT.call_once(preview_logging::initialize_for_tests);
}

#[derive(Default)]
struct Calls {
    registered: Vec<usize>,
    unregistered: Vec<FontHandle>,
}

/// Hands out sequential handles and rejects payloads starting with `0xFF`.
struct RecordingRegistrar {
    calls: Rc<RefCell<Calls>>,
    next: u32,
}

impl RecordingRegistrar {
    fn new() -> (Self, Rc<RefCell<Calls>>) {
        let calls = Rc::new(RefCell::new(Calls::default()));
        (
            Self {
                calls: calls.clone(),
                next: 0,
            },
            calls,
        )
    }
}

impl FontRegistrar for RecordingRegistrar {
    fn register(&mut self, bytes: &[u8]) -> Option<FontHandle> {
        self.calls.borrow_mut().registered.push(bytes.len());
        if bytes.first() == Some(&0xFF) {
            return None;
        }
        let handle = FontHandle(self.next);
        self.next += 1;
        Some(handle)
    }

    fn families(&self, handle: FontHandle) -> Vec<String> {
        vec![format!("Family {}", handle.0)]
    }

    fn unregister(&mut self, handle: FontHandle) {
        self.calls.borrow_mut().unregistered.push(handle);
    }
}

#[test]
fn identical_payload_registers_once() {
    init_logging();
    let (registrar, calls) = RecordingRegistrar::new();
    let mut cache = FontRegistrationCache::new(Box::new(registrar));

    let first = cache.register_font(b"font-bytes").unwrap();
    let second = cache.register_font(b"font-bytes").unwrap();

    assert_eq!(first, second);
    assert_eq!(calls.borrow().registered, vec![10]);
    assert_eq!(cache.len(), 1);
}

#[test]
fn interleaved_payloads_reuse_first_handle() {
    init_logging();
    let (registrar, calls) = RecordingRegistrar::new();
    let mut cache = FontRegistrationCache::new(Box::new(registrar));

    let ten = cache.register_font(b"0123456789").unwrap();
    let twelve = cache.register_font(b"0123456789AB").unwrap();
    let again = cache.register_font(b"0123456789").unwrap();

    assert_ne!(ten, twelve);
    assert_eq!(again, ten);
    assert_eq!(calls.borrow().registered, vec![10, 12]);
    assert_eq!(
        cache.stats(),
        FontCacheStats {
            lookups: 3,
            registrations: 2
        }
    );
}

#[test]
fn rejected_payload_is_not_cached() {
    init_logging();
    let (registrar, calls) = RecordingRegistrar::new();
    let mut cache = FontRegistrationCache::new(Box::new(registrar));

    let err = cache.register_font(&[0xFF, 1, 2]).unwrap_err();
    assert_eq!(err, FontRegistrationError::Rejected { length: 3 });
    assert!(cache.is_empty());

    // Not cached, so a retry reaches the registrar again.
    assert!(cache.register_font(&[0xFF, 1, 2]).is_err());
    assert_eq!(calls.borrow().registered.len(), 2);
}

#[test]
fn families_are_lowercased() {
    init_logging();
    let (registrar, _calls) = RecordingRegistrar::new();
    let mut cache = FontRegistrationCache::new(Box::new(registrar));

    let handle = cache.register_font(b"serif").unwrap();
    let entry = cache.entry(handle).unwrap();
    assert!(entry.registered_families.contains("family 0"));
    assert_eq!(entry.byte_length, 5);
    assert!(cache.has_family("FAMILY 0"));
    assert!(!cache.has_family("family 1"));
}

#[test]
fn release_all_unregisters_everything() {
    init_logging();
    let (registrar, calls) = RecordingRegistrar::new();
    let mut cache = FontRegistrationCache::new(Box::new(registrar));
    cache.register_font(b"a").unwrap();
    cache.register_font(b"b").unwrap();

    cache.release_all();
    assert!(cache.is_empty());
    assert_eq!(
        calls.borrow().unregistered,
        vec![FontHandle(0), FontHandle(1)]
    );

    // A released payload registers afresh.
    cache.register_font(b"a").unwrap();
    assert_eq!(calls.borrow().registered.len(), 3);
}

#[test]
fn drop_releases_fonts() {
    init_logging();
    let (registrar, calls) = RecordingRegistrar::new();
    {
        let mut cache = FontRegistrationCache::new(Box::new(registrar));
        cache.register_font(b"a").unwrap();
    }
    assert_eq!(calls.borrow().unregistered, vec![FontHandle(0)]);
}
