use std::sync::Arc;
use std::time::{Duration, Instant};

use satchel_core::config::{QueueConfig, DEFAULT_MAXSIZE, DEFAULT_VT};
use satchel_core::error::SatchelError;
use satchel_core::store::{PushEntry, QueueStore};
use satchel_core::time::ManualTimeProvider;
use satchel_sqlite::Storage;

const BASE_US: i64 = 1_700_000_000_000_000;
const BASE_S: i64 = BASE_US / 1_000_000;
const BASE_MS: i64 = BASE_US / 1_000;

fn storage() -> (Storage, Arc<ManualTimeProvider>) {
    let clock = Arc::new(ManualTimeProvider::new(Instant::now(), BASE_US));
    let storage = Storage::open_in_memory()
        .expect("Failed to open storage")
        .with_clock(clock.clone());
    (storage, clock)
}

#[test]
fn test_create_queue_defaults() {
    let (storage, _) = storage();
    assert!(storage.create_queue("q", &QueueConfig::default()).unwrap());
    // Second creation reports the queue already existed.
    assert!(!storage.create_queue("q", &QueueConfig::default()).unwrap());

    let info = storage.queue_info("q").unwrap();
    assert_eq!(info.config.vt, DEFAULT_VT);
    assert_eq!(info.config.delay, 0);
    assert_eq!(info.config.maxsize, DEFAULT_MAXSIZE);
    assert_eq!(info.metadata.created, BASE_S);
    assert_eq!(info.metadata.modified, BASE_S);
    assert_eq!(info.metadata.totalsent, 0);
    assert_eq!(info.metadata.totalrecv, 0);
    assert_eq!(info.metadata.msgs, 0);
    assert_eq!(info.metadata.hiddenmsgs, 0);
}

#[test]
fn test_create_does_not_overwrite_config() {
    let (storage, _) = storage();
    let custom = QueueConfig {
        vt: 10,
        delay: 5,
        maxsize: 0,
        ..QueueConfig::default()
    };
    assert!(storage.create_queue("q", &custom).unwrap());
    assert!(!storage.create_queue("q", &QueueConfig::default()).unwrap());

    let info = storage.queue_info("q").unwrap();
    assert_eq!(info.config.vt, 10);
    assert_eq!(info.config.delay, 5);
    assert_eq!(info.config.maxsize, 0);
}

#[test]
fn test_push_then_get() {
    let (storage, _) = storage();
    let id = storage.push_message("q", b"foo", Some(0), None).unwrap();

    let msg = storage.get_message("q", None).unwrap().expect("a message");
    assert_eq!(msg.message_id, id);
    assert_eq!(msg.body, b"foo");
    assert_eq!(msg.rc, 1);
    assert_eq!(msg.sent, BASE_S);
    assert_eq!(msg.fr, BASE_MS);

    let info = storage.queue_info("q").unwrap();
    assert_eq!(info.metadata.totalsent, 1);
    assert_eq!(info.metadata.totalrecv, 1);
    assert_eq!(info.metadata.msgs, 1);
    // The received message is in flight, so it counts as hidden.
    assert_eq!(info.metadata.hiddenmsgs, 1);
}

#[test]
fn test_visibility_timeout_hides_message() {
    let (storage, clock) = storage();
    let id = storage.push_message("q", b"foo", None, None).unwrap();

    let first = storage.get_message("q", None).unwrap().expect("a message");
    assert_eq!(first.message_id, id);
    assert!(storage.get_message("q", None).unwrap().is_none());

    // Still hidden one second before the default timeout elapses.
    clock.advance(Duration::from_secs(59));
    assert!(storage.get_message("q", None).unwrap().is_none());

    clock.advance(Duration::from_secs(2));
    let again = storage.get_message("q", None).unwrap().expect("redelivery");
    assert_eq!(again.message_id, id);
    assert_eq!(again.rc, 2);
    // First-retrieval timestamp is set exactly once.
    assert_eq!(again.fr, first.fr);
}

#[test]
fn test_get_vt_override() {
    let (storage, clock) = storage();
    storage.push_message("q", b"foo", None, None).unwrap();

    storage.get_message("q", Some(10)).unwrap().expect("a message");
    clock.advance(Duration::from_secs(9));
    assert!(storage.get_message("q", None).unwrap().is_none());
    clock.advance(Duration::from_secs(2));
    assert!(storage.get_message("q", None).unwrap().is_some());
}

#[test]
fn test_delete_is_idempotent() {
    let (storage, _) = storage();
    let id = storage.push_message("q", b"foo", None, None).unwrap();

    storage.delete_message("q", &id).unwrap();
    let info = storage.queue_info("q").unwrap();
    assert_eq!(info.metadata.msgs, 0);
    assert_eq!(info.metadata.totalsent, 1);

    // Deleting again, or deleting on an unknown queue, is a no-op.
    storage.delete_message("q", &id).unwrap();
    storage.delete_message("nosuchqueue", &id).unwrap();
    let info = storage.queue_info("q").unwrap();
    assert_eq!(info.metadata.msgs, 0);
    assert_eq!(info.metadata.totalsent, 1);
}

#[test]
fn test_delayed_delivery_with_override() {
    let (storage, clock) = storage();
    let config = QueueConfig {
        vt: 10,
        delay: 10,
        maxsize: 0,
        ..QueueConfig::default()
    };
    assert!(storage.create_queue("q2", &config).unwrap());

    // "a" uses the queue delay; "b" overrides it to zero.
    storage.push_message("q2", b"a", None, None).unwrap();
    storage.push_message("q2", b"b", Some(0), None).unwrap();

    let msg = storage.get_message("q2", None).unwrap().expect("b visible");
    assert_eq!(msg.body, b"b");
    assert!(storage.get_message("q2", None).unwrap().is_none());

    let info = storage.queue_info("q2").unwrap();
    assert_eq!(info.metadata.msgs, 2);
    assert_eq!(info.metadata.hiddenmsgs, 2);

    clock.advance(Duration::from_secs(10));
    let msg = storage.get_message("q2", None).unwrap().expect("a visible");
    assert_eq!(msg.body, b"a");
}

#[test]
fn test_pop_returns_rc_one_and_deletes() {
    let (storage, _) = storage();
    storage.push_message("q", b"foo", None, None).unwrap();

    let msg = storage.pop_message("q").unwrap().expect("a message");
    assert_eq!(msg.body, b"foo");
    assert_eq!(msg.rc, 1);
    assert_eq!(msg.fr, BASE_MS);

    assert!(storage.pop_message("q").unwrap().is_none());
    let info = storage.queue_info("q").unwrap();
    assert_eq!(info.metadata.msgs, 0);
    assert_eq!(info.metadata.totalrecv, 1);
}

#[test]
fn test_pop_skips_hidden_messages() {
    let (storage, _) = storage();
    storage.push_message("q", b"later", Some(30), None).unwrap();
    assert!(storage.pop_message("q").unwrap().is_none());
}

#[test]
fn test_id_ordering_matches_push_order() {
    let (storage, clock) = storage();
    let mut ids = Vec::with_capacity(1000);
    for _ in 0..1000 {
        ids.push(storage.push_message("q", b"x", None, None).unwrap());
        clock.advance(Duration::from_micros(1));
    }
    let mut sorted = ids.clone();
    sorted.sort();
    assert_eq!(ids, sorted);
}

#[test]
fn test_invalid_queue_names() {
    let (storage, _) = storage();
    assert!(matches!(
        storage.create_queue("", &QueueConfig::default()),
        Err(SatchelError::InvalidQueueName)
    ));
    assert!(matches!(
        storage.create_queue(&"a".repeat(161), &QueueConfig::default()),
        Err(SatchelError::QueueNameTooLong(160))
    ));
    assert!(matches!(
        storage.create_queue("bad@name", &QueueConfig::default()),
        Err(SatchelError::InvalidCharacter('@'))
    ));
}

#[test]
fn test_push_exceeding_maxsize_fails() {
    let (storage, _) = storage();
    let config = QueueConfig {
        maxsize: 8,
        ..QueueConfig::default()
    };
    assert!(storage.create_queue("small", &config).unwrap());
    assert!(matches!(
        storage.push_message("small", b"123456789", None, None),
        Err(SatchelError::MessageTooLarge { size: 9, maxsize: 8 })
    ));
    // maxsize 0 means unbounded.
    let config = QueueConfig {
        maxsize: 0,
        ..QueueConfig::default()
    };
    assert!(storage.create_queue("big", &config).unwrap());
    storage
        .push_message("big", &vec![0u8; 1 << 20], None, None)
        .unwrap();
}

#[test]
fn test_push_auto_creates_queue() {
    let (storage, _) = storage();
    storage.push_message("fresh", b"foo", None, None).unwrap();
    assert!(storage.list_queues().unwrap().contains("fresh"));
    let info = storage.describe_queue("fresh").unwrap();
    assert_eq!(info.config.vt, DEFAULT_VT);
    assert_eq!(info.metadata.totalsent, 1);
}

#[test]
fn test_get_on_unknown_queue_returns_none() {
    let (storage, _) = storage();
    assert!(storage.get_message("nothere", None).unwrap().is_none());
    assert!(storage.pop_message("nothere").unwrap().is_none());
    // Reads do not create queues; only queue_info and push do.
    assert!(storage.list_queues().unwrap().is_empty());
}

#[test]
fn test_describe_queue_is_strict() {
    let (storage, _) = storage();
    assert!(matches!(
        storage.describe_queue("missing"),
        Err(SatchelError::QueueDoesNotExist(name)) if name == "missing"
    ));
    // queue_info creates on read; describe sees it afterwards.
    storage.queue_info("missing").unwrap();
    assert!(storage.describe_queue("missing").is_ok());
}

#[test]
fn test_setters_bump_modified() {
    let (storage, clock) = storage();
    assert!(storage.create_queue("q", &QueueConfig::default()).unwrap());

    clock.advance(Duration::from_secs(5));
    storage.set_queue_vt("q", 20).unwrap();
    let info = storage.queue_info("q").unwrap();
    assert_eq!(info.config.vt, 20);
    assert_eq!(info.metadata.created, BASE_S);
    assert_eq!(info.metadata.modified, BASE_S + 5);

    clock.advance(Duration::from_secs(1));
    storage.set_queue_delay("q", 7).unwrap();
    storage.set_queue_maxsize("q", 1024).unwrap();
    let info = storage.queue_info("q").unwrap();
    assert_eq!(info.config.delay, 7);
    assert_eq!(info.config.maxsize, 1024);
    assert_eq!(info.metadata.modified, BASE_S + 6);

    assert!(matches!(
        storage.set_queue_vt("missing", 20),
        Err(SatchelError::QueueDoesNotExist(_))
    ));
}

#[test]
fn test_interval_bounds_enforced() {
    let (storage, _) = storage();
    assert!(matches!(
        storage.set_queue_vt("q", 10_000_000),
        Err(SatchelError::ValueTooHigh(9_999_999))
    ));
    assert!(matches!(
        storage.push_message("q", b"x", Some(10_000_000), None),
        Err(SatchelError::ValueTooHigh(9_999_999))
    ));
}

#[test]
fn test_push_many_is_all_or_nothing() {
    let (storage, _) = storage();
    let config = QueueConfig {
        maxsize: 8,
        ..QueueConfig::default()
    };
    assert!(storage.create_queue("q", &config).unwrap());

    let entries = vec![
        PushEntry {
            body: b"ok".to_vec(),
            ..PushEntry::default()
        },
        PushEntry {
            body: b"way too large".to_vec(),
            ..PushEntry::default()
        },
    ];
    assert!(matches!(
        storage.push_many("q", &entries),
        Err(SatchelError::MessageTooLarge { .. })
    ));
    let info = storage.queue_info("q").unwrap();
    assert_eq!(info.metadata.msgs, 0);
    assert_eq!(info.metadata.totalsent, 0);

    let entries = vec![
        PushEntry {
            body: b"one".to_vec(),
            ..PushEntry::default()
        },
        PushEntry {
            body: b"two".to_vec(),
            ..PushEntry::default()
        },
    ];
    let ids = storage.push_many("q", &entries).unwrap();
    assert_eq!(ids.len(), 2);
    assert!(ids[0] < ids[1]);
    let info = storage.queue_info("q").unwrap();
    assert_eq!(info.metadata.msgs, 2);
    assert_eq!(info.metadata.totalsent, 2);
}

#[test]
fn test_user_metadata_survives_roundtrip() {
    use satchel_core::codec::{FieldValue, Metadata};

    let (storage, _) = storage();
    let mut metadata = Metadata::new();
    metadata.insert("origin".to_string(), FieldValue::Str("api".to_string()));
    storage
        .push_message("q", b"foo", None, Some(metadata))
        .unwrap();

    let msg = storage.get_message("q", None).unwrap().expect("a message");
    assert_eq!(
        msg.metadata.get("origin"),
        Some(&FieldValue::Str("api".to_string()))
    );
    assert_eq!(msg.metadata.get("sent"), Some(&FieldValue::Int(BASE_S)));
}

#[test]
fn test_delete_queue_erases_messages() {
    let (storage, _) = storage();
    storage.push_message("q", b"foo", None, None).unwrap();
    storage.delete_queue("q").unwrap();
    assert!(storage.list_queues().unwrap().is_empty());

    // Recreating starts from a clean slate.
    let info = storage.queue_info("q").unwrap();
    assert_eq!(info.metadata.totalsent, 0);
    assert_eq!(info.metadata.msgs, 0);

    // Deleting an unknown queue is a no-op.
    storage.delete_queue("neverexisted").unwrap();
}

#[test]
fn test_counters_follow_operations() {
    let (storage, _) = storage();
    for body in [b"a", b"b", b"c"] {
        storage.push_message("q", body, None, None).unwrap();
    }
    let got = storage.get_message("q", None).unwrap().expect("a message");
    storage.pop_message("q").unwrap().expect("a message");
    storage.delete_message("q", &got.message_id).unwrap();

    let info = storage.queue_info("q").unwrap();
    assert_eq!(info.metadata.totalsent, 3);
    assert_eq!(info.metadata.totalrecv, 2);
    assert_eq!(info.metadata.msgs, 1);
}

#[test]
fn test_messages_survive_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("broker.db");

    let id = {
        let storage = Storage::open(&path).unwrap();
        storage.push_message("q", b"durable", None, None).unwrap()
    };

    let storage = Storage::open(&path).unwrap();
    let msg = storage.get_message("q", None).unwrap().expect("a message");
    assert_eq!(msg.message_id, id);
    assert_eq!(msg.body, b"durable");
}
