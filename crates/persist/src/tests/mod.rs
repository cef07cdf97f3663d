//! End-to-end scenarios against live local overlay nodes.
//!
//! Every test opens its own node on an ephemeral port (`dht://:0/...`), so
//! the suite runs in parallel without port contention; the multi-node
//! cases wire nodes together over loopback.

use std::time::Duration;

use atomspace::atom::{Atom, Handle};
use atomspace::space::AtomSpace;
use atomspace::value::Value;
use overlay::{InfoHash, Record};

use crate::codec;
use crate::policy::SPACE_ID;
use crate::{DhtStorage, StorageError};

fn open(space: &str) -> DhtStorage {
    DhtStorage::open(&format!("dht://:0/{space}")).unwrap()
}

fn tv_key() -> Handle {
    Atom::node("Predicate", "*-TruthValueKey-*")
}

/// `(Evaluation (Predicate "blort") (List (Concept "foo") (Concept "bar")))`
fn evaluation() -> Handle {
    Atom::link(
        "Evaluation",
        vec![
            Atom::node("Predicate", "blort"),
            Atom::link(
                "List",
                vec![Atom::node("Concept", "foo"), Atom::node("Concept", "bar")],
            ),
        ],
    )
}

#[test]
fn store_and_fetch_node() {
    let store = open("scenario-node");
    let foobar = Atom::node("Concept", "foobar");
    store.store_atom(&foobar).unwrap();
    store.barrier();

    let guid: InfoHash = store.immutable_hash(&foobar).parse().unwrap();
    let fetched = store.fetch_atom_by_guid(&guid).unwrap();
    assert_eq!(fetched, foobar);

    let report = store.examine(&store.atomspace_hash().unwrap()).unwrap();
    assert!(report.contains("add "), "space record missing add tag: {report}");
    assert!(report.contains("(Concept \"foobar\")"), "{report}");
}

#[test]
fn store_is_idempotent() {
    let store = open("scenario-idempotent");
    let foobar = Atom::node("Concept", "foobar");
    store.store_atom(&foobar).unwrap();
    store.store_atom(&foobar).unwrap();
    store.barrier();

    let guid_report = store.examine(&store.immutable_hash(&foobar)).unwrap();
    assert!(guid_report.starts_with("Found 1 records"), "{guid_report}");

    let space_report = store.examine(&store.atomspace_hash().unwrap()).unwrap();
    let mentions = space_report.matches("(Concept \"foobar\")").count();
    assert_eq!(mentions, 1, "{space_report}");
}

#[test]
fn link_values_round_trip() {
    let store = open("scenario-values");
    let link = evaluation();
    link.set_value(&tv_key(), Value::Truth(0.7, 0.9));
    store.store_atom(&link).unwrap();
    store.barrier();

    let fresh = evaluation();
    assert!(fresh.keys().is_empty());
    let fetched = store.fetch_atom(&fresh).unwrap();
    assert_eq!(fetched.get_value(&tv_key()), Some(Value::Truth(0.7, 0.9)));
}

#[test]
fn incoming_set_enumeration() {
    let store = open("scenario-incoming");
    let link = evaluation();
    store.store_atom(&link).unwrap();
    store.barrier();

    // The direct holder of the predicate is the evaluation itself.
    let blort = Atom::node("Predicate", "blort");
    let holders = store.get_incoming_set(&blort).unwrap();
    assert_eq!(holders.len(), 1);
    assert_eq!(holders[0], link);

    // The concepts are held by the inner list.
    let foo = Atom::node("Concept", "foo");
    let holders = store.get_incoming_set(&foo).unwrap();
    assert_eq!(holders.len(), 1);
    assert_eq!(holders[0].type_name(), "List");

    let by_type = store.get_incoming_by_type(&foo, "List").unwrap();
    assert_eq!(by_type.len(), 1);
    assert!(store.get_incoming_by_type(&foo, "Evaluation").unwrap().is_empty());
}

#[test]
fn recursive_remove_takes_holders_down() {
    let store = open("scenario-remove");
    let link = evaluation();
    store.store_atom(&link).unwrap();
    store.barrier();

    let foo = Atom::node("Concept", "foo");
    store.remove_atom(&foo, true).unwrap();
    store.barrier();

    let blort = Atom::node("Predicate", "blort");
    assert!(store.get_incoming_set(&blort).unwrap().is_empty());
    let bar = Atom::node("Concept", "bar");
    assert!(store.get_incoming_set(&bar).unwrap().is_empty());
}

#[test]
fn non_recursive_remove_is_refused() {
    let store = open("scenario-refuse");
    let link = evaluation();
    store.store_atom(&link).unwrap();
    store.barrier();

    let foo = Atom::node("Concept", "foo");
    store.remove_atom(&foo, false).unwrap();
    store.barrier();

    // Still present: the remove was a no-op.
    let guid: InfoHash = store.immutable_hash(&foo).parse().unwrap();
    assert!(store.fetch_atom_by_guid(&guid).is_ok());
    assert!(!store.get_incoming_set(&foo).unwrap().is_empty());
}

#[test]
fn emptied_value_map_publishes_tombstone() {
    let store = open("scenario-tombstone");
    let a = Atom::node("Concept", "decorated");
    a.set_value(&tv_key(), Value::float(1.0));
    store.store_atom(&a).unwrap();
    store.barrier();

    // A bare copy of the same atom: storing it retracts the value map.
    let bare = Atom::node("Concept", "decorated");
    store.store_atom(&bare).unwrap();
    store.barrier();

    let fresh = Atom::node("Concept", "decorated");
    let fetched = store.fetch_atom(&fresh).unwrap();
    assert!(fetched.keys().is_empty());
}

#[test]
fn newest_value_map_wins() {
    let store = open("scenario-lww");
    let a = Atom::node("Concept", "counted");
    let key = Atom::node("Predicate", "count");
    a.set_value(&key, Value::float(1.0));
    store.store_atom(&a).unwrap();
    a.set_value(&key, Value::float(2.0));
    store.store_atom(&a).unwrap();
    store.barrier();

    let fetched = store.fetch_atom(&Atom::node("Concept", "counted")).unwrap();
    assert_eq!(fetched.get_value(&key), Some(Value::float(2.0)));
}

#[test]
fn observing_mode_refuses_writes() {
    let store = DhtStorage::open("dht://:0/").unwrap();
    assert!(store.connected());
    let atom = Atom::node("Concept", "nope");
    assert!(matches!(
        store.store_atom(&atom),
        Err(StorageError::ObservingOnly { .. })
    ));
    assert!(matches!(
        store.remove_atom(&atom, false),
        Err(StorageError::ObservingOnly { .. })
    ));
    assert!(matches!(
        store.atomspace_hash(),
        Err(StorageError::NotConnected)
    ));
}

#[test]
fn open_rejects_remote_uris_and_garbage() {
    for uri in ["dht://remote.example:4343/space", "http:///space", "dht://"] {
        assert!(matches!(
            DhtStorage::open(uri),
            Err(StorageError::BadUri { .. })
        ));
    }
}

#[test]
fn explicit_port_conflict_surfaces_port_in_use() {
    let first = open("scenario-port-a");
    let err = DhtStorage::open(&format!("dht://:{}/scenario-port-b", first.port()));
    assert!(matches!(err, Err(StorageError::PortInUse { .. })));
}

#[test]
fn unanswered_get_times_out() {
    let mut store = open("scenario-timeout");
    // A blackhole peer: nothing listens there, so the search can only
    // settle by deadline, which sits beyond the shrunken wait window.
    store.bootstrap("dht://127.0.0.1:9/").unwrap();
    store.set_wait_time(Duration::from_millis(100));

    let err = store.fetch_atom(&Atom::node("Concept", "ghost"));
    assert!(matches!(err, Err(StorageError::OverlayUnavailable { .. })));
}

#[test]
fn colliding_record_ids_keep_both_atoms_loadable() {
    let store = open("collide");
    let space_hash = store.space_hash;
    // Forge two membership records whose 64-bit ids collide.
    store
        .runner
        .put(
            &space_hash,
            Record::new(SPACE_ID, 0xdead_beef, codec::space_add("(Concept \"collider-a\")")),
        )
        .unwrap();
    store
        .runner
        .put(
            &space_hash,
            Record::new(SPACE_ID, 0xdead_beef, codec::space_add("(Concept \"collider-b\")")),
        )
        .unwrap();

    let space = AtomSpace::new("collide");
    store.load_atomspace(&space, "collide").unwrap();
    assert!(space.get(&Atom::node("Concept", "collider-a")).is_some());
    assert!(space.get(&Atom::node("Concept", "collider-b")).is_some());
}

#[test]
fn bulk_round_trip_between_two_nodes() {
    let writer = open("bulk-rt");
    let source = AtomSpace::new("bulk-rt");
    for i in 0..120 {
        source.create_node("Concept", format!("bulk-node-{i}"));
    }
    source.create_link(
        "List",
        vec![
            source.create_node("Concept", "bulk-node-0"),
            source.create_node("Concept", "bulk-node-1"),
        ],
    );
    let stored = writer.store_atomspace(&source).unwrap();
    assert_eq!(stored, 121);
    writer.barrier();

    let reader = open("bulk-rt");
    reader
        .bootstrap(&format!("dht://127.0.0.1:{}/", writer.port()))
        .unwrap();
    // Let the hello round trip land before searching.
    std::thread::sleep(Duration::from_millis(300));

    let restored = AtomSpace::new("bulk-rt");
    let loaded = reader.load_atomspace(&restored, "bulk-rt").unwrap();
    // Everything the writer published, plus the truth-value key it
    // publishes on open.
    assert_eq!(loaded, 122);
    assert!(restored.get(&Atom::node("Concept", "bulk-node-57")).is_some());
    assert!(
        restored
            .get(&source.create_link(
                "List",
                vec![
                    source.create_node("Concept", "bulk-node-0"),
                    source.create_node("Concept", "bulk-node-1"),
                ],
            ))
            .is_some()
    );
}

#[test]
fn load_type_filters_client_side() {
    let store = open("scenario-loadtype");
    store
        .store_atom(&Atom::node("Concept", "keep-me"))
        .unwrap();
    store
        .store_atom(&Atom::node("Predicate", "skip-me"))
        .unwrap();
    store.barrier();

    let space = AtomSpace::new("scenario-loadtype");
    let loaded = store.load_type(&space, "Concept").unwrap();
    assert_eq!(loaded, 1);
    assert!(space.get(&Atom::node("Concept", "keep-me")).is_some());
    assert!(space.get(&Atom::node("Predicate", "skip-me")).is_none());
}
