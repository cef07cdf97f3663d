//! The storage façade: lifecycle, key derivation, caches, diagnostics.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Condvar, Mutex as StdMutex};
use std::time::Duration;

use parking_lot::Mutex;

use atomspace::atom::{Atom, Handle};
use atomspace::space::AtomSpace;
use atomspace::store::BackingStore;
use atomspace::sexpr;
use overlay::{InfoHash, KeyError, Record, Runner, RunnerConfig, TypeFilter};

use crate::error::StorageError;
use crate::policy::{self, PolicyStats, RecordKind};
use crate::stats::OpCounts;
use crate::uri::DhtUri;

//================================================================================================
// Types
//================================================================================================

/// Overlay-backed persistent storage for one atom space.
///
/// An instance owns a private overlay node. Opening with a space name
/// subscribes to that space; opening with a name of length one or less
/// yields an *observing* instance that may read and inspect the overlay
/// but refuses every write.
///
/// Four process-local caches sit in front of the overlay: derived GUID
/// keys, derived membership keys, decoded atoms, and the set of atoms this
/// instance has already published. Their locks are only ever held across a
/// map operation, never across an overlay call.
pub struct DhtStorage {
    pub(crate) uri: String,
    /// The space name with its trailing slash, e.g. `"testspace/"`.
    pub(crate) space_name: String,
    pub(crate) observing: bool,
    pub(crate) port: u16,
    /// Key of the membership multiset; zero when observing.
    pub(crate) space_hash: InfoHash,
    pub(crate) runner: Runner,
    pub(crate) wait_time: Duration,
    /// The well-known truth-value key, published into every open space.
    pub(crate) tv_key: Handle,
    pub(crate) guid_cache: Mutex<HashMap<Handle, InfoHash>>,
    pub(crate) member_cache: Mutex<HashMap<Handle, InfoHash>>,
    pub(crate) space_cache: Mutex<HashMap<String, InfoHash>>,
    pub(crate) decode_cache: Mutex<HashMap<InfoHash, Handle>>,
    pub(crate) published: Mutex<HashSet<Handle>>,
    pub(crate) counts: OpCounts,
    pub(crate) policy_stats: Arc<PolicyStats>,
}

//================================================================================================
// Impls
//================================================================================================

impl DhtStorage {
    /// Opens a storage instance for the space named by `uri`.
    ///
    /// The URI has the shape `dht:///<name>` or `dht://:<port>/<name>`;
    /// see [`crate::uri`] for the grammar. The overlay node is started,
    /// record policies registered, configured bootstrap peers greeted, and
    /// (unless observing) the truth-value key published.
    ///
    /// # Errors
    ///
    /// [`StorageError::BadUri`] for malformed or remote URIs,
    /// [`StorageError::PortInUse`] when no port could be bound.
    pub fn open(uri: &str) -> Result<Self, StorageError> {
        let parsed: DhtUri = uri.parse()?;
        if parsed.host().is_some() {
            return Err(StorageError::BadUri {
                uri: uri.to_string(),
                reason: "open expects a local node URI (dht:///name or dht://:port/name)".into(),
            });
        }
        let cfg = config::CONFIG.clone();
        let port = parsed.port().unwrap_or(cfg.port);
        let observing = parsed.observing();
        let mut space_name = parsed.space().to_string();
        space_name.push('/');

        let runner = Runner::new();
        let runner_config = RunnerConfig {
            network: cfg.network,
            threaded: cfg.threaded,
            max_req_per_sec: cfg.max_req_per_sec,
            max_peer_req_per_sec: cfg.max_peer_req_per_sec,
            // Probing past the bind port only applies to the default; an
            // explicitly requested port either binds or fails.
            retry_ports: port == cfg.port,
        };
        let bound = runner
            .run(port, runner_config)
            .map_err(|e| StorageError::from_overlay(e, None))?;

        let stats = Arc::new(PolicyStats::default());
        policy::register_policies(&runner, &stats, cfg.record_lifetime());

        let space_hash = if observing {
            InfoHash::zero()
        } else {
            InfoHash::get(&space_name)
        };

        let storage = DhtStorage {
            uri: uri.to_string(),
            space_name: space_name.clone(),
            observing,
            port: bound,
            space_hash,
            runner,
            wait_time: cfg.wait_time(),
            tv_key: Atom::node("Predicate", "*-TruthValueKey-*"),
            guid_cache: Mutex::new(HashMap::new()),
            member_cache: Mutex::new(HashMap::new()),
            space_cache: Mutex::new(HashMap::from([(space_name, space_hash)])),
            decode_cache: Mutex::new(HashMap::new()),
            published: Mutex::new(HashSet::new()),
            counts: OpCounts::default(),
            policy_stats: stats,
        };

        for peer in &cfg.bootstrap {
            storage.bootstrap(peer)?;
        }

        if !storage.observing {
            let tv = storage.tv_key.clone();
            storage.store_recursive(&tv)?;
        }
        tracing::info!(uri, port = bound, observing, "atomspace storage open");
        Ok(storage)
    }

    /// Greets a known peer named by a `dht://host[:port]/` URI.
    ///
    /// # Errors
    ///
    /// [`StorageError::BadUri`] when the URI is malformed or names no
    /// host.
    pub fn bootstrap(&self, peer: &str) -> Result<(), StorageError> {
        let parsed: DhtUri = peer.parse()?;
        let Some(host) = parsed.host() else {
            return Err(StorageError::BadUri {
                uri: peer.to_string(),
                reason: "bootstrap URI needs a host".into(),
            });
        };
        let port = parsed.port().unwrap_or(config::CONFIG.port);
        self.runner
            .bootstrap(host, port)
            .map_err(|e| StorageError::from_overlay(e, None))
    }

    /// Closes the instance, draining and shutting down the overlay node.
    pub fn close(self) {
        drop(self);
    }

    /// Whether the overlay node is up.
    pub fn connected(&self) -> bool {
        self.runner.is_running()
    }

    /// The port the overlay node is bound to.
    pub fn port(&self) -> u16 {
        self.port
    }

    /// The wait window applied to every overlay `get`.
    pub fn wait_time(&self) -> Duration {
        self.wait_time
    }

    /// Overrides the wait window applied to every overlay `get`.
    pub fn set_wait_time(&mut self, wait: Duration) {
        self.wait_time = wait;
    }

    /// The well-known truth-value key atom.
    pub fn truth_value_key(&self) -> &Handle {
        &self.tv_key
    }

    /// Best-effort fence: pumps the overlay's high-priority and regular
    /// queues so queued writes actually hit the wire. This is a local
    /// operation, not a cluster-wide sync point.
    pub fn barrier(&self) {
        self.runner.loop_();
        self.runner.loop_();
    }

    //--------------------------------------------------------------------------------------------
    // Key derivation
    //--------------------------------------------------------------------------------------------

    /// The immutable-content key of an atom, derived from its canonical
    /// serialization alone. Memoized for the life of the instance.
    pub(crate) fn guid(&self, atom: &Handle) -> InfoHash {
        if let Some(key) = self.guid_cache.lock().get(atom) {
            return *key;
        }
        let key = InfoHash::get(sexpr::encode_atom(atom));
        self.guid_cache.lock().insert(atom.clone(), key);
        key
    }

    /// The per-space membership key of an atom. Memoized; evicted when
    /// the atom is removed so a republication re-derives it.
    pub(crate) fn membership(&self, atom: &Handle) -> InfoHash {
        if let Some(key) = self.member_cache.lock().get(atom) {
            return *key;
        }
        let key = self.membership_in(&self.space_name, atom);
        self.member_cache.lock().insert(atom.clone(), key);
        key
    }

    /// The membership key of an atom within an arbitrary space name
    /// (trailing slash included). Not cached.
    pub(crate) fn membership_in(&self, space_name: &str, atom: &Handle) -> InfoHash {
        InfoHash::get(format!("{space_name}{}", sexpr::encode_atom(atom)))
    }

    /// The membership-multiset key of a space name (trailing slash
    /// included). Memoized by name.
    pub(crate) fn space_key_for(&self, space_name: &str) -> InfoHash {
        if let Some(key) = self.space_cache.lock().get(space_name) {
            return *key;
        }
        let key = InfoHash::get(space_name);
        self.space_cache.lock().insert(space_name.to_string(), key);
        key
    }

    //--------------------------------------------------------------------------------------------
    // Overlay access
    //--------------------------------------------------------------------------------------------

    pub(crate) fn ensure_connected(&self) -> Result<(), StorageError> {
        if self.connected() {
            Ok(())
        } else {
            Err(StorageError::NotConnected)
        }
    }

    pub(crate) fn check_writable(&self) -> Result<(), StorageError> {
        self.ensure_connected()?;
        if self.observing {
            return Err(StorageError::ObservingOnly {
                uri: self.uri.clone(),
            });
        }
        Ok(())
    }

    /// A bounded-wait `get`: the one place an overlay lookup can block.
    pub(crate) fn get_records(
        &self,
        key: &InfoHash,
        filter: TypeFilter,
    ) -> Result<Vec<Record>, StorageError> {
        self.ensure_connected()?;
        self.runner
            .get(key, filter)
            .wait_for(self.wait_time)
            .map_err(|_| StorageError::OverlayUnavailable {
                key: key.to_string(),
                wait: self.wait_time,
            })
    }

    /// A fire-and-forget `put`.
    pub(crate) fn put_record(&self, key: &InfoHash, record: Record) -> Result<(), StorageError> {
        self.runner
            .put(key, record)
            .map_err(|e| StorageError::from_overlay(e, Some(key)))
    }

    //--------------------------------------------------------------------------------------------
    // Diagnostics
    //--------------------------------------------------------------------------------------------

    /// Fetches and pretty-prints every record stored at a raw hex key.
    ///
    /// # Errors
    ///
    /// [`StorageError::BadUri`] for malformed hex,
    /// [`StorageError::OverlayUnavailable`] on lookup timeout.
    pub fn examine(&self, hash_hex: &str) -> Result<String, StorageError> {
        let key: InfoHash = hash_hex.parse().map_err(|e: KeyError| StorageError::BadUri {
            uri: hash_hex.to_string(),
            reason: e.to_string(),
        })?;
        let records = self.get_records(&key, TypeFilter::Any)?;
        let mut out = format!("Found {} records\n", records.len());
        for record in records {
            out.push_str(&describe_record(&record));
        }
        Ok(out)
    }

    /// Hex of the membership-multiset key of the open space.
    ///
    /// # Errors
    ///
    /// [`StorageError::NotConnected`] on an observing instance.
    pub fn atomspace_hash(&self) -> Result<String, StorageError> {
        if self.observing {
            return Err(StorageError::NotConnected);
        }
        Ok(self.space_hash.to_string())
    }

    /// Hex of the atom's immutable-content key.
    pub fn immutable_hash(&self, atom: &Handle) -> String {
        self.guid(atom).to_string()
    }

    /// Hex of the atom's per-space membership key.
    ///
    /// # Errors
    ///
    /// [`StorageError::NotConnected`] on an observing instance.
    pub fn atom_hash(&self, atom: &Handle) -> Result<String, StorageError> {
        if self.observing {
            return Err(StorageError::NotConnected);
        }
        Ok(self.membership(atom).to_string())
    }

    /// The overlay node's status block.
    pub fn node_info(&self) -> String {
        self.runner.node_info()
    }

    /// One line per key the local replica stores.
    pub fn storage_log(&self) -> String {
        self.runner.storage_log()
    }

    /// The overlay's known peers.
    pub fn routing_tables_log(&self) -> String {
        self.runner.routing_tables_log()
    }

    /// The overlay's recent searches.
    pub fn searches_log(&self) -> String {
        self.runner.searches_log()
    }

    /// The multi-line performance report.
    pub fn stats_report(&self) -> String {
        let hash = if self.observing {
            "(observing)".to_string()
        } else {
            self.space_hash.to_string()
        };
        self.counts.report(&self.uri, &hash, &self.policy_stats)
    }

    /// Resets every performance counter.
    pub fn clear_stats(&self) {
        self.counts.clear();
        self.policy_stats.clear();
    }
}

impl Drop for DhtStorage {
    fn drop(&mut self) {
        if self.runner.is_running() {
            // Drain both overlay queues, then hold the teardown until the
            // shutdown callback has acknowledged.
            self.runner.loop_();
            self.runner.loop_();

            let pair = Arc::new((StdMutex::new(false), Condvar::new()));
            let signal = pair.clone();
            self.runner.shutdown(move || {
                let (lock, cv) = &*signal;
                let mut done = lock.lock().unwrap_or_else(|e| e.into_inner());
                *done = true;
                cv.notify_one();
            });

            let (lock, cv) = &*pair;
            let guard = lock.lock().unwrap_or_else(|e| e.into_inner());
            let _ = cv.wait_timeout_while(guard, Duration::from_secs(2), |done| !*done);
        }
        self.runner.join();
    }
}

impl BackingStore for DhtStorage {
    type Error = StorageError;

    fn store_atom(&self, atom: &Handle) -> Result<(), StorageError> {
        DhtStorage::store_atom(self, atom)
    }

    fn fetch_atom(&self, atom: &Handle) -> Result<Handle, StorageError> {
        DhtStorage::fetch_atom(self, atom)
    }

    fn fetch_node(&self, ty: &str, name: &str) -> Result<Handle, StorageError> {
        DhtStorage::fetch_node(self, ty, name)
    }

    fn fetch_link(&self, ty: &str, outgoing: &[Handle]) -> Result<Handle, StorageError> {
        DhtStorage::fetch_link(self, ty, outgoing)
    }

    fn get_incoming_set(&self, atom: &Handle) -> Result<Vec<Handle>, StorageError> {
        DhtStorage::get_incoming_set(self, atom)
    }

    fn get_incoming_by_type(&self, atom: &Handle, ty: &str) -> Result<Vec<Handle>, StorageError> {
        DhtStorage::get_incoming_by_type(self, atom, ty)
    }

    fn remove_atom(&self, atom: &Handle, recursive: bool) -> Result<(), StorageError> {
        DhtStorage::remove_atom(self, atom, recursive)
    }

    fn load_atomspace(&self, space: &AtomSpace, name: &str) -> Result<usize, StorageError> {
        DhtStorage::load_atomspace(self, space, name)
    }

    fn store_atomspace(&self, space: &AtomSpace) -> Result<usize, StorageError> {
        DhtStorage::store_atomspace(self, space)
    }

    fn load_type(&self, space: &AtomSpace, ty: &str) -> Result<usize, StorageError> {
        DhtStorage::load_type(self, space, ty)
    }

    fn barrier(&self) -> Result<(), StorageError> {
        DhtStorage::barrier(self);
        Ok(())
    }

    fn connected(&self) -> bool {
        DhtStorage::connected(self)
    }
}

//================================================================================================
// Functions
//================================================================================================

fn describe_record(record: &Record) -> String {
    match RecordKind::from_id(record.kind) {
        Some(RecordKind::Atom) => {
            format!("Atom ts={} {}\n", record.timestamp, record.payload_str())
        }
        Some(RecordKind::Space) => {
            format!("Member id={:016x} {}\n", record.id, record.payload_str())
        }
        Some(RecordKind::Values) => {
            if record.payload.is_empty() {
                "Value: (tombstone)\n".to_string()
            } else {
                format!("Value: {}\n", record.payload_str())
            }
        }
        Some(RecordKind::Incoming) => match InfoHash::from_bytes(&record.payload) {
            Some(guid) if guid.is_zero() => "Incoming: (tombstone)\n".to_string(),
            Some(guid) => format!("Incoming: {guid}\n"),
            None => format!("Incoming: (garbled {} bytes)\n", record.payload.len()),
        },
        None => format!("Raw: kind={} id={:016x}\n", record.kind, record.id),
    }
}
