//! Performance counters for a storage instance.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use parking_lot::Mutex;

use crate::policy::{PolicyStats, RecordKind};

//================================================================================================
// Types
//================================================================================================

/// Operation counters, one set per storage instance.
#[derive(Debug)]
pub(crate) struct OpCounts {
    pub load_count: AtomicU64,
    pub store_count: AtomicU64,
    pub value_updates: AtomicU64,
    pub value_deletes: AtomicU64,
    pub value_fetches: AtomicU64,
    pub num_get_atoms: AtomicU64,
    pub num_got_nodes: AtomicU64,
    pub num_got_links: AtomicU64,
    pub num_get_insets: AtomicU64,
    pub num_get_inlinks: AtomicU64,
    pub num_node_inserts: AtomicU64,
    pub num_link_inserts: AtomicU64,
    pub num_atom_deletes: AtomicU64,
    since: Mutex<SystemTime>,
}

//================================================================================================
// Impls
//================================================================================================

impl Default for OpCounts {
    fn default() -> Self {
        OpCounts {
            load_count: AtomicU64::new(0),
            store_count: AtomicU64::new(0),
            value_updates: AtomicU64::new(0),
            value_deletes: AtomicU64::new(0),
            value_fetches: AtomicU64::new(0),
            num_get_atoms: AtomicU64::new(0),
            num_got_nodes: AtomicU64::new(0),
            num_got_links: AtomicU64::new(0),
            num_get_insets: AtomicU64::new(0),
            num_get_inlinks: AtomicU64::new(0),
            num_node_inserts: AtomicU64::new(0),
            num_link_inserts: AtomicU64::new(0),
            num_atom_deletes: AtomicU64::new(0),
            since: Mutex::new(SystemTime::now()),
        }
    }
}

impl OpCounts {
    pub(crate) fn bump(counter: &AtomicU64) -> u64 {
        counter.fetch_add(1, Ordering::Relaxed) + 1
    }

    pub(crate) fn clear(&self) {
        let OpCounts {
            load_count,
            store_count,
            value_updates,
            value_deletes,
            value_fetches,
            num_get_atoms,
            num_got_nodes,
            num_got_links,
            num_get_insets,
            num_get_inlinks,
            num_node_inserts,
            num_link_inserts,
            num_atom_deletes,
            since,
        } = self;
        for counter in [
            load_count,
            store_count,
            value_updates,
            value_deletes,
            value_fetches,
            num_get_atoms,
            num_got_nodes,
            num_got_links,
            num_get_insets,
            num_get_inlinks,
            num_node_inserts,
            num_link_inserts,
            num_atom_deletes,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
        *since.lock() = SystemTime::now();
    }

    /// The multi-line stats report, in the shape the CLI prints.
    pub(crate) fn report(&self, uri: &str, space_hash: &str, policy: &PolicyStats) -> String {
        let load = self.load_count.load(Ordering::Relaxed);
        let store = self.store_count.load(Ordering::Relaxed);
        let since = *self.since.lock();
        let elapsed = since.elapsed().map(|d| d.as_secs()).unwrap_or(0);
        let since_secs = since
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);

        let mut out = String::new();
        out.push_str(&format!("dht-stats: currently open URI: {uri}\n"));
        out.push_str(&format!("dht-stats: AtomSpace hash: {space_hash}\n"));
        out.push_str(&format!(
            "dht-stats: time since stats reset={elapsed} secs, at epoch {since_secs}\n\n"
        ));
        out.push_str(&format!(
            "dht-stats: total loads = {load} total stores = {store} ratio = {:.3}\n",
            ratio(store, load)
        ));
        out.push_str(&format!(
            "dht-stats: value updates = {} deletes = {} fetches = {}\n",
            self.value_updates.load(Ordering::Relaxed),
            self.value_deletes.load(Ordering::Relaxed),
            self.value_fetches.load(Ordering::Relaxed),
        ));
        out.push_str(&format!(
            "dht-stats: total atom deletes = {}\n\n",
            self.num_atom_deletes.load(Ordering::Relaxed)
        ));

        let get_atoms = self.num_get_atoms.load(Ordering::Relaxed);
        let got_nodes = self.num_got_nodes.load(Ordering::Relaxed);
        let got_links = self.num_got_links.load(Ordering::Relaxed);
        let insets = self.num_get_insets.load(Ordering::Relaxed);
        let inlinks = self.num_get_inlinks.load(Ordering::Relaxed);
        out.push_str(&format!(
            "num_get_atoms={get_atoms} num_got_nodes={got_nodes} num_got_links={got_links}\n"
        ));
        out.push_str(&format!(
            "num_get_incoming_sets={insets} set total={inlinks} avg set size={:.3}\n",
            ratio(inlinks, insets)
        ));

        let node_inserts = self.num_node_inserts.load(Ordering::Relaxed);
        let link_inserts = self.num_link_inserts.load(Ordering::Relaxed);
        out.push_str(&format!(
            "total stores for node={node_inserts} link={link_inserts} ratio = {:.3}\n\n",
            ratio(link_inserts, node_inserts)
        ));

        for kind in RecordKind::ALL {
            out.push_str(&format!(
                "dht {:<9} stores = {} edits = {}\n",
                kind.policy_name().trim_end_matches(" policy"),
                policy.stores(kind),
                policy.edits(kind),
            ));
        }
        out
    }
}

fn ratio(num: u64, den: u64) -> f64 {
    if den == 0 {
        0.0
    } else {
        num as f64 / den as f64
    }
}
