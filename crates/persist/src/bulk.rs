//! The bulk engine: whole-space save and restore.
//!
//! Both directions run inside `tracing` spans styled as atom-count
//! progress bars (see the `log` module); a host without a progress layer
//! just sees the spans and the periodic throughput events.

use std::time::Instant;

use atomspace::atom::Handle;
use atomspace::sexpr;
use atomspace::space::AtomSpace;
use overlay::TypeFilter;
use tracing::info_span;
use tracing_indicatif::span_ext::IndicatifSpanExt;

use crate::codec::{self, SpaceTag};
use crate::error::StorageError;
use crate::log;
use crate::policy::SPACE_ID;
use crate::stats::OpCounts;
use crate::storage::DhtStorage;

/// How many stores go by between barriers during a bulk save. Without the
/// periodic drain the overlay sheds records under sustained load.
const BULK_FENCE_INTERVAL: usize = 500;

impl DhtStorage {
    /// Restores every atom of the named space into `space`.
    ///
    /// Membership records tagged `drop` are skipped; each surviving atom
    /// has its value map fetched before insertion.
    ///
    /// # Errors
    ///
    /// Overlay and decode errors as for the underlying lookups.
    pub fn load_atomspace(&self, space: &AtomSpace, name: &str) -> Result<usize, StorageError> {
        self.ensure_connected()?;
        let mut space_name = name.split('/').next().unwrap_or_default().to_string();
        space_name.push('/');
        let space_key = self.space_key_for(&space_name);
        self.load_space_records(space, &space_name, &space_key, None)
    }

    /// Restores only the atoms of type `ty` into `space`. The filtering
    /// happens client-side; the whole membership multiset is scanned.
    ///
    /// # Errors
    ///
    /// Overlay and decode errors as for the underlying lookups.
    pub fn load_type(&self, space: &AtomSpace, ty: &str) -> Result<usize, StorageError> {
        self.ensure_connected()?;
        if self.observing {
            return Err(StorageError::NotConnected);
        }
        let space_key = self.space_hash;
        let space_name = self.space_name.clone();
        self.load_space_records(space, &space_name, &space_key, Some(ty))
    }

    fn load_space_records(
        &self,
        space: &AtomSpace,
        space_name: &str,
        space_key: &overlay::InfoHash,
        type_filter: Option<&str>,
    ) -> Result<usize, StorageError> {
        let started = Instant::now();
        let records = self.get_records(space_key, TypeFilter::Kind(SPACE_ID))?;

        let span = info_span!("bulk_load");
        let _guard = span.enter();
        log::set_atom_bar(&span, space_name, records.len() as u64);

        let mut loaded = 0usize;
        for record in records {
            // The bar tracks records scanned, dropped members included.
            span.pb_inc(1);
            let payload = record.payload_str();
            let Some((SpaceTag::Add, serialized)) = codec::parse_space_payload(&payload) else {
                continue;
            };
            let atom = sexpr::decode_atom_exact(serialized)?;
            if type_filter.is_some_and(|ty| atom.type_name() != ty) {
                continue;
            }
            self.fetch_values_in(space_name, &atom)?;
            space.add_atom(&atom);
            loaded += 1;
            OpCounts::bump(&self.counts.load_count);
        }
        tracing::info!(
            loaded,
            secs = started.elapsed().as_secs_f64(),
            space = space_name,
            "finished loading atomspace"
        );
        Ok(loaded)
    }

    /// Saves every atom resident in `space`: all nodes first, then all
    /// links, with a fence every few hundred stores to let the overlay
    /// drain.
    ///
    /// # Errors
    ///
    /// [`StorageError::ObservingOnly`] on an observing instance; overlay
    /// errors from the underlying stores.
    pub fn store_atomspace(&self, space: &AtomSpace) -> Result<usize, StorageError> {
        self.check_writable()?;
        let started = Instant::now();
        let nodes = space.nodes();
        let links = space.links();

        let span = info_span!("bulk_store");
        let _guard = span.enter();
        log::set_atom_bar(&span, space.name(), (nodes.len() + links.len()) as u64);

        let mut stored = 0usize;
        let mut save = |atoms: Vec<Handle>| -> Result<(), StorageError> {
            for atom in atoms {
                self.store_atom(&atom)?;
                stored += 1;
                span.pb_inc(1);
                if stored % BULK_FENCE_INTERVAL == 0 {
                    self.barrier();
                }
                if stored % 100 == 0 {
                    let secs = started.elapsed().as_secs_f64().max(f64::EPSILON);
                    tracing::info!(
                        stored,
                        rate = stored as f64 / secs,
                        "bulk store progress"
                    );
                }
            }
            Ok(())
        };

        // Knock out the nodes first, then the links.
        save(nodes)?;
        save(links)?;
        self.barrier();

        tracing::info!(
            stored,
            secs = started.elapsed().as_secs_f64(),
            space = space.name(),
            "finished storing atomspace"
        );
        Ok(stored)
    }
}
