//! This module defines the subcommands for the asdht CLI.
//!
//! Every invocation opens the storage instance named by `--uri`, greets
//! any `--peer` bootstrap URIs, runs one command against it, and closes
//! the instance again; `open` and `close` from the storage surface are
//! implicit rather than separate subcommands.

use atomspace::sexpr;
use atomspace::space::AtomSpace;
use clap::Subcommand;
use persist::DhtStorage;

use super::Args;

//================================================================================================
// Types
//================================================================================================

/// The subcommands for the asdht CLI.
#[derive(Subcommand)]
pub(crate) enum Commands {
    /// Print the performance counters of this instance.
    Stats,
    /// Reset the performance counters of this instance.
    ClearStats,
    /// Greet a bootstrap peer and print the node status.
    Bootstrap {
        /// The peer, as `dht://host[:port]/`.
        peer: String,
    },
    /// Load the whole atomspace and print every atom.
    LoadAtomspace {
        /// The space name to load; defaults to the one in `--uri`.
        name: Option<String>,
    },
    /// Load only the atoms of one type and print them.
    LoadType {
        /// The type name to keep, e.g. `Concept`.
        type_name: String,
    },
    /// Read s-expressions from a file and store every atom found.
    StoreFile {
        /// Path to a file of canonical atom s-expressions.
        path: std::path::PathBuf,
    },
    /// Fetch and pretty-print every record stored at a raw hex key.
    Examine {
        /// The 40-digit hex key.
        hash: String,
    },
    /// Print the overlay key of the open atomspace.
    AtomspaceHash,
    /// Print the immutable-content key of an atom.
    ImmutableHash {
        /// The atom, as a canonical s-expression.
        atom: String,
    },
    /// Print the per-space membership key of an atom.
    AtomHash {
        /// The atom, as a canonical s-expression.
        atom: String,
    },
    /// Print the overlay node status.
    NodeInfo,
    /// Print one line per key stored on the local replica.
    StorageLog,
    /// Print the overlay's known peers.
    RoutingTablesLog,
    /// Print the overlay's recent searches.
    SearchesLog,
}

//================================================================================================
// Functions
//================================================================================================

/// The main entry point for the asdht CLI.
pub async fn run(args: Args) -> anyhow::Result<()> {
    let store = DhtStorage::open(&args.uri)?;
    for peer in &args.peers {
        store.bootstrap(peer)?;
    }

    match args.command {
        Commands::Stats => println!("{}", store.stats_report()),
        Commands::ClearStats => {
            store.clear_stats();
            println!("stats cleared");
        }
        Commands::Bootstrap { peer } => {
            store.bootstrap(&peer)?;
            println!("{}", store.node_info());
        }
        Commands::LoadAtomspace { name } => {
            let name = name.unwrap_or_else(|| space_of(&args.uri));
            let space = AtomSpace::new(name.clone());
            let loaded = store.load_atomspace(&space, &name)?;
            for atom in space.atoms() {
                println!("{atom}");
            }
            tracing::info!(loaded, "atomspace loaded");
        }
        Commands::LoadType { type_name } => {
            let space = AtomSpace::new(space_of(&args.uri));
            let loaded = store.load_type(&space, &type_name)?;
            for atom in space.atoms() {
                println!("{atom}");
            }
            tracing::info!(loaded, %type_name, "atoms loaded");
        }
        Commands::StoreFile { path } => {
            let text = std::fs::read_to_string(&path)?;
            let mut stored = 0usize;
            for line in text.lines().map(str::trim).filter(|l| !l.is_empty()) {
                let atom = sexpr::decode_atom_exact(line)?;
                store.store_atom(&atom)?;
                stored += 1;
            }
            store.barrier();
            println!("stored {stored} atoms from {}", path.display());
        }
        Commands::Examine { hash } => print!("{}", store.examine(&hash)?),
        Commands::AtomspaceHash => println!("{}", store.atomspace_hash()?),
        Commands::ImmutableHash { atom } => {
            let atom = sexpr::decode_atom_exact(&atom)?;
            println!("{}", store.immutable_hash(&atom));
        }
        Commands::AtomHash { atom } => {
            let atom = sexpr::decode_atom_exact(&atom)?;
            println!("{}", store.atom_hash(&atom)?);
        }
        Commands::NodeInfo => print!("{}", store.node_info()),
        Commands::StorageLog => println!("{}", store.storage_log()),
        Commands::RoutingTablesLog => println!("{}", store.routing_tables_log()),
        Commands::SearchesLog => println!("{}", store.searches_log()),
    }
    Ok(())
}

/// The space name inside a `dht://` URI, for commands that default to it.
fn space_of(uri: &str) -> String {
    uri.parse::<persist::uri::DhtUri>()
        .map(|u| u.space().to_string())
        .unwrap_or_default()
}
