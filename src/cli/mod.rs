//! This module contains the command-line interface for asdht.
//!
//! It uses the `clap` crate to parse command-line arguments and subcommands.
//! The main entry point is the `run` function, which opens the storage
//! instance named by `--uri` and executes the appropriate command.

use clap::Parser;

pub use self::commands::run;
pub use self::logging::init_global_subscriber;

mod commands;
pub mod logging;

/// The top-level command-line arguments for asdht.
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// The storage URI to open.
    ///
    /// `dht:///<name>` opens the named space on a local node on the
    /// default port; `dht://:<port>/<name>` picks the port. A name of
    /// one character or less opens in observing mode: the node joins the
    /// overlay and may be inspected, but no writes are permitted.
    #[arg(short, long, global = true, default_value = "dht:///", value_name = "URI")]
    pub uri: String,

    /// A peer to bootstrap against, as `dht://host[:port]/`.
    ///
    /// May be given several times. Peers from the configuration file are
    /// greeted as well.
    #[arg(short, long = "peer", global = true, value_name = "URI")]
    pub peers: Vec<String>,

    /// Arguments for controlling logging behavior.
    #[command(flatten)]
    pub log: LogArgs,

    #[command(subcommand)]
    pub(crate) command: commands::Commands,
}

/// Arguments for controlling logging behavior.
#[derive(Parser, Clone, Copy, Debug)]
#[command(next_help_heading = "Log Options")]
pub struct LogArgs {
    /// Set the level of verbosity.
    ///
    /// This flag can be used multiple times to increase verbosity:
    /// - `-v` for DEBUG level
    /// - `-vv` for TRACE level
    ///
    /// If not specified, defaults to INFO level.
    ///
    /// Alternatively, set the `RUST_LOG` environment variable (e.g., `RUST_LOG=info`), which takes
    /// precedence over this flag.
    ///
    /// **Note**: This flag is silently ignored when `--quiet` is also set.
    #[arg(
        short,
        long,
        action = clap::ArgAction::Count,
        global = true,
        help = "Increase logging verbosity",
    )]
    verbosity: u8,

    /// Suppress verbosity, taking precedence over other flags.
    ///
    /// This flag can be used multiple times to decrease verbosity:
    /// - `-q` for WARN level
    /// - `-qq` for ERROR level
    ///
    /// This flag *overrides* any verbosity settings. It takes precedence over both the
    /// `--verbosity` flag and the `RUST_LOG` environment variable.
    ///
    /// Use this flag when you want minimal output from the application, typically in
    /// non-interactive or automated environments.
    #[arg(
        short,
        long,
        action = clap::ArgAction::Count,
        global = true,
    )]
    quiet: u8,
}
