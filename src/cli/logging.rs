//! Logging for the CLI: terminal output, JSON fallback, progress bars.
//!
//! The storage layer wraps its bulk save/restore loops in spans styled as
//! atom-count progress bars; the `IndicatifLayer` installed here is what
//! renders them. On a terminal the fmt layer writes compact human output
//! above the live bars. When stderr is not a terminal the bars are moot
//! and output switches to JSON lines through a non-blocking writer, so a
//! piped `load-atomspace` still yields scrapeable throughput events.

use std::io::IsTerminal;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_indicatif::IndicatifLayer;
use tracing_indicatif::style::ProgressStyle;
use tracing_subscriber::filter::{EnvFilter, LevelFilter};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{Layer, fmt};

use super::LogArgs;

//================================================================================================
// Macros
//================================================================================================

/// Logs an error that is about to terminate the process.
#[macro_export]
macro_rules! fatal {
    ($error:expr) => {
        tracing::error!(fatal = true, "{}", $error);
    };
}

//================================================================================================
// Functions
//================================================================================================

/// Installs the global tracing subscriber.
///
/// Returns the guard keeping the non-blocking JSON writer alive; hold it
/// for the life of the process.
pub fn init_global_subscriber(args: LogArgs) -> WorkerGuard {
    let env_filter = EnvFilter::from_default_env().add_directive(level_for(args).into());

    let (non_blocking, guard) = tracing_appender::non_blocking(std::io::stderr());

    // Bulk operations style their own bars; any other long-lived span
    // falls back to this plain spinner.
    let progress = IndicatifLayer::new().with_progress_style(
        ProgressStyle::with_template("{span_child_prefix}{spinner:.cyan} {span_name} {wide_msg}")
            .unwrap_or(ProgressStyle::default_spinner()),
    );

    let output = if std::io::stderr().is_terminal() {
        fmt::layer()
            .without_time()
            .with_target(false)
            .with_writer(progress.get_stderr_writer())
            .compact()
            .boxed()
    } else {
        fmt::layer().json().with_writer(non_blocking).boxed()
    };

    tracing_subscriber::registry()
        .with(output)
        .with(env_filter)
        .with(progress)
        .init();

    guard
}

/// Resolves the level filter: `-q`/`-qq` silence everything else, a
/// parseable `RUST_LOG` beats `-v`, and `-v`/`-vv` raise the INFO
/// default.
fn level_for(args: LogArgs) -> LevelFilter {
    match args.quiet {
        0 => (),
        1 => return LevelFilter::WARN,
        _ => return LevelFilter::ERROR,
    }

    if let Ok(var) = std::env::var(EnvFilter::DEFAULT_ENV) {
        if let Ok(level) = var.parse() {
            return level;
        }
    }

    match args.verbosity {
        0 => LevelFilter::INFO,
        1 => LevelFilter::DEBUG,
        _ => LevelFilter::TRACE,
    }
}
