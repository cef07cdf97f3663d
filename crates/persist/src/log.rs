//! Progress styling for long-running storage operations.
//!
//! Bulk save and restore iterate whole membership multisets; their loops
//! run inside `tracing` spans styled here. A host that installs a
//! `tracing-indicatif` layer (the CLI does) renders those spans as live
//! progress bars; headless embedders pay only ordinary span bookkeeping.

use tracing::Span;
use tracing_indicatif::span_ext::IndicatifSpanExt;
use tracing_indicatif::style::ProgressStyle;

/// Styles `span` as a determinate bar over `len` atoms, labeled with the
/// space being walked. Callers advance it with `pb_inc`.
pub(crate) fn set_atom_bar(span: &Span, space_name: &str, len: u64) {
    let style =
        ProgressStyle::with_template("{elapsed} [{bar:32.cyan/blue}] {pos}/{len} atoms {msg}")
            .unwrap_or(ProgressStyle::default_bar())
            .progress_chars("=> ");
    span.pb_set_style(&style);
    span.pb_set_message(space_name);
    span.pb_set_length(len);
}
