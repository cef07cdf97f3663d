//! asdht, a command-line shell for DHT-backed atom space persistence.

#![warn(missing_docs)]

pub mod cli;
