//! Manages application configuration by loading settings from standard locations.
//!
//! This crate provides a unified configuration object (`Config`) that aggregates
//! settings from files and environment variables, making them accessible
//! globally via a lazily initialized static reference (`CONFIG`).

use std::sync::LazyLock;
use std::time::Duration;

use etcetera::BaseStrategy;
use figment::providers::{Env, Format, Toml};
use figment::{Figment, Metadata, Provider};
use serde::{Deserialize, Serialize};

//================================================================================================
// Statics
//================================================================================================

/// Provides a lazily instantiated static reference to the application `Config`.
///
/// This static variable ensures that configuration is parsed only once from
/// canonical locations and then made immutably available throughout the
/// application's lifecycle.
pub static CONFIG: LazyLock<Config> = LazyLock::new(load_config);

//================================================================================================
// Types
//================================================================================================

/// Represents the application's primary configuration structure.
#[derive(Deserialize, Serialize, Clone, Debug)]
#[serde(default)]
pub struct Config {
    /// The default port an overlay node binds.
    pub port: u16,
    /// The private network id isolating this overlay from public ones.
    pub network: u32,
    /// How long a `get` waits on the overlay, in milliseconds.
    pub wait_time_ms: u64,
    /// How long overlay records live before expiry, in seconds.
    pub record_lifetime_secs: u64,
    /// Total inbound requests admitted per second; `-1` for unlimited.
    pub max_req_per_sec: i32,
    /// Inbound requests admitted per peer per second; `-1` for unlimited.
    pub max_peer_req_per_sec: i32,
    /// Whether the overlay node runs its own worker threads.
    pub threaded: bool,
    /// Peers greeted automatically on open, as `dht://host:port/` URIs.
    pub bootstrap: Vec<String>,
}

//================================================================================================
// Impls
//================================================================================================

impl Default for Config {
    fn default() -> Self {
        Config {
            port: 4343,
            network: 42,
            wait_time_ms: 4000,
            record_lifetime_secs: 7 * 24 * 3600,
            max_req_per_sec: -1,
            max_peer_req_per_sec: -1,
            threaded: true,
            bootstrap: Vec::new(),
        }
    }
}

impl Config {
    /// The `get` wait window as a [`Duration`].
    pub fn wait_time(&self) -> Duration {
        Duration::from_millis(self.wait_time_ms)
    }

    /// The record lifetime as a [`Duration`].
    pub fn record_lifetime(&self) -> Duration {
        Duration::from_secs(self.record_lifetime_secs)
    }

    /// Constructs a `Figment` instance for configuration loading.
    ///
    /// This method builds a configuration provider by layering default
    /// settings, the user configuration file, and environment variables.
    pub fn figment() -> Figment {
        let mut fig = Figment::from(Config::default());

        if let Ok(c) = etcetera::choose_base_strategy() {
            let config = c.config_dir().join("asdht.toml");
            fig = fig.admerge(Toml::file(config));
        }

        fig.admerge(Env::prefixed("ASDHT_"))
    }

    /// Creates a `Config` instance from a given provider.
    pub fn from<T: Provider>(provider: T) -> Result<Config, Box<figment::Error>> {
        Figment::from(provider).extract().map_err(Box::new)
    }
}

impl Provider for Config {
    fn metadata(&self) -> figment::Metadata {
        Metadata::named("asdht config")
    }

    fn data(
        &self,
    ) -> Result<figment::value::Map<figment::Profile, figment::value::Dict>, figment::Error> {
        figment::providers::Serialized::defaults(self).data()
    }
}

//================================================================================================
// Functions
//================================================================================================

/// Loads the application configuration using the default `Figment` provider.
///
/// This function is used to initialize the `CONFIG` static variable.
fn load_config() -> Config {
    Config::figment().extract().unwrap_or_else(|e| {
        tracing::error!(error = %e, "problem loading config from default sources, falling back to built-in defaults");
        Config::default()
    })
}

//================================================================================================
// Tests
//================================================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_wire_constants() {
        let config = Config::default();
        assert_eq!(config.port, 4343);
        assert_eq!(config.network, 42);
        assert_eq!(config.wait_time(), Duration::from_secs(4));
        assert_eq!(config.record_lifetime(), Duration::from_secs(604_800));
        assert_eq!(config.max_req_per_sec, -1);
        assert!(config.threaded);
    }

    #[test]
    fn layered_values_override_defaults() {
        let fig = Figment::from(Config::default())
            .admerge(("port", 5000))
            .admerge(("wait_time_ms", 250));
        let config: Config = fig.extract().unwrap();
        assert_eq!(config.port, 5000);
        assert_eq!(config.wait_time(), Duration::from_millis(250));
        assert_eq!(config.network, 42);
    }
}
