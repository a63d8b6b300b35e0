// ── Runtime adapter configuration ──
//
// Describes how the adapter reaches its two collaborators and how its
// timers are tuned. Never touches disk: the binary builds an
// `AdapterConfig` from the config crate and hands it in.

use std::path::PathBuf;
use std::time::Duration;

use pollcast_api::broker::SessionConfig;
use pollcast_api::store::DEFAULT_TABLE;
use secrecy::SecretString;
use url::Url;

use crate::detector;
use crate::presence;
use crate::reconnect::BackoffPolicy;

/// Where the vote counters live.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Project URL, e.g. `https://xyz.supabase.co`.
    pub url: Url,
    /// Service-role key sent as `apikey` and bearer token.
    pub service_key: SecretString,
    /// Table holding `id` and `vote_count`.
    pub table: String,
    /// Per-request timeout.
    pub timeout: Duration,
    /// Extra CA certificate to trust, for self-hosted stores.
    pub ca_cert: Option<PathBuf>,
}

impl StoreConfig {
    pub fn new(url: Url, service_key: SecretString) -> Self {
        Self {
            url,
            service_key,
            table: DEFAULT_TABLE.to_owned(),
            timeout: Duration::from_secs(10),
            ca_cert: None,
        }
    }
}

/// Everything the adapter needs to run.
#[derive(Debug, Clone)]
pub struct AdapterConfig {
    pub store: StoreConfig,
    pub broker: SessionConfig,
    /// Delta detector tick. Default: 500ms.
    pub detector_interval: Duration,
    /// Presence sweep tick. Default: 15s.
    pub sweep_interval: Duration,
    /// How long a visitor stays counted without a fresh ping. Default: 1h.
    pub visitor_ttl: Duration,
    pub reconnect: BackoffPolicy,
}

impl AdapterConfig {
    /// Defaults for everything except the store location and key.
    pub fn new(store: StoreConfig) -> Self {
        Self {
            store,
            broker: SessionConfig::default(),
            detector_interval: detector::DEFAULT_INTERVAL,
            sweep_interval: presence::DEFAULT_SWEEP_INTERVAL,
            visitor_ttl: presence::DEFAULT_TTL,
            reconnect: BackoffPolicy::default(),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let store = StoreConfig::new(
            Url::parse("https://example.supabase.co").unwrap(),
            SecretString::from("key"),
        );
        let config = AdapterConfig::new(store);

        assert_eq!(config.store.table, "poll_options");
        assert_eq!(config.broker.host, "localhost");
        assert_eq!(config.broker.port, 6661);
        assert_eq!(config.detector_interval, Duration::from_millis(500));
        assert_eq!(config.sweep_interval, Duration::from_secs(15));
        assert_eq!(config.visitor_ttl, Duration::from_secs(3600));
        assert_eq!(config.reconnect.max_attempts, 10);
    }
}
