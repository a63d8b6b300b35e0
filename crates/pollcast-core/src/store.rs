// ── Store binding ──
//
// Plugs the PostgREST client into the adapter's `CounterStore` seam.

use pollcast_api::{CounterRow, StoreClient, TlsMode, TransportConfig};

use crate::adapter::CounterStore;
use crate::config::StoreConfig;
use crate::error::CoreError;

/// Build the store client described by `config`.
pub fn store_client(config: &StoreConfig) -> Result<StoreClient, CoreError> {
    let transport = TransportConfig {
        tls: config
            .ca_cert
            .clone()
            .map_or(TlsMode::System, TlsMode::CustomCa),
        timeout: config.timeout,
    };
    Ok(StoreClient::new(
        &config.url,
        &config.table,
        &config.service_key,
        &transport,
    )?)
}

impl CounterStore for StoreClient {
    async fn get(&self, entity_id: &str) -> Result<Option<i64>, CoreError> {
        Ok(self.get_counter(entity_id).await?)
    }

    async fn get_many(&self, entity_ids: &[String]) -> Result<Vec<CounterRow>, CoreError> {
        Ok(self.get_counters(entity_ids).await?)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use secrecy::SecretString;
    use url::Url;

    use super::*;

    #[test]
    fn builds_client_for_table() {
        let config = StoreConfig::new(
            Url::parse("https://example.supabase.co").unwrap(),
            SecretString::from("key"),
        );
        let client = store_client(&config).unwrap();
        assert_eq!(
            client.table_url().as_str(),
            "https://example.supabase.co/rest/v1/poll_options"
        );
    }

    #[test]
    fn missing_ca_file_is_config_error() {
        let mut config = StoreConfig::new(
            Url::parse("https://example.supabase.co").unwrap(),
            SecretString::from("key"),
        );
        config.ca_cert = Some("/nonexistent/ca.pem".into());
        let err = store_client(&config).unwrap_err();
        assert!(matches!(err, CoreError::Config { .. }));
    }
}
