//! `pollcast run`: serve until a shutdown signal.

use tokio_util::sync::CancellationToken;
use tracing::info;

use pollcast_config::{load_config, resolve_config_path};
use pollcast_core::{BrokerConnector, serve, store_client};

use crate::cli::GlobalOpts;
use crate::error::CliError;
use crate::signal;

pub async fn handle(global: &GlobalOpts) -> Result<(), CliError> {
    let path = resolve_config_path(global.config.as_deref());
    let config = load_config(&path)
        .and_then(|c| c.to_adapter_config())
        .map_err(|e| CliError::from_config(e, &path))?;

    let address = format!("{}:{}", config.broker.host, config.broker.port);
    let store = store_client(&config.store).map_err(|e| CliError::from_core(e, &address))?;
    let connector = BrokerConnector::new(config.broker.clone());

    info!(
        config = %path.display(),
        store = %config.store.url,
        table = %config.store.table,
        broker = %address,
        "starting adapter"
    );

    let cancel = CancellationToken::new();
    let signals = tokio::spawn(signal::cancel_on_shutdown(cancel.clone()));

    let result = serve(&config, store, connector, cancel).await;
    signals.abort();

    result.map_err(|e| CliError::from_core(e, &address))?;
    info!("adapter stopped");
    Ok(())
}
