// ── Core error types ──
//
// Adapter-level errors. Consumers never see HTTP status codes or broker
// wire details directly; the `From<pollcast_api::Error>` impl folds
// transport-layer failures into the classes the adapter acts on.

use thiserror::Error;

/// Message sent back to the broker when an item name has an unknown shape.
pub const INVALID_ITEM_MESSAGE: &str =
    "Invalid item name. Expected format: option_<uuid>, visitor_<uuid>, or 'visitors_count'";

/// Message sent back to the broker when the snapshot read for an
/// `option_` item fails.
pub const SNAPSHOT_FAILED_MESSAGE: &str = "Failed to fetch vote count";

/// Unified error type for the core crate.
#[derive(Debug, Error)]
pub enum CoreError {
    // ── Validation ───────────────────────────────────────────────────
    /// The requested item name matches none of the known patterns.
    #[error("{INVALID_ITEM_MESSAGE}")]
    InvalidItem { item: String },

    // ── Store ────────────────────────────────────────────────────────
    /// A counter read failed. `transient` tells whether the next tick is
    /// likely to succeed.
    #[error("Store read failed: {message}")]
    Store { message: String, transient: bool },

    // ── Broker ───────────────────────────────────────────────────────
    #[error("Cannot reach broker: {reason}")]
    BrokerUnreachable { reason: String },

    #[error("Broker disconnected: {reason}")]
    BrokerDisconnected { reason: String },

    /// Publish to an item the broker has not opened.
    #[error("Item not open on broker: {item}")]
    NotSubscribed { item: String },

    #[error("Gave up connecting to broker after {attempts} attempts: {last_error}")]
    RetriesExhausted { attempts: u32, last_error: String },

    // ── Configuration ────────────────────────────────────────────────
    #[error("Configuration error: {message}")]
    Config { message: String },

    // ── Internal ─────────────────────────────────────────────────────
    #[error("Internal error: {0}")]
    Internal(String),
}

impl CoreError {
    /// Whether retrying the same operation later may succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Store { transient, .. } => *transient,
            Self::BrokerUnreachable { .. } | Self::BrokerDisconnected { .. } => true,
            _ => false,
        }
    }

    /// Whether this is a rejection of client input rather than a failure.
    pub fn is_validation(&self) -> bool {
        matches!(self, Self::InvalidItem { .. })
    }
}

// ── Conversion from transport-layer errors ───────────────────────────

impl From<pollcast_api::Error> for CoreError {
    fn from(err: pollcast_api::Error) -> Self {
        use pollcast_api::Error as Api;

        let transient = err.is_transient();
        match err {
            Api::InvalidUrl(e) => Self::Config {
                message: format!("invalid store URL: {e}"),
            },
            Api::Tls(message) => Self::Config { message },
            Api::BrokerConnect(reason) => Self::BrokerUnreachable { reason },
            Api::BrokerClosed { reason } => Self::BrokerDisconnected { reason },
            Api::UnknownItem { item } => Self::NotSubscribed { item },
            Api::Protocol { reason, .. } => Self::BrokerDisconnected {
                reason: format!("protocol error: {reason}"),
            },
            Api::Io(e) => Self::BrokerDisconnected {
                reason: e.to_string(),
            },
            other @ (Api::Transport(_)
            | Api::Unauthorized { .. }
            | Api::Store { .. }
            | Api::Deserialization { .. }) => Self::Store {
                message: other.to_string(),
                transient,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_item_renders_broker_message() {
        let err = CoreError::InvalidItem {
            item: "foo_123".into(),
        };
        assert_eq!(err.to_string(), INVALID_ITEM_MESSAGE);
        assert!(err.is_validation());
        assert!(!err.is_transient());
    }

    #[test]
    fn store_errors_keep_transience() {
        let err = CoreError::from(pollcast_api::Error::Store {
            status: 503,
            message: "unavailable".into(),
        });
        assert!(matches!(err, CoreError::Store { transient: true, .. }));

        let err = CoreError::from(pollcast_api::Error::Unauthorized { status: 401 });
        assert!(matches!(err, CoreError::Store { transient: false, .. }));
    }

    #[test]
    fn broker_errors_map_to_broker_classes() {
        let err = CoreError::from(pollcast_api::Error::BrokerConnect("refused".into()));
        assert!(matches!(err, CoreError::BrokerUnreachable { .. }));

        let err = CoreError::from(pollcast_api::Error::UnknownItem {
            item: "option_a".into(),
        });
        assert!(matches!(err, CoreError::NotSubscribed { item } if item == "option_a"));
    }
}
