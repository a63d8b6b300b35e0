use thiserror::Error;

/// Top-level error type for the `pollcast-api` crate.
///
/// Covers every failure mode of the two external collaborators: the
/// PostgREST counter store and the streaming broker's TCP session.
/// `pollcast-core` maps these into adapter-level error classes.
#[derive(Debug, Error)]
pub enum Error {
    // ── Store transport ─────────────────────────────────────────────
    /// HTTP transport error (connection refused, DNS failure, etc.)
    #[error("HTTP transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// URL parsing error.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// TLS or HTTP client construction error.
    #[error("TLS error: {0}")]
    Tls(String),

    /// Store credentials rejected (HTTP 401/403).
    #[error("Store rejected credentials (HTTP {status})")]
    Unauthorized { status: u16 },

    /// Non-success response from the store.
    #[error("Store error (HTTP {status}): {message}")]
    Store { status: u16, message: String },

    // ── Data ────────────────────────────────────────────────────────
    /// JSON deserialization failed, with the raw body for debugging.
    #[error("Deserialization error: {message}")]
    Deserialization { message: String, body: String },

    // ── Broker ──────────────────────────────────────────────────────
    /// TCP connection to the broker could not be established.
    #[error("Broker connection failed: {0}")]
    BrokerConnect(String),

    /// Broker session ended (peer closed, `CLOSE` received, or shut down).
    #[error("Broker session closed: {reason}")]
    BrokerClosed { reason: String },

    /// A line on the broker connection did not follow the protocol.
    #[error("Protocol error: {reason} (line {line:?})")]
    Protocol { line: String, reason: String },

    /// Publish to an item the broker never subscribed (or already dropped).
    #[error("Item not subscribed on broker: {item}")]
    UnknownItem { item: String },

    /// Socket-level I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Returns `true` if this is a transient error worth retrying.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Transport(e) => e.is_timeout() || e.is_connect(),
            Self::Store { status, .. } => *status >= 500 || *status == 429,
            Self::BrokerConnect(_) | Self::BrokerClosed { .. } | Self::Io(_) => true,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn server_errors_are_transient() {
        let err = Error::Store {
            status: 503,
            message: "unavailable".into(),
        };
        assert!(err.is_transient());

        let err = Error::Store {
            status: 400,
            message: "bad filter".into(),
        };
        assert!(!err.is_transient());
    }

    #[test]
    fn broker_errors_are_classified() {
        assert!(Error::BrokerConnect("refused".into()).is_transient());
        assert!(!Error::Unauthorized { status: 401 }.is_transient());
        assert!(
            !Error::UnknownItem {
                item: "option_1".into()
            }
            .is_transient()
        );
    }
}
