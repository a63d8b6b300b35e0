// ── Broadcast channel ──
//
// Outbound side of the adapter. Publishes are fire-and-forget: while the
// broker is not connected, or the item has no active subscription, they
// are dropped with a debug log instead of queued.

use std::fmt;
use std::sync::Arc;

use tokio::sync::watch;
use tracing::debug;

use crate::error::CoreError;
use crate::item::Fields;
use crate::reconnect::ConnectionState;
use crate::registry::Registry;

/// Something that can deliver item updates to the broker.
pub trait Publisher: Send + Sync + fmt::Debug {
    /// Send one update. `snapshot` marks the initial image of an item.
    fn publish(&self, item: &str, snapshot: bool, fields: Fields) -> Result<(), CoreError>;

    /// Tear the underlying connection down.
    fn close(&self);
}

#[derive(Debug)]
pub struct BroadcastChannel {
    publisher: Option<Arc<dyn Publisher>>,
    state: watch::Receiver<ConnectionState>,
}

impl BroadcastChannel {
    pub fn new(state: watch::Receiver<ConnectionState>) -> Self {
        Self {
            publisher: None,
            state,
        }
    }

    /// Route publishes to a freshly connected session.
    pub fn attach(&mut self, publisher: Arc<dyn Publisher>) {
        self.publisher = Some(publisher);
    }

    pub fn detach(&mut self) {
        self.publisher = None;
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    pub fn is_connected(&self) -> bool {
        self.publisher.is_some() && self.state() == ConnectionState::Connected
    }

    /// Push the initial image of `item`.
    pub fn publish_snapshot(&self, registry: &Registry, item: &str, fields: Fields) -> bool {
        self.publish(registry, item, true, fields)
    }

    /// Push a change to `item`.
    pub fn publish_update(&self, registry: &Registry, item: &str, fields: Fields) -> bool {
        self.publish(registry, item, false, fields)
    }

    fn publish(&self, registry: &Registry, item: &str, snapshot: bool, fields: Fields) -> bool {
        if !registry.is_active(item) {
            debug!(item, "no active subscription, dropping publish");
            return false;
        }
        let publisher = match &self.publisher {
            Some(p) if self.state() == ConnectionState::Connected => p,
            _ => {
                debug!(item, state = %self.state(), "broker not connected, dropping publish");
                return false;
            }
        };
        match publisher.publish(item, snapshot, fields) {
            Ok(()) => true,
            Err(e) => {
                debug!(item, error = %e, "publish failed");
                false
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::Mutex;

    use super::*;
    use crate::item::{count_fields, vote_count_fields};

    #[derive(Debug, Default)]
    struct Recorder {
        sent: Mutex<Vec<(String, bool, Fields)>>,
        fail: bool,
    }

    impl Publisher for Recorder {
        fn publish(&self, item: &str, snapshot: bool, fields: Fields) -> Result<(), CoreError> {
            if self.fail {
                return Err(CoreError::NotSubscribed { item: item.into() });
            }
            self.sent
                .lock()
                .unwrap()
                .push((item.to_owned(), snapshot, fields));
            Ok(())
        }

        fn close(&self) {}
    }

    fn connected() -> (watch::Sender<ConnectionState>, BroadcastChannel, Arc<Recorder>) {
        let (tx, rx) = watch::channel(ConnectionState::Connected);
        let mut channel = BroadcastChannel::new(rx);
        let recorder = Arc::new(Recorder::default());
        channel.attach(recorder.clone());
        (tx, channel, recorder)
    }

    #[test]
    fn publishes_to_active_items() {
        let (_tx, channel, recorder) = connected();
        let mut registry = Registry::new();
        let generation = registry.subscribe("option_a").unwrap().generation;
        registry.activate("option_a", generation);

        assert!(channel.publish_snapshot(&registry, "option_a", vote_count_fields(1)));
        assert!(channel.publish_update(&registry, "option_a", vote_count_fields(2)));

        let sent = recorder.sent.lock().unwrap();
        assert_eq!(sent.len(), 2);
        assert!(sent[0].1);
        assert!(!sent[1].1);
    }

    #[test]
    fn drops_publish_without_active_subscription() {
        let (_tx, channel, recorder) = connected();
        let mut registry = Registry::new();
        registry.subscribe("option_a").unwrap();

        assert!(!channel.publish_update(&registry, "option_a", vote_count_fields(1)));
        assert!(!channel.publish_update(&registry, "visitors_count", count_fields(1)));
        assert!(recorder.sent.lock().unwrap().is_empty());
    }

    #[test]
    fn drops_publish_while_disconnected() {
        let (tx, mut channel, recorder) = connected();
        let mut registry = Registry::new();
        registry.subscribe("visitors_count").unwrap();

        tx.send_replace(ConnectionState::Disconnected);
        assert!(!channel.is_connected());
        assert!(!channel.publish_update(&registry, "visitors_count", count_fields(3)));

        tx.send_replace(ConnectionState::Connected);
        channel.detach();
        assert!(!channel.publish_update(&registry, "visitors_count", count_fields(3)));

        assert!(recorder.sent.lock().unwrap().is_empty());
    }

    #[test]
    fn publisher_errors_are_swallowed() {
        let (_tx, rx) = watch::channel(ConnectionState::Connected);
        let mut channel = BroadcastChannel::new(rx);
        channel.attach(Arc::new(Recorder {
            fail: true,
            ..Recorder::default()
        }));
        let mut registry = Registry::new();
        registry.subscribe("visitors_count").unwrap();

        assert!(!channel.publish_update(&registry, "visitors_count", count_fields(1)));
    }
}
