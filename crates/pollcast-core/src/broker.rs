// ── Broker binding ──
//
// Plugs the broker session into the adapter: the session handle publishes,
// responders acknowledge, and `BrokerConnector` opens sessions for the
// reconnector.

use std::sync::Arc;

use pollcast_api::broker::{self, Inbound, Responder, SessionConfig, SessionHandle};
use tokio::sync::mpsc;
use tracing::debug;

use crate::adapter::{Acknowledge, Request};
use crate::channel::Publisher;
use crate::error::CoreError;
use crate::item::Fields;
use crate::reconnect::{Connection, Connector};

const REQUEST_CHANNEL_SIZE: usize = 256;

impl Publisher for SessionHandle {
    fn publish(&self, item: &str, snapshot: bool, fields: Fields) -> Result<(), CoreError> {
        Ok(SessionHandle::publish(self, item, snapshot, fields)?)
    }

    fn close(&self) {
        SessionHandle::close(self);
    }
}

impl Acknowledge for Responder {
    fn accept(self: Box<Self>) {
        (*self).success();
    }

    fn reject(self: Box<Self>, reason: &str) {
        (*self).error(reason);
    }
}

/// Opens TCP sessions to the broker.
#[derive(Debug, Clone)]
pub struct BrokerConnector {
    config: SessionConfig,
}

impl BrokerConnector {
    pub fn new(config: SessionConfig) -> Self {
        Self { config }
    }
}

impl Connector for BrokerConnector {
    async fn connect(&self) -> Result<Connection, CoreError> {
        let (handle, mut inbound) = broker::connect(&self.config).await?;
        let (tx, requests) = mpsc::channel(REQUEST_CHANNEL_SIZE);

        let session = handle.clone();
        tokio::spawn(async move {
            while let Some(message) = inbound.recv().await {
                let request = match message {
                    Inbound::Subscribe { item, responder } => {
                        debug!(request_id = responder.request_id(), item = %item, "subscribe request");
                        Request::Subscribe {
                            item,
                            ack: Box::new(responder),
                        }
                    }
                    Inbound::Unsubscribe { item, responder } => {
                        debug!(request_id = responder.request_id(), item = %item, "unsubscribe request");
                        Request::Unsubscribe {
                            item,
                            ack: Box::new(responder),
                        }
                    }
                };
                if tx.send(request).await.is_err() {
                    break;
                }
            }
            debug!(
                peer = %session.peer(),
                open_items = session.open_items(),
                "broker request stream ended"
            );
        });

        Ok(Connection {
            publisher: Arc::new(handle),
            requests,
        })
    }
}
