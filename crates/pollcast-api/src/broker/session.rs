// ── Broker session ──
//
// One TCP connection to the streaming broker. A driver task owns the
// socket: it answers the init handshake, records which items the broker
// opened (and under which SUB id), forwards subscribe/unsubscribe
// requests to the adapter, and drains the outbound queue. The session
// ends when the peer closes, an I/O error occurs, or the handle closes it.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tokio_util::codec::Framed;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use super::protocol::{LineCodec, Outbound, Request};
use crate::error::Error;

const INBOUND_CHANNEL_SIZE: usize = 256;

// ── SessionConfig ────────────────────────────────────────────────────

/// Where and how to reach the broker.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub host: String,
    pub port: u16,
    /// Upper bound on the TCP connect. Default: 5s.
    pub connect_timeout: Duration,
    /// Idle interval after which a `KEEPALIVE` line is written. Default: 10s.
    pub keepalive: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            host: "localhost".into(),
            port: 6661,
            connect_timeout: Duration::from_secs(5),
            keepalive: Duration::from_secs(10),
        }
    }
}

// ── Inbound ──────────────────────────────────────────────────────────

/// A subscription request forwarded from the broker to the adapter.
///
/// Every request carries a [`Responder`] that must be consumed to
/// answer the broker.
#[derive(Debug)]
pub enum Inbound {
    Subscribe { item: String, responder: Responder },
    Unsubscribe { item: String, responder: Responder },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ReplyKind {
    Subscribe,
    Unsubscribe,
}

/// One-shot answer to a broker request.
#[derive(Debug)]
pub struct Responder {
    id: String,
    item: String,
    kind: ReplyKind,
    out: mpsc::UnboundedSender<Outbound>,
    items: Arc<ItemTable>,
}

impl Responder {
    /// The broker's request id.
    pub fn request_id(&self) -> &str {
        &self.id
    }

    /// Accept the request.
    pub fn success(self) {
        let reply = match self.kind {
            ReplyKind::Subscribe => Outbound::SubscribeOk { id: self.id },
            ReplyKind::Unsubscribe => Outbound::UnsubscribeOk { id: self.id },
        };
        let _ = self.out.send(reply);
    }

    /// Reject the request with a human-readable message.
    ///
    /// Unsubscribe cannot fail on the wire, so a rejected unsubscribe is
    /// still acknowledged.
    pub fn error(self, message: &str) {
        let reply = match self.kind {
            ReplyKind::Subscribe => {
                self.items.remove_if(&self.item, &self.id);
                Outbound::SubscribeErr {
                    id: self.id,
                    message: message.to_owned(),
                }
            }
            ReplyKind::Unsubscribe => Outbound::UnsubscribeOk { id: self.id },
        };
        let _ = self.out.send(reply);
    }
}

// ── Item table ───────────────────────────────────────────────────────

/// item name → id of the `SUB` request that opened it.
#[derive(Debug, Default)]
struct ItemTable {
    inner: Mutex<HashMap<String, String>>,
}

impl ItemTable {
    fn insert(&self, item: String, id: String) {
        self.lock().insert(item, id);
    }

    fn remove(&self, item: &str) {
        self.lock().remove(item);
    }

    fn remove_if(&self, item: &str, id: &str) {
        let mut map = self.lock();
        if map.get(item).is_some_and(|current| current == id) {
            map.remove(item);
        }
    }

    fn get(&self, item: &str) -> Option<String> {
        self.lock().get(item).cloned()
    }

    fn len(&self) -> usize {
        self.lock().len()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, String>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

// ── SessionHandle ────────────────────────────────────────────────────

/// Publishing side of a live broker session.
///
/// Cheaply cloneable. All clones observe the same session; once it has
/// ended every [`publish`](Self::publish) fails with `BrokerClosed`.
#[derive(Debug, Clone)]
pub struct SessionHandle {
    out: mpsc::UnboundedSender<Outbound>,
    items: Arc<ItemTable>,
    cancel: CancellationToken,
    peer: SocketAddr,
}

impl SessionHandle {
    /// Queue an update for `item`.
    ///
    /// Fails with [`Error::UnknownItem`] if the broker has not opened the
    /// item on this session.
    pub fn publish(
        &self,
        item: &str,
        snapshot: bool,
        fields: Vec<(String, String)>,
    ) -> Result<(), Error> {
        if self.cancel.is_cancelled() {
            return Err(Error::BrokerClosed {
                reason: "session closed".into(),
            });
        }

        let sub_id = self.items.get(item).ok_or_else(|| Error::UnknownItem {
            item: item.to_owned(),
        })?;

        self.out
            .send(Outbound::Update {
                item: item.to_owned(),
                sub_id,
                snapshot,
                fields,
            })
            .map_err(|_| Error::BrokerClosed {
                reason: "session driver stopped".into(),
            })
    }

    /// Ask the driver task to close the connection.
    pub fn close(&self) {
        self.cancel.cancel();
    }

    /// Remote address of the broker.
    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    /// Number of items the broker currently has open on this session.
    pub fn open_items(&self) -> usize {
        self.items.len()
    }
}

// ── Connect ──────────────────────────────────────────────────────────

/// Open a session and spawn its driver task.
///
/// Returns the publishing handle and the stream of forwarded requests.
/// The request stream ends when the session does.
pub async fn connect(
    config: &SessionConfig,
) -> Result<(SessionHandle, mpsc::Receiver<Inbound>), Error> {
    let addr = format!("{}:{}", config.host, config.port);
    debug!(%addr, "connecting to broker");

    let stream = tokio::time::timeout(config.connect_timeout, TcpStream::connect(&addr))
        .await
        .map_err(|_| {
            Error::BrokerConnect(format!(
                "connect to {addr} timed out after {}ms",
                config.connect_timeout.as_millis()
            ))
        })?
        .map_err(|e| Error::BrokerConnect(format!("{addr}: {e}")))?;
    stream.set_nodelay(true)?;
    let peer = stream.peer_addr()?;

    let (out_tx, out_rx) = mpsc::unbounded_channel();
    let (inbound_tx, inbound_rx) = mpsc::channel(INBOUND_CHANNEL_SIZE);
    let items = Arc::new(ItemTable::default());
    let cancel = CancellationToken::new();

    let handle = SessionHandle {
        out: out_tx.clone(),
        items: Arc::clone(&items),
        cancel: cancel.clone(),
        peer,
    };

    let driver = Driver {
        framed: Framed::new(stream, LineCodec::default()),
        out_tx,
        out_rx,
        inbound: inbound_tx,
        items,
        cancel: cancel.clone(),
        keepalive: config.keepalive,
    };

    tokio::spawn(async move {
        match driver.run().await {
            Ok(()) => debug!(%peer, "broker session closed"),
            Err(e) => warn!(%peer, error = %e, "broker session ended"),
        }
        cancel.cancel();
    });

    info!(%peer, "broker session established");
    Ok((handle, inbound_rx))
}

// ── Driver ───────────────────────────────────────────────────────────

struct Driver {
    framed: Framed<TcpStream, LineCodec>,
    out_tx: mpsc::UnboundedSender<Outbound>,
    out_rx: mpsc::UnboundedReceiver<Outbound>,
    inbound: mpsc::Sender<Inbound>,
    items: Arc<ItemTable>,
    cancel: CancellationToken,
    keepalive: Duration,
}

impl Driver {
    async fn run(self) -> Result<(), Error> {
        let Self {
            framed,
            out_tx,
            mut out_rx,
            inbound,
            items,
            cancel,
            keepalive,
        } = self;
        let (mut sink, mut stream) = framed.split();

        let mut heartbeat = tokio::time::interval(keepalive);
        heartbeat.set_missed_tick_behavior(MissedTickBehavior::Delay);
        heartbeat.tick().await; // consume the immediate first tick

        loop {
            tokio::select! {
                biased;
                () = cancel.cancelled() => {
                    // Flush whatever was queued before the close request.
                    while let Ok(msg) = out_rx.try_recv() {
                        sink.send(msg.encode()).await?;
                    }
                    return Ok(());
                }
                Some(msg) = out_rx.recv() => {
                    let line = msg.encode();
                    trace!(%line, "broker <-");
                    sink.send(line).await?;
                    heartbeat.reset();
                }
                frame = stream.next() => {
                    let line = match frame {
                        Some(Ok(line)) => line,
                        Some(Err(e)) => return Err(e),
                        None => {
                            return Err(Error::BrokerClosed {
                                reason: "connection closed by peer".into(),
                            });
                        }
                    };
                    trace!(%line, "broker ->");

                    let request = match Request::parse(&line) {
                        Ok(r) => r,
                        Err(e) => {
                            warn!(error = %e, "ignoring malformed broker request");
                            continue;
                        }
                    };

                    match request {
                        Request::Init { id } => {
                            sink.send(Outbound::InitOk { id }.encode()).await?;
                            heartbeat.reset();
                        }
                        Request::Subscribe { id, item } => {
                            items.insert(item.clone(), id.clone());
                            let responder = Responder {
                                id,
                                item: item.clone(),
                                kind: ReplyKind::Subscribe,
                                out: out_tx.clone(),
                                items: Arc::clone(&items),
                            };
                            if inbound.send(Inbound::Subscribe { item, responder }).await.is_err() {
                                return Ok(());
                            }
                        }
                        Request::Unsubscribe { id, item } => {
                            items.remove(&item);
                            let responder = Responder {
                                id,
                                item: item.clone(),
                                kind: ReplyKind::Unsubscribe,
                                out: out_tx.clone(),
                                items: Arc::clone(&items),
                            };
                            if inbound.send(Inbound::Unsubscribe { item, responder }).await.is_err() {
                                return Ok(());
                            }
                        }
                        Request::KeepAlive => {}
                        Request::Close { reason } => {
                            return Err(Error::BrokerClosed {
                                reason: reason.unwrap_or_else(|| "CLOSE received".into()),
                            });
                        }
                    }
                }
                _ = heartbeat.tick() => {
                    sink.send(Outbound::KeepAlive.encode()).await?;
                }
            }
        }
    }
}
