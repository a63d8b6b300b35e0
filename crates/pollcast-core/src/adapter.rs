// ── Adapter event loop ──
//
// One task owns the registry, the counter cache and the presence set.
// Broker requests, connection changes, timer ticks and finished store
// reads all arrive here and are handled one at a time. Store reads are
// the only slow operations; they run on spawned tasks and report back,
// so subscribes and unsubscribes keep flowing while a read is pending.

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use pollcast_api::CounterRow;
use tokio::sync::{mpsc, watch};
use tokio::task::{JoinError, JoinSet};
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::channel::{BroadcastChannel, Publisher};
use crate::config::AdapterConfig;
use crate::detector::{DeltaDetector, ScanPlan};
use crate::error::{CoreError, SNAPSHOT_FAILED_MESSAGE};
use crate::item::{Item, VISITORS_COUNT, count_fields, ping_fields, vote_count_fields};
use crate::presence::PresenceTracker;
use crate::reconnect::{ConnectionState, Connector, Reconnector};
use crate::registry::Registry;

const EVENT_CHANNEL_SIZE: usize = 1024;

/// Reply sent when a subscription is replaced or dropped before its
/// snapshot read finished.
const SUPERSEDED_MESSAGE: &str = "Subscription superseded";

// ── Seams ────────────────────────────────────────────────────────

/// Read access to the vote counters.
pub trait CounterStore: Send + Sync + 'static {
    /// Current value for one entity. `None` if the row does not exist.
    fn get(&self, entity_id: &str) -> impl Future<Output = Result<Option<i64>, CoreError>> + Send;

    /// Current values for many entities in one round trip. Missing rows
    /// are simply absent from the result.
    fn get_many(
        &self,
        entity_ids: &[String],
    ) -> impl Future<Output = Result<Vec<CounterRow>, CoreError>> + Send;
}

/// Answer to one broker request. Consumed exactly once.
pub trait Acknowledge: Send + fmt::Debug {
    fn accept(self: Box<Self>);
    fn reject(self: Box<Self>, reason: &str);
}

/// Subscription request from the broker.
#[derive(Debug)]
pub enum Request {
    Subscribe {
        item: String,
        ack: Box<dyn Acknowledge>,
    },
    Unsubscribe {
        item: String,
        ack: Box<dyn Acknowledge>,
    },
}

/// Everything the event loop reacts to besides its own timers.
#[derive(Debug)]
pub enum AdapterEvent {
    Request(Request),
    /// A broker session came up; publish through it.
    Attached(Arc<dyn Publisher>),
    /// The broker session went away.
    Detached,
}

// ── Store read results ───────────────────────────────────────────

#[derive(Debug)]
struct SnapshotRead {
    item: String,
    entity_id: String,
    generation: u64,
    ack: Box<dyn Acknowledge>,
    result: Result<Option<i64>, CoreError>,
}

#[derive(Debug)]
struct ScanRead {
    plan: ScanPlan,
    result: Result<Vec<CounterRow>, CoreError>,
}

// ── Adapter ──────────────────────────────────────────────────────

pub struct Adapter<S> {
    store: Arc<S>,
    registry: Registry,
    detector: DeltaDetector,
    presence: PresenceTracker,
    channel: BroadcastChannel,
    detector_interval: Duration,
    sweep_interval: Duration,
    inbox: mpsc::Receiver<AdapterEvent>,
    snapshots: JoinSet<SnapshotRead>,
    scans: JoinSet<ScanRead>,
}

impl<S: CounterStore> Adapter<S> {
    pub fn new(
        config: &AdapterConfig,
        store: S,
        state: watch::Receiver<ConnectionState>,
        inbox: mpsc::Receiver<AdapterEvent>,
    ) -> Self {
        Self {
            store: Arc::new(store),
            registry: Registry::new(),
            detector: DeltaDetector::new(),
            presence: PresenceTracker::new(config.visitor_ttl),
            channel: BroadcastChannel::new(state),
            detector_interval: config.detector_interval,
            sweep_interval: config.sweep_interval,
            inbox,
            snapshots: JoinSet::new(),
            scans: JoinSet::new(),
        }
    }

    /// Drive the adapter until `cancel` fires or every event sender is gone.
    pub async fn run(mut self, cancel: CancellationToken) {
        let mut detect = tokio::time::interval(self.detector_interval);
        detect.set_missed_tick_behavior(MissedTickBehavior::Skip);
        detect.tick().await; // consume the immediate first tick

        let mut sweep = tokio::time::interval(self.sweep_interval);
        sweep.set_missed_tick_behavior(MissedTickBehavior::Skip);
        sweep.tick().await;

        info!(
            detector_interval_ms = duration_ms(self.detector_interval),
            sweep_interval_secs = self.sweep_interval.as_secs(),
            visitor_ttl_secs = self.presence.ttl().as_secs(),
            "adapter running"
        );

        loop {
            tokio::select! {
                biased;
                () = cancel.cancelled() => break,
                event = self.inbox.recv() => {
                    let Some(event) = event else { break };
                    self.handle_event(event);
                }
                Some(joined) = self.snapshots.join_next() => match joined {
                    Ok(read) => self.finish_snapshot(read),
                    Err(e) => log_join_error(&e, "snapshot read"),
                },
                Some(joined) = self.scans.join_next() => match joined {
                    Ok(read) => self.finish_scan(read),
                    Err(e) => log_join_error(&e, "batched read"),
                },
                _ = detect.tick() => self.start_scan(),
                _ = sweep.tick() => self.sweep(),
            }
        }

        self.snapshots.abort_all();
        self.scans.abort_all();
        debug!("adapter stopped");
    }

    fn handle_event(&mut self, event: AdapterEvent) {
        match event {
            AdapterEvent::Request(Request::Subscribe { item, ack }) => self.subscribe(item, ack),
            AdapterEvent::Request(Request::Unsubscribe { item, ack }) => {
                self.unsubscribe(&item);
                ack.accept();
            }
            AdapterEvent::Attached(publisher) => self.channel.attach(publisher),
            AdapterEvent::Detached => self.channel.detach(),
        }
    }

    // ── Subscriptions ────────────────────────────────────────────

    fn subscribe(&mut self, name: String, ack: Box<dyn Acknowledge>) {
        let (item, generation) = match self.registry.subscribe(&name) {
            Ok(sub) => (sub.item.clone(), sub.generation),
            Err(e) => {
                debug!(item = %name, "rejecting subscription: {e}");
                ack.reject(&e.to_string());
                return;
            }
        };

        match item {
            Item::VoteOption(entity_id) => {
                debug!(item = %name, generation, "fetching snapshot");
                let store = Arc::clone(&self.store);
                self.snapshots.spawn(async move {
                    let result = store.get(&entity_id).await;
                    SnapshotRead {
                        item: name,
                        entity_id,
                        generation,
                        ack,
                        result,
                    }
                });
            }
            Item::VisitorPing(visitor_id) => {
                ack.accept();
                self.channel
                    .publish_snapshot(&self.registry, &name, ping_fields());

                let count = self.presence.join(&visitor_id, Instant::now());
                debug!(visitor_id, count, "visitor joined");
                self.broadcast_count(count);
            }
            Item::VisitorCount => {
                ack.accept();
                self.channel.publish_snapshot(
                    &self.registry,
                    VISITORS_COUNT,
                    count_fields(self.presence.count()),
                );
            }
        }
    }

    fn unsubscribe(&mut self, name: &str) {
        let Some(sub) = self.registry.unregister(name) else {
            debug!(item = name, "unsubscribe for unknown item");
            return;
        };

        match sub.item {
            Item::VoteOption(entity_id) => self.detector.forget(&entity_id),
            Item::VisitorPing(visitor_id) => {
                let count = self.presence.leave(&visitor_id);
                debug!(visitor_id, count, "visitor left");
                self.broadcast_count(count);
            }
            Item::VisitorCount => {}
        }
    }

    fn finish_snapshot(&mut self, read: SnapshotRead) {
        let SnapshotRead {
            item,
            entity_id,
            generation,
            ack,
            result,
        } = read;

        let value = match result {
            Ok(Some(value)) => value,
            Ok(None) => {
                warn!(item, "no counter row for subscribed option");
                self.registry.discard(&item, generation);
                ack.reject(SNAPSHOT_FAILED_MESSAGE);
                return;
            }
            Err(e) => {
                warn!(item, error = %e, "snapshot read failed");
                self.registry.discard(&item, generation);
                ack.reject(SNAPSHOT_FAILED_MESSAGE);
                return;
            }
        };

        if !self.registry.activate(&item, generation) {
            debug!(item, generation, "subscription changed during snapshot read");
            ack.reject(SUPERSEDED_MESSAGE);
            return;
        }

        ack.accept();
        // Unrecorded values are pushed again by the next scan.
        if self
            .channel
            .publish_snapshot(&self.registry, &item, vote_count_fields(value))
        {
            self.detector.record(&entity_id, value);
        }
    }

    // ── Delta detection ──────────────────────────────────────────

    fn start_scan(&mut self) {
        if !self.scans.is_empty() {
            debug!("previous batched read still running, skipping tick");
            return;
        }
        let Some(plan) = self.detector.plan(&self.registry) else {
            return;
        };

        let store = Arc::clone(&self.store);
        self.scans.spawn(async move {
            let result = store.get_many(&plan.ids()).await;
            ScanRead { plan, result }
        });
    }

    fn finish_scan(&mut self, read: ScanRead) {
        let ScanRead { plan, result } = read;
        let rows = match result {
            Ok(rows) => rows,
            Err(e) => {
                warn!(error = %e, "batched counter read failed, skipping tick");
                return;
            }
        };

        for (entity_id, value) in self.detector.apply(&self.registry, &plan, rows) {
            debug!(entity_id, value, "vote count changed");
            if self.channel.publish_update(
                &self.registry,
                &Item::option_name(&entity_id),
                vote_count_fields(value),
            ) {
                self.detector.record(&entity_id, value);
            }
        }
    }

    // ── Presence ─────────────────────────────────────────────────

    fn sweep(&mut self) {
        let evicted = self.presence.sweep(Instant::now());
        if evicted.is_empty() {
            return;
        }
        for visitor_id in &evicted {
            self.registry.unregister(&Item::visitor_name(visitor_id));
        }

        let count = self.presence.count();
        info!(evicted = evicted.len(), count, "evicted stale visitors");
        self.broadcast_count(count);
    }

    fn broadcast_count(&self, count: usize) {
        self.channel
            .publish_update(&self.registry, VISITORS_COUNT, count_fields(count));
    }
}

fn log_join_error(err: &JoinError, what: &str) {
    if err.is_cancelled() {
        debug!("{what} cancelled");
    } else {
        error!(error = %err, "{what} task panicked");
    }
}

fn duration_ms(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}

// ── Entry point ──────────────────────────────────────────────────

/// Run the adapter against `store`, keeping a broker session up through
/// `connector`, until `cancel` fires.
///
/// Fails only when the broker stays unreachable for a whole retry cycle.
pub async fn serve<S, C>(
    config: &AdapterConfig,
    store: S,
    connector: C,
    cancel: CancellationToken,
) -> Result<(), CoreError>
where
    S: CounterStore,
    C: Connector,
{
    let (events_tx, events_rx) = mpsc::channel(EVENT_CHANNEL_SIZE);
    let reconnector = Reconnector::new(connector, config.reconnect.clone(), events_tx);
    let adapter = Adapter::new(config, store, reconnector.state(), events_rx);

    let adapter_cancel = cancel.child_token();
    let adapter_task = tokio::spawn(adapter.run(adapter_cancel.clone()));

    let result = reconnector.run(cancel).await;

    adapter_cancel.cancel();
    if let Err(e) = adapter_task.await {
        error!(error = %e, "adapter task failed");
    }
    result
}
