// ── Reconnector ──
//
// Sole owner of the broker connection state. Connects through a
// `Connector`, retries with capped exponential backoff, forwards the
// session's requests into the adapter inbox, and starts over with a fresh
// attempt budget when an established session drops. Running out of
// attempts is fatal for the process.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::adapter::{AdapterEvent, Request};
use crate::channel::Publisher;
use crate::error::CoreError;

// ── ConnectionState ──────────────────────────────────────────────

/// Broker connection state observable by the rest of the adapter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

// ── BackoffPolicy ────────────────────────────────────────────────

/// Exponential backoff for broker connects.
#[derive(Debug, Clone, PartialEq)]
pub struct BackoffPolicy {
    /// Delay after the first failed attempt. Default: 2s.
    pub initial_delay: Duration,
    /// Growth per failed attempt. Default: 1.5.
    pub factor: f64,
    /// Upper bound on any single delay. Default: 30s.
    pub max_delay: Duration,
    /// Attempts before giving up. Default: 10.
    pub max_attempts: u32,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(2),
            factor: 1.5,
            max_delay: Duration::from_secs(30),
            max_attempts: 10,
        }
    }
}

impl BackoffPolicy {
    /// Delay to wait after failed attempt number `attempt` (1-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = i32::try_from(attempt.saturating_sub(1)).unwrap_or(i32::MAX);
        let secs = self.initial_delay.as_secs_f64() * self.factor.powi(exponent);
        let capped = secs.min(self.max_delay.as_secs_f64()).max(0.0);
        Duration::from_secs_f64(capped)
    }
}

/// Attempt counter over a [`BackoffPolicy`].
#[derive(Debug, Clone)]
pub struct Backoff {
    policy: BackoffPolicy,
    failures: u32,
}

impl Backoff {
    pub fn new(policy: BackoffPolicy) -> Self {
        Self {
            policy,
            failures: 0,
        }
    }

    /// Record a failed attempt. Returns how long to wait before the next
    /// one, or `None` once the attempt budget is spent.
    pub fn next_delay(&mut self) -> Option<Duration> {
        self.failures = self.failures.saturating_add(1);
        if self.failures >= self.policy.max_attempts {
            return None;
        }
        Some(self.policy.delay_for(self.failures))
    }

    /// Failed attempts recorded so far.
    pub fn failures(&self) -> u32 {
        self.failures
    }
}

// ── Connector ────────────────────────────────────────────────────

/// A live broker session as seen by the adapter.
#[derive(Debug)]
pub struct Connection {
    pub publisher: Arc<dyn Publisher>,
    /// Subscribe/unsubscribe requests. Ends when the session does.
    pub requests: mpsc::Receiver<Request>,
}

/// Opens broker sessions.
pub trait Connector: Send + Sync + 'static {
    fn connect(&self) -> impl Future<Output = Result<Connection, CoreError>> + Send;
}

// ── Reconnector ──────────────────────────────────────────────────

pub struct Reconnector<C> {
    connector: C,
    policy: BackoffPolicy,
    state: watch::Sender<ConnectionState>,
    events: mpsc::Sender<AdapterEvent>,
}

impl<C: Connector> Reconnector<C> {
    pub fn new(connector: C, policy: BackoffPolicy, events: mpsc::Sender<AdapterEvent>) -> Self {
        let (state, _) = watch::channel(ConnectionState::Disconnected);
        Self {
            connector,
            policy,
            state,
            events,
        }
    }

    /// Observe connection state changes.
    pub fn state(&self) -> watch::Receiver<ConnectionState> {
        self.state.subscribe()
    }

    /// Keep a broker session up until `cancel` fires.
    ///
    /// Returns `Ok(())` on cancellation (or when the adapter stops
    /// listening) and [`CoreError::RetriesExhausted`] when a connect
    /// cycle runs out of attempts.
    pub async fn run(self, cancel: CancellationToken) -> Result<(), CoreError> {
        loop {
            let Some(connection) = self.connect_with_retry(&cancel).await? else {
                return Ok(());
            };
            let Connection {
                publisher,
                requests,
            } = connection;

            self.state.send_replace(ConnectionState::Connected);
            if self
                .events
                .send(AdapterEvent::Attached(Arc::clone(&publisher)))
                .await
                .is_err()
            {
                publisher.close();
                return Ok(());
            }
            info!("broker connected");

            let stopped = self.forward(requests, &cancel).await;

            self.state.send_replace(ConnectionState::Disconnected);
            let _ = self.events.send(AdapterEvent::Detached).await;

            if stopped {
                publisher.close();
                debug!("reconnector stopped");
                return Ok(());
            }
            warn!("broker connection lost, reconnecting");
        }
    }

    /// One connect cycle with a fresh attempt budget. `Ok(None)` means
    /// cancelled.
    async fn connect_with_retry(
        &self,
        cancel: &CancellationToken,
    ) -> Result<Option<Connection>, CoreError> {
        let mut backoff = Backoff::new(self.policy.clone());

        loop {
            let attempt = backoff.failures() + 1;
            self.state.send_replace(ConnectionState::Connecting);
            debug!(attempt, "connecting to broker");

            let result = tokio::select! {
                biased;
                () = cancel.cancelled() => {
                    self.state.send_replace(ConnectionState::Disconnected);
                    return Ok(None);
                }
                result = self.connector.connect() => result,
            };

            let err = match result {
                Ok(connection) => return Ok(Some(connection)),
                Err(e) => e,
            };
            self.state.send_replace(ConnectionState::Disconnected);

            let Some(delay) = backoff.next_delay() else {
                error!(attempts = attempt, error = %err, "giving up on broker");
                return Err(CoreError::RetriesExhausted {
                    attempts: attempt,
                    last_error: err.to_string(),
                });
            };
            warn!(
                attempt,
                delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                error = %err,
                "broker connect failed, retrying"
            );

            tokio::select! {
                biased;
                () = cancel.cancelled() => return Ok(None),
                () = tokio::time::sleep(delay) => {}
            }
        }
    }

    /// Pump requests into the adapter. Returns `true` if the reconnector
    /// should stop, `false` if the session ended on its own.
    async fn forward(
        &self,
        mut requests: mpsc::Receiver<Request>,
        cancel: &CancellationToken,
    ) -> bool {
        loop {
            tokio::select! {
                biased;
                () = cancel.cancelled() => return true,
                request = requests.recv() => {
                    let Some(request) = request else { return false };
                    if self.events.send(AdapterEvent::Request(request)).await.is_err() {
                        return true;
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_policy_matches_documented_values() {
        let policy = BackoffPolicy::default();
        assert_eq!(policy.delay_for(1), Duration::from_secs(2));
        assert_eq!(policy.delay_for(2), Duration::from_secs(3));
        assert_eq!(policy.delay_for(3), Duration::from_millis(4500));
        assert_eq!(policy.delay_for(20), Duration::from_secs(30));
    }

    #[test]
    fn delays_are_non_decreasing_and_capped() {
        let policy = BackoffPolicy::default();
        let mut backoff = Backoff::new(policy.clone());
        let mut delays = Vec::new();
        while let Some(delay) = backoff.next_delay() {
            delays.push(delay);
        }

        assert_eq!(delays.len(), 9);
        assert!(delays.windows(2).all(|w| w[0] <= w[1]));
        assert!(delays.iter().all(|d| *d <= policy.max_delay));
        assert_eq!(delays.last(), Some(&Duration::from_secs(30)));
        assert_eq!(backoff.failures(), 10);
    }

    #[test]
    fn single_attempt_policy_never_waits() {
        let mut backoff = Backoff::new(BackoffPolicy {
            max_attempts: 1,
            ..BackoffPolicy::default()
        });
        assert_eq!(backoff.next_delay(), None);
    }
}
