use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock as StdRwLock, Weak};

use axum::body::Bytes;
use axum::extract::ws::Message;
use chrono::Utc;
use serde::Serialize;
use thermogate_core::alert::AlertEvent;
use thermogate_core::measurement::Measurement;
use thermogate_core::protocol::{OutboundEvent, ProducerCommand};
use thermogate_core::types::{ConnId, Timestamp};
use thermogate_db::TelemetryStore;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{broadcast, mpsc, RwLock};
use tokio_util::sync::CancellationToken;

use super::{DisconnectListener, MeasurementObserver, Role};

/// Capacity of the in-process alert stream (email and other listeners).
const ALERT_STREAM_CAPACITY: usize = 256;

struct Subscriber {
    role: Role,
    sender: mpsc::Sender<Message>,
    /// Cancelled when the hub drops this subscriber.
    closed: CancellationToken,
    /// Registration order; lower is older.
    seq: u64,
}

/// What a connection task gets back from [`Hub::register`].
pub struct Registration {
    /// Outbound frames to forward to the socket.
    pub receiver: mpsc::Receiver<Message>,
    /// Fires when the hub drops this subscriber from the registry.
    pub closed: CancellationToken,
}

/// Subscriber registry plus publish paths.
///
/// Thread-safe via interior locks; designed to be wrapped in `Arc` and
/// shared across connection tasks.
pub struct Hub {
    subscribers: RwLock<HashMap<ConnId, Subscriber>>,
    queue_capacity: usize,
    next_seq: AtomicU64,
    store: Arc<dyn TelemetryStore>,
    observers: StdRwLock<Vec<Arc<dyn MeasurementObserver>>>,
    disconnect_listeners: StdRwLock<Vec<Weak<dyn DisconnectListener>>>,
    alerts: broadcast::Sender<AlertEvent>,
}

impl Hub {
    pub fn new(store: Arc<dyn TelemetryStore>, queue_capacity: usize) -> Self {
        let (alerts, _) = broadcast::channel(ALERT_STREAM_CAPACITY);
        Self {
            subscribers: RwLock::new(HashMap::new()),
            queue_capacity: queue_capacity.max(1),
            next_seq: AtomicU64::new(0),
            store,
            observers: StdRwLock::new(Vec::new()),
            disconnect_listeners: StdRwLock::new(Vec::new()),
            alerts,
        }
    }

    pub fn add_observer(&self, observer: Arc<dyn MeasurementObserver>) {
        self.observers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(observer);
    }

    pub fn add_disconnect_listener(&self, listener: Weak<dyn DisconnectListener>) {
        self.disconnect_listeners
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(listener);
    }

    /// Receive every alert the hub publishes, independent of WebSocket
    /// subscribers. Slow receivers lag rather than block the hub.
    pub fn subscribe_alerts(&self) -> broadcast::Receiver<AlertEvent> {
        self.alerts.subscribe()
    }

    // -----------------------------------------------------------------------
    // Registry
    // -----------------------------------------------------------------------

    /// Register a connection. Returns `None` if `conn_id` is already
    /// registered, leaving the existing registration untouched.
    pub async fn register(&self, conn_id: ConnId, role: Role) -> Option<Registration> {
        let mut subs = self.subscribers.write().await;
        if subs.contains_key(&conn_id) {
            return None;
        }
        let (sender, receiver) = mpsc::channel(self.queue_capacity);
        let closed = CancellationToken::new();
        let seq = self.next_seq.fetch_add(1, Ordering::Relaxed);
        subs.insert(
            conn_id.clone(),
            Subscriber {
                role,
                sender,
                closed: closed.clone(),
                seq,
            },
        );
        tracing::info!(conn_id = %conn_id, ?role, "Subscriber registered");
        Some(Registration { receiver, closed })
    }

    /// Drop a connection. Returns `false` if it was not registered.
    ///
    /// Removing a producer notifies every [`DisconnectListener`].
    pub async fn unregister(&self, conn_id: &str) -> bool {
        let removed = self.subscribers.write().await.remove(conn_id);
        let Some(sub) = removed else {
            return false;
        };
        self.retire(conn_id, sub);
        true
    }

    /// Signal a removed subscriber's connection task and, for producers,
    /// tell the disconnect listeners.
    fn retire(&self, conn_id: &str, sub: Subscriber) {
        sub.closed.cancel();
        tracing::info!(conn_id = %conn_id, role = ?sub.role, "Subscriber unregistered");

        if sub.role == Role::Producer {
            let listeners: Vec<_> = self
                .disconnect_listeners
                .read()
                .unwrap_or_else(PoisonError::into_inner)
                .iter()
                .filter_map(Weak::upgrade)
                .collect();
            for listener in listeners {
                listener.producer_disconnected(conn_id);
            }
        }
    }

    pub async fn count(&self, role: Role) -> usize {
        self.subscribers
            .read()
            .await
            .values()
            .filter(|s| s.role == role)
            .count()
    }

    /// The longest-connected producer, if any.
    pub async fn oldest_producer(&self) -> Option<ConnId> {
        self.subscribers
            .read()
            .await
            .iter()
            .filter(|(_, s)| s.role == Role::Producer)
            .min_by_key(|(_, s)| s.seq)
            .map(|(id, _)| id.clone())
    }

    // -----------------------------------------------------------------------
    // Publish paths
    // -----------------------------------------------------------------------

    /// Persist a measurement, fan it out to consumers, then run observers
    /// and publish whatever alerts they raise.
    ///
    /// A persistence failure is logged and does not stop live delivery.
    pub async fn publish_measurement(&self, measurement: Measurement) -> Timestamp {
        let received_at = Utc::now();

        if let Err(e) = self.store.insert_measurement(&measurement, received_at).await {
            tracing::error!(
                device_id = %measurement.device_id(),
                error = %e,
                "Failed to persist measurement"
            );
        }

        let observers: Vec<_> = self
            .observers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();

        let frame = OutboundEvent::measurement(measurement.clone(), received_at).to_json();
        let delivered = self.broadcast(Role::Consumer, &frame).await;
        tracing::debug!(device_id = %measurement.device_id(), delivered, "Measurement published");

        for observer in observers {
            for alert in observer.observe(&measurement).await {
                self.publish_alert(alert).await;
            }
        }
        received_at
    }

    /// Fan an alert out to consumers and in-process listeners. Not persisted.
    pub async fn publish_alert(&self, alert: AlertEvent) {
        tracing::warn!(kind = ?alert.kind, message = %alert.message, "Alert raised");
        let frame = OutboundEvent::Alert(alert.clone()).to_json();
        // Ignore the SendError; it only means there are zero receivers.
        let _ = self.alerts.send(alert);
        self.broadcast(Role::Consumer, &frame).await;
    }

    /// Fan any outbound event out to consumers.
    pub async fn publish_event(&self, event: &OutboundEvent) -> usize {
        self.broadcast(Role::Consumer, &event.to_json()).await
    }

    /// Send a command to every producer. Returns how many accepted it.
    pub async fn broadcast_command(&self, command: &ProducerCommand) -> usize {
        match serde_json::to_string(command) {
            Ok(frame) => self.broadcast(Role::Producer, &frame).await,
            Err(e) => {
                tracing::error!(error = %e, "Failed to encode producer command");
                0
            }
        }
    }

    /// Send one JSON frame to a single connection.
    pub async fn send_to<T: Serialize>(&self, conn_id: &str, payload: &T) -> bool {
        let frame = match serde_json::to_string(payload) {
            Ok(f) => f,
            Err(e) => {
                tracing::error!(conn_id = %conn_id, error = %e, "Failed to encode frame");
                return false;
            }
        };
        let result = {
            let subs = self.subscribers.read().await;
            match subs.get(conn_id) {
                Some(sub) => sub.sender.try_send(Message::Text(frame.into())),
                None => return false,
            }
        };
        match result {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                tracing::warn!(conn_id = %conn_id, "Subscriber queue full, disconnecting");
                self.unregister(conn_id).await;
                false
            }
            Err(TrySendError::Closed(_)) => false,
        }
    }

    /// Offer a frame to every subscriber of `role` without waiting.
    ///
    /// A subscriber whose queue is full is disconnected; the others are
    /// unaffected. Closed queues are skipped and cleaned up by their own
    /// connection task.
    async fn broadcast(&self, role: Role, frame: &str) -> usize {
        let message = Message::Text(frame.into());
        let mut delivered = 0;
        let mut overflowed = Vec::new();
        {
            let subs = self.subscribers.read().await;
            for (id, sub) in subs.iter().filter(|(_, s)| s.role == role) {
                match sub.sender.try_send(message.clone()) {
                    Ok(()) => delivered += 1,
                    Err(TrySendError::Full(_)) => overflowed.push(id.clone()),
                    Err(TrySendError::Closed(_)) => {}
                }
            }
        }
        for id in overflowed {
            tracing::warn!(conn_id = %id, "Subscriber queue full, disconnecting");
            self.unregister(&id).await;
        }
        delivered
    }

    // -----------------------------------------------------------------------
    // Housekeeping
    // -----------------------------------------------------------------------

    /// Queue a Ping frame for every subscriber.
    pub async fn ping_all(&self) {
        let subs = self.subscribers.read().await;
        for sub in subs.values() {
            let _ = sub.sender.try_send(Message::Ping(Bytes::new()));
        }
    }

    /// Send a Close frame to every connection, then retire each one the
    /// same way [`Hub::unregister`] does.
    ///
    /// Dropping the senders lets each connection drain its queue (including
    /// the Close) before the socket is torn down.
    pub async fn shutdown_all(&self) {
        let drained: Vec<_> = self.subscribers.write().await.drain().collect();
        let count = drained.len();
        for (conn_id, sub) in drained {
            let _ = sub.sender.try_send(Message::Close(None));
            self.retire(&conn_id, sub);
        }
        tracing::info!(count, "Closed all WebSocket connections");
    }
}
