//! Real-time notification fan-out.
//!
//! The hub maps live connections to at-most-one occupant each and keeps a
//! global broadcast set. Delivery is best-effort: a failing sink is logged
//! and skipped, never propagated to the operation that triggered the
//! notification. The hub lock is held only while snapshotting the
//! connection list; sends happen with no lock held.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use turnstile_core::status::SpaceStatus;
use turnstile_core::types::OccupantId;

/// Identifier for a live connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConnectionId(Uuid);

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Crowding classification of the current occupancy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum CrowdState {
    /// Plenty of room.
    #[default]
    Normal,
    /// At or above 90% of capacity.
    Near,
    /// At capacity.
    Full,
}

impl CrowdState {
    /// Classifies a count against a capacity.
    #[must_use]
    pub fn classify(count: u32, max: u32) -> Self {
        if max == 0 || count >= max {
            return Self::Full;
        }
        if f64::from(count) / f64::from(max) >= 0.9 {
            return Self::Near;
        }
        Self::Normal
    }
}

/// What happened to the acting occupant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScanAction {
    /// The occupant entered.
    Entered,
    /// The occupant scanned out voluntarily.
    Exited,
}

/// A notification payload, tagged by topic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "topic", rename_all = "snake_case")]
pub enum Notification {
    /// Broadcast after every counter change.
    OccupancyUpdate {
        count: u32,
        max: u32,
        percent: f64,
    },
    /// Broadcast once per transition into Near or Full.
    OccupancyAlert {
        state: CrowdState,
        count: u32,
        max: u32,
    },
    /// Unicast to the acting occupant on entry or voluntary exit.
    UserAction {
        occupant: OccupantId,
        action: ScanAction,
    },
    /// Unicast to an occupant whose session was evicted to make room.
    UserRemoved {
        occupant: OccupantId,
        message: String,
    },
    /// Unicast to an occupant whose session hit its deadline.
    SessionExpired {
        occupant: OccupantId,
        deadline: chrono::DateTime<chrono::Utc>,
    },
    /// Broadcast on space status change.
    StatusUpdate {
        status: SpaceStatus,
        message: Option<String>,
    },
}

/// Transport-side receiver for notifications.
///
/// Implementations wrap whatever transport carries messages to a client
/// (a websocket writer, a test buffer). `send` must not block for long;
/// errors are logged by the hub and otherwise ignored.
pub trait NotificationSink: Send + Sync {
    /// Delivers one notification.
    ///
    /// # Errors
    ///
    /// Returns a human-readable description of the delivery failure.
    fn send(&self, notification: &Notification) -> Result<(), String>;
}

struct Connection {
    sink: Arc<dyn NotificationSink>,
    occupant: Option<OccupantId>,
    broadcast: bool,
}

#[derive(Default)]
struct HubInner {
    connections: HashMap<ConnectionId, Connection>,
    last_crowd: CrowdState,
}

/// Connection registry and topic fan-out.
#[derive(Default)]
pub struct NotificationHub {
    inner: Mutex<HubInner>,
}

impl NotificationHub {
    /// Creates an empty hub.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a connection. Broadcast topics are delivered to it when
    /// `broadcast` is true; unicast topics only after [`Self::bind`].
    pub fn register(&self, sink: Arc<dyn NotificationSink>, broadcast: bool) -> ConnectionId {
        let id = ConnectionId(Uuid::new_v4());
        self.inner.lock().connections.insert(
            id,
            Connection {
                sink,
                occupant: None,
                broadcast,
            },
        );
        id
    }

    /// Associates a connection with an occupant, replacing any previous
    /// association. Each connection carries at most one occupant.
    pub fn bind(&self, id: ConnectionId, occupant: OccupantId) {
        if let Some(conn) = self.inner.lock().connections.get_mut(&id) {
            conn.occupant = Some(occupant);
        }
    }

    /// Removes a connection.
    pub fn unregister(&self, id: ConnectionId) {
        self.inner.lock().connections.remove(&id);
    }

    /// Number of live connections.
    #[must_use]
    pub fn connection_count(&self) -> usize {
        self.inner.lock().connections.len()
    }

    /// Broadcasts a counter change, plus an alert once per transition
    /// into Near or Full.
    pub fn occupancy_changed(&self, count: u32, max: u32) {
        let percent = if max == 0 {
            100.0
        } else {
            f64::from(count) / f64::from(max) * 100.0
        };
        self.broadcast(&Notification::OccupancyUpdate {
            count,
            max,
            percent,
        });

        let state = CrowdState::classify(count, max);
        let crossed = {
            let mut inner = self.inner.lock();
            let crossed = state != inner.last_crowd && state != CrowdState::Normal;
            inner.last_crowd = state;
            crossed
        };
        if crossed {
            self.broadcast(&Notification::OccupancyAlert { state, count, max });
        }
    }

    /// Broadcasts to every broadcast-subscribed connection.
    pub fn broadcast(&self, notification: &Notification) {
        let sinks: Vec<(ConnectionId, Arc<dyn NotificationSink>)> = {
            let inner = self.inner.lock();
            inner
                .connections
                .iter()
                .filter(|(_, c)| c.broadcast)
                .map(|(id, c)| (*id, Arc::clone(&c.sink)))
                .collect()
        };
        deliver(&sinks, notification);
    }

    /// Delivers to every connection bound to `occupant`.
    pub fn unicast(&self, occupant: &OccupantId, notification: &Notification) {
        let sinks: Vec<(ConnectionId, Arc<dyn NotificationSink>)> = {
            let inner = self.inner.lock();
            inner
                .connections
                .iter()
                .filter(|(_, c)| c.occupant.as_ref() == Some(occupant))
                .map(|(id, c)| (*id, Arc::clone(&c.sink)))
                .collect()
        };
        deliver(&sinks, notification);
    }
}

fn deliver(sinks: &[(ConnectionId, Arc<dyn NotificationSink>)], notification: &Notification) {
    for (id, sink) in sinks {
        if let Err(reason) = sink.send(notification) {
            tracing::warn!(connection = %id, %reason, "notification delivery failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use parking_lot::Mutex as PlMutex;

    use super::*;

    #[derive(Default)]
    struct RecordingSink {
        received: PlMutex<Vec<Notification>>,
        fail: bool,
    }

    impl NotificationSink for RecordingSink {
        fn send(&self, notification: &Notification) -> Result<(), String> {
            if self.fail {
                return Err("connection reset".to_string());
            }
            self.received.lock().push(notification.clone());
            Ok(())
        }
    }

    fn id(s: &str) -> OccupantId {
        OccupantId::new(s).unwrap()
    }

    #[test]
    fn classify_thresholds() {
        assert_eq!(CrowdState::classify(0, 10), CrowdState::Normal);
        assert_eq!(CrowdState::classify(8, 10), CrowdState::Normal);
        assert_eq!(CrowdState::classify(9, 10), CrowdState::Near);
        assert_eq!(CrowdState::classify(10, 10), CrowdState::Full);
        assert_eq!(CrowdState::classify(0, 0), CrowdState::Full);
    }

    #[test]
    fn broadcast_reaches_subscribed_connections_only() {
        let hub = NotificationHub::new();
        let subscribed = Arc::new(RecordingSink::default());
        let unicast_only = Arc::new(RecordingSink::default());
        hub.register(Arc::clone(&subscribed) as Arc<dyn NotificationSink>, true);
        hub.register(Arc::clone(&unicast_only) as Arc<dyn NotificationSink>, false);

        hub.occupancy_changed(1, 10);

        assert_eq!(subscribed.received.lock().len(), 1);
        assert!(unicast_only.received.lock().is_empty());
    }

    #[test]
    fn unicast_targets_bound_occupant() {
        let hub = NotificationHub::new();
        let alice = Arc::new(RecordingSink::default());
        let bob = Arc::new(RecordingSink::default());
        let alice_conn = hub.register(Arc::clone(&alice) as Arc<dyn NotificationSink>, false);
        let bob_conn = hub.register(Arc::clone(&bob) as Arc<dyn NotificationSink>, false);
        hub.bind(alice_conn, id("alice"));
        hub.bind(bob_conn, id("bob"));

        hub.unicast(
            &id("alice"),
            &Notification::UserAction {
                occupant: id("alice"),
                action: ScanAction::Entered,
            },
        );

        assert_eq!(alice.received.lock().len(), 1);
        assert!(bob.received.lock().is_empty());
    }

    #[test]
    fn alert_fires_once_per_transition() {
        let hub = NotificationHub::new();
        let sink = Arc::new(RecordingSink::default());
        hub.register(Arc::clone(&sink) as Arc<dyn NotificationSink>, true);

        hub.occupancy_changed(9, 10); // Normal -> Near: update + alert
        hub.occupancy_changed(9, 10); // still Near: update only
        hub.occupancy_changed(10, 10); // Near -> Full: update + alert
        hub.occupancy_changed(5, 10); // Full -> Normal: update only

        let alerts: Vec<Notification> = sink
            .received
            .lock()
            .iter()
            .filter(|n| matches!(n, Notification::OccupancyAlert { .. }))
            .cloned()
            .collect();
        assert_eq!(alerts.len(), 2);
        assert!(matches!(
            alerts[0],
            Notification::OccupancyAlert {
                state: CrowdState::Near,
                ..
            }
        ));
        assert!(matches!(
            alerts[1],
            Notification::OccupancyAlert {
                state: CrowdState::Full,
                ..
            }
        ));
    }

    #[test]
    fn failing_sink_does_not_stop_delivery() {
        let hub = NotificationHub::new();
        let broken = Arc::new(RecordingSink {
            fail: true,
            ..RecordingSink::default()
        });
        let healthy = Arc::new(RecordingSink::default());
        hub.register(broken as Arc<dyn NotificationSink>, true);
        hub.register(Arc::clone(&healthy) as Arc<dyn NotificationSink>, true);

        hub.occupancy_changed(3, 10);
        assert_eq!(healthy.received.lock().len(), 1);
    }

    #[test]
    fn unregister_stops_delivery() {
        let hub = NotificationHub::new();
        let sink = Arc::new(RecordingSink::default());
        let conn = hub.register(Arc::clone(&sink) as Arc<dyn NotificationSink>, true);
        hub.unregister(conn);
        hub.occupancy_changed(1, 10);
        assert!(sink.received.lock().is_empty());
        assert_eq!(hub.connection_count(), 0);
    }

    #[test]
    fn notification_serializes_with_topic_tag() {
        let json = serde_json::to_string(&Notification::StatusUpdate {
            status: SpaceStatus::Closed,
            message: Some("closing early".to_string()),
        })
        .unwrap();
        assert!(json.contains("\"topic\":\"status_update\""));
        assert!(json.contains("\"closed\""));
    }
}
