//! Topic registry and fan-out.
//!
//! A topic is a job id. Every connection owns an unbounded sender; a
//! broadcast clones the event into the sender of each connection currently
//! subscribed to the event's job and never waits on any of them.

use crate::metrics;
use adpulse_core::{ConnectionId, Interface, JobId};
use adpulse_domain::HubEvent;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, trace};

/// Something that can push an event to the subscribers of its job.
///
/// Returns the number of connections the event was handed to.
pub trait Broadcaster: Interface {
    fn broadcast(&self, event: &HubEvent) -> usize;
}

/// Something that can add or drop a job topic for one client.
pub trait TopicSubscriber: Send + Sync {
    fn subscribe(&self, job_id: &JobId);
    fn unsubscribe(&self, job_id: &JobId);
}

struct ConnectionEntry {
    sender: mpsc::UnboundedSender<HubEvent>,
    topics: HashSet<JobId>,
    connected_at: DateTime<Utc>,
}

#[derive(Default)]
struct Registry {
    connections: HashMap<ConnectionId, ConnectionEntry>,
    topics: HashMap<JobId, HashSet<ConnectionId>>,
}

impl Registry {
    fn detach(&mut self, connection: ConnectionId, job_id: &JobId) {
        if let Some(members) = self.topics.get_mut(job_id) {
            members.remove(&connection);
            if members.is_empty() {
                self.topics.remove(job_id);
            }
        }
    }

    fn publish_sizes(&self) {
        metrics::record_sizes(self.connections.len(), self.topics.len());
    }
}

/// Point-in-time view of the hub, served on the health endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HubStats {
    pub connections: usize,
    pub topics: usize,
    pub subscriptions: usize,
}

/// In-process publish/subscribe registry keyed by job id.
///
/// Owned, not global: a process may run several hubs side by side and each
/// one only knows its own connections.
#[derive(Default)]
pub struct FanoutHub {
    registry: RwLock<Registry>,
}

impl FanoutHub {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a new connection.
    ///
    /// Dropping the returned [`HubConnection`] disconnects it.
    #[must_use]
    pub fn connect(self: &Arc<Self>) -> HubConnection {
        let (sender, receiver) = mpsc::unbounded_channel();
        let id = ConnectionId::new();

        let mut registry = self.registry.write();
        registry.connections.insert(
            id,
            ConnectionEntry {
                sender,
                topics: HashSet::new(),
                connected_at: Utc::now(),
            },
        );
        registry.publish_sizes();
        drop(registry);

        debug!(connection_id = %id, "Hub connection opened");
        HubConnection {
            handle: ConnectionHandle {
                hub: Arc::clone(self),
                id,
            },
            receiver,
        }
    }

    /// Subscribes a connection to a job topic.
    ///
    /// Unknown job ids are accepted; the subscriber simply never hears
    /// anything. Returns `false` when the subscription already existed or the
    /// connection is gone.
    pub fn subscribe(&self, connection: ConnectionId, job_id: &JobId) -> bool {
        let mut registry = self.registry.write();
        let Some(entry) = registry.connections.get_mut(&connection) else {
            return false;
        };
        if !entry.topics.insert(job_id.clone()) {
            return false;
        }
        registry
            .topics
            .entry(job_id.clone())
            .or_default()
            .insert(connection);
        registry.publish_sizes();

        trace!(connection_id = %connection, job_id = %job_id, "Subscribed");
        true
    }

    /// Drops one subscription. Returns `false` when there was none.
    pub fn unsubscribe(&self, connection: ConnectionId, job_id: &JobId) -> bool {
        let mut registry = self.registry.write();
        let removed = registry
            .connections
            .get_mut(&connection)
            .is_some_and(|entry| entry.topics.remove(job_id));
        if removed {
            registry.detach(connection, job_id);
            registry.publish_sizes();
            trace!(connection_id = %connection, job_id = %job_id, "Unsubscribed");
        }
        removed
    }

    /// Removes a connection and every subscription it held.
    ///
    /// Returns the number of released subscriptions. Idempotent.
    pub fn disconnect(&self, connection: ConnectionId) -> usize {
        let mut registry = self.registry.write();
        let Some(entry) = registry.connections.remove(&connection) else {
            return 0;
        };
        for job_id in &entry.topics {
            registry.detach(connection, job_id);
        }
        registry.publish_sizes();

        let lifetime = Utc::now() - entry.connected_at;
        debug!(
            connection_id = %connection,
            released = entry.topics.len(),
            lifetime_secs = lifetime.num_seconds(),
            "Hub connection closed"
        );
        entry.topics.len()
    }

    /// Hands an event to every connection subscribed to its job.
    ///
    /// Connections whose receiver has gone away are disconnected on the way.
    pub fn broadcast(&self, event: &HubEvent) -> usize {
        let mut delivered = 0;
        let mut closed = Vec::new();
        {
            let registry = self.registry.read();
            if let Some(members) = registry.topics.get(event.job_id()) {
                for id in members {
                    match registry.connections.get(id) {
                        Some(entry) if entry.sender.send(event.clone()).is_ok() => delivered += 1,
                        Some(_) => closed.push(*id),
                        None => {}
                    }
                }
            }
        }

        for id in closed {
            let released = self.disconnect(id);
            debug!(connection_id = %id, released, "Pruned closed hub connection");
        }

        trace!(job_id = %event.job_id(), event = event.name(), delivered, "Broadcast");
        metrics::record_broadcast(event.name(), delivered);
        delivered
    }

    #[must_use]
    pub fn connection_count(&self) -> usize {
        self.registry.read().connections.len()
    }

    /// Number of connections subscribed to a job.
    #[must_use]
    pub fn subscriber_count(&self, job_id: &JobId) -> usize {
        self.registry.read().topics.get(job_id).map_or(0, HashSet::len)
    }

    /// Topics held by one connection.
    #[must_use]
    pub fn topics_of(&self, connection: ConnectionId) -> Vec<JobId> {
        self.registry
            .read()
            .connections
            .get(&connection)
            .map(|entry| entry.topics.iter().cloned().collect())
            .unwrap_or_default()
    }

    #[must_use]
    pub fn stats(&self) -> HubStats {
        let registry = self.registry.read();
        HubStats {
            connections: registry.connections.len(),
            topics: registry.topics.len(),
            subscriptions: registry.topics.values().map(HashSet::len).sum(),
        }
    }
}

impl Broadcaster for FanoutHub {
    fn broadcast(&self, event: &HubEvent) -> usize {
        FanoutHub::broadcast(self, event)
    }
}

impl std::fmt::Debug for FanoutHub {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FanoutHub").field("stats", &self.stats()).finish()
    }
}

/// Cloneable reference to one connection, used to manage its topics.
#[derive(Clone)]
pub struct ConnectionHandle {
    hub: Arc<FanoutHub>,
    id: ConnectionId,
}

impl ConnectionHandle {
    #[must_use]
    pub const fn id(&self) -> ConnectionId {
        self.id
    }

    /// See [`FanoutHub::disconnect`].
    pub fn disconnect(&self) -> usize {
        self.hub.disconnect(self.id)
    }
}

impl TopicSubscriber for ConnectionHandle {
    fn subscribe(&self, job_id: &JobId) {
        self.hub.subscribe(self.id, job_id);
    }

    fn unsubscribe(&self, job_id: &JobId) {
        self.hub.unsubscribe(self.id, job_id);
    }
}

impl std::fmt::Debug for ConnectionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionHandle").field("id", &self.id).finish()
    }
}

/// A live connection: the receiving end of its event stream.
#[derive(Debug)]
pub struct HubConnection {
    handle: ConnectionHandle,
    receiver: mpsc::UnboundedReceiver<HubEvent>,
}

impl HubConnection {
    #[must_use]
    pub const fn id(&self) -> ConnectionId {
        self.handle.id
    }

    #[must_use]
    pub const fn handle(&self) -> &ConnectionHandle {
        &self.handle
    }

    /// Waits for the next event. Returns `None` once disconnected.
    pub async fn recv(&mut self) -> Option<HubEvent> {
        self.receiver.recv().await
    }

    /// Returns the next buffered event without waiting.
    pub fn try_recv(&mut self) -> Option<HubEvent> {
        self.receiver.try_recv().ok()
    }
}

impl Drop for HubConnection {
    fn drop(&mut self) {
        self.handle.disconnect();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn progress(job: &str, value: i16) -> HubEvent {
        HubEvent::progress(JobId::from(job), value, None)
    }

    fn progress_of(event: Option<HubEvent>) -> Option<(String, i16)> {
        match event {
            Some(HubEvent::Progress(p)) => Some((p.job_id.into_inner(), p.progress)),
            _ => None,
        }
    }

    #[test]
    fn test_broadcast_reaches_subscribers_only() {
        let hub = Arc::new(FanoutHub::new());
        let mut a = hub.connect();
        let mut b = hub.connect();
        hub.subscribe(a.id(), &JobId::from("J1"));
        hub.subscribe(b.id(), &JobId::from("J2"));

        assert_eq!(hub.broadcast(&progress("J1", 40)), 1);
        assert_eq!(progress_of(a.try_recv()), Some(("J1".to_string(), 40)));
        assert!(b.try_recv().is_none());
    }

    #[test]
    fn test_delivery_order_is_preserved() {
        let hub = Arc::new(FanoutHub::new());
        let mut conn = hub.connect();
        let job = JobId::from("J1");
        hub.subscribe(conn.id(), &job);

        hub.broadcast(&progress("J1", 40));
        hub.broadcast(&HubEvent::completed(job.clone(), serde_json::json!({"ok": true})));

        assert_eq!(progress_of(conn.try_recv()), Some(("J1".to_string(), 40)));
        assert!(matches!(conn.try_recv(), Some(HubEvent::Completed(_))));
        assert!(conn.try_recv().is_none());
    }

    #[test]
    fn test_subscribe_is_idempotent() {
        let hub = Arc::new(FanoutHub::new());
        let mut conn = hub.connect();
        let job = JobId::from("J1");

        assert!(hub.subscribe(conn.id(), &job));
        assert!(!hub.subscribe(conn.id(), &job));
        assert_eq!(hub.subscriber_count(&job), 1);

        assert_eq!(hub.broadcast(&progress("J1", 1)), 1);
        assert!(conn.try_recv().is_some());
        assert!(conn.try_recv().is_none());
    }

    #[test]
    fn test_unsubscribe_stops_delivery() {
        let hub = Arc::new(FanoutHub::new());
        let mut conn = hub.connect();
        let job = JobId::from("J1");

        hub.subscribe(conn.id(), &job);
        assert!(hub.unsubscribe(conn.id(), &job));
        assert!(!hub.unsubscribe(conn.id(), &job));

        assert_eq!(hub.broadcast(&progress("J1", 10)), 0);
        assert!(conn.try_recv().is_none());
        assert_eq!(hub.stats().topics, 0);
    }

    #[test]
    fn test_unknown_job_subscription_is_accepted() {
        let hub = Arc::new(FanoutHub::new());
        let conn = hub.connect();
        assert!(hub.subscribe(conn.id(), &JobId::from("never-created")));
        assert_eq!(hub.topics_of(conn.id()).len(), 1);
    }

    #[test]
    fn test_disconnect_releases_all_subscriptions() {
        let hub = Arc::new(FanoutHub::new());
        let conn = hub.connect();
        let other = hub.connect();
        for job in ["J1", "J2", "J3"] {
            hub.subscribe(conn.id(), &JobId::from(job));
        }
        hub.subscribe(other.id(), &JobId::from("J1"));

        assert_eq!(hub.disconnect(conn.id()), 3);
        assert_eq!(hub.disconnect(conn.id()), 0);
        assert!(!hub.subscribe(conn.id(), &JobId::from("J4")));

        assert_eq!(
            hub.stats(),
            HubStats {
                connections: 1,
                topics: 1,
                subscriptions: 1,
            }
        );
    }

    #[test]
    fn test_dropping_connection_disconnects() {
        let hub = Arc::new(FanoutHub::new());
        let conn = hub.connect();
        hub.subscribe(conn.id(), &JobId::from("J1"));
        assert_eq!(hub.connection_count(), 1);

        drop(conn);
        assert_eq!(hub.connection_count(), 0);
        assert_eq!(hub.subscriber_count(&JobId::from("J1")), 0);
        assert_eq!(hub.broadcast(&progress("J1", 5)), 0);
    }

    #[test]
    fn test_broadcast_prunes_closed_receivers() {
        let hub = Arc::new(FanoutHub::new());
        let mut live = hub.connect();
        let mut gone = hub.connect();
        hub.subscribe(live.id(), &JobId::from("J1"));
        hub.subscribe(gone.id(), &JobId::from("J1"));
        hub.subscribe(gone.id(), &JobId::from("J2"));
        gone.receiver.close();

        assert_eq!(hub.broadcast(&progress("J1", 10)), 1);
        assert_eq!(progress_of(live.try_recv()), Some(("J1".to_string(), 10)));
        assert_eq!(hub.connection_count(), 1);
        assert_eq!(hub.subscriber_count(&JobId::from("J1")), 1);
        assert_eq!(hub.subscriber_count(&JobId::from("J2")), 0);
        assert!(hub.topics_of(gone.id()).is_empty());

        // Dropping the pruned connection later is harmless.
        drop(gone);
        assert_eq!(hub.connection_count(), 1);
    }

    #[test]
    fn test_hubs_are_independent() {
        let first = Arc::new(FanoutHub::new());
        let second = Arc::new(FanoutHub::new());
        let mut conn = first.connect();
        first.subscribe(conn.id(), &JobId::from("J1"));

        assert_eq!(second.broadcast(&progress("J1", 5)), 0);
        assert!(conn.try_recv().is_none());
        assert_eq!(second.connection_count(), 0);
    }

    #[test]
    fn test_handle_manages_topics() {
        let hub = Arc::new(FanoutHub::new());
        let conn = hub.connect();
        let handle = conn.handle().clone();
        let job = JobId::from("J9");

        TopicSubscriber::subscribe(&handle, &job);
        assert_eq!(hub.subscriber_count(&job), 1);
        TopicSubscriber::unsubscribe(&handle, &job);
        assert_eq!(hub.subscriber_count(&job), 0);
    }

    #[tokio::test]
    async fn test_recv_after_broadcast_from_another_task() {
        let hub = Arc::new(FanoutHub::new());
        let mut conn = hub.connect();
        hub.subscribe(conn.id(), &JobId::from("J1"));

        let publisher = Arc::clone(&hub);
        tokio::spawn(async move {
            publisher.broadcast(&HubEvent::error(JobId::from("J1"), "decode failed"));
        });

        match conn.recv().await {
            Some(HubEvent::Error(payload)) => assert_eq!(payload.error, "decode failed"),
            other => panic!("unexpected event: {other:?}"),
        }
    }
}
