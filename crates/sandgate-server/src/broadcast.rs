//! Event fan-out to sibling connections on the same instance.

use crate::registry::ConnectionRegistry;
use sandgate_core::OutboundEnvelope;
use std::sync::Arc;
use tracing::debug;

/// Pushes an envelope to every other live connection on an instance,
/// excluding all connections belonging to the originating user (one user
/// may have several tabs open; none of them should echo their own change).
pub struct Broadcaster {
    registry: Arc<ConnectionRegistry>,
}

impl Broadcaster {
    pub fn new(registry: Arc<ConnectionRegistry>) -> Self {
        Self { registry }
    }

    /// Fan out `envelope` to the instance's connections, skipping every
    /// connection owned by `exclude_user`. A connection whose outbound
    /// queue is full or closed is silently skipped. Returns the number of
    /// connections the envelope was queued to.
    pub async fn to_instance(
        &self,
        instance_id: &str,
        exclude_user: &str,
        envelope: &OutboundEnvelope,
    ) -> usize {
        let snapshot = self.registry.instance_snapshot(instance_id).await;
        let mut delivered = 0;
        for conn in &snapshot {
            if conn.user_id == exclude_user {
                continue;
            }
            if conn.push(envelope.clone()) {
                delivered += 1;
            } else {
                debug!(
                    connection_id = %conn.id,
                    instance_id,
                    "skipping unwritable connection during broadcast"
                );
            }
        }
        debug!(
            instance_id,
            action = %envelope.action,
            recipients = delivered,
            "broadcast delivered"
        );
        delivered
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::make_connection;
    use sandgate_core::envelope::Domain;

    fn changed_event() -> OutboundEnvelope {
        OutboundEnvelope::broadcast(
            Domain::File,
            "changed",
            serde_json::json!({"path": "x.py", "userId": "alice"}),
        )
    }

    #[tokio::test]
    async fn excludes_all_connections_of_originating_user() {
        let registry = Arc::new(ConnectionRegistry::new());
        let (alice_tab1, mut rx1) = make_connection("alice", "inst-1");
        let (alice_tab2, mut rx2) = make_connection("alice", "inst-1");
        let (bob, mut rx3) = make_connection("bob", "inst-1");
        registry.insert(alice_tab1).await;
        registry.insert(alice_tab2).await;
        registry.insert(bob).await;

        let broadcaster = Broadcaster::new(registry);
        let delivered = broadcaster
            .to_instance("inst-1", "alice", &changed_event())
            .await;

        assert_eq!(delivered, 1);
        assert!(rx1.try_recv().is_err());
        assert!(rx2.try_recv().is_err());
        let received = rx3.try_recv().unwrap();
        assert_eq!(received.action, "changed");
        assert!(received.request_id.is_none());
    }

    #[tokio::test]
    async fn scoped_to_instance() {
        let registry = Arc::new(ConnectionRegistry::new());
        let (bob, mut rx_bob) = make_connection("bob", "inst-1");
        let (carol, mut rx_carol) = make_connection("carol", "inst-2");
        registry.insert(bob).await;
        registry.insert(carol).await;

        let broadcaster = Broadcaster::new(registry);
        broadcaster
            .to_instance("inst-1", "alice", &changed_event())
            .await;

        assert!(rx_bob.try_recv().is_ok());
        assert!(rx_carol.try_recv().is_err());
    }

    #[tokio::test]
    async fn full_queue_is_skipped_not_an_error() {
        let registry = Arc::new(ConnectionRegistry::new());
        let (bob, _rx_kept) = make_connection("bob", "inst-1");
        // Fill bob's queue to capacity.
        while bob.push(changed_event()) {}
        registry.insert(bob).await;

        let broadcaster = Broadcaster::new(registry);
        let delivered = broadcaster
            .to_instance("inst-1", "alice", &changed_event())
            .await;
        assert_eq!(delivered, 0);
    }

    #[tokio::test]
    async fn empty_instance_is_a_no_op() {
        let registry = Arc::new(ConnectionRegistry::new());
        let broadcaster = Broadcaster::new(registry);
        let delivered = broadcaster
            .to_instance("inst-none", "alice", &changed_event())
            .await;
        assert_eq!(delivered, 0);
    }
}
