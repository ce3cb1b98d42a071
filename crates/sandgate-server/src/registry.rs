//! Live connection registry.
//!
//! Two structures that must stay mutually consistent: the connection map
//! (exclusive owner of all connection state) and a derived per-instance
//! index used for fan-out. One lock guards both, so every reader observes
//! them in a consistent state; fan-out takes a snapshot of an instance's
//! connections before iterating.

use crate::sandbox::Sandbox;
use sandgate_core::OutboundEnvelope;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::sync::Mutex as StdMutex;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, RwLock};
use tracing::{debug, info};

/// One authenticated client socket.
///
/// Constructed only after handshake auth and sandbox provisioning both
/// succeed, so a registered connection always has a usable sandbox handle.
pub struct Connection {
    /// Unique per process lifetime: `{user}_{instance}_{random suffix}`.
    pub id: String,
    pub user_id: String,
    pub instance_id: String,
    pub workspace_id: String,
    /// Resolved once at connect time, shared across all requests, never
    /// reassigned.
    pub sandbox: Arc<dyn Sandbox>,
    /// Queue feeding this connection's write half.
    outbound: mpsc::Sender<OutboundEnvelope>,
    /// Updated on every inbound message. Diagnostics only.
    last_activity: StdMutex<Instant>,
}

impl Connection {
    pub fn new(
        user_id: String,
        instance_id: String,
        workspace_id: String,
        sandbox: Arc<dyn Sandbox>,
        outbound: mpsc::Sender<OutboundEnvelope>,
    ) -> Self {
        let suffix: u32 = rand::random();
        Self {
            id: format!("{user_id}_{instance_id}_{suffix:08x}"),
            user_id,
            instance_id,
            workspace_id,
            sandbox,
            outbound,
            last_activity: StdMutex::new(Instant::now()),
        }
    }

    /// Queue an envelope for delivery. Returns false if the queue is full
    /// or the connection's write task is gone; callers treat that as a
    /// skip, not an error.
    pub fn push(&self, envelope: OutboundEnvelope) -> bool {
        self.outbound.try_send(envelope).is_ok()
    }

    /// Record inbound activity.
    pub fn touch(&self) {
        if let Ok(mut at) = self.last_activity.lock() {
            *at = Instant::now();
        }
    }

    /// Time since the last inbound message.
    pub fn idle(&self) -> Duration {
        self.last_activity
            .lock()
            .map(|at| at.elapsed())
            .unwrap_or_default()
    }
}

/// Read-only registry snapshot for operators.
#[derive(Debug, Clone, Default)]
pub struct RegistryStats {
    pub total_connections: usize,
    pub active_instances: usize,
    pub per_instance: HashMap<String, usize>,
}

#[derive(Default)]
struct RegistryInner {
    connections: HashMap<String, Arc<Connection>>,
    by_instance: HashMap<String, HashSet<String>>,
}

/// The registry. All mutation goes through one `RwLock` over both maps.
pub struct ConnectionRegistry {
    inner: RwLock<RegistryInner>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(RegistryInner::default()),
        }
    }

    /// Insert a connection into both maps.
    pub async fn insert(&self, connection: Arc<Connection>) {
        let mut inner = self.inner.write().await;
        inner
            .by_instance
            .entry(connection.instance_id.clone())
            .or_default()
            .insert(connection.id.clone());
        info!(
            connection_id = %connection.id,
            instance_id = %connection.instance_id,
            "connection registered"
        );
        inner
            .connections
            .insert(connection.id.clone(), connection);
    }

    /// Remove a connection from both maps, deleting the instance's set when
    /// it becomes empty. Idempotent: removing an unknown id is a no-op.
    pub async fn remove(&self, connection_id: &str) -> Option<Arc<Connection>> {
        let mut inner = self.inner.write().await;
        let removed = inner.connections.remove(connection_id)?;
        if let Some(set) = inner.by_instance.get_mut(&removed.instance_id) {
            set.remove(connection_id);
            if set.is_empty() {
                inner.by_instance.remove(&removed.instance_id);
            }
        }
        debug!(connection_id, "connection unregistered");
        Some(removed)
    }

    /// Consistent snapshot of an instance's live connections. A concurrent
    /// disconnect during the caller's iteration cannot invalidate it.
    pub async fn instance_snapshot(&self, instance_id: &str) -> Vec<Arc<Connection>> {
        let inner = self.inner.read().await;
        match inner.by_instance.get(instance_id) {
            Some(ids) => ids
                .iter()
                .filter_map(|id| inner.connections.get(id).cloned())
                .collect(),
            None => Vec::new(),
        }
    }

    pub async fn count(&self) -> usize {
        self.inner.read().await.connections.len()
    }

    /// Operator introspection: totals and per-instance counts.
    pub async fn stats(&self) -> RegistryStats {
        let inner = self.inner.read().await;
        RegistryStats {
            total_connections: inner.connections.len(),
            active_instances: inner.by_instance.len(),
            per_instance: inner
                .by_instance
                .iter()
                .map(|(id, set)| (id.clone(), set.len()))
                .collect(),
        }
    }

    /// Check the derived index against the connection map. Test support.
    #[cfg(test)]
    pub async fn is_consistent(&self) -> bool {
        let inner = self.inner.read().await;
        for (instance_id, ids) in &inner.by_instance {
            if ids.is_empty() {
                return false;
            }
            for id in ids {
                match inner.connections.get(id) {
                    Some(conn) if &conn.instance_id == instance_id => {}
                    _ => return false,
                }
            }
        }
        for (id, conn) in &inner.connections {
            let indexed = inner
                .by_instance
                .get(&conn.instance_id)
                .is_some_and(|set| set.contains(id));
            if !indexed {
                return false;
            }
        }
        true
    }
}

impl Default for ConnectionRegistry {
    fn default() -> Self {
        Self::new()
    }
}
