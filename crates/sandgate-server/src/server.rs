//! Gateway lifecycle: accept loop, per-connection session task, shutdown.
//!
//! Each accepted socket runs one sequential task: authenticate, authorize,
//! provision, register, then a read/write loop until disconnect. Messages
//! from one connection are therefore processed in arrival order; different
//! connections proceed independently.

use crate::config::ServerConfig;
use crate::directory::InstanceDirectory;
use crate::handshake::{self, CLOSE_UNAUTHORIZED, CLOSE_UNAVAILABLE};
use crate::registry::{Connection, ConnectionRegistry, RegistryStats};
use crate::router::MessageRouter;
use crate::sandbox::SandboxProvider;
use crate::transport::{self, AuthenticatedSocket};
use sandgate_core::envelope::{parse_inbound, Domain, ParseOutcome};
use sandgate_core::{GatewayError, OutboundEnvelope};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, error, info, warn};

const STATS_INTERVAL: Duration = Duration::from_secs(60);

/// The gateway: owns the registry, router, and collaborator seams.
pub struct Gateway {
    config: ServerConfig,
    directory: Arc<dyn InstanceDirectory>,
    provider: Arc<dyn SandboxProvider>,
    registry: Arc<ConnectionRegistry>,
    router: MessageRouter,
    shutdown_tx: broadcast::Sender<()>,
}

/// One iteration of the session loop.
enum SessionEvent {
    Shutdown,
    Queued(Option<OutboundEnvelope>),
    Incoming(sandgate_core::GatewayResult<Option<String>>),
}

impl Gateway {
    pub fn new(
        config: ServerConfig,
        directory: Arc<dyn InstanceDirectory>,
        provider: Arc<dyn SandboxProvider>,
    ) -> Self {
        let registry = Arc::new(ConnectionRegistry::new());
        let router = MessageRouter::new(registry.clone());
        let (shutdown_tx, _) = broadcast::channel(1);
        Self {
            config,
            directory,
            provider,
            registry,
            router,
            shutdown_tx,
        }
    }

    pub fn registry(&self) -> &Arc<ConnectionRegistry> {
        &self.registry
    }

    /// Operator snapshot of the live connection population.
    pub async fn stats(&self) -> RegistryStats {
        self.registry.stats().await
    }

    /// Signal every session task to drain and close. Idempotent; a no-op
    /// when no sessions are live.
    pub fn shutdown(&self) {
        info!("gateway shutdown requested");
        let _ = self.shutdown_tx.send(());
    }

    /// Serve connections on `listener` until [`Gateway::shutdown`] fires.
    pub async fn run(self: Arc<Self>, listener: TcpListener) {
        if let Ok(addr) = listener.local_addr() {
            info!(%addr, "gateway listening");
        }
        self.clone().spawn_stats_task();

        let mut shutdown_rx = self.shutdown_tx.subscribe();
        loop {
            tokio::select! {
                _ = shutdown_rx.recv() => {
                    info!("accept loop stopping");
                    break;
                }
                accepted = listener.accept() => {
                    match accepted {
                        Ok((stream, remote_addr)) => {
                            let gateway = self.clone();
                            tokio::spawn(async move {
                                gateway.handle_connection(stream, remote_addr).await;
                            });
                        }
                        Err(e) => {
                            warn!(error = %e, "accept failed");
                        }
                    }
                }
            }
        }
    }

    fn spawn_stats_task(self: Arc<Self>) {
        let mut shutdown_rx = self.shutdown_tx.subscribe();
        tokio::spawn(async move {
            let mut tick = tokio::time::interval(STATS_INTERVAL);
            tick.tick().await;
            loop {
                tokio::select! {
                    _ = shutdown_rx.recv() => break,
                    _ = tick.tick() => {
                        let stats = self.registry.stats().await;
                        info!(
                            connections = stats.total_connections,
                            instances = stats.active_instances,
                            "registry stats"
                        );
                    }
                }
            }
        });
    }

    /// Full life of one client socket, from TCP accept to deregistration.
    async fn handle_connection(
        self: Arc<Self>,
        stream: TcpStream,
        remote_addr: std::net::SocketAddr,
    ) {
        let socket =
            match transport::accept_authenticated(stream, remote_addr, &self.config.secret).await {
                Ok(socket) => socket,
                Err(e) => {
                    debug!(remote = %remote_addr, error = %e, "handshake refused");
                    return;
                }
            };
        let AuthenticatedSocket {
            mut stream,
            remote_addr,
            claims,
        } = socket;

        // The token only proves identity; the instance may be gone or the
        // user removed from it since issuance.
        let record = match handshake::authorize(self.directory.as_ref(), &claims).await {
            Ok(record) => record,
            Err(e) => {
                warn!(
                    remote = %remote_addr,
                    user_id = %claims.user_id,
                    instance_id = %claims.instance_id,
                    error = %e,
                    "authorization failed"
                );
                transport::close_with(&mut stream, CLOSE_UNAUTHORIZED, "unauthorized").await;
                return;
            }
        };

        let sandbox = match self
            .provider
            .get_or_create(&claims.instance_id, &claims.user_id)
            .await
        {
            Ok(sandbox) => sandbox,
            Err(e) => {
                error!(
                    instance_id = %claims.instance_id,
                    error = %e,
                    "sandbox provisioning failed"
                );
                transport::close_with(&mut stream, CLOSE_UNAVAILABLE, "instance unavailable")
                    .await;
                return;
            }
        };

        let (outbound_tx, outbound_rx) = mpsc::channel(self.config.send_queue);
        let connection = Arc::new(Connection::new(
            claims.user_id,
            claims.instance_id,
            record.workspace_id,
            sandbox,
            outbound_tx,
        ));
        self.registry.insert(connection.clone()).await;
        info!(
            connection_id = %connection.id,
            remote = %remote_addr,
            "session established"
        );

        let greeting = OutboundEnvelope::reply(
            Domain::System,
            "connected",
            json!({
                "instanceId": connection.instance_id,
                "workspaceId": connection.workspace_id,
                "endpoint": connection.sandbox.endpoint(),
            }),
            None,
            true,
        );
        if transport::send_envelope(&mut stream, &greeting).await.is_ok() {
            self.session_loop(&connection, &mut stream, outbound_rx).await;
        }

        self.registry.remove(&connection.id).await;
        info!(connection_id = %connection.id, "session closed");
    }

    /// Sequential read/write loop for one registered connection.
    async fn session_loop(
        &self,
        connection: &Arc<Connection>,
        stream: &mut tokio_tungstenite::WebSocketStream<TcpStream>,
        mut outbound_rx: mpsc::Receiver<OutboundEnvelope>,
    ) {
        let mut shutdown_rx = self.shutdown_tx.subscribe();
        loop {
            let event = tokio::select! {
                _ = shutdown_rx.recv() => SessionEvent::Shutdown,
                queued = outbound_rx.recv() => SessionEvent::Queued(queued),
                incoming = transport::recv_text(stream, self.config.max_frame_bytes) => {
                    SessionEvent::Incoming(incoming)
                }
            };

            match event {
                SessionEvent::Shutdown => {
                    let notice = OutboundEnvelope::reply(
                        Domain::System,
                        "shutdown",
                        json!({}),
                        None,
                        true,
                    );
                    let _ = transport::send_envelope(stream, &notice).await;
                    transport::close_with(stream, 1001, "server shutting down").await;
                    return;
                }
                SessionEvent::Queued(Some(envelope)) => {
                    if transport::send_envelope(stream, &envelope).await.is_err() {
                        return;
                    }
                }
                // The sender half lives on the connection in the registry,
                // so this only happens after deregistration.
                SessionEvent::Queued(None) => return,
                SessionEvent::Incoming(Ok(Some(text))) => {
                    // Every inbound frame counts as activity, even ones
                    // that fail to parse.
                    connection.touch();
                    let reply = match parse_inbound(&text) {
                        ParseOutcome::Valid(envelope) => {
                            self.router.route(connection, envelope).await
                        }
                        ParseOutcome::UnknownType { request_id } => {
                            debug!(
                                connection_id = %connection.id,
                                "frame with unknown type"
                            );
                            MessageRouter::unknown_type(request_id)
                        }
                        ParseOutcome::Malformed => {
                            debug!(connection_id = %connection.id, "malformed frame");
                            MessageRouter::malformed()
                        }
                    };
                    if transport::send_envelope(stream, &reply).await.is_err() {
                        return;
                    }
                }
                SessionEvent::Incoming(Ok(None)) => {
                    debug!(connection_id = %connection.id, "peer closed");
                    return;
                }
                // Oversized frame: reject the message, keep the session.
                SessionEvent::Incoming(Err(GatewayError::InvalidMessage(msg))) => {
                    warn!(connection_id = %connection.id, error = %msg, "frame rejected");
                    if transport::send_envelope(stream, &MessageRouter::malformed())
                        .await
                        .is_err()
                    {
                        return;
                    }
                }
                SessionEvent::Incoming(Err(e)) => {
                    debug!(connection_id = %connection.id, error = %e, "transport error");
                    return;
                }
            }
        }
    }
}
