//
// Copyright 2017-2026 Hans W. Uhlig. All Rights Reserved.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//      http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//

//! Broadsock server implementation
//!
//! The BroadsockServer owns the TCP listener. Its accept loop admits or
//! rejects new connections, announces them to the other peers and spawns
//! one [`ClientWorker`] per admitted client. A watcher task listens for the
//! session lifecycle asking the process to terminate.

use crate::{
    Client, ClientId, ClientWorker, ConnectionRegistry, Dispatcher, ExitReason,
    LocalSessionLifecycle, MessageHandler, Result, ServerConfig, ServerMetrics, ServerSnapshot,
    ServiceError, SessionLifecycle,
};
use broadsock_codec::protocol;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{Mutex, watch};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, warn};

/// Broadsock server
///
/// # Example
///
/// ```no_run
/// use broadsock_service::{BroadcastHandler, BroadsockServer, ServerConfig};
/// use std::sync::Arc;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let server = BroadsockServer::new(ServerConfig::default()).await?;
///     server.start(Arc::new(BroadcastHandler)).await?;
///
///     tokio::signal::ctrl_c().await?;
///     server.shutdown().await?;
///     Ok(())
/// }
/// ```
pub struct BroadsockServer {
    shared: Arc<Shared>,
    /// Listener, taken by the accept loop on start
    listener: Mutex<Option<TcpListener>>,
    bind_address: SocketAddr,
    started_at: Instant,
}

/// State shared by the server handle, the accept loop and the watcher
struct Shared {
    config: ServerConfig,
    registry: Arc<ConnectionRegistry>,
    dispatcher: Arc<Dispatcher>,
    lifecycle: Arc<dyn SessionLifecycle>,
    metrics: Arc<ServerMetrics>,
    next_id: AtomicU64,
    activated: AtomicBool,
    running: AtomicBool,
    shutdown: CancellationToken,
    tracker: TaskTracker,
    exit: watch::Sender<Option<ExitReason>>,
}

impl BroadsockServer {
    /// Create a server with an in-process session lifecycle
    ///
    /// This binds to the configured address but does not start accepting
    /// connections. Call `start()` to begin accepting.
    pub async fn new(config: ServerConfig) -> Result<Self> {
        Self::with_lifecycle(config, Arc::new(LocalSessionLifecycle::new())).await
    }

    /// Create a server reporting to the given session lifecycle
    pub async fn with_lifecycle(
        config: ServerConfig,
        lifecycle: Arc<dyn SessionLifecycle>,
    ) -> Result<Self> {
        config.validate()?;

        let listener = TcpListener::bind(config.bind_address).await?;
        let bind_address = listener.local_addr()?;

        let metrics = Arc::new(ServerMetrics::new());
        let registry = Arc::new(ConnectionRegistry::new(config.client_limit()));
        let dispatcher = Arc::new(Dispatcher::new(
            registry.clone(),
            metrics.clone(),
            lifecycle.clone(),
            config.max_message_size,
            config.write_timeout,
        ));
        let (exit, _) = watch::channel(None);

        info!(%bind_address, "Broadsock server bound");

        Ok(Self {
            shared: Arc::new(Shared {
                next_id: AtomicU64::new(config.first_client_id),
                config,
                registry,
                dispatcher,
                lifecycle,
                metrics,
                activated: AtomicBool::new(false),
                running: AtomicBool::new(false),
                shutdown: CancellationToken::new(),
                tracker: TaskTracker::new(),
                exit,
            }),
            listener: Mutex::new(Some(listener)),
            bind_address,
            started_at: Instant::now(),
        })
    }

    /// Start accepting connections
    ///
    /// Tells the session lifecycle the process is ready, then spawns the
    /// accept loop and the termination watcher. A server runs at most once.
    pub async fn start(&self, handler: Arc<dyn MessageHandler>) -> Result<()> {
        let listener = self
            .listener
            .lock()
            .await
            .take()
            .ok_or(if self.is_running() {
                ServiceError::ServerAlreadyRunning
            } else {
                ServiceError::ServerStopped
            })?;

        let port = self.bind_address.port();
        if let Err(e) = self.shared.lifecycle.process_ready(port).await {
            *self.listener.lock().await = Some(listener);
            return Err(e);
        }
        self.shared.running.store(true, Ordering::SeqCst);
        info!(bind_address = %self.bind_address, "Starting Broadsock server");

        let shared = self.shared.clone();
        self.shared
            .tracker
            .spawn(shared.accept_loop(listener, handler));

        let shared = self.shared.clone();
        tokio::spawn(async move {
            select_termination(shared).await;
        });

        Ok(())
    }

    /// Shut the server down
    ///
    /// Stops accepting, closes every client and waits up to the configured
    /// shutdown timeout for the workers to finish.
    pub async fn shutdown(&self) -> Result<()> {
        self.shared.stop(ExitReason::Shutdown).await
    }

    /// Wait until the server has stopped, by shutdown or termination
    pub async fn wait(&self) -> ExitReason {
        let mut exit = self.shared.exit.subscribe();
        match exit.wait_for(Option::is_some).await {
            Ok(reason) => (*reason).unwrap_or(ExitReason::Shutdown),
            Err(_) => ExitReason::Shutdown,
        }
    }

    /// Answer a health probe without blocking
    pub fn health_check(&self) -> bool {
        self.is_running() && self.shared.lifecycle.health_check()
    }

    /// Check if the server is running
    pub fn is_running(&self) -> bool {
        self.shared.running.load(Ordering::SeqCst)
    }

    /// Get the server's bind address
    pub fn bind_address(&self) -> SocketAddr {
        self.bind_address
    }

    /// Get the number of live clients
    pub fn connection_count(&self) -> usize {
        self.shared.registry.count()
    }

    /// Get a snapshot of the server state
    pub fn snapshot(&self) -> ServerSnapshot {
        ServerSnapshot {
            active_clients: self.shared.registry.count(),
            total_clients: self.shared.metrics.total_clients(),
            rejected_clients: self.shared.metrics.rejected_clients(),
            bind_address: self.bind_address,
            uptime: self.started_at.elapsed(),
            started_at: self.started_at,
        }
    }

    /// Get the server metrics
    pub fn metrics(&self) -> Arc<ServerMetrics> {
        self.shared.metrics.clone()
    }

    /// Get the connection registry
    pub fn registry(&self) -> Arc<ConnectionRegistry> {
        self.shared.registry.clone()
    }

    /// Get the dispatcher
    pub fn dispatcher(&self) -> Arc<Dispatcher> {
        self.shared.dispatcher.clone()
    }

    /// Get the server configuration
    pub fn config(&self) -> &ServerConfig {
        &self.shared.config
    }
}

async fn select_termination(shared: Arc<Shared>) {
    tokio::select! {
        _ = shared.lifecycle.terminated() => {
            info!("Session lifecycle requested termination");
            if let Err(e) = shared.stop(ExitReason::Terminated).await {
                debug!(error = %e, "Termination after shutdown");
            }
        }
        _ = shared.shutdown.cancelled() => {}
    }
}

/// Tell every other client that `client` joined
///
/// Runs before the client's worker reads anything, so peers always see
/// CONNECT_OTHER ahead of the newcomer's first message.
async fn announce(dispatcher: &Dispatcher, client: &Client) {
    let peer_addr = client.peer_addr();
    let announced = match protocol::connect_other(
        client.id().as_u64(),
        peer_addr.ip(),
        peer_addr.port(),
        dispatcher.max_message_size(),
    ) {
        Ok(notice) => dispatcher.broadcast_except(&notice, client.id()).await.map(drop),
        Err(e) => Err(e.into()),
    };
    if let Err(e) = announced {
        warn!(client_id = %client.id(), error = %e, "Failed to announce client");
    }
}

impl Shared {
    async fn accept_loop(self: Arc<Self>, listener: TcpListener, handler: Arc<dyn MessageHandler>) {
        loop {
            let accepted = tokio::select! {
                _ = self.shutdown.cancelled() => break,
                accepted = listener.accept() => accepted,
            };

            match accepted {
                Ok((socket, peer_addr)) => self.admit(socket, peer_addr, &handler).await,
                Err(e) => {
                    error!(error = %e, "Failed to accept connection");
                    self.metrics.accept_error();

                    // Back off on errors to avoid tight loop
                    tokio::time::sleep(Duration::from_millis(100)).await;
                }
            }
        }

        info!("Accept loop terminated");
    }

    async fn admit(&self, socket: TcpStream, peer_addr: SocketAddr, handler: &Arc<dyn MessageHandler>) {
        if self.registry.count() + 1 >= self.config.max_clients {
            warn!(
                %peer_addr,
                max_clients = self.config.max_clients,
                "Hub full, rejecting connection"
            );
            self.metrics.client_rejected();
            drop(socket);
            return;
        }

        let id = ClientId::new(self.next_id.fetch_add(1, Ordering::SeqCst));
        if let Err(e) = socket.set_nodelay(true) {
            debug!(client_id = %id, error = %e, "Failed to set TCP_NODELAY");
        }
        let (reader, writer) = socket.into_split();
        let client = Arc::new(Client::new(id, peer_addr, writer));

        // The greeting goes out before registration so no relay can overtake it.
        let welcomed = match protocol::connect_self(id.as_u64(), self.config.max_message_size) {
            Ok(notice) => self.dispatcher.send_to(&client, &notice).await,
            Err(e) => Err(e.into()),
        };
        if let Err(e) = welcomed {
            warn!(client_id = %id, %peer_addr, error = %e, "Failed to welcome client");
            client.close().await;
            return;
        }

        if let Err(e) = self.registry.add(client.clone()) {
            warn!(client_id = %id, error = %e, "Failed to register client");
            client.close().await;
            return;
        }
        self.metrics.client_connected();
        info!(client_id = %id, %peer_addr, "Client connected");

        if !self.activated.swap(true, Ordering::SeqCst) {
            if let Err(e) = self.lifecycle.activate_session().await {
                warn!(error = %e, "Failed to activate session");
            }
        }

        if self.shutdown.is_cancelled() {
            self.dispatcher.evict(id).await;
            return;
        }

        let dispatcher = self.dispatcher.clone();
        let worker = ClientWorker::new(
            client.clone(),
            reader,
            self.dispatcher.clone(),
            handler.clone(),
            self.metrics.clone(),
            self.config.idle_timeout,
        );
        self.tracker.spawn(async move {
            announce(&dispatcher, &client).await;
            if client.is_closed() {
                debug!(client_id = %client.id(), "Client left before its worker started");
                return;
            }
            worker.run().await;
        });
    }

    async fn stop(&self, reason: ExitReason) -> Result<()> {
        if !self.running.swap(false, Ordering::SeqCst) {
            return Err(ServiceError::ServerNotRunning);
        }

        info!(?reason, "Shutting down Broadsock server");
        self.shutdown.cancel();

        for client in self.registry.clients() {
            client.close().await;
        }

        self.tracker.close();
        if tokio::time::timeout(self.config.shutdown_timeout, self.tracker.wait())
            .await
            .is_err()
        {
            warn!(
                remaining = self.tracker.len(),
                "Workers still running after shutdown timeout"
            );
        }

        if let Err(e) = self.lifecycle.process_ending().await {
            warn!(error = %e, "Failed to report process ending");
        }

        self.exit.send_replace(Some(reason));
        info!("Broadsock server shutdown complete");
        Ok(())
    }
}

impl std::fmt::Debug for BroadsockServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BroadsockServer")
            .field("bind_address", &self.bind_address())
            .field("running", &self.is_running())
            .field("connection_count", &self.connection_count())
            .field("uptime", &self.started_at.elapsed())
            .finish()
    }
}

// Implement Drop to ensure cleanup
impl Drop for BroadsockServer {
    fn drop(&mut self) {
        if self.shared.running.swap(false, Ordering::SeqCst) {
            warn!("BroadsockServer dropped while still running");
            self.shared.shutdown.cancel();
        }
    }
}
