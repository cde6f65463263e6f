//! Live-update server listener
//!
//! Handles the TCP accept loop and spawns one task per connection.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use crate::error::{Error, Result};
use crate::publisher::EventPublisher;
use crate::registry::{ConnectionRegistry, RegistryConfig};
use crate::server::config::ServerConfig;
use crate::server::connection::Connection;

/// WebSocket server for live inventory updates
///
/// Owns the registry and the publisher; hand [`publisher()`](Self::publisher)
/// to whatever performs inventory writes.
pub struct InventoryServer {
    config: ServerConfig,
    registry: Arc<ConnectionRegistry>,
    publisher: Arc<EventPublisher>,
    next_connection_id: AtomicU64,
    connection_semaphore: Option<Arc<Semaphore>>,
}

impl InventoryServer {
    /// Create a new server with the given configuration
    pub fn new(config: ServerConfig) -> Self {
        Self::with_registry_config(config, RegistryConfig::default())
    }

    /// Create a new server with custom registry configuration
    pub fn with_registry_config(config: ServerConfig, registry_config: RegistryConfig) -> Self {
        let connection_semaphore = if config.max_connections > 0 {
            Some(Arc::new(Semaphore::new(config.max_connections)))
        } else {
            None
        };

        let registry = Arc::new(ConnectionRegistry::with_config(registry_config));
        let publisher = Arc::new(EventPublisher::new(Arc::clone(&registry)));

        Self {
            config,
            registry,
            publisher,
            next_connection_id: AtomicU64::new(1),
            connection_semaphore,
        }
    }

    /// Get a reference to the connection registry
    pub fn registry(&self) -> &Arc<ConnectionRegistry> {
        &self.registry
    }

    /// Get a reference to the event publisher
    pub fn publisher(&self) -> &Arc<EventPublisher> {
        &self.publisher
    }

    /// Run the server
    ///
    /// This method blocks until the listener fails to bind.
    pub async fn run(&self) -> Result<()> {
        self.run_until(std::future::pending()).await
    }

    /// Bind the configured address and serve until `shutdown` completes
    pub async fn run_until<F>(&self, shutdown: F) -> Result<()>
    where
        F: std::future::Future<Output = ()>,
    {
        let listener = TcpListener::bind(self.config.bind_addr).await?;
        self.serve(listener, shutdown).await
    }

    /// Serve on an already bound listener until `shutdown` completes
    pub async fn serve<F>(&self, listener: TcpListener, shutdown: F) -> Result<()>
    where
        F: std::future::Future<Output = ()>,
    {
        let addr = listener.local_addr()?;
        tracing::info!(addr = %addr, "Inventory live server listening");

        tokio::select! {
            _ = shutdown => {
                tracing::info!("Shutdown signal received");
                Ok(())
            }
            result = self.accept_loop(&listener) => result,
        }
    }

    async fn accept_loop(&self, listener: &TcpListener) -> Result<()> {
        loop {
            match listener.accept().await {
                Ok((socket, peer_addr)) => {
                    if let Err(e) = self.handle_connection(socket, peer_addr) {
                        tracing::warn!(peer = %peer_addr, error = %e, "Connection rejected");
                    }
                }
                Err(e) => {
                    tracing::error!(error = %e, "Failed to accept connection");
                }
            }
        }
    }

    fn handle_connection(&self, socket: TcpStream, peer_addr: SocketAddr) -> Result<()> {
        let permit = self.acquire_permit()?;
        let connection_id = self.next_connection_id.fetch_add(1, Ordering::Relaxed);

        tracing::debug!(connection_id, peer = %peer_addr, "New connection");

        if self.config.tcp_nodelay {
            socket.set_nodelay(true)?;
        }

        let config = self.config.clone();
        let registry = Arc::clone(&self.registry);

        tokio::spawn(async move {
            // Held for the life of the connection
            let _permit = permit;

            let mut connection =
                match Connection::accept(connection_id, socket, peer_addr, config, registry).await
                {
                    Ok(connection) => connection,
                    Err(e) => {
                        tracing::debug!(connection_id, error = %e, "Handshake failed");
                        return;
                    }
                };

            if let Err(e) = connection.run().await {
                tracing::debug!(connection_id, error = %e, "Connection error");
            }

            tracing::debug!(connection_id, "Connection closed");
        });

        Ok(())
    }

    fn acquire_permit(&self) -> Result<Option<OwnedSemaphorePermit>> {
        match self.connection_semaphore {
            Some(ref sem) => sem
                .clone()
                .try_acquire_owned()
                .map(Some)
                .map_err(|_| Error::ConnectionLimit(self.config.max_connections)),
            None => Ok(None),
        }
    }

    /// Get the bind address
    pub fn bind_addr(&self) -> SocketAddr {
        self.config.bind_addr
    }
}
