//! `BeaconServer` builder and accept loop.
//!
//! Ties the layers together: transport → session gate → registry, with the
//! notification dispatcher sharing the same registry.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use beacon_notify::{Dispatcher, NotificationStore};
use beacon_protocol::JsonCodec;
use beacon_registry::ConnectionRegistry;
use beacon_session::{IdentityVerifier, SessionGate};
use beacon_transport::{Transport, WebSocketTransport};

use crate::handler::handle_pending;
use crate::{BeaconConfig, BeaconError};

/// Shared server state passed to each connection handler task.
pub(crate) struct ServerState<V: IdentityVerifier> {
    pub(crate) gate: SessionGate<V>,
    pub(crate) registry: Arc<ConnectionRegistry>,
    pub(crate) codec: JsonCodec,
    pub(crate) idle_timeout: Duration,
}

/// Builder for configuring and starting a Beacon server.
///
/// # Example
///
/// ```rust,no_run
/// use std::sync::Arc;
///
/// use beacon::prelude::*;
///
/// # async fn run() -> Result<(), BeaconError> {
/// let server = BeaconServerBuilder::new()
///     .bind("0.0.0.0:8080")
///     .build(
///         HmacTokenVerifier::new("secret"),
///         Arc::new(InMemoryNotificationStore::new()),
///     )
///     .await?;
/// server.run().await
/// # }
/// ```
pub struct BeaconServerBuilder {
    config: BeaconConfig,
}

impl BeaconServerBuilder {
    pub fn new() -> Self {
        Self {
            config: BeaconConfig::default(),
        }
    }

    /// Replaces the whole configuration.
    pub fn config(mut self, config: BeaconConfig) -> Self {
        self.config = config;
        self
    }

    /// Sets the address to bind the server to.
    pub fn bind(mut self, addr: &str) -> Self {
        self.config.bind = addr.to_string();
        self
    }

    /// Binds the listener and wires the registry, gate and dispatcher.
    pub async fn build<V, S>(
        self,
        verifier: V,
        store: Arc<S>,
    ) -> Result<BeaconServer<V, S>, BeaconError>
    where
        V: IdentityVerifier,
        S: NotificationStore,
    {
        let transport = WebSocketTransport::bind(&self.config.bind).await?;
        let registry = Arc::new(ConnectionRegistry::new(self.config.registry_config()));
        let dispatcher = Dispatcher::new(store, Arc::clone(&registry))
            .with_thresholds(self.config.credit_thresholds.clone());

        let state = Arc::new(ServerState {
            gate: SessionGate::new(verifier, self.config.session_config()),
            registry,
            codec: JsonCodec,
            idle_timeout: self.config.idle_timeout,
        });

        Ok(BeaconServer {
            transport,
            state,
            dispatcher,
        })
    }
}

impl Default for BeaconServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// A bound Beacon server.
///
/// Grab [`dispatcher()`](Self::dispatcher) before calling
/// [`run()`](Self::run); business code uses it to push notifications.
pub struct BeaconServer<V: IdentityVerifier, S: NotificationStore> {
    transport: WebSocketTransport,
    state: Arc<ServerState<V>>,
    dispatcher: Dispatcher<S, ConnectionRegistry>,
}

impl<V, S> BeaconServer<V, S>
where
    V: IdentityVerifier,
    S: NotificationStore,
{
    /// Returns the local address the server is bound to.
    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.transport.local_addr()
    }

    pub fn registry(&self) -> &Arc<ConnectionRegistry> {
        &self.state.registry
    }

    /// The dispatcher wired to this server's registry. Cheap to clone.
    pub fn dispatcher(&self) -> &Dispatcher<S, ConnectionRegistry> {
        &self.dispatcher
    }

    /// Runs the accept loop until the process is terminated.
    pub async fn run(self) -> Result<(), BeaconError> {
        self.run_until(std::future::pending()).await
    }

    /// Runs the accept loop until `shutdown` resolves.
    ///
    /// Connections already accepted keep running on their own tasks.
    pub async fn run_until(
        mut self,
        shutdown: impl Future<Output = ()>,
    ) -> Result<(), BeaconError> {
        tracing::info!(addr = ?self.transport.local_addr().ok(), "Beacon server running");
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                () = &mut shutdown => break,
                accepted = self.transport.accept() => match accepted {
                    Ok(pending) => {
                        let state = Arc::clone(&self.state);
                        tokio::spawn(async move {
                            if let Err(e) = handle_pending(pending, state).await {
                                tracing::debug!(error = %e, "connection ended with error");
                            }
                        });
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "accept failed");
                    }
                },
            }
        }

        self.transport.shutdown().await?;
        tracing::info!("Beacon server stopped");
        Ok(())
    }
}
