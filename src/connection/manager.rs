/*
 * Resilient connection manager for a single chain-node endpoint
 */

use parking_lot::RwLock;
use std::future::Future;
use std::mem;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Notify};
use tokio::time::{self, Instant, Interval, MissedTickBehavior};
use tracing::{debug, info, warn};
use crate::connection::{ManagerSettings, NodeClient, NodeDialer};
use crate::models::{ConnectionState, LinkError, Result};

enum Link<C> {
    Disconnected,
    Connecting,
    Connected(Arc<C>),
    Error,
}

impl<C> Link<C> {
    fn state(&self) -> ConnectionState {
        match self {
            Link::Disconnected => ConnectionState::Disconnected,
            Link::Connecting => ConnectionState::Connecting,
            Link::Connected(_) => ConnectionState::Connected,
            Link::Error => ConnectionState::Error,
        }
    }

    fn client(&self) -> Option<Arc<C>> {
        match self {
            Link::Connected(client) => Some(Arc::clone(client)),
            _ => None,
        }
    }

    /// Detaches the live client, leaving `Disconnected` behind. Other states are untouched.
    fn take_client(&mut self) -> Option<Arc<C>> {
        match mem::replace(self, Link::Disconnected) {
            Link::Connected(client) => Some(client),
            other => {
                *self = other;
                None
            }
        }
    }
}

struct Inner<C> {
    link: Link<C>,
    last_error: Option<LinkError>,
    reconnect_pending: bool,
    // Bumped per connect attempt so a superseded attempt can tell it lost.
    attempt: u64,
    closed: bool,
    monitor: Option<watch::Sender<bool>>,
}

struct Shared<D: NodeDialer> {
    url: String,
    dialer: D,
    settings: ManagerSettings,
    inner: RwLock<Inner<D::Client>>,
    reconnect_signal: Notify,
}

/// Owns the connection to one node endpoint: connects, verifies, lends the
/// live client out, and heals it from a background monitor.
///
/// Clones share the same connection. Build one per endpoint at startup and
/// call [`ConnectionManager::close`] on shutdown; the monitor task holds a
/// handle until then.
pub struct ConnectionManager<D: NodeDialer> {
    shared: Arc<Shared<D>>,
}

impl<D: NodeDialer> Clone for ConnectionManager<D> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<D: NodeDialer> ConnectionManager<D> {
    #[must_use]
    pub fn new(url: impl Into<String>, dialer: D, settings: ManagerSettings) -> Self {
        Self {
            shared: Arc::new(Shared {
                url: url.into(),
                dialer,
                settings,
                inner: RwLock::new(Inner {
                    link: Link::Disconnected,
                    last_error: None,
                    reconnect_pending: false,
                    attempt: 0,
                    closed: false,
                    monitor: None,
                }),
                reconnect_signal: Notify::new(),
            }),
        }
    }

    #[must_use]
    pub fn endpoint(&self) -> &str {
        &self.shared.url
    }

    /// Dials and verifies the endpoint. A no-op when already connected.
    pub async fn connect(&self) -> Result<()> {
        self.acquire().await.map(|_| ())
    }

    /// Returns the live client, dialing once if none is held.
    ///
    /// The client stays owned by the manager; a reconnect may close it at any
    /// time, so callers should not keep it past the operation at hand.
    pub async fn client(&self) -> Result<Arc<D::Client>> {
        {
            let inner = self.shared.inner.read();
            if let Some(client) = inner.link.client() {
                return Ok(client);
            }
            if inner.closed {
                return Err(LinkError::Closed);
            }
        }

        match self.acquire().await {
            Ok(client) => Ok(client),
            // Another attempt is already recovering the link.
            Err(e @ LinkError::AlreadyConnecting) => Err(LinkError::NotConnected(Box::new(e))),
            Err(e) => {
                self.trigger_reconnect();
                Err(LinkError::NotConnected(Box::new(e)))
            }
        }
    }

    #[must_use]
    pub fn status(&self) -> (ConnectionState, Option<LinkError>) {
        let inner = self.shared.inner.read();
        (inner.link.state(), inner.last_error.clone())
    }

    /// Asks the node for its latest block within the health-check timeout.
    pub async fn check_health(&self) -> bool {
        let Some(client) = self.shared.inner.read().link.client() else {
            return false;
        };

        match time::timeout(self.shared.settings.health_check_timeout, client.block_number()).await {
            Ok(Ok(height)) => {
                debug!(height, "Node health check passed");
                true
            }
            Ok(Err(e)) => {
                warn!(error = %e, "Node health check failed");
                false
            }
            Err(_) => {
                warn!(
                    "Node health check timed out after {:?}",
                    self.shared.settings.health_check_timeout
                );
                false
            }
        }
    }

    /// Queues a reconnect for the monitor. Requests made while one is already
    /// queued are dropped; never blocks.
    pub fn trigger_reconnect(&self) {
        {
            let mut inner = self.shared.inner.write();
            if inner.closed {
                debug!("Ignoring reconnect request on closed manager");
                return;
            }
            if inner.reconnect_pending {
                debug!("Reconnect already pending");
                return;
            }
            inner.reconnect_pending = true;
        }
        self.shared.reconnect_signal.notify_one();
    }

    /// Stops the monitor and releases the client. An in-flight connect is
    /// not interrupted; its result is discarded when it lands.
    pub fn close(&self) {
        let (stop, client) = {
            let mut inner = self.shared.inner.write();
            inner.closed = true;
            inner.reconnect_pending = false;
            let client = inner.link.take_client();
            inner.link = Link::Disconnected;
            (inner.monitor.take(), client)
        };

        if let Some(stop) = stop {
            stop.send(true).ok();
        }
        if let Some(client) = client {
            client.close();
        }
        info!(url = %self.shared.url, "Node connection closed");
    }

    async fn acquire(&self) -> Result<Arc<D::Client>> {
        let attempt = {
            let mut inner = self.shared.inner.write();
            match &inner.link {
                Link::Connecting => return Err(LinkError::AlreadyConnecting),
                Link::Connected(client) => return Ok(Arc::clone(client)),
                Link::Disconnected | Link::Error => {}
            }
            inner.link = Link::Connecting;
            inner.closed = false;
            inner.attempt += 1;
            inner.attempt
        };

        let outcome = self.establish().await;

        let (result, start_monitor) = {
            let mut inner = self.shared.inner.write();
            let current = inner.attempt == attempt && matches!(inner.link, Link::Connecting);
            match outcome {
                Ok((client, network_id)) if current => {
                    let client = Arc::new(client);
                    inner.link = Link::Connected(Arc::clone(&client));
                    inner.last_error = None;
                    let stop_rx = if inner.monitor.is_none() {
                        let (stop_tx, stop_rx) = watch::channel(false);
                        inner.monitor = Some(stop_tx);
                        Some(stop_rx)
                    } else {
                        None
                    };
                    info!(url = %self.shared.url, network_id, "Connected to node");
                    (Ok(client), stop_rx)
                }
                Ok((client, _)) => {
                    client.close();
                    debug!(url = %self.shared.url, "Connect attempt superseded, client released");
                    (Err(LinkError::Closed), None)
                }
                Err(e) => {
                    if current {
                        inner.link = Link::Error;
                        inner.last_error = Some(e.clone());
                    }
                    warn!(error = %e, "Node connection attempt failed");
                    (Err(e), None)
                }
            }
        };

        if let Some(stop_rx) = start_monitor {
            tokio::spawn(self.clone().monitor(stop_rx));
        }
        result
    }

    async fn establish(&self) -> Result<(D::Client, u64)> {
        let url = &self.shared.url;
        let timeout = self.shared.settings.connect_timeout;
        let deadline = Instant::now() + timeout;

        let client = match time::timeout_at(deadline, self.shared.dialer.dial(url)).await {
            Ok(Ok(client)) => client,
            Ok(Err(e)) => {
                return Err(LinkError::DialFailure {
                    url: url.clone(),
                    reason: e.to_string(),
                })
            }
            Err(_) => {
                return Err(LinkError::DialFailure {
                    url: url.clone(),
                    reason: format!("timed out after {timeout:?}"),
                })
            }
        };

        // A socket-level connect proves nothing; the node has to answer.
        let verified = time::timeout_at(deadline, client.network_id()).await;
        let reason = match verified {
            Ok(Ok(network_id)) => return Ok((client, network_id)),
            Ok(Err(e)) => e.to_string(),
            Err(_) => format!("network id request timed out after {timeout:?}"),
        };
        client.close();
        Err(LinkError::VerificationFailure {
            url: url.clone(),
            reason,
        })
    }

    // Boxed: the connect path spawns this future, and it awaits connect in turn.
    fn monitor(self, mut stop: watch::Receiver<bool>) -> Pin<Box<dyn Future<Output = ()> + Send>> {
        Box::pin(async move {
            let settings = self.shared.settings;
            let mut health = interval_after(settings.health_check_interval);
            let mut reconnect = interval_after(settings.reconnect_interval);
            info!(url = %self.shared.url, "Connection monitor started");

            loop {
                tokio::select! {
                    _ = stop.changed() => break,
                    _ = health.tick() => {
                        if !self.check_health().await {
                            warn!("Connection health check failed, triggering reconnect");
                            self.trigger_reconnect();
                        }
                    }
                    _ = reconnect.tick() => {
                        let idle = self.shared.inner.read().link.client().is_none();
                        if idle {
                            self.trigger_reconnect();
                        }
                    }
                    () = self.shared.reconnect_signal.notified() => self.run_reconnect().await,
                }
            }

            info!(url = %self.shared.url, "Connection monitor stopped");
        })
    }

    async fn run_reconnect(&self) {
        let live = {
            let mut inner = self.shared.inner.write();
            // Cleared by close(); the permit is left over from before it.
            if !inner.reconnect_pending {
                return;
            }
            inner.reconnect_pending = false;
            if matches!(inner.link, Link::Connecting) {
                debug!("Connect already in flight, skipping reconnect");
                return;
            }
            inner.link.client().is_some()
        };

        // A held client is only torn down once it fails a health check.
        if live && self.check_health().await {
            debug!("Node link healthy, skipping reconnect");
            return;
        }

        let stale = {
            let mut inner = self.shared.inner.write();
            if inner.closed || matches!(inner.link, Link::Connecting) {
                return;
            }
            inner.link.take_client()
        };

        if let Some(client) = stale {
            client.close();
        }

        info!(url = %self.shared.url, "Attempting to reconnect to node");
        match self.connect().await {
            Ok(()) => info!("Successfully reconnected to node"),
            Err(LinkError::AlreadyConnecting) => debug!("Reconnect raced another connect attempt"),
            Err(e) => warn!(error = %e, "Reconnection failed"),
        }
    }
}

fn interval_after(period: Duration) -> Interval {
    let mut interval = time::interval_at(Instant::now() + period, period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    interval
}
