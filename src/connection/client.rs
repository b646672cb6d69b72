//! WebSocket client driving [`ConnectionMachine`] with tokio-tungstenite.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use serde::Serialize;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, error, info, warn};

use super::machine::{ConnectionMachine, ConnectionState};
use crate::protocol::WireMessage;

pub const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_millis(3000);

#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// No URL means `connect()` does nothing.
    pub url: Option<String>,
    pub reconnect_delay: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            url: None,
            reconnect_delay: DEFAULT_RECONNECT_DELAY,
        }
    }
}

type Handler = Arc<dyn Fn(&WireMessage) + Send + Sync>;

#[derive(Default)]
struct Dispatcher {
    next_id: AtomicU64,
    handlers: Mutex<Vec<(u64, Handler)>>,
    primary: Mutex<Option<u64>>,
}

impl Dispatcher {
    fn add(&self, handler: Handler) -> u64 {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        lock(&self.handlers).push((id, handler));
        id
    }

    fn remove(&self, id: u64) {
        lock(&self.handlers).retain(|(existing, _)| *existing != id);
    }

    fn replace_primary(&self, handler: Handler) {
        let id = self.add(handler);
        if let Some(previous) = lock(&self.primary).replace(id) {
            self.remove(previous);
        }
    }

    fn publish(&self, message: &WireMessage) {
        // Handlers run without the lock held so they may (un)subscribe.
        let handlers: Vec<Handler> = lock(&self.handlers)
            .iter()
            .map(|(_, handler)| Arc::clone(handler))
            .collect();
        for handler in handlers {
            handler(message);
        }
    }

    fn len(&self) -> usize {
        lock(&self.handlers).len()
    }
}

/// Keeps a handler registered. Dropping it unsubscribes.
#[must_use = "dropping a Subscription unsubscribes its handler"]
#[derive(Debug)]
pub struct Subscription {
    id: u64,
    dispatcher: Weak<Dispatcher>,
}

impl Subscription {
    pub fn cancel(self) {}
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(dispatcher) = self.dispatcher.upgrade() {
            dispatcher.remove(self.id);
        }
    }
}

#[derive(Default)]
struct Inner {
    machine: ConnectionMachine,
    outbound: Option<mpsc::UnboundedSender<Message>>,
    socket_task: Option<JoinHandle<()>>,
    reconnect_task: Option<JoinHandle<()>>,
}

struct Shared {
    config: ClientConfig,
    inner: Mutex<Inner>,
    state_tx: watch::Sender<ConnectionState>,
    dispatcher: Arc<Dispatcher>,
}

/// Reconnecting duplex channel to the generation backend.
///
/// Every close schedules a new `connect()` after the configured delay until
/// [`StreamClient::disconnect`] is called. Cloning yields another handle to
/// the same connection.
#[derive(Clone)]
pub struct StreamClient {
    shared: Arc<Shared>,
}

impl fmt::Debug for StreamClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StreamClient")
            .field("url", &self.shared.config.url)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

impl StreamClient {
    pub fn new(config: ClientConfig) -> Self {
        let (state_tx, _) = watch::channel(ConnectionState::Disconnected);
        Self {
            shared: Arc::new(Shared {
                config,
                inner: Mutex::new(Inner::default()),
                state_tx,
                dispatcher: Arc::new(Dispatcher::default()),
            }),
        }
    }

    pub fn url(&self) -> Option<&str> {
        self.shared.config.url.as_deref()
    }

    pub fn state(&self) -> ConnectionState {
        self.shared.lock().machine.state()
    }

    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.shared.state_tx.subscribe()
    }

    /// User-facing message for the last transport error, cleared on open.
    pub fn last_error(&self) -> Option<String> {
        self.shared.lock().machine.error().map(ToString::to_string)
    }

    pub fn connect(&self) {
        self.shared.connect();
    }

    /// Close the transport and stop the reconnect loop.
    pub fn disconnect(&self) {
        let mut inner = self.shared.lock();
        if let Some(task) = inner.reconnect_task.take() {
            task.abort();
        }
        if let Some(task) = inner.socket_task.take() {
            task.abort();
        }
        inner.outbound = None;
        inner.machine.disconnect();
        self.shared.publish_state(&inner);
        info!("disconnected");
    }

    /// Serialize and transmit `payload`. Only succeeds while connected;
    /// nothing is queued otherwise.
    pub fn send<T: Serialize + ?Sized>(&self, payload: &T) -> bool {
        let inner = self.shared.lock();
        let Some(outbound) = inner
            .outbound
            .as_ref()
            .filter(|_| inner.machine.state().is_connected())
        else {
            debug!(state = ?inner.machine.state(), "send skipped: not connected");
            return false;
        };

        match serde_json::to_string(payload) {
            Ok(json) => outbound.send(Message::Text(json.into())).is_ok(),
            Err(e) => {
                error!(error = %e, "failed to serialize outbound frame");
                false
            }
        }
    }

    /// Install the primary message handler, dropping the previously
    /// installed one. Handlers added with [`Self::subscribe`] are unaffected.
    pub fn set_message_handler(&self, handler: impl Fn(&WireMessage) + Send + Sync + 'static) {
        self.shared.dispatcher.replace_primary(Arc::new(handler));
    }

    /// Register an additional handler for every inbound frame.
    pub fn subscribe(&self, handler: impl Fn(&WireMessage) + Send + Sync + 'static) -> Subscription {
        let id = self.shared.dispatcher.add(Arc::new(handler));
        Subscription {
            id,
            dispatcher: Arc::downgrade(&self.shared.dispatcher),
        }
    }
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, Inner> {
        lock(&self.inner)
    }

    fn publish_state(&self, inner: &Inner) {
        self.state_tx.send_replace(inner.machine.state());
    }

    fn connect(self: &Arc<Self>) {
        let mut inner = self.lock();
        self.connect_locked(&mut inner);
    }

    fn connect_locked(self: &Arc<Self>, inner: &mut Inner) {
        let Some(url) = self.config.url.clone() else {
            debug!("connect skipped: no server url configured");
            return;
        };

        let Some(epoch) = inner.machine.begin_connect() else {
            return;
        };
        if let Some(pending) = inner.reconnect_task.take() {
            pending.abort();
        }
        self.publish_state(inner);

        let shared = Arc::clone(self);
        let task = tokio::spawn(async move { shared.run_socket(url, epoch).await });
        if let Some(previous) = inner.socket_task.replace(task) {
            previous.abort();
        }
    }

    async fn run_socket(self: Arc<Self>, url: String, epoch: u64) {
        info!(%url, epoch, "connecting");

        match connect_async(url.as_str()).await {
            Ok((stream, _response)) => {
                let (tx, mut rx) = mpsc::unbounded_channel();
                if !self.on_open(epoch, tx) {
                    return;
                }

                let (mut write, mut read) = stream.split();
                loop {
                    tokio::select! {
                        incoming = read.next() => match incoming {
                            Some(Ok(Message::Text(text))) => self.on_frame(epoch, text.as_str()),
                            Some(Ok(Message::Close(frame))) => {
                                debug!(?frame, "close frame received");
                                break;
                            }
                            Some(Ok(_)) => {}
                            Some(Err(e)) => {
                                warn!(error = %e, "connection read failed");
                                self.on_error(epoch);
                                break;
                            }
                            None => break,
                        },
                        outgoing = rx.recv() => {
                            let Some(message) = outgoing else { break };
                            if let Err(e) = write.send(message).await {
                                warn!(error = %e, "connection write failed");
                                self.on_error(epoch);
                                break;
                            }
                        }
                    }
                }

                if let Err(e) = write.close().await {
                    debug!(error = %e, "close handshake failed");
                }
            }
            Err(e) => {
                warn!(%url, error = %e, "connection failed");
                self.on_error(epoch);
            }
        }

        self.on_close(epoch);
    }

    fn on_open(&self, epoch: u64, outbound: mpsc::UnboundedSender<Message>) -> bool {
        let mut inner = self.lock();
        if !inner.machine.opened(epoch) {
            debug!(epoch, "stale transport opened, dropping it");
            return false;
        }
        inner.outbound = Some(outbound);
        self.publish_state(&inner);
        info!(epoch, "connected");
        true
    }

    fn on_error(&self, epoch: u64) {
        let mut inner = self.lock();
        if inner.machine.failed(epoch) {
            inner.outbound = None;
            self.publish_state(&inner);
        }
    }

    fn on_close(self: &Arc<Self>, epoch: u64) {
        let mut inner = self.lock();
        if !inner.machine.closed(epoch) {
            return;
        }
        inner.outbound = None;
        self.publish_state(&inner);
        self.schedule_reconnect(&mut inner);
    }

    fn on_frame(&self, epoch: u64, frame: &str) {
        if !self.lock().machine.is_current(epoch) {
            return;
        }
        match WireMessage::parse(frame) {
            Ok(message) => {
                debug!(kind = message.kind(), "frame received");
                self.dispatcher.publish(&message);
            }
            Err(e) => {
                let preview: String = frame.chars().take(120).collect();
                warn!(error = %e, frame = %preview, "dropping malformed frame");
            }
        }
    }

    fn schedule_reconnect(self: &Arc<Self>, inner: &mut Inner) {
        if let Some(previous) = inner.reconnect_task.take() {
            previous.abort();
        }
        let delay = self.config.reconnect_delay;
        let epoch = inner.machine.epoch();
        info!(?delay, epoch, "connection closed, reconnect scheduled");

        let shared = Arc::clone(self);
        inner.reconnect_task = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let mut inner = shared.lock();
            // Abort cannot stop a task that already woke; any connect or
            // disconnect since scheduling bumped the epoch.
            if !inner.machine.is_current(epoch) {
                debug!(epoch, "reconnect superseded");
                return;
            }
            inner.reconnect_task.take();
            shared.connect_locked(&mut inner);
        }));
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
