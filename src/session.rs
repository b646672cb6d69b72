// One generation session: wire messages in, rendered document out

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

use crate::connection::{StreamClient, Subscription};
use crate::events::SessionEvent;
use crate::history::{HistoryEntry, HistorySink};
use crate::protocol::{ClientRequest, WireMessage};
use crate::reassembler::{ChunkMode, Lifecycle, Reassembler};
use crate::render::{RenderScheduler, RenderView, DEFAULT_TICK};

#[derive(Debug, Clone, Copy)]
pub struct SessionOptions {
    pub tick: Duration,
    pub chunk_mode: ChunkMode,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            tick: DEFAULT_TICK,
            chunk_mode: ChunkMode::Incremental,
        }
    }
}

pub type SharedSession = Arc<Mutex<Session>>;

/// Owns the render pipeline for the document currently being generated.
pub struct Session {
    reassembler: Reassembler,
    renderer: RenderScheduler,
    lifecycle_tx: watch::Sender<Lifecycle>,
    events: Option<mpsc::UnboundedSender<SessionEvent>>,
    history: Option<Arc<dyn HistorySink>>,
    prompt: Option<String>,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("lifecycle", &self.reassembler.lifecycle())
            .field("raw_len", &self.reassembler.raw().len())
            .field("prompt", &self.prompt)
            .finish_non_exhaustive()
    }
}

impl Session {
    pub fn new(options: SessionOptions) -> Self {
        let (lifecycle_tx, _) = watch::channel(Lifecycle::Idle);
        Self {
            reassembler: Reassembler::new(options.chunk_mode),
            renderer: RenderScheduler::new(options.tick),
            lifecycle_tx,
            events: None,
            history: None,
            prompt: None,
        }
    }

    #[must_use]
    pub fn with_events(mut self, events: mpsc::UnboundedSender<SessionEvent>) -> Self {
        self.events = Some(events);
        self
    }

    #[must_use]
    pub fn with_history(mut self, history: Arc<dyn HistorySink>) -> Self {
        self.history = Some(history);
        self
    }

    pub fn into_shared(self) -> SharedSession {
        Arc::new(Mutex::new(self))
    }

    pub const fn lifecycle(&self) -> Lifecycle {
        self.reassembler.lifecycle()
    }

    pub fn error(&self) -> Option<&str> {
        self.reassembler.error()
    }

    pub fn status(&self) -> Option<&str> {
        self.reassembler.status()
    }

    pub fn raw(&self) -> &str {
        self.reassembler.raw()
    }

    pub fn displayed(&self) -> String {
        self.renderer.displayed()
    }

    pub fn prompt(&self) -> Option<&str> {
        self.prompt.as_deref()
    }

    pub fn view(&self) -> RenderView {
        self.renderer.view()
    }

    pub fn watch_lifecycle(&self) -> watch::Receiver<Lifecycle> {
        self.lifecycle_tx.subscribe()
    }

    /// Send a generate request and remember its prompt for history.
    /// Returns `false` when the client is not connected.
    pub fn submit(&mut self, client: &StreamClient, request: &ClientRequest) -> bool {
        if !client.send(request) {
            warn!("generate request not sent: not connected");
            return false;
        }
        self.prompt = Some(request.prompt().to_string());
        true
    }

    /// Feed one inbound message through the pipeline.
    pub fn handle(&mut self, message: &WireMessage) {
        let before = self.reassembler.lifecycle();
        if let Some(effect) = self.reassembler.apply(message) {
            self.renderer.apply(effect);
        }
        self.lifecycle_tx.send_replace(self.reassembler.lifecycle());

        match message {
            WireMessage::Start { message } => {
                info!("generation started");
                self.emit(SessionEvent::Started(message.clone()));
            }
            WireMessage::Complete { .. } if before != Lifecycle::Generating => {
                debug!(lifecycle = ?before, "complete outside of a generation ignored");
            }
            WireMessage::Complete { message, metadata } => {
                info!(len = self.reassembler.raw().len(), "generation complete");
                self.record_history();
                self.emit(SessionEvent::Completed {
                    message: message.clone(),
                    metadata: metadata.clone(),
                });
            }
            WireMessage::Error { .. } => {
                let error = self.reassembler.error().unwrap_or_default().to_string();
                warn!(%error, "generation failed");
                self.emit(SessionEvent::Failed(error));
            }
            WireMessage::Chunk { .. } | WireMessage::Content { .. } => {}
        }
    }

    /// Skip the typing effect and show everything received so far.
    pub fn flush(&self) {
        self.renderer.flush();
    }

    /// Stop rendering for good.
    pub fn shutdown(&mut self) {
        self.renderer.shutdown();
    }

    fn emit(&self, event: SessionEvent) {
        if let Some(tx) = &self.events {
            let _ = tx.send(event);
        }
    }

    fn record_history(&self) {
        let Some(history) = &self.history else {
            return;
        };
        let contract = self.reassembler.raw();
        if contract.is_empty() {
            debug!("empty document, nothing recorded");
            return;
        }
        history.record(HistoryEntry::new(
            self.prompt.clone().unwrap_or_default(),
            contract,
        ));
    }
}

/// Route every message the client receives into `session`.
pub fn attach(session: &SharedSession, client: &StreamClient) -> Subscription {
    let session = Arc::clone(session);
    client.subscribe(move |message| {
        session
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .handle(message);
    })
}
