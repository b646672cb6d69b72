// Incremental render pipeline: pending buffer drained one token per tick

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, trace};

use crate::reassembler::RenderEffect;
use crate::scanner::next_token;

pub const DEFAULT_TICK: Duration = Duration::from_millis(10);

/// Raw content plus a cursor marking how much of it is displayed.
///
/// Displayed content is always `raw[..cursor]` and the pending buffer is
/// `raw[cursor..]`, so nothing can be shown twice or skipped.
#[derive(Debug, Default, Clone)]
pub struct RenderBuffer {
    raw: String,
    cursor: usize,
}

impl RenderBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn raw(&self) -> &str {
        &self.raw
    }

    pub fn displayed(&self) -> &str {
        &self.raw[..self.cursor]
    }

    pub fn pending(&self) -> &str {
        &self.raw[self.cursor..]
    }

    pub fn is_drained(&self) -> bool {
        self.cursor == self.raw.len()
    }

    pub fn reset(&mut self) {
        self.raw.clear();
        self.cursor = 0;
    }

    pub fn append(&mut self, content: &str) {
        self.raw.push_str(content);
    }

    /// Swap in a whole new document; display restarts from the beginning.
    pub fn replace(&mut self, content: String) {
        self.raw = content;
        self.cursor = 0;
    }

    pub fn apply(&mut self, effect: RenderEffect) {
        match effect {
            RenderEffect::Reset => self.reset(),
            RenderEffect::Append(content) => self.append(&content),
            RenderEffect::Replace(content) => self.replace(content),
        }
    }

    /// Move exactly one token from pending to displayed.
    /// Returns the number of bytes revealed, zero once drained.
    pub fn tick(&mut self) -> usize {
        let len = next_token(self.pending()).0.len();
        self.cursor += len;
        len
    }

    /// Reveal everything at once.
    pub fn flush(&mut self) {
        self.cursor = self.raw.len();
    }
}

#[derive(Debug, Default)]
struct Ticker {
    buffer: RenderBuffer,
    running: bool,
    closed: bool,
}

/// Read-only handle on the displayed content.
#[derive(Debug, Clone)]
pub struct RenderView {
    ticker: Arc<Mutex<Ticker>>,
    revision: watch::Receiver<u64>,
}

impl RenderView {
    pub fn displayed(&self) -> String {
        lock(&self.ticker).buffer.displayed().to_string()
    }

    pub fn displayed_len(&self) -> usize {
        lock(&self.ticker).buffer.displayed().len()
    }

    pub fn is_drained(&self) -> bool {
        lock(&self.ticker).buffer.is_drained()
    }

    /// The scheduler was shut down; nothing more will be displayed.
    pub fn is_closed(&self) -> bool {
        lock(&self.ticker).closed
    }

    /// Wait until the displayed content changes.
    /// Returns `false` once the scheduler is gone.
    pub async fn changed(&mut self) -> bool {
        self.revision.changed().await.is_ok()
    }

    /// Wait until every received byte has been displayed, or until the
    /// scheduler is shut down.
    pub async fn drained(&mut self) {
        while !self.is_drained() && !self.is_closed() {
            if !self.changed().await {
                return;
            }
        }
    }
}

/// Fixed-cadence ticker that moves tokens from the pending buffer to the
/// displayed content. The timer runs only while there is something pending.
#[derive(Debug)]
pub struct RenderScheduler {
    period: Duration,
    ticker: Arc<Mutex<Ticker>>,
    revision: Arc<watch::Sender<u64>>,
    task: Option<JoinHandle<()>>,
}

impl RenderScheduler {
    pub fn new(period: Duration) -> Self {
        let (revision, _) = watch::channel(0);
        Self {
            period: period.max(Duration::from_millis(1)),
            ticker: Arc::new(Mutex::new(Ticker::default())),
            revision: Arc::new(revision),
            task: None,
        }
    }

    pub fn view(&self) -> RenderView {
        RenderView {
            ticker: Arc::clone(&self.ticker),
            revision: self.revision.subscribe(),
        }
    }

    pub fn displayed(&self) -> String {
        lock(&self.ticker).buffer.displayed().to_string()
    }

    pub fn pending_len(&self) -> usize {
        lock(&self.ticker).buffer.pending().len()
    }

    /// Mirror a reassembler change and make sure the timer is running if
    /// anything is left to show.
    pub fn apply(&mut self, effect: RenderEffect) {
        let resets = !matches!(effect, RenderEffect::Append(_));
        lock(&self.ticker).buffer.apply(effect);
        if resets {
            self.revision.send_modify(|r| *r += 1);
        }
        self.wake();
    }

    /// Show everything still pending right away.
    pub fn flush(&self) {
        lock(&self.ticker).buffer.flush();
        self.revision.send_modify(|r| *r += 1);
    }

    fn wake(&mut self) {
        {
            let mut ticker = lock(&self.ticker);
            if ticker.closed || ticker.running || ticker.buffer.is_drained() {
                return;
            }
            ticker.running = true;
        }

        trace!(period = ?self.period, "render timer started");
        let ticker = Arc::clone(&self.ticker);
        let revision = Arc::clone(&self.revision);
        let period = self.period;
        self.task = Some(tokio::spawn(async move {
            let mut interval = tokio::time::interval_at(Instant::now() + period, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                interval.tick().await;
                {
                    let mut ticker = lock(&ticker);
                    if ticker.buffer.tick() == 0 {
                        ticker.running = false;
                        trace!("render timer idle");
                        return;
                    }
                }
                revision.send_modify(|r| *r += 1);
            }
        }));
    }

    /// Cancel the timer for good; later input is ignored.
    pub fn shutdown(&mut self) {
        {
            let mut ticker = lock(&self.ticker);
            if ticker.closed {
                return;
            }
            ticker.closed = true;
            ticker.running = false;
        }
        if let Some(task) = self.task.take() {
            task.abort();
            debug!("render timer cancelled");
        }
        self.revision.send_modify(|r| *r += 1);
    }
}

impl Drop for RenderScheduler {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn lock(ticker: &Mutex<Ticker>) -> MutexGuard<'_, Ticker> {
    ticker.lock().unwrap_or_else(PoisonError::into_inner)
}
