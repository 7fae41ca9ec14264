// ─── Progress ───
// The core only writes progress; consumers decide how to present it.
// Byte counts from concurrent workers accumulate in atomics and a pump
// drains them on a fixed tick, so a UI sink sees at most one update per tick.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Three independent channels: coarse step, per-stage bytes, status text.
pub trait ProgressSink: Send + Sync {
    fn step(&self, index: usize, total: usize);
    fn bytes(&self, transferred: u64, total: u64);
    fn status(&self, message: &str);
}

/// Sink that drops everything.
pub struct NoopProgress;

impl ProgressSink for NoopProgress {
    fn step(&self, _index: usize, _total: usize) {}
    fn bytes(&self, _transferred: u64, _total: u64) {}
    fn status(&self, _message: &str) {}
}

/// Payload delivered to channel subscribers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ProgressEvent {
    Step { index: usize, total: usize },
    Bytes { transferred: u64, total: u64 },
    Status { message: String },
}

/// Forwards events to an unbounded channel the caller subscribes to.
pub struct ChannelProgressSink {
    tx: mpsc::UnboundedSender<ProgressEvent>,
}

impl ChannelProgressSink {
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<ProgressEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    fn send(&self, event: ProgressEvent) {
        // A dropped receiver just means nobody is listening any more.
        let _ = self.tx.send(event);
    }
}

impl ProgressSink for ChannelProgressSink {
    fn step(&self, index: usize, total: usize) {
        self.send(ProgressEvent::Step { index, total });
    }

    fn bytes(&self, transferred: u64, total: u64) {
        self.send(ProgressEvent::Bytes { transferred, total });
    }

    fn status(&self, message: &str) {
        self.send(ProgressEvent::Status {
            message: message.to_string(),
        });
    }
}

/// Byte counters shared by every worker of a batch.
#[derive(Debug, Default)]
pub struct ByteCounter {
    transferred: AtomicU64,
    total: AtomicU64,
}

impl ByteCounter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_total(&self, bytes: u64) {
        self.total.fetch_add(bytes, Ordering::Relaxed);
    }

    pub fn add_transferred(&self, bytes: u64) {
        self.transferred.fetch_add(bytes, Ordering::Relaxed);
    }

    /// Roll back bytes counted by an attempt that was discarded.
    pub fn sub_transferred(&self, bytes: u64) {
        let _ = self
            .transferred
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |current| {
                Some(current.saturating_sub(bytes))
            });
    }

    pub fn snapshot(&self) -> (u64, u64) {
        (
            self.transferred.load(Ordering::Relaxed),
            self.total.load(Ordering::Relaxed),
        )
    }

    pub fn reset(&self) {
        self.transferred.store(0, Ordering::Relaxed);
        self.total.store(0, Ordering::Relaxed);
    }
}

/// Periodically drains a [`ByteCounter`] into a sink, emitting only on change.
pub struct ProgressPump {
    stop: CancellationToken,
    handle: JoinHandle<()>,
}

impl ProgressPump {
    pub const DEFAULT_TICK: Duration = Duration::from_millis(100);

    pub fn start(counter: Arc<ByteCounter>, sink: Arc<dyn ProgressSink>, tick: Duration) -> Self {
        let stop = CancellationToken::new();
        let stopped = stop.clone();

        let handle = tokio::spawn(async move {
            let mut last = None;
            let mut interval = tokio::time::interval(tick);
            loop {
                let finished = tokio::select! {
                    _ = stopped.cancelled() => true,
                    _ = interval.tick() => false,
                };

                let current = counter.snapshot();
                if last != Some(current) {
                    sink.bytes(current.0, current.1);
                    last = Some(current);
                }

                if finished {
                    break;
                }
            }
        });

        Self { stop, handle }
    }

    /// Stop the pump after one final drain.
    pub async fn finish(self) {
        self.stop.cancel();
        let _ = self.handle.await;
    }
}
