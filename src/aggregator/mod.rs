use std::fmt;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::time::{self, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::buffer::RecordBuffer;
use crate::config::Config;
use crate::publisher::Publisher;
use crate::record::PacketRecord;

/// Which execution context asked for the flush.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FlushTrigger {
    Ingest,
    Timer,
    Shutdown,
}

impl fmt::Display for FlushTrigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FlushTrigger::Ingest => write!(f, "ingest"),
            FlushTrigger::Timer => write!(f, "timer"),
            FlushTrigger::Shutdown => write!(f, "shutdown"),
        }
    }
}

/// What one flush attempt did.
#[derive(Debug, PartialEq, Eq)]
pub enum FlushOutcome {
    /// Nothing to send, or the ingest-path window has not elapsed yet.
    Skipped,
    Published { sent: usize },
    /// Publish failed; the drained batch was dropped, not requeued.
    Failed { dropped: usize },
}

/// What the ingestion boundary reports back to the sensor.
#[derive(Debug, PartialEq, Eq)]
pub enum IngestAck {
    /// Record accepted; the flush window is still open.
    Buffered { pending: usize },
    /// A due batch went out; the inbound record opened the next one.
    Flushed { sent: usize, pending: usize },
    /// A due batch was dropped on a failed publish. The inbound record
    /// itself is safe in the buffer.
    PublishFailed { dropped: usize },
}

/// State behind the single mutex — buffer and flush clock together, so there
/// is no lock ordering to get wrong.
struct FlushState {
    buffer: RecordBuffer,
    last_flush: Instant,
}

/// Coordinates the two flush triggers against the shared buffer.
///
/// Constructed once at process start and shared via `Arc` with the ingestion
/// listener and the timer task. Uses `std::sync::Mutex` (not tokio) because
/// the lock is never held across `.await` — every guarded operation is an
/// O(1) append or drain-and-swap, and publishing always runs on an owned,
/// already-swapped batch.
pub struct Aggregator<P> {
    state: Mutex<FlushState>,
    flush_interval: Duration,
    max_buffered: Option<usize>,
    publisher: P,
}

impl<P: Publisher> Aggregator<P> {
    pub fn new(publisher: P, config: &Config) -> Self {
        Self {
            state: Mutex::new(FlushState {
                buffer: RecordBuffer::new(),
                last_flush: Instant::now(),
            }),
            flush_interval: config.flush_interval,
            max_buffered: config.buffer_max_records,
            publisher,
        }
    }

    pub fn flush_interval(&self) -> Duration {
        self.flush_interval
    }

    /// Handle one accepted record.
    ///
    /// The flush decision runs against the records buffered *before* this
    /// one: a due batch is claimed first and the inbound record opens the
    /// next batch in the freshly swapped buffer. Claim and append share a
    /// single lock acquisition; the publish happens after release.
    pub async fn on_ingest(&self, record: PacketRecord) -> IngestAck {
        let (due, pending) = {
            let mut state = self.state.lock().unwrap();
            let due = self.claim_due(&mut state, FlushTrigger::Ingest);
            state.buffer.append(record);
            (due, state.buffer.len())
        };

        let outcome = match due {
            None => FlushOutcome::Skipped,
            Some(batch) => self.publish_batch(batch, FlushTrigger::Ingest).await,
        };

        match outcome {
            FlushOutcome::Skipped => IngestAck::Buffered { pending },
            FlushOutcome::Published { sent } => IngestAck::Flushed { sent, pending },
            FlushOutcome::Failed { dropped } => IngestAck::PublishFailed { dropped },
        }
    }

    /// Timer backstop: drain whatever is buffered, regardless of how much of
    /// the interval has elapsed. An empty buffer is a no-op, not an error.
    pub async fn on_tick(&self) -> FlushOutcome {
        self.try_flush(FlushTrigger::Timer).await
    }

    /// Best-effort final drain before process exit.
    pub async fn on_shutdown(&self) -> FlushOutcome {
        self.try_flush(FlushTrigger::Shutdown).await
    }

    async fn try_flush(&self, trigger: FlushTrigger) -> FlushOutcome {
        let due = {
            let mut state = self.state.lock().unwrap();
            self.claim_due(&mut state, trigger)
        };
        match due {
            None => FlushOutcome::Skipped,
            Some(batch) => self.publish_batch(batch, trigger).await,
        }
    }

    /// The only code allowed to read-and-act on the flush state. Called with
    /// the lock held; returns the drained batch when a flush is due.
    ///
    /// The request path is a throttle, not a deadline: inside the window it
    /// only fires when the buffer has outgrown the capacity threshold. Timer
    /// and shutdown always drain a non-empty buffer.
    fn claim_due(&self, state: &mut FlushState, trigger: FlushTrigger) -> Option<Vec<PacketRecord>> {
        if state.buffer.is_empty() {
            return None;
        }

        if trigger == FlushTrigger::Ingest
            && state.last_flush.elapsed() < self.flush_interval
            && !self.over_capacity(state.buffer.len())
        {
            return None;
        }

        Some(state.buffer.drain())
    }

    fn over_capacity(&self, buffered: usize) -> bool {
        self.max_buffered.is_some_and(|max| buffered >= max)
    }

    /// Publish an owned batch outside the lock. Success advances the flush
    /// clock; failure drops the batch and leaves the clock untouched, so the
    /// next trigger may retry-with-fresh-data immediately.
    async fn publish_batch(&self, batch: Vec<PacketRecord>, trigger: FlushTrigger) -> FlushOutcome {
        let size = batch.len();
        match self.publisher.publish(&batch).await {
            Ok(()) => {
                self.state.lock().unwrap().last_flush = Instant::now();
                info!(records = size, trigger = %trigger, "published packet batch");
                FlushOutcome::Published { sent: size }
            }
            Err(e) => {
                error!(
                    error = %e,
                    records = size,
                    trigger = %trigger,
                    "publish failed, dropping batch"
                );
                FlushOutcome::Failed { dropped: size }
            }
        }
    }
}

/// Recurring backstop: invokes `on_tick` once per flush interval until
/// cancelled. A buffer with no new arrivals still drains within one period.
pub async fn run_timer<P: Publisher>(aggregator: Arc<Aggregator<P>>, cancel: CancellationToken) {
    let period = aggregator.flush_interval();
    let mut ticker = time::interval_at(Instant::now() + period, period);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                if aggregator.on_tick().await == FlushOutcome::Skipped {
                    debug!("backstop tick: buffer empty");
                }
            }
            _ = cancel.cancelled() => break,
        }
    }
}
