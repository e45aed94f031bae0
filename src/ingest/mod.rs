//! Stream ingestion loop
//!
//! Frames are processed strictly in arrival order. While maintenance
//! holds the write lock, raw frames accumulate in the dead-letter
//! buffer; when the lock clears the buffer drains FIFO before any new
//! frame is touched. All per-frame failures are absorbed here: nothing
//! that arrives on the wire can terminate the loop.

pub mod dedup;
pub mod subscriber;

use crate::events::envelope::Envelope;
use crate::events::{version_accepted, Dispatcher, HandlerContext, HandlerError};
use crate::state::AppState;
use dedup::DedupCache;
use flate2::read::ZlibDecoder;
use std::collections::VecDeque;
use std::io::Read;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;

/// Wall-clock deadline for inflating one frame
const DECOMPRESS_TIMEOUT: Duration = Duration::from_secs(5);

/// Corruption guard: no real frame inflates anywhere near this size
const MAX_FRAME_SIZE: u64 = 10 * 1024 * 1024;

/// Cadence of the throughput log line
const LOG_EVERY_EVENTS: u64 = 1_000;

/// Cadence of the buffered-frame log line while the write lock is held
const LOG_EVERY_BUFFERED: usize = 100;

#[derive(Debug, PartialEq, Eq)]
pub enum FrameOutcome {
    Processed,
    Corrupt,
    VersionRejected,
    Duplicate,
    Unrecognized,
    Failed,
}

pub struct Ingestor {
    ctx: HandlerContext,
    dispatcher: Dispatcher,
    state: Arc<AppState>,
    dedup: DedupCache,
    dead_letter: VecDeque<Vec<u8>>,
    started: Instant,
    total_latency_us: u64,
}

impl Ingestor {
    pub fn new(ctx: HandlerContext, state: Arc<AppState>) -> Self {
        Self {
            ctx,
            dispatcher: Dispatcher::with_default_handlers(),
            state,
            dedup: DedupCache::default(),
            dead_letter: VecDeque::new(),
            started: Instant::now(),
            total_latency_us: 0,
        }
    }

    /// Consume the frame channel until it closes or shutdown is signaled
    pub async fn run(
        mut self,
        mut rx: mpsc::Receiver<Vec<u8>>,
        mut shutdown: tokio::sync::watch::Receiver<bool>,
    ) {
        log::info!("🚀 Ingestion loop started");

        loop {
            let frame = tokio::select! {
                maybe = rx.recv() => match maybe {
                    Some(frame) => frame,
                    None => break,
                },
                _ = shutdown.changed() => {
                    log::info!("Shutdown signaled, closing frame channel");
                    // Already-queued frames still drain; the subscriber
                    // thread exits on its next failed send
                    rx.close();
                    continue;
                }
            };

            // Arrival order is preserved by always queueing behind any
            // frames parked while the write lock was held
            self.dead_letter.push_back(frame);

            if self.state.write_lock_held() {
                if self.dead_letter.len() % LOG_EVERY_BUFFERED == 0 {
                    log::info!(
                        "📦 Write lock held, {} frames buffered",
                        self.dead_letter.len()
                    );
                }
                continue;
            }

            if self.dead_letter.len() > 1 {
                log::info!("📦 Draining {} buffered frames", self.dead_letter.len());
            }
            self.drain_buffer().await;
        }

        // Channel closed: shutdown. Best-effort drain of anything still
        // parked so buffered observations are not lost.
        if !self.dead_letter.is_empty() {
            log::info!(
                "🔄 Final drain of {} buffered frames before shutdown",
                self.dead_letter.len()
            );
            self.drain_buffer().await;
        }

        log::info!(
            "✅ Ingestion loop stopped ({} events processed)",
            self.state.events_processed.load(Ordering::Relaxed)
        );
    }

    /// Process parked frames FIFO until empty or the lock is re-taken
    async fn drain_buffer(&mut self) {
        while !self.state.write_lock_held() {
            let Some(frame) = self.dead_letter.pop_front() else {
                break;
            };
            self.process_raw(&frame).await;
        }
    }

    /// Run one raw frame through the full pipeline
    pub async fn process_raw(&mut self, raw: &[u8]) -> FrameOutcome {
        let frame_start = Instant::now();

        let payload = {
            let wire_len = raw.len();
            let raw = raw.to_vec();
            let inflate =
                tokio::task::spawn_blocking(move || inflate_frame(&raw));
            match tokio::time::timeout(DECOMPRESS_TIMEOUT, inflate).await {
                Ok(Ok(Ok(payload))) => payload,
                Ok(Ok(Err(e))) => {
                    log::warn!("⚠️ Dropping corrupt frame ({} bytes): {}", wire_len, e);
                    return FrameOutcome::Corrupt;
                }
                Ok(Err(e)) => {
                    log::error!("❌ Decompression task failed: {}", e);
                    return FrameOutcome::Corrupt;
                }
                Err(_) => {
                    log::warn!(
                        "⚠️ Dropping frame: decompression exceeded {}s deadline",
                        DECOMPRESS_TIMEOUT.as_secs()
                    );
                    return FrameOutcome::Corrupt;
                }
            }
        };

        let envelope = match Envelope::parse(&payload) {
            Ok(envelope) => envelope,
            Err(e) => {
                log::warn!("⚠️ Dropping unparseable frame: {}", e);
                return FrameOutcome::Corrupt;
            }
        };

        if !version_accepted(envelope.header.gameversion.as_deref()) {
            self.state.events_rejected.fetch_add(1, Ordering::Relaxed);
            log::debug!(
                "Version gate rejected {:?} ({})",
                envelope.header.gameversion,
                envelope.schema_ref
            );
            return FrameOutcome::VersionRejected;
        }

        let dedup_key = format!("{}{}", envelope.schema_ref, envelope.dedup_timestamp());
        if !self.dedup.insert(&dedup_key) {
            self.state.events_deduplicated.fetch_add(1, Ordering::Relaxed);
            return FrameOutcome::Duplicate;
        }
        self.state.dedup_size.store(self.dedup.len(), Ordering::Relaxed);

        let outcome = match self
            .dispatcher
            .dispatch(&envelope.schema_ref, &envelope.message, &self.ctx)
            .await
        {
            Ok(true) => FrameOutcome::Processed,
            Ok(false) => FrameOutcome::Unrecognized,
            Err(HandlerError::Database(e)) => {
                log::warn!(
                    "⚠️ Dropping {} frame on database error: {}",
                    self.dispatcher.handler_name(&envelope.schema_ref),
                    e
                );
                return FrameOutcome::Failed;
            }
            Err(HandlerError::Payload(e)) => {
                log::warn!(
                    "⚠️ Dropping malformed {} payload: {}",
                    self.dispatcher.handler_name(&envelope.schema_ref),
                    e
                );
                return FrameOutcome::Failed;
            }
        };

        if outcome == FrameOutcome::Processed {
            self.total_latency_us += frame_start.elapsed().as_micros() as u64;
            let processed = self.state.events_processed.fetch_add(1, Ordering::Relaxed) + 1;
            if processed % LOG_EVERY_EVENTS == 0 {
                self.log_throughput(processed);
            }
        }

        outcome
    }

    fn log_throughput(&self, processed: u64) {
        let elapsed = self.started.elapsed().as_secs_f64().max(0.001);
        let rate = processed as f64 / elapsed;
        let avg_latency_ms = (self.total_latency_us as f64 / processed as f64) / 1000.0;
        log::info!(
            "📊 {} events processed ({:.1}/s, avg latency {:.2}ms, dedup size {})",
            processed,
            rate,
            avg_latency_ms,
            self.dedup.len()
        );
    }

    pub fn buffered_frames(&self) -> usize {
        self.dead_letter.len()
    }
}

fn inflate_frame(raw: &[u8]) -> std::io::Result<Vec<u8>> {
    let mut decoder = ZlibDecoder::new(raw).take(MAX_FRAME_SIZE);
    let mut payload = Vec::new();
    decoder.read_to_end(&mut payload)?;
    Ok(payload)
}

/// Compress a payload the way the upstream gateway does; shared with the
/// integration tests
pub fn deflate_frame(payload: &[u8]) -> Vec<u8> {
    use flate2::write::ZlibEncoder;
    use flate2::Compression;
    use std::io::Write;

    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(payload).expect("in-memory write");
    encoder.finish().expect("in-memory finish")
}
