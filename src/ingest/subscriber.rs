//! Upstream feed subscriber
//!
//! A dedicated OS thread owns the ZeroMQ SUB socket (zmq sockets are not
//! Send-safe across await points) and forwards raw frames into a bounded
//! channel consumed by the async ingestion loop. Reconnection is driven
//! by receive timeouts with exponential backoff; the thread exits when
//! the channel closes.

use std::thread::JoinHandle;
use std::time::Duration;
use tokio::sync::mpsc;

/// Socket receive timeout; a silent feed this long triggers a reconnect
const RECV_TIMEOUT_MS: i32 = 60_000;

pub struct ReconnectBackoff {
    initial_delay: u64,
    max_delay: u64,
    current_attempt: u32,
}

impl ReconnectBackoff {
    pub fn new(initial: u64, max: u64) -> Self {
        Self {
            initial_delay: initial,
            max_delay: max,
            current_attempt: 0,
        }
    }

    pub fn sleep(&mut self) {
        let delay = std::cmp::min(
            self.initial_delay
                .saturating_mul(2u64.saturating_pow(self.current_attempt)),
            self.max_delay,
        );
        log::warn!("⏳ Reconnecting to upstream feed in {}s", delay);
        std::thread::sleep(Duration::from_secs(delay));
        self.current_attempt = self.current_attempt.saturating_add(1);
    }

    pub fn reset(&mut self) {
        self.current_attempt = 0;
    }

    pub fn next_delay_secs(&self) -> u64 {
        std::cmp::min(
            self.initial_delay
                .saturating_mul(2u64.saturating_pow(self.current_attempt)),
            self.max_delay,
        )
    }
}

/// Spawn the subscriber thread; frames arrive on the returned channel's
/// paired receiver until the receiver is dropped
pub fn spawn_subscriber(url: String, tx: mpsc::Sender<Vec<u8>>) -> JoinHandle<()> {
    std::thread::Builder::new()
        .name("feed-subscriber".to_string())
        .spawn(move || subscriber_loop(&url, tx))
        .expect("failed to spawn subscriber thread")
}

fn subscriber_loop(url: &str, tx: mpsc::Sender<Vec<u8>>) {
    let context = zmq::Context::new();
    let mut backoff = ReconnectBackoff::new(5, 60);

    loop {
        if tx.is_closed() {
            log::info!("Frame channel closed, subscriber thread exiting");
            return;
        }

        let socket = match connect(&context, url) {
            Ok(socket) => {
                log::info!("🔌 Subscribed to upstream feed: {}", url);
                backoff.reset();
                socket
            }
            Err(e) => {
                log::error!("❌ Upstream connection failed: {}", e);
                backoff.sleep();
                continue;
            }
        };

        loop {
            match socket.recv_bytes(0) {
                Ok(frame) => {
                    // Blocking send applies channel backpressure to the
                    // socket instead of buffering unbounded in memory
                    if tx.blocking_send(frame).is_err() {
                        log::info!("Frame channel closed, subscriber thread exiting");
                        return;
                    }
                }
                Err(e) => {
                    log::warn!("⚠️ Upstream receive failed ({}), reconnecting", e);
                    break;
                }
            }
        }

        backoff.sleep();
    }
}

fn connect(context: &zmq::Context, url: &str) -> Result<zmq::Socket, zmq::Error> {
    let socket = context.socket(zmq::SUB)?;
    socket.set_rcvtimeo(RECV_TIMEOUT_MS)?;
    socket.set_reconnect_ivl(5_000)?;
    socket.connect(url)?;
    // Empty-string topic: every message the feed publishes
    socket.set_subscribe(b"")?;
    Ok(socket)
}
