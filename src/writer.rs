// Single-writer persistence queue
//
// Saves are handed to one background thread so callers never wait on storage.
// Bursts are coalesced: only the newest value per key is written.

use crate::kv::KvStore;
use eyre::{Context, Result};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc;
use std::thread::{self, JoinHandle};
use tracing::{debug, warn};

enum Message {
    Write { key: String, value: String },
    Flush(mpsc::Sender<()>),
}

#[derive(Default)]
struct WriteStats {
    written: AtomicU64,
    failed: AtomicU64,
}

/// Handle to the background writer thread
pub struct WriteQueue {
    tx: Option<mpsc::Sender<Message>>,
    handle: Option<JoinHandle<()>>,
    stats: Arc<WriteStats>,
}

impl WriteQueue {
    /// Start the writer thread for `kv`
    pub fn spawn(kv: Arc<dyn KvStore>) -> Result<Self> {
        let (tx, rx) = mpsc::channel();
        let stats = Arc::new(WriteStats::default());
        let thread_stats = Arc::clone(&stats);

        let handle = thread::Builder::new()
            .name("tasklist-writer".to_string())
            .spawn(move || run_writer(kv, rx, thread_stats))
            .context("Failed to spawn writer thread")?;

        Ok(Self {
            tx: Some(tx),
            handle: Some(handle),
            stats,
        })
    }

    /// Queue `value` to be written under `key`; never blocks
    pub fn submit(&self, key: &str, value: String) {
        let Some(tx) = &self.tx else {
            return;
        };
        let message = Message::Write {
            key: key.to_string(),
            value,
        };
        if tx.send(message).is_err() {
            warn!(key, "Writer thread is gone, dropping save");
            self.stats.failed.fetch_add(1, Ordering::SeqCst);
        }
    }

    /// Block until every save submitted before this call has been attempted
    pub fn flush(&self) {
        let Some(tx) = &self.tx else {
            return;
        };
        let (ack_tx, ack_rx) = mpsc::channel();
        if tx.send(Message::Flush(ack_tx)).is_ok() {
            let _ = ack_rx.recv();
        }
    }

    /// Number of values successfully written so far
    pub fn written(&self) -> u64 {
        self.stats.written.load(Ordering::SeqCst)
    }

    /// Number of writes that failed so far
    pub fn failed_writes(&self) -> u64 {
        self.stats.failed.load(Ordering::SeqCst)
    }
}

impl Drop for WriteQueue {
    fn drop(&mut self) {
        // Closing the channel lets the writer drain what is queued and exit
        self.tx.take();
        if let Some(handle) = self.handle.take()
            && handle.join().is_err()
        {
            warn!("Writer thread panicked");
        }
    }
}

fn run_writer(kv: Arc<dyn KvStore>, rx: mpsc::Receiver<Message>, stats: Arc<WriteStats>) {
    while let Ok(first) = rx.recv() {
        let mut pending: Vec<(String, String)> = Vec::new();
        let mut acks = Vec::new();

        let mut next = Some(first);
        while let Some(message) = next {
            match message {
                Message::Write { key, value } => match pending.iter_mut().find(|(k, _)| *k == key) {
                    Some(slot) => slot.1 = value,
                    None => pending.push((key, value)),
                },
                Message::Flush(ack) => acks.push(ack),
            }
            next = rx.try_recv().ok();
        }

        for (key, value) in pending {
            match kv.set(&key, &value) {
                Ok(()) => {
                    debug!(key = %key, bytes = value.len(), "Saved");
                    stats.written.fetch_add(1, Ordering::SeqCst);
                }
                Err(e) => {
                    warn!(key = %key, error = ?e, "Failed to save, change not persisted");
                    stats.failed.fetch_add(1, Ordering::SeqCst);
                }
            }
        }

        for ack in acks {
            let _ = ack.send(());
        }
    }
    debug!("Writer thread exiting");
}
