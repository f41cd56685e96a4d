//! Sync bridge for the async embedder
//!
//! The embedder is inherently async but is sometimes consumed from sync code
//! that is already running inside a tokio runtime, where `block_on` would
//! panic. The bridge keeps ONE long-lived worker thread with its own
//! single-threaded runtime and ships embed jobs to it over a channel.
//! Spawning a thread per call costs ~50 ms each and is exactly what this
//! avoids during batch ingest.

use std::sync::mpsc;
use std::sync::Arc;
use std::thread;

use super::embedding::{Embedder, EmbeddingError};

type Job = (String, mpsc::Sender<Result<Vec<f32>, EmbeddingError>>);

/// Reusable worker-thread bridge around an async embedder
pub struct EmbeddingBridge {
    tx: mpsc::Sender<Job>,
    dimensions: usize,
}

impl EmbeddingBridge {
    /// Spawn the worker thread. The thread owns its runtime and lives until
    /// the bridge is dropped.
    pub fn new(embedder: Arc<dyn Embedder>) -> Self {
        let dimensions = embedder.dimensions();
        let (tx, rx) = mpsc::channel::<Job>();

        let spawned = thread::Builder::new()
            .name("engram-embed".to_string())
            .spawn(move || {
                let runtime = match tokio::runtime::Builder::new_current_thread()
                    .enable_all()
                    .build()
                {
                    Ok(rt) => rt,
                    Err(e) => {
                        tracing::warn!("embedding bridge runtime failed to start: {e}");
                        return;
                    }
                };
                while let Ok((text, reply)) = rx.recv() {
                    let result = runtime.block_on(embedder.embed(&text));
                    let _ = reply.send(result);
                }
            });
        if let Err(e) = spawned {
            // With no receiver alive every embed_blocking reports Bridge
            tracing::warn!("failed to spawn embedding bridge thread: {e}");
        }

        Self { tx, dimensions }
    }

    /// Output vector length of the wrapped embedder
    pub fn dimensions(&self) -> usize {
        self.dimensions
    }

    /// Run an embed on the worker thread and block the caller until it
    /// finishes. Safe inside and outside tokio runtimes.
    pub fn embed_blocking(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        let (reply_tx, reply_rx) = mpsc::channel();
        self.tx
            .send((text.to_string(), reply_tx))
            .map_err(|_| EmbeddingError::Bridge("worker thread is gone".into()))?;
        reply_rx
            .recv()
            .map_err(|_| EmbeddingError::Bridge("worker dropped reply".into()))?
    }
}
