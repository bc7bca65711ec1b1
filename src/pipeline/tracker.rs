//! Completion counting across an unknown number of sub-streams.
//!
//! The counter starts at one for the message stream itself. Every attachment
//! increments it when discovered and decrements it once persisted; the parser
//! decrements it when the message ends. The barrier opens on the 1 → 0
//! transition and never again.

use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};

use tokio::sync::oneshot;

use crate::error::{Result, UploadError};

struct State {
    outstanding: usize,
    on_zero: Option<oneshot::Sender<()>>,
}

/// Shared handle to the completion counter.
///
/// Clones refer to the same counter. The count can only be changed through
/// [`increment`](Self::increment) and [`decrement`](Self::decrement).
#[derive(Clone)]
pub struct CompletionTracker {
    state: Arc<Mutex<State>>,
}

/// Resolves once every tracked sub-stream has finished.
pub struct CompletionBarrier {
    rx: oneshot::Receiver<()>,
}

impl CompletionTracker {
    /// Create a tracker with one outstanding sub-stream (the message itself).
    pub fn new() -> (Self, CompletionBarrier) {
        let (tx, rx) = oneshot::channel();
        let tracker = Self {
            state: Arc::new(Mutex::new(State {
                outstanding: 1,
                on_zero: Some(tx),
            })),
        };
        (tracker, CompletionBarrier { rx })
    }

    /// Register a new sub-stream before it starts.
    pub fn increment(&self) {
        let mut state = self.lock();
        state.outstanding += 1;
    }

    /// Mark one sub-stream as finished.
    ///
    /// Fails if the counter is already zero, which means some sub-stream
    /// reported completion twice.
    pub fn decrement(&self) -> Result<()> {
        let mut state = self.lock();
        if state.outstanding == 0 {
            return Err(UploadError::Composition(
                "completion counter decremented below zero".into(),
            ));
        }
        state.outstanding -= 1;
        if state.outstanding == 0 {
            if let Some(tx) = state.on_zero.take() {
                // The barrier may already be dropped when the conversion is aborting.
                let _ = tx.send(());
            }
        }
        Ok(())
    }

    /// Number of sub-streams still running. Diagnostic only.
    pub fn outstanding(&self) -> usize {
        self.lock().outstanding
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, State> {
        // The critical sections cannot panic, so a poisoned lock still holds a valid count.
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Future for CompletionBarrier {
    type Output = Result<()>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.rx).poll(cx).map(|res| {
            res.map_err(|_| {
                UploadError::Composition("completion tracker dropped before reaching zero".into())
            })
        })
    }
}
