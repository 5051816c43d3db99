//! A bounded FIFO channel with an externally observable depth (spec §3:
//! "Queue depth is an observable"). Wraps `tokio::sync::mpsc` rather than
//! relying on its internal length accounting, so Measure can read a
//! queue's depth without owning its receiver.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;

pub struct Sender<T> {
    inner: mpsc::Sender<T>,
    depth: Arc<AtomicUsize>,
}

pub struct Receiver<T> {
    inner: mpsc::Receiver<T>,
    depth: Arc<AtomicUsize>,
}

/// A cloneable handle exposing only the current depth, for Measure.
#[derive(Clone)]
pub struct DepthHandle(Arc<AtomicUsize>);

impl DepthHandle {
    pub fn get(&self) -> usize {
        self.0.load(Ordering::Relaxed)
    }
}

impl<T> Clone for Sender<T> {
    fn clone(&self) -> Self {
        Sender {
            inner: self.inner.clone(),
            depth: self.depth.clone(),
        }
    }
}

pub fn channel<T>(capacity: usize) -> (Sender<T>, Receiver<T>) {
    let (tx, rx) = mpsc::channel(capacity);
    let depth = Arc::new(AtomicUsize::new(0));
    (
        Sender {
            inner: tx,
            depth: depth.clone(),
        },
        Receiver { inner: rx, depth },
    )
}

impl<T> Sender<T> {
    /// Blocks the caller while the queue is at capacity (backpressure).
    pub async fn send(&self, item: T) -> Result<(), mpsc::error::SendError<T>> {
        self.inner.send(item).await?;
        self.depth.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    pub fn depth_handle(&self) -> DepthHandle {
        DepthHandle(self.depth.clone())
    }
}

impl<T> Receiver<T> {
    pub async fn recv(&mut self) -> Option<T> {
        let item = self.inner.recv().await;
        if item.is_some() {
            self.depth.fetch_sub(1, Ordering::Relaxed);
        }
        item
    }

    pub fn depth_handle(&self) -> DepthHandle {
        DepthHandle(self.depth.clone())
    }
}
