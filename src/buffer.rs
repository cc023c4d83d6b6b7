//! Bounded pending queue and the background flusher that drains it.

use parking_lot::{Condvar, Mutex};
use std::io;
use std::sync::Arc;
use std::thread::JoinHandle;

#[derive(Debug, Default)]
struct QueueState {
    lines: Vec<Vec<u8>>,
    /// Drained batch handed back by the consumer, reused on the next swap.
    spare: Vec<Vec<u8>>,
    closed: bool,
}

/// Multi-producer queue of formatted lines waiting for the flusher.
#[derive(Debug)]
pub(crate) struct PendingQueue {
    state: Mutex<QueueState>,
    not_empty: Condvar,
    not_full: Condvar,
    capacity: usize,
}

impl PendingQueue {
    pub(crate) fn new(capacity: usize) -> Self {
        Self {
            state: Mutex::new(QueueState::default()),
            not_empty: Condvar::new(),
            not_full: Condvar::new(),
            capacity: capacity.max(1),
        }
    }

    /// Enqueue a line, blocking while the queue is full. Returns false once closed.
    pub(crate) fn push(&self, line: Vec<u8>) -> bool {
        let mut state = self.state.lock();
        while state.lines.len() >= self.capacity && !state.closed {
            self.not_full.wait(&mut state);
        }
        if state.closed {
            return false;
        }
        state.lines.push(line);
        self.not_empty.notify_one();
        true
    }

    /// Block until something is queued. Returns false when closed and empty.
    pub(crate) fn wait_non_empty(&self) -> bool {
        let mut state = self.state.lock();
        while state.lines.is_empty() {
            if state.closed {
                return false;
            }
            self.not_empty.wait(&mut state);
        }
        true
    }

    /// Swap out everything queued so far.
    pub(crate) fn take_all(&self) -> Vec<Vec<u8>> {
        let mut state = self.state.lock();
        let spare = std::mem::take(&mut state.spare);
        let batch = std::mem::replace(&mut state.lines, spare);
        self.not_full.notify_all();
        batch
    }

    /// Hand a written batch back so its allocation is reused.
    pub(crate) fn recycle(&self, mut batch: Vec<Vec<u8>>) {
        batch.clear();
        let mut state = self.state.lock();
        if batch.capacity() > state.spare.capacity() {
            state.spare = batch;
        }
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.state.lock().lines.is_empty()
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.state.lock().lines.len()
    }

    /// Reject further pushes and wake everyone waiting.
    pub(crate) fn close(&self) {
        let mut state = self.state.lock();
        state.closed = true;
        self.not_empty.notify_all();
        self.not_full.notify_all();
    }
}

/// Owner of the flusher thread.
#[derive(Debug)]
pub(crate) struct BufferedSink {
    queue: Arc<PendingQueue>,
    flusher: Option<JoinHandle<()>>,
}

impl BufferedSink {
    /// Start the flusher. `drain` is called every time the queue becomes non-empty and
    /// must take the queued lines itself; the thread exits once the queue is closed
    /// and empty.
    pub(crate) fn spawn<F>(queue: Arc<PendingQueue>, mut drain: F) -> io::Result<Self>
    where
        F: FnMut(&PendingQueue) + Send + 'static,
    {
        let worker_queue = Arc::clone(&queue);
        let flusher = std::thread::Builder::new()
            .name("splitlog-flusher".to_string())
            .spawn(move || {
                while worker_queue.wait_non_empty() {
                    drain(&worker_queue);
                }
            })?;
        Ok(Self {
            queue,
            flusher: Some(flusher),
        })
    }

    #[cfg(test)]
    pub(crate) fn queue(&self) -> &Arc<PendingQueue> {
        &self.queue
    }

    /// Close the queue and wait for the flusher to write what is left.
    pub(crate) fn shutdown(&mut self) {
        self.queue.close();
        if let Some(flusher) = self.flusher.take()
            && flusher.join().is_err()
        {
            eprintln!("splitlog: flusher thread panicked");
        }
    }
}

impl Drop for BufferedSink {
    fn drop(&mut self) {
        self.shutdown();
    }
}
