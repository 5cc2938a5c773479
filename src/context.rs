//! Main execution context.
//!
//! Listeners must never run concurrently with each other or with calls made
//! from the application's main thread. Work produced on other threads (the
//! watch service poll loop) is posted here and executed by whoever owns the
//! [`MainContext`], in FIFO order.
//!
//! ```text
//! poll thread ──post──▶ [ task queue ] ──run_pending──▶ main thread
//! main thread ──dispatch──▶ (drain queue, then run inline)
//! ```

use std::marker::PhantomData;
use std::thread::{self, ThreadId};
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, unbounded};

type Task = Box<dyn FnOnce() + Send + 'static>;

/// Longest single wait inside [`MainContext::run_until`] before the
/// predicate is re-checked.
const PUMP_SLICE: Duration = Duration::from_millis(50);

/// Owner side of the main context. Bound to the thread that created it.
pub struct MainContext {
    handle: ContextHandle,
    // Tasks must run on the owning thread.
    _not_send: PhantomData<*const ()>,
}

impl MainContext {
    /// Create a context owned by the current thread.
    pub fn new() -> Self {
        let (tx, rx) = unbounded();
        Self {
            handle: ContextHandle {
                owner: thread::current().id(),
                tx,
                rx,
            },
            _not_send: PhantomData,
        }
    }

    /// A cloneable, thread-safe handle for posting work.
    pub fn handle(&self) -> ContextHandle {
        self.handle.clone()
    }

    /// Run every task queued so far. Returns how many ran.
    pub fn run_pending(&self) -> usize {
        self.handle.drain()
    }

    /// Execute tasks as they arrive for `duration`.
    pub fn run_for(&self, duration: Duration) -> usize {
        let deadline = Instant::now() + duration;
        let mut ran = 0;
        while let Some(remaining) = deadline.checked_duration_since(Instant::now()) {
            if remaining.is_zero() {
                break;
            }
            match self.handle.rx.recv_timeout(remaining.min(PUMP_SLICE)) {
                Ok(task) => {
                    task();
                    ran += 1;
                }
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => break,
            }
        }
        ran
    }

    /// Execute tasks until `done` returns true or `timeout` elapses.
    ///
    /// Returns the final value of `done`.
    pub fn run_until(&self, timeout: Duration, mut done: impl FnMut() -> bool) -> bool {
        let deadline = Instant::now() + timeout;
        loop {
            self.run_pending();
            if done() {
                return true;
            }
            let remaining = match deadline.checked_duration_since(Instant::now()) {
                Some(r) if !r.is_zero() => r,
                _ => return done(),
            };
            match self.handle.rx.recv_timeout(remaining.min(PUMP_SLICE)) {
                Ok(task) => task(),
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => return done(),
            }
        }
    }
}

impl Default for MainContext {
    fn default() -> Self {
        Self::new()
    }
}

/// Thread-safe handle to a [`MainContext`].
#[derive(Clone)]
pub struct ContextHandle {
    owner: ThreadId,
    tx: Sender<Task>,
    rx: Receiver<Task>,
}

impl ContextHandle {
    /// True when called on the context's owning thread.
    pub fn is_current(&self) -> bool {
        thread::current().id() == self.owner
    }

    /// Queue `task` for the owning thread, even if already on it.
    pub fn post(&self, task: impl FnOnce() + Send + 'static) {
        // Both ends live in every handle, so the channel cannot be closed.
        let _ = self.tx.send(Box::new(task));
    }

    /// Run `task` inline when already on the owning thread, queue it otherwise.
    ///
    /// Inline execution first drains queued tasks so ordering stays FIFO.
    pub fn dispatch(&self, task: impl FnOnce() + Send + 'static) {
        if self.is_current() {
            self.drain();
            task();
        } else {
            self.post(task);
        }
    }

    /// Run queued tasks now when on the owning thread. Returns how many ran.
    pub fn flush(&self) -> usize {
        if self.is_current() {
            self.drain()
        } else {
            0
        }
    }

    /// Number of queued tasks.
    pub fn pending(&self) -> usize {
        self.rx.len()
    }

    fn drain(&self) -> usize {
        let mut ran = 0;
        while let Ok(task) = self.rx.try_recv() {
            task();
            ran += 1;
        }
        ran
    }
}

impl std::fmt::Debug for ContextHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContextHandle")
            .field("owner", &self.owner)
            .field("pending", &self.rx.len())
            .finish()
    }
}
