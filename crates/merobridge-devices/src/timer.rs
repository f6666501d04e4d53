//! Cancellable delayed tasks.
//!
//! A [`TimerSlot`] holds at most one pending task. Scheduling aborts the
//! previous task and bumps the slot generation in one step, so a task that
//! was already running when it got superseded can detect it through
//! [`TimerSlot::release`] and bail out.

use parking_lot::Mutex;
use std::future::Future;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::Instant;

#[derive(Default)]
struct SlotInner {
    handle: Option<JoinHandle<()>>,
    generation: u64,
    deadline: Option<Instant>,
}

/// Slot for one pending timer of a (device, purpose) pair.
#[derive(Default)]
pub struct TimerSlot {
    inner: Mutex<SlotInner>,
}

impl TimerSlot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `task` after `delay`, replacing any pending task.
    ///
    /// The task receives its generation and should pass it to
    /// [`release`](Self::release) when it fires. Returns the generation.
    pub fn schedule<F, Fut>(&self, delay: Duration, task: F) -> u64
    where
        F: FnOnce(u64) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let mut inner = self.inner.lock();
        if let Some(handle) = inner.handle.take() {
            handle.abort();
        }
        inner.generation += 1;
        let generation = inner.generation;
        inner.deadline = Some(Instant::now() + delay);
        inner.handle = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            task(generation).await;
        }));
        generation
    }

    /// Cancel the pending task. Returns `true` if one was pending.
    pub fn cancel(&self) -> bool {
        let mut inner = self.inner.lock();
        inner.generation += 1;
        inner.deadline = None;
        match inner.handle.take() {
            Some(handle) => {
                handle.abort();
                true
            }
            None => false,
        }
    }

    /// Mark the task of `generation` as fired.
    ///
    /// Returns `false` when the task was superseded or cancelled, in which
    /// case it must not do any work.
    pub fn release(&self, generation: u64) -> bool {
        let mut inner = self.inner.lock();
        if inner.generation != generation {
            return false;
        }
        inner.handle = None;
        inner.deadline = None;
        true
    }

    /// Whether a task is waiting to fire.
    pub fn is_pending(&self) -> bool {
        self.inner.lock().handle.is_some()
    }

    /// Time left until the pending task fires.
    pub fn remaining(&self) -> Option<Duration> {
        let inner = self.inner.lock();
        inner.handle.as_ref()?;
        inner
            .deadline
            .map(|deadline| deadline.saturating_duration_since(Instant::now()))
    }
}

impl Drop for TimerSlot {
    fn drop(&mut self) {
        if let Some(handle) = self.inner.get_mut().handle.take() {
            handle.abort();
        }
    }
}
