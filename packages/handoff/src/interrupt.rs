//! Cancellation signal for blocking operations.

use smallvec::SmallVec;
use std::{
    sync::{
        atomic::{AtomicBool, Ordering::SeqCst},
        Arc, Mutex, PoisonError,
    },
    task::Waker,
};


/// Sticky, cloneable signal that interrupts blocking channel operations
///
/// Once [`interrupt`](Self::interrupt) is called on any clone, every blocking operation that
/// observes this interrupt (whether currently waiting or started later) fails with
/// [`InterruptedError`](crate::error::InterruptedError). There is no way to reset it.
///
/// Deadlines are composed on top of this: have a timer thread call `interrupt`.
#[derive(Clone, Default)]
pub struct Interrupt(Arc<Shared>);

#[derive(Default)]
struct Shared {
    // set once, never cleared.
    interrupted: AtomicBool,
    // wakers of operations currently blocked on this interrupt.
    waiters: Mutex<Waiters>,
}

#[derive(Default)]
struct Waiters {
    next_key: u64,
    wakers: SmallVec<[(u64, Waker); 2]>,
}

impl Interrupt {
    /// Construct a new interrupt which has not fired
    pub fn new() -> Self {
        Self::default()
    }

    /// Fire the interrupt, waking all operations blocked on it
    ///
    /// Idempotent.
    pub fn interrupt(&self) {
        if self.0.interrupted.swap(true, SeqCst) {
            return;
        }
        trace!("interrupt fired");
        // take the wakers out before waking, since waking locks the waiter's channel.
        let wakers = {
            let mut waiters = self.0.waiters.lock().unwrap_or_else(PoisonError::into_inner);
            std::mem::take(&mut waiters.wakers)
        };
        for (_, waker) in wakers {
            waker.wake();
        }
    }

    /// Whether the interrupt has fired
    pub fn is_interrupted(&self) -> bool {
        self.0.interrupted.load(SeqCst)
    }

    // register a waker to be woken when the interrupt fires. the waker is deregistered when the
    // returned guard is dropped.
    //
    // the caller must check is_interrupted after registering and before blocking.
    pub(crate) fn register(&self, waker: Waker) -> Registration<'_> {
        let mut waiters = self.0.waiters.lock().unwrap_or_else(PoisonError::into_inner);
        let key = waiters.next_key;
        waiters.next_key += 1;
        waiters.wakers.push((key, waker));
        Registration { interrupt: self, key }
    }
}

impl std::fmt::Debug for Interrupt {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        f.debug_struct("Interrupt")
            .field("interrupted", &self.is_interrupted())
            .finish()
    }
}

// registration of a waker with an interrupt.
pub(crate) struct Registration<'a> {
    interrupt: &'a Interrupt,
    key: u64,
}

impl<'a> Drop for Registration<'a> {
    fn drop(&mut self) {
        let mut waiters = self.interrupt.0.waiters.lock().unwrap_or_else(PoisonError::into_inner);
        // already gone if the interrupt fired
        waiters.wakers.retain(|entry| entry.0 != self.key);
    }
}
