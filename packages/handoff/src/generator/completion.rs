// result handle for a generator's producer task.
//
// a Completion is the shared state between the producer task, which resolves it, and the
// generator, which takes the result or cancels. resolution happens exactly once, and runs the
// attached completion hooks afterwards, outside the lock. the generator installs a closer which
// runs after every hook and closes the channel, so the channel is only ever closed after the
// result is resolved and its hooks have run.

use super::error::*;
use crate::interrupt::Interrupt;
use smallvec::SmallVec;
use std::{
    any::Any,
    future::Future,
    mem::take,
    panic::{catch_unwind, resume_unwind, AssertUnwindSafe},
    pin::Pin,
    sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError},
    task::{Context, Poll, Waker},
    time::{Duration, Instant},
};


// callback run once a completion is resolved.
pub(crate) type Hook = Box<dyn FnOnce() + Send + 'static>;

// shared completion state.
pub(crate) struct Completion<R> {
    lockable: Mutex<Lockable<R>>,
    // notified on resolution and on task exit.
    cond: Condvar,
    // the producer task's interrupt. fired on cancellation, after the hooks run.
    interrupt: Interrupt,
}

struct Lockable<R> {
    outcome: Outcome<R>,
    // hooks not yet run. drained on resolution.
    hooks: SmallVec<[Hook; 1]>,
    // releases the consumer. runs after the hooks.
    closer: Option<Hook>,
    // waker of the task awaiting the ResultFut, if any.
    waker: Option<Waker>,
    // whether the producer task has finished running, or was dropped without running.
    exited: bool,
}

enum Outcome<R> {
    Pending,
    // result is None once taken.
    Resolved {
        state: ResultState,
        result: Option<Result<R, GeneratorError>>,
    },
}

/// Resolution state of a generator's result
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub enum ResultState {
    /// The producer has not yet completed, and the generator was not closed
    Pending,
    /// The producer returned successfully
    Succeeded,
    /// The producer returned an error or panicked
    Failed,
    /// The generator was closed before the producer completed
    Cancelled,
}

// timeout for blocking on a result.
#[derive(Copy, Clone)]
pub(crate) enum Timeout {
    // never time out.
    Never,
    // time out at the given deadline.
    At(Instant),
    // time out if the result is not already resolved.
    NonBlocking,
}

impl<R> Completion<R> {
    // construct pending.
    pub(crate) fn new(interrupt: Interrupt) -> Arc<Self> {
        Arc::new(Completion {
            lockable: Mutex::new(Lockable {
                outcome: Outcome::Pending,
                hooks: SmallVec::new(),
                closer: None,
                waker: None,
                exited: false,
            }),
            cond: Condvar::new(),
            interrupt,
        })
    }

    // lock the completion. hooks never run under the lock.
    fn lock(&self) -> MutexGuard<'_, Lockable<R>> {
        self.lockable.lock().unwrap_or_else(PoisonError::into_inner)
    }

    // current resolution state.
    pub(crate) fn state(&self) -> ResultState {
        match &self.lock().outcome {
            Outcome::Pending => ResultState::Pending,
            &Outcome::Resolved { state, .. } => state,
        }
    }

    // attach a hook to run once resolved. runs it immediately if already resolved.
    pub(crate) fn on_complete(&self, hook: Hook) {
        {
            let mut lock = self.lock();
            if let Outcome::Pending = lock.outcome {
                lock.hooks.push(hook);
                return;
            }
        }
        hook();
    }

    // install the closer, which runs once resolved, after all hooks. runs it immediately if
    // already resolved.
    pub(crate) fn set_closer(&self, closer: Hook) {
        {
            let mut lock = self.lock();
            if let Outcome::Pending = lock.outcome {
                lock.closer = Some(closer);
                return;
            }
        }
        closer();
    }

    // resolve with the given result, unless already resolved. returns whether this resolved it.
    //
    // a panicking hook is resumed once everything else has run.
    pub(crate) fn complete(&self, result: Result<R, GeneratorError>) -> bool {
        let (resolved, panic) = self.resolve(result);
        if let Some(panic) = panic {
            resume_unwind(panic);
        }
        resolved
    }

    // resolve as cancelled, unless already resolved, then fire the producer task's interrupt.
    // returns whether this resolved it.
    pub(crate) fn cancel(&self) -> bool {
        let (cancelled, panic) = self.resolve(Err(CancelledError.into()));
        if cancelled {
            self.interrupt.interrupt();
        }
        if let Some(panic) = panic {
            resume_unwind(panic);
        }
        cancelled
    }

    // resolve unless already resolved, then run the hooks, the closer, and the waker. a panic in
    // one hook does not stop the rest; the first one is returned.
    fn resolve(
        &self,
        result: Result<R, GeneratorError>,
    ) -> (bool, Option<Box<dyn Any + Send>>) {
        let state = match &result {
            Ok(_) => ResultState::Succeeded,
            Err(GeneratorError::Failed(_)) => ResultState::Failed,
            Err(GeneratorError::Cancelled(_)) => ResultState::Cancelled,
        };
        let (hooks, closer, waker) = {
            let mut lock = self.lock();
            if let Outcome::Resolved { .. } = lock.outcome {
                trace!(?state, "completion already resolved, discarding outcome");
                return (false, None);
            }
            lock.outcome = Outcome::Resolved { state, result: Some(result) };
            self.cond.notify_all();
            (take(&mut lock.hooks), lock.closer.take(), lock.waker.take())
        };
        debug!(?state, "generator result resolved");
        let mut panic = None;
        for hook in hooks {
            if let Err(payload) = catch_unwind(AssertUnwindSafe(hook)) {
                warn!("completion hook panicked");
                panic.get_or_insert(payload);
            }
        }
        if let Some(closer) = closer {
            closer();
        }
        if let Some(waker) = waker {
            waker.wake();
        }
        (true, panic)
    }

    // mark the producer task as exited.
    pub(crate) fn exit(&self) {
        let mut lock = self.lock();
        lock.exited = true;
        self.cond.notify_all();
    }

    // block until the producer task has exited.
    pub(crate) fn wait_exited(&self) {
        let mut lock = self.lock();
        while !lock.exited {
            lock = self.cond.wait(lock).unwrap_or_else(PoisonError::into_inner);
        }
    }

    // take the result, blocking until resolved or timed out. returns None on timeout.
    //
    // panics if already taken.
    pub(crate) fn take(&self, timeout: Timeout) -> Option<Result<R, GeneratorError>> {
        let mut lock = self.lock();
        while let Outcome::Pending = lock.outcome {
            match timeout {
                Timeout::Never => {
                    lock = self.cond.wait(lock).unwrap_or_else(PoisonError::into_inner);
                }
                Timeout::At(deadline) => {
                    let duration = deadline.checked_duration_since(Instant::now())?;
                    lock = self.cond.wait_timeout(lock, duration)
                        .unwrap_or_else(PoisonError::into_inner)
                        .0;
                }
                Timeout::NonBlocking => return None,
            }
        }
        Some(take_resolved(&mut lock.outcome))
    }

    // take the result if resolved, otherwise install the context's waker.
    //
    // panics if already taken.
    fn poll_take(&self, cx: &mut Context) -> Poll<Result<R, GeneratorError>> {
        let mut lock = self.lock();
        if let Outcome::Pending = lock.outcome {
            if !lock.waker.as_ref().is_some_and(|waker| waker.will_wake(cx.waker())) {
                lock.waker = Some(cx.waker().clone());
            }
            return Poll::Pending;
        }
        Poll::Ready(take_resolved(&mut lock.outcome))
    }
}

// take the result out of a resolved outcome.
fn take_resolved<R>(outcome: &mut Outcome<R>) -> Result<R, GeneratorError> {
    match outcome {
        Outcome::Resolved { result, .. } => result
            .take()
            .expect("generator result taken twice (internal bug)"),
        Outcome::Pending => unreachable!("outcome not resolved (internal bug)"),
    }
}


// guard owned by a producer task. if the task is dropped without resolving the completion, for
// example because the execution context was shut down before running it, resolves it as
// cancelled so that the consumer is released. marks the task as exited either way.
pub(crate) struct ExitGuard<R>(Arc<Completion<R>>);

impl<R> ExitGuard<R> {
    pub(crate) fn new(completion: Arc<Completion<R>>) -> Self {
        ExitGuard(completion)
    }

    pub(crate) fn completion(&self) -> &Completion<R> {
        &self.0
    }
}

impl<R> Drop for ExitGuard<R> {
    fn drop(&mut self) {
        if self.0.cancel() {
            debug!("producer task dropped without completing");
        }
        self.0.exit();
    }
}


/// Future for a generator's result
///
/// Resolves once the producer function returns, fails, or panics, or the generator is closed
/// before that. If [`Generator::advance`][1] has returned `false`, this is already resolved, and
/// [`try_now`](Self::try_now) is guaranteed to succeed.
///
/// Besides being awaitable, it provides the API for blocking on the result or trying to take it
/// immediately. The result can be taken only once; afterwards the future is terminated.
///
/// [1]: crate::Generator::advance
pub struct ResultFut<R> {
    completion: Arc<Completion<R>>,
    terminated: bool,
}

impl<R> ResultFut<R> {
    pub(crate) fn new(completion: Arc<Completion<R>>) -> Self {
        ResultFut { completion, terminated: false }
    }

    // construct already terminated, sharing the completion for queries.
    pub(crate) fn terminated(completion: Arc<Completion<R>>) -> Self {
        ResultFut { completion, terminated: true }
    }

    // block until the producer task has exited.
    pub(crate) fn wait_exited(&self) {
        self.completion.wait_exited();
    }

    fn take(&mut self, timeout: Timeout) -> Option<Result<R, GeneratorError>> {
        let result = self.completion.take(timeout);
        self.terminated |= result.is_some();
        result
    }

    /// Current resolution state
    ///
    /// Remains accurate after the result has been taken.
    pub fn state(&self) -> ResultState {
        self.completion.state()
    }

    /// Whether the result has resolved, for any reason
    pub fn is_done(&self) -> bool {
        self.state() != ResultState::Pending
    }

    /// Whether the result resolved as cancelled
    pub fn is_cancelled(&self) -> bool {
        self.state() == ResultState::Cancelled
    }

    /// Resolve as cancelled if not already resolved, returning whether this did so
    ///
    /// On success, closes the generator's channel (releasing a blocked advance) and fires the
    /// producer's [`Interrupt`](crate::Interrupt) (releasing a blocked yield). Does nothing to an
    /// already resolved result.
    pub fn cancel(&self) -> bool {
        self.completion.cancel()
    }

    /// Attach a callback to run once the result resolves
    ///
    /// Runs on whichever thread resolves the result, after resolution, or immediately on this
    /// thread if already resolved. Callbacks run before the generator's channel closes, so they
    /// have all finished by the time [`Generator::advance`][1] returns `false`.
    ///
    /// If a callback panics, the remaining callbacks still run and waiters are still released,
    /// and the panic then resumes on the resolving thread.
    ///
    /// [1]: crate::Generator::advance
    pub fn on_complete<F>(&self, f: F)
    where
        F: FnOnce() + Send + 'static,
    {
        self.completion.on_complete(Box::new(f));
    }

    /// Try to take the result immediately without blocking
    ///
    /// If this returns anything other than [`WouldBlockError`], that counts as this future
    /// resolving. Panics if this future has already resolved.
    pub fn try_now(&mut self) -> Result<R, TryResultError> {
        assert!(!self.terminated, "ResultFut.try_now called after terminated");
        match self.take(Timeout::NonBlocking) {
            Some(result) => result.map_err(TryResultError::from),
            None => Err(WouldBlockError.into()),
        }
    }

    /// Block until the result resolves
    ///
    /// Panics if this future has already resolved.
    pub fn block(&mut self) -> Result<R, GeneratorError> {
        assert!(!self.terminated, "ResultFut.block called after terminated");
        self.take(Timeout::Never).expect("take timed out with Timeout::Never")
    }

    /// Block until the result resolves or a timeout elapses
    ///
    /// If this returns anything other than [`WouldBlockError`], that counts as this future
    /// resolving. Panics if this future has already resolved.
    pub fn block_timeout(&mut self, timeout: Duration) -> Result<R, TryResultError> {
        assert!(!self.terminated, "ResultFut.block_timeout called after terminated");
        match Instant::now().checked_add(timeout) {
            Some(deadline) => self.block_deadline(deadline),
            // too far in the future to represent
            None => Ok(self.block()?),
        }
    }

    /// Block until the result resolves or the deadline is reached
    ///
    /// If this returns anything other than [`WouldBlockError`], that counts as this future
    /// resolving. Panics if this future has already resolved.
    pub fn block_deadline(&mut self, deadline: Instant) -> Result<R, TryResultError> {
        assert!(!self.terminated, "ResultFut.block_deadline called after terminated");
        match self.take(Timeout::At(deadline)) {
            Some(result) => result.map_err(TryResultError::from),
            None => Err(WouldBlockError.into()),
        }
    }

    /// Whether the result has already been taken
    pub fn is_terminated(&self) -> bool {
        self.terminated
    }
}

impl<R> Future for ResultFut<R> {
    type Output = Result<R, GeneratorError>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context) -> Poll<Self::Output> {
        let this = self.get_mut();
        // for implementation of FusedFuture
        if this.terminated {
            return Poll::Pending;
        }
        let poll = this.completion.poll_take(cx);
        this.terminated = poll.is_ready();
        poll
    }
}

#[cfg(feature = "futures")]
impl<R> futures::future::FusedFuture for ResultFut<R> {
    fn is_terminated(&self) -> bool {
        Self::is_terminated(self)
    }
}

impl<R> std::fmt::Debug for ResultFut<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        f.debug_struct("ResultFut")
            .field("state", &self.state())
            .field("terminated", &self.terminated)
            .finish()
    }
}
