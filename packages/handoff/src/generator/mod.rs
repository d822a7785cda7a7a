// generators: a rendezvous channel coupled to a producer task and its result.
//
// the producer task performs the channel handshake before running any producer code, so the
// producer function only starts on the first advance. when the task resolves the completion
// (returning, failing, panicking, or being cancelled), a completion hook closes the channel.
// because the close strictly follows the resolution, an advance returning false implies the
// result is already available.

pub(crate) mod error;
pub(crate) mod completion;
pub mod exec;
mod yield_all;

pub use self::yield_all::{yield_all, yield_all_in};

use self::{
    completion::{Completion, ExitGuard, ResultFut, ResultState},
    error::*,
    exec::Execute,
};
use crate::{
    channel::{
        api::{Consumer, Producer},
        core,
        error::AdvanceError,
    },
    interrupt::Interrupt,
};
use std::{
    any::Any,
    panic::{catch_unwind, AssertUnwindSafe},
    sync::Arc,
};


/// Handle to a producer function running on its own execution context, which can be resumed
/// at its yield points
///
/// The producer function receives a [`Producer`] and may [yield][1] any number of times before
/// returning. It does not start running until the first call to [`advance`](Self::advance),
/// whose input is discarded. Each subsequent advance passes its input to the suspended yield,
/// and blocks until the producer yields again or completes. The producer and the consumer never
/// run at the same time.
///
/// The producer's eventual outcome is available through [`result`](Self::result). Closing (or
/// dropping) the generator cancels the producer if it has not completed.
///
/// [1]: Producer::yield_
pub struct Generator<In, Out, R> {
    consumer: Consumer<In, Out>,
    completion: Arc<Completion<R>>,
    result: ResultFut<R>,
}

impl<In, Out, R> Generator<In, Out, R>
where
    In: Send + 'static,
    Out: Send + 'static,
    R: Send + 'static,
{
    /// Create a generator, submitting its producer function to the given execution context
    pub fn new<F, E>(producer: F, exec: &E) -> Self
    where
        F: FnOnce(&Producer<In, Out>) -> anyhow::Result<R> + Send + 'static,
        E: Execute + ?Sized,
    {
        let channel = core::Channel::new();
        let interrupt = Interrupt::new();
        let completion = Completion::new(interrupt.clone());

        // close the channel only once the result is resolved and its hooks have run
        let closer = channel.clone();
        completion.set_closer(Box::new(move || closer.close()));

        let guard = ExitGuard::new(Arc::clone(&completion));
        let producer_channel = channel.clone();
        exec.execute(Box::new(move || {
            let guard = guard;
            if guard.completion().state() != ResultState::Pending {
                debug!("generator closed before its producer started");
                return;
            }
            let handle = Producer::new(producer_channel, interrupt);
            let result = catch_unwind(AssertUnwindSafe(|| {
                handle.handshake()?;
                trace!("producer started");
                producer(&handle)
            }));
            let result = match result {
                Ok(Ok(r)) => Ok(r),
                Ok(Err(e)) => Err(GeneratorError::Failed(e)),
                Err(panic) => {
                    let msg = panic_message(&*panic);
                    warn!(%msg, "producer panicked");
                    Err(GeneratorError::Failed(anyhow::anyhow!("producer panicked: {}", msg)))
                }
            };
            guard.completion().complete(result);
            // dropping the handle closes the channel, which must not precede resolution
            drop(handle);
        }));

        Generator {
            consumer: Consumer::new(channel),
            result: ResultFut::new(Arc::clone(&completion)),
            completion,
        }
    }

    /// Resume the producer with the given input, and block until it yields again or completes
    ///
    /// Returns `Ok(true)` after calling `f` with the next yielded value (outside of any lock).
    /// Returns `Ok(false)` once the producer has completed for any reason, at which point
    /// [`result`](Self::result) is guaranteed to be resolved. Repeated calls after completion
    /// keep returning `Ok(false)`.
    ///
    /// The first call starts the producer, and its input is discarded.
    pub fn advance<F>(&self, input: In, f: F) -> Result<bool, AdvanceError>
    where
        F: FnOnce(Out),
    {
        self.consumer.advance(input, f)
    }

    /// Version of [`advance`](Self::advance) that fails with
    /// [`InterruptedError`](crate::error::InterruptedError) if the given interrupt fires while
    /// waiting
    ///
    /// Being interrupted closes the generator, as by [`close`](Self::close).
    pub fn advance_interruptible<F>(
        &self,
        input: In,
        interrupt: &Interrupt,
        f: F,
    ) -> Result<bool, AdvanceError>
    where
        F: FnOnce(Out),
    {
        self.close_on_interrupt(self.consumer.advance_interruptible(input, interrupt, f))
    }

    /// Version of [`advance`](Self::advance) that returns the next yielded value, or `None` once
    /// the producer has completed
    pub fn next(&self, input: In) -> Result<Option<Out>, AdvanceError> {
        self.consumer.next(input)
    }

    /// Version of [`next`](Self::next) that fails with
    /// [`InterruptedError`](crate::error::InterruptedError) if the given interrupt fires while
    /// waiting
    ///
    /// Being interrupted closes the generator, as by [`close`](Self::close).
    pub fn next_interruptible(
        &self,
        input: In,
        interrupt: &Interrupt,
    ) -> Result<Option<Out>, AdvanceError> {
        self.close_on_interrupt(self.consumer.next_interruptible(input, interrupt))
    }

    // an interrupted exchange cannot resume in order, so it ends the generator. cancelling also
    // keeps the result resolved whenever the channel is closed.
    fn close_on_interrupt<T>(&self, result: Result<T, AdvanceError>) -> Result<T, AdvanceError> {
        if let Err(AdvanceError::Interrupted(_)) = result {
            self.close();
        }
        result
    }
}

impl<In, Out, R> Generator<In, Out, R> {
    /// The producer function's eventual outcome
    pub fn result(&mut self) -> &mut ResultFut<R> {
        &mut self.result
    }

    /// Close the generator and take its result handle
    ///
    /// If the producer has already completed, its outcome is kept. Otherwise the result resolves
    /// as cancelled.
    pub fn into_result(mut self) -> ResultFut<R> {
        self.close();
        let terminated = ResultFut::terminated(Arc::clone(&self.completion));
        std::mem::replace(&mut self.result, terminated)
    }

    /// Close the generator, cancelling the producer if it has not yet completed
    ///
    /// Cancelling resolves the result as cancelled and closes the channel, so that a blocked or
    /// later advance returns `false` and a blocked yield fails with
    /// [`ClosedChannelError`](crate::error::ClosedChannelError). It also fires the producer's
    /// [`Interrupt`], releasing other blocking operations that observe it. The producer's
    /// execution unit is not forcibly stopped: producer code should propagate these errors.
    ///
    /// If the producer has already completed, this does nothing. Idempotent.
    pub fn close(&self) {
        if self.completion.cancel() {
            debug!("generator cancelled");
        }
    }

    /// Whether the generator is closed, meaning no further values will be yielded
    pub fn is_closed(&self) -> bool {
        self.consumer.is_closed()
    }
}

impl<In, Out, R> Drop for Generator<In, Out, R> {
    fn drop(&mut self) {
        self.close();
    }
}

impl<In, Out, R> std::fmt::Debug for Generator<In, Out, R> {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        f.debug_struct("Generator")
            .field("closed", &self.is_closed())
            .field("result", &self.result)
            .finish()
    }
}

// best-effort message of a panic payload.
fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&'static str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_owned()
    }
}


#[cfg(test)]
mod tests;
