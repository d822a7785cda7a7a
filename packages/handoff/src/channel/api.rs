// exposed API of channels

use super::{
    error::*,
    core,
};
use crate::interrupt::Interrupt;


/// Create a rendezvous channel
///
/// The two halves exchange control and data in strict alternation: the producer [yields][1] an
/// output and blocks until the consumer [advances][2] with an input, which in turn blocks until
/// the producer yields again. At most one of the two sides is running at any instant.
///
/// The producer's first yield is a handshake: the consumer's first advance resumes it, but the
/// handshake's output (if any) is never delivered, and the consumer's first input is only seen by
/// the handshake. See [`Producer::handshake`].
///
/// Dropping either half closes the channel.
///
/// [1]: Producer::yield_
/// [2]: Consumer::advance
pub fn channel<In, Out>() -> (Producer<In, Out>, Consumer<In, Out>)
where
    In: Send + 'static,
    Out: Send + 'static,
{
    let channel_1 = core::Channel::new();
    let channel_2 = channel_1.clone();
    (Producer::new(channel_1, Interrupt::new()), Consumer(channel_2))
}


/// Producer half of a rendezvous channel
///
/// The producer may only yield. Its blocking operations observe the producer's own
/// [`Interrupt`], which is fired when a [`Generator`][1] running it is closed.
///
/// [1]: crate::Generator
pub struct Producer<In, Out> {
    channel: core::Channel<In, Out>,
    interrupt: Interrupt,
}

impl<In, Out> Producer<In, Out>
where
    In: Send + 'static,
    Out: Send + 'static,
{
    pub(crate) fn new(channel: core::Channel<In, Out>, interrupt: Interrupt) -> Self {
        Producer { channel, interrupt }
    }

    /// Yield an output to the consumer and block until resumed with the next input
    ///
    /// Fails with [`ClosedChannelError`] if the channel closes while waiting, which the producer
    /// should treat as a signal to stop. Fails with [`ConcurrentUseError`] if another yield is
    /// already in progress or the channel was already closed when called.
    pub fn yield_(&self, out: Out) -> Result<In, YieldError> {
        self.channel.yield_(Some(out), Some(&self.interrupt))
    }

    /// Perform the initial handshake yield, which carries no output
    ///
    /// Blocks until the consumer first advances, and returns the consumer's first input. This is
    /// only valid as the very first yield; afterwards it fails with [`ConcurrentUseError`].
    /// [`Generator`](crate::Generator) performs the handshake itself before running the producer
    /// function.
    pub fn handshake(&self) -> Result<In, YieldError> {
        self.channel.yield_(None, Some(&self.interrupt))
    }

    /// The interrupt observed by this producer's blocking operations
    ///
    /// Pass it on to nested blocking operations (such as advancing another generator) so that
    /// they are released when this producer is cancelled.
    pub fn interrupt(&self) -> &Interrupt {
        &self.interrupt
    }
}

impl<In, Out> Producer<In, Out> {
    /// Close the channel, waking the consumer if it is waiting
    ///
    /// Idempotent.
    pub fn close(&self) {
        self.channel.close();
    }

    /// Whether the channel has been closed
    pub fn is_closed(&self) -> bool {
        self.channel.state() == core::State::Done
    }
}

impl<In, Out> Drop for Producer<In, Out> {
    fn drop(&mut self) {
        // a consumer waiting on a producer which will never yield again would hang
        self.channel.close();
    }
}


/// Consumer half of a rendezvous channel
pub struct Consumer<In, Out>(core::Channel<In, Out>);

impl<In, Out> Consumer<In, Out>
where
    In: Send + 'static,
    Out: Send + 'static,
{
    pub(crate) fn new(channel: core::Channel<In, Out>) -> Self {
        Consumer(channel)
    }

    /// Pass an input to the waiting producer, and block until it yields again
    ///
    /// Returns `Ok(true)` after calling `f` with the next yielded output. `f` is called after the
    /// channel has been unlocked. Returns `Ok(false)` if the channel is or becomes closed; this is
    /// idempotent, and never an error.
    ///
    /// If the producer has not yet made its first yield, this first waits for it.
    pub fn advance<F>(&self, input: In, f: F) -> Result<bool, AdvanceError>
    where
        F: FnOnce(Out),
    {
        Ok(self.0.advance(input, None)?.map(f).is_some())
    }

    /// Version of [`advance`](Self::advance) that fails with [`InterruptedError`] if the given
    /// interrupt fires while waiting
    ///
    /// If the interrupt fires after the input was handed to the producer, the channel is closed,
    /// since the exchange can no longer complete in order.
    pub fn advance_interruptible<F>(
        &self,
        input: In,
        interrupt: &Interrupt,
        f: F,
    ) -> Result<bool, AdvanceError>
    where
        F: FnOnce(Out),
    {
        Ok(self.0.advance(input, Some(interrupt))?.map(f).is_some())
    }

    /// Version of [`advance`](Self::advance) that returns the next yielded output, or `None` if
    /// the channel is closed
    pub fn next(&self, input: In) -> Result<Option<Out>, AdvanceError> {
        self.0.advance(input, None)
    }

    /// Version of [`next`](Self::next) that fails with [`InterruptedError`] if the given
    /// interrupt fires while waiting
    pub fn next_interruptible(
        &self,
        input: In,
        interrupt: &Interrupt,
    ) -> Result<Option<Out>, AdvanceError> {
        self.0.advance(input, Some(interrupt))
    }
}

impl<In, Out> Consumer<In, Out> {
    /// Close the channel, waking the producer if it is waiting
    ///
    /// Idempotent.
    pub fn close(&self) {
        self.0.close();
    }

    /// Whether the channel has been closed
    pub fn is_closed(&self) -> bool {
        self.0.state() == core::State::Done
    }
}

impl<In, Out> Drop for Consumer<In, Out> {
    fn drop(&mut self) {
        self.0.close();
    }
}


// ==== tests ====
