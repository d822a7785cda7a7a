// forwarding one generator's output through another producer's yield point.

use super::{
    error::YieldAllError,
    exec::ThreadPerTask,
    Generator,
};
use crate::channel::api::Producer;


/// Yield every value of a new inner generator through the given producer, and return the inner
/// generator's result
///
/// The inner producer function runs on its own thread. This is a one-way forwarding: the inputs
/// the outer consumer passes in are discarded, and the inner generator only receives `()`.
///
/// The inner generator has been closed, and its thread has finished running, by the time this
/// returns, including when yielding to the outer consumer fails (for example because the outer
/// generator was closed).
pub fn yield_all<In, Out, R, F>(producer: &Producer<In, Out>, inner: F) -> Result<R, YieldAllError>
where
    In: Send + 'static,
    Out: Send + 'static,
    R: Send + 'static,
    F: FnOnce(&Producer<(), Out>) -> anyhow::Result<R> + Send + 'static,
{
    let generator = Generator::new(inner, &ThreadPerTask::new());
    forward(producer, generator, true)
}

/// Yield every value of an existing generator through the given producer, and return the
/// generator's result
///
/// Like [`yield_all`], except that the inner generator may run on any execution context. The
/// inner generator is closed by the time this returns, but its execution unit is not waited for.
pub fn yield_all_in<In, Out, R>(
    producer: &Producer<In, Out>,
    generator: Generator<(), Out, R>,
) -> Result<R, YieldAllError>
where
    In: Send + 'static,
    Out: Send + 'static,
    R: Send + 'static,
{
    forward(producer, generator, false)
}

fn forward<In, Out, R>(
    producer: &Producer<In, Out>,
    generator: Generator<(), Out, R>,
    wait_exited: bool,
) -> Result<R, YieldAllError>
where
    In: Send + 'static,
    Out: Send + 'static,
    R: Send + 'static,
{
    let drained = drain(producer, &generator);
    let mut result = generator.into_result();
    if wait_exited {
        result.wait_exited();
    }
    if let Err(e) = drained {
        debug!(%e, "yield_all aborted");
        return Err(e);
    }
    Ok(result.block()?)
}

// advance the inner generator to the end, yielding each of its values to the outer consumer.
fn drain<In, Out, R>(
    producer: &Producer<In, Out>,
    generator: &Generator<(), Out, R>,
) -> Result<(), YieldAllError>
where
    In: Send + 'static,
    Out: Send + 'static,
    R: Send + 'static,
{
    // the inner advance observes the outer producer's interrupt, so that closing the outer
    // generator releases it.
    while let Some(out) = generator.next_interruptible((), producer.interrupt())? {
        producer.yield_(out)?;
    }
    Ok(())
}
