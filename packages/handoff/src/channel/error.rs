// channel error types.

use thiserror::Error;


// ==== base error types ====


/// Error for two overlapping calls to the same side of a channel
///
/// This is a programming error, not a recoverable condition: each side of a channel is meant to
/// be driven by exactly one thread of execution at a time.
#[derive(Error, Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
#[error("concurrent use of channel {side} side")]
pub struct ConcurrentUseError {
    /// Which side was used concurrently
    pub side: Side,
}

/// Error for a producer waiting on a channel which was closed
#[derive(Error, Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
#[error("channel closed")]
pub struct ClosedChannelError;

/// Error for a blocking channel operation being interrupted by an [`Interrupt`][1]
///
/// [1]: crate::Interrupt
#[derive(Error, Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
#[error("interrupted while waiting")]
pub struct InterruptedError;

/// The side of a channel
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub enum Side {
    /// The side which yields output and receives input
    Producer,
    /// The side which advances by supplying input and receives output
    Consumer,
}

impl std::fmt::Display for Side {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            Side::Producer => f.write_str("producer"),
            Side::Consumer => f.write_str("consumer"),
        }
    }
}


// ==== compound error types ====


macro_rules! compound_from {
    ($compound:ident {$(
        $variant:ident($inner:ty),
    )*})=>{$(
        impl From<$inner> for $compound {
            fn from(inner: $inner) -> Self {
                Self::$variant(inner)
            }
        }
    )*};
}

pub(crate) use compound_from;

/// Error for yielding from the producer side of a channel
#[derive(Error, Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub enum YieldError {
    /// A yield was already in progress, or the channel was closed before the yield began
    #[error(transparent)]
    ConcurrentUse(ConcurrentUseError),
    /// The channel was closed while the yield was waiting to be resumed
    #[error(transparent)]
    ClosedChannel(ClosedChannelError),
    /// The producer's interrupt fired while the yield was waiting
    #[error(transparent)]
    Interrupted(InterruptedError),
}

compound_from!(YieldError {
    ConcurrentUse(ConcurrentUseError),
    ClosedChannel(ClosedChannelError),
    Interrupted(InterruptedError),
});

/// Error for advancing the consumer side of a channel
///
/// Closure is not an error for the consumer side: it is reported as `Ok(false)` or `Ok(None)`.
#[derive(Error, Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub enum AdvanceError {
    /// An advance was already in progress
    #[error(transparent)]
    ConcurrentUse(ConcurrentUseError),
    /// The supplied interrupt fired while the advance was waiting
    #[error(transparent)]
    Interrupted(InterruptedError),
}

compound_from!(AdvanceError {
    ConcurrentUse(ConcurrentUseError),
    Interrupted(InterruptedError),
});
