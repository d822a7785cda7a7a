// generator error types.

use crate::channel::error::{compound_from, AdvanceError, YieldError};
use thiserror::Error;


/// Error for a generator's result when the generator was closed before its producer completed
#[derive(Error, Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
#[error("generator cancelled")]
pub struct CancelledError;

/// Error for attempting to take a generator's result with no or limited blocking, and the result
/// not being resolved immediately or by the specified deadline
#[derive(Error, Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
#[error("would block")]
pub struct WouldBlockError;

/// Unsuccessful outcome of a generator
#[derive(Error, Debug)]
pub enum GeneratorError {
    /// The producer function returned an error or panicked
    #[error("producer failed: {0:#}")]
    Failed(anyhow::Error),
    /// The generator was closed before the producer function completed
    #[error(transparent)]
    Cancelled(CancelledError),
}

compound_from!(GeneratorError {
    Failed(anyhow::Error),
    Cancelled(CancelledError),
});

impl GeneratorError {
    /// Whether this is the cancelled error
    pub fn is_cancelled(&self) -> bool {
        matches!(self, GeneratorError::Cancelled(_))
    }

    /// If this is a producer failure, the error the producer failed with
    pub fn failure(&self) -> Option<&anyhow::Error> {
        match self {
            GeneratorError::Failed(e) => Some(e),
            GeneratorError::Cancelled(_) => None,
        }
    }
}

/// Error for taking a generator's result with no or limited blocking
#[derive(Error, Debug)]
pub enum TryResultError {
    /// The generator resolved unsuccessfully
    #[error(transparent)]
    Generator(GeneratorError),
    /// The result could not be resolved immediately or by the specified deadline
    #[error(transparent)]
    WouldBlock(WouldBlockError),
}

compound_from!(TryResultError {
    Generator(GeneratorError),
    WouldBlock(WouldBlockError),
});

/// Error for [`yield_all`](crate::yield_all)
#[derive(Error, Debug)]
pub enum YieldAllError {
    /// Yielding an inner value to the outer consumer failed
    #[error(transparent)]
    Yield(YieldError),
    /// Advancing the inner generator failed
    #[error(transparent)]
    Advance(AdvanceError),
    /// The inner generator resolved unsuccessfully
    #[error(transparent)]
    Inner(GeneratorError),
}

compound_from!(YieldAllError {
    Yield(YieldError),
    Advance(AdvanceError),
    Inner(GeneratorError),
});
