//! Generators whose bodies run on their own thread or task, resumed in strict alternation with
//! the caller.
//!
//! A [`Generator`] runs a producer function on an [execution context](exec::Execute). The
//! producer [yields][1] values to the caller and receives inputs back; the caller drives it with
//! [`advance`](Generator::advance). Although the two sides run on independently scheduled
//! execution units, a rendezvous [channel] ensures only one of them executes at a time.
//!
//! ```
//! use handoff::{Generator, exec::ThreadPerTask};
//!
//! let mut gen = Generator::<i32, i32, i32>::new(|chan| {
//!     let mut total = 0;
//!     for i in 0..3 {
//!         total += chan.yield_(i)?;
//!     }
//!     Ok(total)
//! }, &ThreadPerTask::new());
//!
//! let mut seen = Vec::new();
//! while gen.advance(10, |i| seen.push(i)).unwrap() {}
//! assert_eq!(seen, [0, 1, 2]);
//! assert_eq!(gen.result().try_now().unwrap(), 30);
//! ```
//!
//! [1]: Producer::yield_

#[macro_use]
extern crate tracing;

mod channel;
mod generator;
mod interrupt;

pub use crate::{
    channel::api::*,
    generator::{
        exec,
        yield_all,
        yield_all_in,
        Generator,
    },
    interrupt::Interrupt,
};

/// Error types
pub mod error {
    pub use crate::channel::error::*;
    pub use crate::generator::error::*;
}

/// Future types
pub mod future {
    pub use crate::generator::completion::{ResultFut, ResultState};
}
