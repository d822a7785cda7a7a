// implementation of the rendezvous channel.
//
// the architecture is as such:
//
// producer and consumer handles wrap around Arc<shared state>
//                                                 |
//          /--------------------------------------/
//          v
//       shared state
//          |
//          |------ a mutex around the lockable state, which is:
//          |
//          |       - a four-state machine: New -> Yielding <-> Running -> Done
//          |       - a single slot holding the one value in flight, either the producer's
//          |         output or the consumer's input, tagged as to which
//          |
//          \------ a condvar, notified on every state change by both sides
//
// blocking waits may additionally register a waker with an Interrupt, which wakes the condvar
// when the interrupt fires.
//
// the organization of these modules is as such:
//
//      core: the state machine and slot handoff. presents both sides' operations on one type,
//       ^    and leaves keeping them apart to the caller.
//       |
//      api: the producer and consumer handles, which each expose only their side's operations.
//           the crate re-exports this API publically.
//
// there is also the error module, which contains the relevant error types, which is also
// re-exported publically.

pub(crate) mod error;
pub(crate) mod api;
pub(crate) mod core;
