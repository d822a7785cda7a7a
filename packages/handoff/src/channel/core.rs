// minimal API for the rendezvous channel. the exposed API is a capability-restricted wrapper
// around this.

use super::error::*;
use crate::interrupt::Interrupt;
use std::{
    mem::replace,
    sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError},
    task::{Wake, Waker},
};


// handle to a channel.
pub(crate) struct Channel<In, Out>(Arc<Shared<In, Out>>);

// channel shared state.
struct Shared<In, Out> {
    // mutex around lockable state. never held across caller code.
    lockable: Mutex<Lockable<In, Out>>,
    // notified on every state change, by both sides.
    cond: Condvar,
}

// channel lockable state.
struct Lockable<In, Out> {
    state: State,
    // written immediately before a state change that wakes the other side, taken immediately
    // after waking.
    slot: Slot<In, Out>,
    // whether the consumer has advanced at least once.
    advanced: bool,
}

// channel state machine.
//
// New -> Yielding <-> Running -> Done, and any state -> Done on close. Done is absorbing.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub(crate) enum State {
    // the producer has not yet yielded for the first time.
    New,
    // the producer is executing, the consumer is waiting for it to yield.
    Running,
    // the producer is waiting for the consumer to advance.
    Yielding,
    // closed. no further values are exchanged.
    Done,
}

// the single in-flight value.
enum Slot<In, Out> {
    Empty,
    Input(In),
    Output(Out),
}

impl<In, Out> Slot<In, Out> {
    fn take(&mut self) -> Self {
        replace(self, Slot::Empty)
    }
}

impl<In, Out> Channel<In, Out> {
    // construct a channel in the New state.
    pub(crate) fn new() -> Self {
        Channel(Arc::new(Shared {
            lockable: Mutex::new(Lockable {
                state: State::New,
                slot: Slot::Empty,
                advanced: false,
            }),
            cond: Condvar::new(),
        }))
    }

    // clone another handle to the channel.
    pub(crate) fn clone(&self) -> Self {
        Channel(Arc::clone(&self.0))
    }

    // lock the channel. no caller code ever runs under the lock, so poisoning can only come from
    // a panic in a value's destructor, after which the state machine is still consistent.
    fn lock(&self) -> MutexGuard<'_, Lockable<In, Out>> {
        self.0.lockable.lock().unwrap_or_else(PoisonError::into_inner)
    }

    // read the current state.
    pub(crate) fn state(&self) -> State {
        self.lock().state
    }

    // set the state to Done and wake all waiters, regardless of current state. idempotent.
    pub(crate) fn close(&self) {
        let mut lock = self.lock();
        let stale = self.close_locked(&mut lock);
        drop(lock);
        // drop any leftover value outside the lock
        drop(stale);
    }

    // close while already holding the lock. returns the leftover slot value, which the caller
    // drops after unlocking.
    fn close_locked(&self, lock: &mut Lockable<In, Out>) -> Slot<In, Out> {
        if lock.state == State::Done {
            return Slot::Empty;
        }
        lock.state = State::Done;
        self.0.cond.notify_all();
        debug!("channel closed");
        lock.slot.take()
    }
}

impl<In, Out> Channel<In, Out>
where
    In: Send + 'static,
    Out: Send + 'static,
{
    // block while the state equals `blocked`, or until the interrupt fires.
    //
    // an interrupt while blocked in Yielding or Running closes the channel: this side has
    // already handed off its value, and the exchange cannot be resumed in order.
    fn wait_while<'a>(
        &'a self,
        mut lock: MutexGuard<'a, Lockable<In, Out>>,
        blocked: State,
        interrupt: Option<&Interrupt>,
    ) -> Result<MutexGuard<'a, Lockable<In, Out>>, InterruptedError> {
        if lock.state != blocked {
            return Ok(lock);
        }
        // registered while holding the lock, so firing the interrupt cannot slip in between the
        // check below and the wait.
        let _registration = interrupt
            .map(|interrupt| interrupt.register(Waker::from(Arc::clone(&self.0))));
        while lock.state == blocked {
            if interrupt.is_some_and(Interrupt::is_interrupted) {
                if blocked != State::New {
                    let stale = self.close_locked(&mut lock);
                    drop(lock);
                    drop(stale);
                }
                return Err(InterruptedError);
            }
            lock = self.0.cond.wait(lock).unwrap_or_else(PoisonError::into_inner);
        }
        Ok(lock)
    }

    // producer side: hand `out` to the consumer and block until resumed with an input.
    //
    // `out` is None only for the handshake, which must be the first yield. a value yielded from
    // the New state is never observed by the consumer: its first input replaces it.
    pub(crate) fn yield_(
        &self,
        out: Option<Out>,
        interrupt: Option<&Interrupt>,
    ) -> Result<In, YieldError> {
        if interrupt.is_some_and(Interrupt::is_interrupted) {
            return Err(InterruptedError.into());
        }
        let mut lock = self.lock();
        match lock.state {
            State::New => (),
            State::Running if out.is_some() => (),
            state => {
                warn!(?state, "producer side used concurrently or after close");
                return Err(ConcurrentUseError { side: Side::Producer }.into());
            }
        }

        lock.slot = match out {
            Some(out) => Slot::Output(out),
            None => Slot::Empty,
        };
        lock.state = State::Yielding;
        self.0.cond.notify_all();
        trace!("producer yielded");

        let mut lock = self.wait_while(lock, State::Yielding, interrupt)?;
        if lock.state == State::Done {
            return Err(ClosedChannelError.into());
        }
        debug_assert_eq!(lock.state, State::Running);
        match lock.slot.take() {
            Slot::Input(input) => Ok(input),
            _ => unreachable!("producer resumed without input (internal bug)"),
        }
    }

    // consumer side: hand `input` to the waiting producer and block until it yields again.
    //
    // returns None if the channel is or becomes Done.
    pub(crate) fn advance(
        &self,
        input: In,
        interrupt: Option<&Interrupt>,
    ) -> Result<Option<Out>, AdvanceError> {
        if interrupt.is_some_and(Interrupt::is_interrupted) {
            return Err(InterruptedError.into());
        }
        let lock = self.lock();
        // wait for the first yield
        let mut lock = self.wait_while(lock, State::New, interrupt)?;
        match lock.state {
            State::Done => return Ok(None),
            State::Running => {
                warn!("consumer side used concurrently");
                return Err(ConcurrentUseError { side: Side::Consumer }.into());
            }
            State::Yielding => (),
            State::New => unreachable!("still New after waiting (internal bug)"),
        }

        let first = !replace(&mut lock.advanced, true);
        let discarded = replace(&mut lock.slot, Slot::Input(input));
        lock.state = State::Running;
        self.0.cond.notify_all();
        trace!("consumer advanced");

        let mut lock = self.wait_while(lock, State::Running, interrupt)?;
        let out = match lock.state {
            State::Done => None,
            State::Yielding => match lock.slot.take() {
                Slot::Output(out) => Some(out),
                _ => unreachable!("producer yielded without output (internal bug)"),
            },
            state => unreachable!("advance woke in state {:?} (internal bug)", state),
        };
        drop(lock);
        if let Slot::Output(_) = discarded {
            // only a yield from New leaves an output for the consumer to replace
            debug_assert!(first, "unreceived output at a later advance (internal bug)");
            trace!("dropped output of first yield");
        }
        drop(discarded);
        Ok(out)
    }
}

// interrupts wake channel waiters through this.
impl<In: Send, Out: Send> Wake for Shared<In, Out> {
    fn wake(self: Arc<Self>) {
        self.wake_by_ref();
    }

    fn wake_by_ref(self: &Arc<Self>) {
        // taking the lock orders this after the waiter has started waiting.
        let _lock = self.lockable.lock().unwrap_or_else(PoisonError::into_inner);
        self.cond.notify_all();
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use std::{thread, time::Duration};

    #[test]
    fn state_progression() {
        let channel = Channel::<u32, &'static str>::new();
        let producer = channel.clone();
        assert_eq!(channel.state(), State::New);

        let join = thread::spawn(move || {
            assert_eq!(producer.yield_(None, None), Ok(0));
            assert_eq!(producer.yield_(Some("a"), None), Ok(1));
            assert_eq!(producer.yield_(Some("b"), None), Err(ClosedChannelError.into()));
        });

        assert_eq!(channel.advance(0, None), Ok(Some("a")));
        assert_eq!(channel.state(), State::Yielding);
        assert_eq!(channel.advance(1, None), Ok(Some("b")));
        channel.close();
        join.join().unwrap();
        assert_eq!(channel.state(), State::Done);
        assert_eq!(channel.advance(2, None), Ok(None));
    }

    #[test]
    fn yield_while_yielding_is_concurrent_use() {
        let channel = Channel::<(), u8>::new();
        let producer = channel.clone();
        let join = thread::spawn(move || producer.yield_(None, None));
        while channel.state() != State::Yielding {
            thread::yield_now();
        }
        assert_eq!(
            channel.yield_(Some(1), None),
            Err(ConcurrentUseError { side: Side::Producer }.into()),
        );
        channel.close();
        assert_eq!(join.join().unwrap(), Err(ClosedChannelError.into()));
    }

    #[test]
    fn yield_after_close_is_concurrent_use() {
        let channel = Channel::<(), u8>::new();
        channel.close();
        assert_eq!(
            channel.yield_(Some(1), None),
            Err(ConcurrentUseError { side: Side::Producer }.into()),
        );
    }

    #[test]
    fn advance_waits_for_first_yield() {
        let channel = Channel::<(), u8>::new();
        let producer = channel.clone();
        let join = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            producer.yield_(None, None)?;
            producer.yield_(Some(7), None)
        });
        assert_eq!(channel.advance((), None), Ok(Some(7)));
        channel.close();
        assert_eq!(join.join().unwrap(), Err(ClosedChannelError.into()));
    }

    #[test]
    fn interrupt_releases_blocked_advance() {
        let channel = Channel::<(), u8>::new();
        let interrupt = Interrupt::new();
        let interrupt_2 = interrupt.clone();
        let join = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            interrupt_2.interrupt();
        });
        assert_eq!(channel.advance((), Some(&interrupt)), Err(InterruptedError.into()));
        join.join().unwrap();
        // still New, nothing was exchanged
        assert_eq!(channel.state(), State::New);
    }

    // fire the interrupt from another thread once the channel reaches the given state.
    fn interrupt_when(
        channel: &Channel<(), u8>,
        state: State,
        interrupt: &Interrupt,
    ) -> thread::JoinHandle<()> {
        let channel = channel.clone();
        let interrupt = interrupt.clone();
        thread::spawn(move || {
            while channel.state() != state {
                thread::yield_now();
            }
            interrupt.interrupt();
        })
    }

    #[test]
    fn interrupted_advance_closes_channel() {
        let channel = Channel::<(), u8>::new();
        let producer = channel.clone();
        let join = thread::spawn(move || {
            producer.yield_(None, None)?;
            producer.yield_(Some(0), None)?;
            thread::sleep(Duration::from_millis(50));
            producer.yield_(Some(1), None)?;
            producer.yield_(Some(2), None)
        });
        assert_eq!(channel.advance((), None), Ok(Some(0)));

        let interrupt = Interrupt::new();
        let fire = interrupt_when(&channel, State::Running, &interrupt);
        assert_eq!(channel.advance((), Some(&interrupt)), Err(InterruptedError.into()));
        fire.join().unwrap();
        assert_eq!(channel.state(), State::Done);

        // neither 1 nor any later value is delivered out of order
        assert_eq!(channel.advance((), None), Ok(None));
        assert_eq!(
            join.join().unwrap(),
            Err(ConcurrentUseError { side: Side::Producer }.into()),
        );
    }

    #[test]
    fn interrupted_yield_closes_channel() {
        let channel = Channel::<(), u8>::new();
        let interrupt = Interrupt::new();
        let fire = interrupt_when(&channel, State::Yielding, &interrupt);
        assert_eq!(channel.yield_(Some(1), Some(&interrupt)), Err(InterruptedError.into()));
        fire.join().unwrap();
        assert_eq!(channel.state(), State::Done);
        assert_eq!(channel.advance((), None), Ok(None));
    }

    #[test]
    fn interrupt_fails_on_entry() {
        let channel = Channel::<(), u8>::new();
        let interrupt = Interrupt::new();
        interrupt.interrupt();
        assert_eq!(channel.yield_(None, Some(&interrupt)), Err(InterruptedError.into()));
        assert_eq!(channel.state(), State::New);
    }

    #[test]
    fn close_is_idempotent() {
        let channel = Channel::<String, String>::new();
        channel.close();
        channel.close();
        assert_eq!(channel.state(), State::Done);
    }
}
