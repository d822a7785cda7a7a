use super::*;
use crate::{
    channel::error::{ConcurrentUseError, InterruptedError, Side},
    exec::{Task, ThreadPerTask},
    future::ResultState,
};
use rand::{Rng, SeedableRng};
use rand_pcg::Pcg64;
use std::{
    sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering::SeqCst},
        mpsc,
    },
    thread,
    time::{Duration, Instant},
};


#[derive(Debug, thiserror::Error)]
#[error("stale greeting")]
struct StaleGreetingError;

fn greeter(chan: &Producer<&'static str, &'static str>) -> anyhow::Result<String> {
    let greeting = chan.yield_("Greeting?")?;
    let name = chan.yield_("Name?")?;
    if greeting == "Hello" && name == "World" {
        return Err(StaleGreetingError.into());
    }
    Ok(format!("{}, {}!", greeting, name))
}

fn counter(chan: &Producer<(), u32>) -> anyhow::Result<()> {
    for i in 0..10 {
        chan.yield_(i)?;
    }
    Ok(())
}

#[test]
fn normal_result() {
    let mut gen = Generator::new(greeter, &ThreadPerTask::new());
    let mut s = String::new();
    assert!(gen.advance("", |out| s.push_str(out)).unwrap());
    assert!(gen.advance("Salutations", |out| s.push_str(out)).unwrap());
    assert!(!gen.advance("Planet", |out| s.push_str(out)).unwrap());

    assert_eq!(s, "Greeting?Name?");
    assert_eq!(gen.result().state(), ResultState::Succeeded);
    assert_eq!(gen.result().try_now().unwrap(), "Salutations, Planet!");
}

#[test]
fn producer_failure() {
    let mut gen = Generator::new(greeter, &ThreadPerTask::new());
    let mut s = String::new();
    assert!(gen.advance("", |out| s.push_str(out)).unwrap());
    assert!(gen.advance("Hello", |out| s.push_str(out)).unwrap());
    assert!(!gen.advance("World", |out| s.push_str(out)).unwrap());

    assert_eq!(s, "Greeting?Name?");
    assert_eq!(gen.result().state(), ResultState::Failed);
    let error = match gen.result().try_now() {
        Err(TryResultError::Generator(error)) => error,
        other => panic!("unexpected result: {:?}", other),
    };
    assert!(error.failure().unwrap().downcast_ref::<StaleGreetingError>().is_some());
}

#[test]
fn two_way_communication() {
    let mut gen = Generator::new(|chan: &Producer<u32, u32>| {
        let mut steps = 0;
        let mut num = chan.yield_(1)?;
        while steps < 10 {
            num = chan.yield_(num * 2)?;
            steps += 1;
        }
        Ok(steps)
    }, &ThreadPerTask::new());

    let mut n = 0;
    gen.advance(0, |i| n = i).unwrap();
    while gen.advance(n + 3, |i| n = i).unwrap() {}

    assert_eq!(n, 7162);
    assert_eq!(gen.result().try_now().unwrap(), 10);
}

#[test]
fn random_sequences_reproduced_in_order() {
    let mut rng = Pcg64::seed_from_u64(0x5eed);
    for _ in 0..20 {
        let len = rng.gen_range(0..50);
        let values: Vec<u64> = (0..len).map(|_| rng.gen()).collect();
        let to_yield = values.clone();
        let mut gen = Generator::new(move |chan: &Producer<(), u64>| {
            for value in to_yield {
                chan.yield_(value)?;
            }
            Ok(len)
        }, &ThreadPerTask::new());

        let mut received = Vec::new();
        let mut advances = 0;
        while gen.advance((), |value| received.push(value)).unwrap() {
            advances += 1;
        }
        assert_eq!(received, values);
        assert_eq!(advances, len);
        assert_eq!(gen.result().try_now().unwrap(), len);
        // repeated advances after completion stay done
        assert!(!gen.advance((), |_| unreachable!()).unwrap());
        assert_eq!(gen.next(()).unwrap(), None);
    }
}

#[test]
fn normal_cancellation() {
    let mut gen = Generator::new(counter, &ThreadPerTask::new());
    let mut actual = Vec::new();
    for _ in 0..3 {
        gen.advance((), |i| actual.push(i)).unwrap();
    }
    gen.close();
    assert!(!gen.advance((), |i| actual.push(i)).unwrap());
    assert!(!gen.advance((), |i| actual.push(i)).unwrap());
    assert_eq!(actual, [0, 1, 2]);
    assert!(gen.is_closed());
    assert!(gen.result().is_cancelled());
    assert!(gen.result().try_now().unwrap_err().to_string().contains("cancelled"));
}

#[test]
fn late_cancellation() {
    let mut gen = Generator::new(counter, &ThreadPerTask::new());
    let mut actual = Vec::new();
    while gen.advance((), |i| actual.push(i)).unwrap() {}
    gen.close();
    assert_eq!(actual, (0..10).collect::<Vec<_>>());
    assert!(!gen.result().is_cancelled());
    gen.result().try_now().unwrap();
}

#[test]
fn cancellation_before_start() {
    let started = Arc::new(AtomicBool::new(false));
    let started_2 = Arc::clone(&started);
    let gen = Generator::new(move |chan: &Producer<(), u32>| {
        started_2.store(true, SeqCst);
        chan.yield_(1)?;
        Ok(())
    }, &ThreadPerTask::new());
    gen.close();
    assert!(!gen.advance((), |_| unreachable!()).unwrap());
    let mut result = gen.into_result();
    assert!(result.is_cancelled());
    result.wait_exited();
    assert!(!started.load(SeqCst));
    assert!(result.block().unwrap_err().is_cancelled());
}

#[test]
fn close_releases_blocked_advance() {
    let gen = Arc::new(Generator::new(|chan: &Producer<(), u32>| -> anyhow::Result<()> {
        chan.yield_(1)?;
        // busy with ordinary code until interrupted
        while !chan.interrupt().is_interrupted() {
            thread::sleep(Duration::from_millis(1));
        }
        anyhow::bail!("interrupted")
    }, &ThreadPerTask::new()));

    assert_eq!(gen.next(()).unwrap(), Some(1));
    let gen_2 = Arc::clone(&gen);
    let join = thread::spawn(move || {
        thread::sleep(Duration::from_millis(20));
        gen_2.close();
    });
    assert_eq!(gen.next(()).unwrap(), None);
    join.join().unwrap();

    let mut gen = Arc::into_inner(gen).unwrap();
    // the producer's own failure does not replace the cancellation
    assert!(gen.result().block().unwrap_err().is_cancelled());
}

#[test]
fn concurrent_advance_is_detected() {
    let (started_send, started_recv) = mpsc::channel();
    let (release_send, release_recv) = mpsc::channel::<()>();
    let gen = Arc::new(Generator::new(move |chan: &Producer<(), u32>| {
        started_send.send(())?;
        release_recv.recv()?;
        chan.yield_(1)?;
        Ok(())
    }, &ThreadPerTask::new()));

    let gen_2 = Arc::clone(&gen);
    let join = thread::spawn(move || gen_2.next(()));
    started_recv.recv().unwrap();
    assert_eq!(
        gen.next(()),
        Err(ConcurrentUseError { side: Side::Consumer }.into()),
    );
    release_send.send(()).unwrap();
    assert_eq!(join.join().unwrap(), Ok(Some(1)));
}

#[test]
fn interruptible_advance() {
    let gen = Generator::new(|chan: &Producer<(), u32>| {
        thread::sleep(Duration::from_millis(200));
        chan.yield_(1)?;
        Ok(())
    }, &ThreadPerTask::new());

    let interrupt = Interrupt::new();
    let interrupt_2 = interrupt.clone();
    let join = thread::spawn(move || {
        thread::sleep(Duration::from_millis(20));
        interrupt_2.interrupt();
    });
    let start = Instant::now();
    assert_eq!(
        gen.advance_interruptible((), &interrupt, |_| unreachable!()),
        Err(InterruptedError.into()),
    );
    assert!(start.elapsed() < Duration::from_millis(200));
    join.join().unwrap();
}

#[test]
fn interrupted_advance_ends_generator() {
    let mut gen = Generator::new(|chan: &Producer<(), u32>| {
        chan.yield_(0)?;
        thread::sleep(Duration::from_millis(100));
        chan.yield_(1)?;
        chan.yield_(2)?;
        Ok(())
    }, &ThreadPerTask::new());
    assert_eq!(gen.next(()).unwrap(), Some(0));

    let interrupt = Interrupt::new();
    let interrupt_2 = interrupt.clone();
    let join = thread::spawn(move || {
        thread::sleep(Duration::from_millis(20));
        interrupt_2.interrupt();
    });
    assert_eq!(gen.next_interruptible((), &interrupt), Err(InterruptedError.into()));
    join.join().unwrap();

    // later values are never delivered out of order
    thread::sleep(Duration::from_millis(150));
    assert_eq!(gen.next(()).unwrap(), None);
    assert!(gen.is_closed());
    assert!(gen.result().is_cancelled());
}

#[test]
fn hooks_finish_before_advance_ends() {
    let mut gen = Generator::new(counter, &ThreadPerTask::new());
    let hooked = Arc::new(AtomicBool::new(false));
    let hooked_2 = Arc::clone(&hooked);
    gen.result().on_complete(move || {
        thread::sleep(Duration::from_millis(50));
        hooked_2.store(true, SeqCst);
    });
    while gen.advance((), drop).unwrap() {}
    assert!(hooked.load(SeqCst));
}

#[test]
fn producer_panic_is_failure() {
    let mut gen = Generator::new(|chan: &Producer<(), u32>| -> anyhow::Result<()> {
        chan.yield_(1)?;
        panic!("boom");
    }, &ThreadPerTask::new());
    assert_eq!(gen.next(()).unwrap(), Some(1));
    assert_eq!(gen.next(()).unwrap(), None);
    let error = gen.result().block().unwrap_err();
    assert!(error.to_string().contains("producer panicked: boom"));
}

#[test]
fn yield_all_concatenates() {
    let live = Arc::new(AtomicUsize::new(0));
    let live_2 = Arc::clone(&live);
    let mut gen = Generator::new(move |chan: &Producer<(), u32>| {
        for _ in 0..10 {
            let live = Arc::clone(&live_2);
            yield_all(chan, move |inner| {
                live.fetch_add(1, SeqCst);
                let result = counter(inner);
                live.fetch_sub(1, SeqCst);
                result
            })?;
            assert_eq!(live_2.load(SeqCst), 0);
        }
        Ok("done!")
    }, &ThreadPerTask::new());

    let mut actual = Vec::new();
    while gen.advance((), |i| actual.push(i)).unwrap() {}

    let expected: Vec<u32> = (0..10).flat_map(|_| 0..10).collect();
    assert_eq!(actual, expected);
    assert_eq!(gen.result().try_now().unwrap(), "done!");
    assert_eq!(live.load(SeqCst), 0);
}

#[test]
fn yield_all_propagates_inner_result() {
    let mut gen = Generator::new(|chan: &Producer<&'static str, &'static str>| {
        let inner = Generator::new(|inner: &Producer<(), &'static str>| -> anyhow::Result<()> {
            inner.yield_("a")?;
            anyhow::bail!("inner failed")
        }, &ThreadPerTask::new());
        match yield_all_in(chan, inner) {
            Err(YieldAllError::Inner(error)) => Ok(error.to_string()),
            other => panic!("unexpected result: {:?}", other),
        }
    }, &ThreadPerTask::new());
    assert_eq!(gen.next("ignored").unwrap(), Some("a"));
    assert_eq!(gen.next("ignored").unwrap(), None);
    assert_eq!(gen.result().try_now().unwrap(), "producer failed: inner failed");
}

#[test]
fn closing_outer_releases_inner() {
    let live = Arc::new(AtomicUsize::new(0));
    let live_2 = Arc::clone(&live);
    let gen = Generator::new(move |chan: &Producer<(), u32>| {
        yield_all(chan, move |inner| -> anyhow::Result<()> {
            live_2.fetch_add(1, SeqCst);
            let mut i = 0;
            let result = loop {
                if let Err(e) = inner.yield_(i) {
                    break Err(e.into());
                }
                i += 1;
            };
            live_2.fetch_sub(1, SeqCst);
            result
        })?;
        Ok(())
    }, &ThreadPerTask::new());

    for i in 0..5 {
        assert_eq!(gen.next(()).unwrap(), Some(i));
    }
    assert_eq!(live.load(SeqCst), 1);
    let result = gen.into_result();
    assert!(result.is_cancelled());
    result.wait_exited();
    assert_eq!(live.load(SeqCst), 0);
}

#[test]
fn tokio_execution_context() {
    let runtime = tokio::runtime::Builder::new_current_thread().build().unwrap();
    let mut gen = Generator::new(counter, runtime.handle());
    let mut sum = 0;
    while gen.advance((), |i| sum += i).unwrap() {}
    assert_eq!(sum, 45);
    gen.result().try_now().unwrap();
}

// execution context which drops every task without running it.
struct Discard;

impl Execute for Discard {
    fn execute(&self, task: Task) {
        drop(task);
    }
}

#[test]
fn dropped_task_cancels() {
    let mut gen = Generator::new(counter, &Discard);
    assert!(!gen.advance((), |_| unreachable!()).unwrap());
    assert!(gen.result().is_cancelled());
}

#[test]
fn await_result() {
    let gen = Generator::new(counter, &ThreadPerTask::new());
    while gen.advance((), drop).unwrap() {}
    futures::executor::block_on(gen.into_result()).unwrap();
}

#[test]
#[ignore]
fn throughput() {
    let gen = Generator::new(|chan: &Producer<(), u64>| {
        for i in 0..1_000_000 {
            chan.yield_(i)?;
        }
        Ok(())
    }, &ThreadPerTask::new());

    let start = Instant::now();
    let mut sum = 0;
    while gen.advance((), |i| sum += i).unwrap() {}
    println!("sum: {}, elapsed: {:?}", sum, start.elapsed());
}
