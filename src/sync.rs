use std::{
    sync::{
        atomic::{AtomicUsize, Ordering},
        Mutex, PoisonError,
    },
    time::Duration,
};

use crossbeam::channel::{bounded, select, Receiver, Sender};

use crate::error::TheaterError;

/// Drops the sender held in `slot`, which disconnects every receiver cloned from it.
fn disconnect(slot: &Mutex<Option<Sender<()>>>) {
    slot.lock()
        .unwrap_or_else(PoisonError::into_inner)
        .take();
}

/// Run-wide cancellation signal.
///
/// Nothing is ever sent on the channel: raising shutdown drops the only sender, after
/// which every `recv` on the receiver (including those parked inside a `select!`)
/// returns immediately. Blocking operations elsewhere in the crate include
/// `recv(shutdown.signal())` as an arm of their `select!`.
pub struct Shutdown {
    trigger: Mutex<Option<Sender<()>>>,
    signal: Receiver<()>,
}

impl Shutdown {
    pub fn new() -> Self {
        let (trigger, signal) = bounded(0);
        Self {
            trigger: Mutex::new(Some(trigger)),
            signal,
        }
    }

    pub fn cancel(&self) {
        disconnect(&self.trigger);
    }

    pub fn is_cancelled(&self) -> bool {
        self.trigger
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_none()
    }

    pub fn signal(&self) -> &Receiver<()> {
        &self.signal
    }

    /// Sleep for `duration`, waking early with a cancellation error if shutdown is raised.
    pub fn sleep(&self, duration: Duration, during: &str) -> Result<(), TheaterError> {
        select! {
            recv(self.signal) -> _ => Err(TheaterError::cancelled(during)),
            default(duration) => Ok(()),
        }
    }
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::new()
    }
}

/// One-shot countdown latch: opens once `arrive` has been called `count` times.
pub struct StartupBarrier {
    remaining: AtomicUsize,
    door: Mutex<Option<Sender<()>>>,
    opened: Receiver<()>,
}

impl StartupBarrier {
    pub fn new(count: usize) -> Self {
        let (door, opened) = bounded(0);
        let barrier = Self {
            remaining: AtomicUsize::new(count),
            door: Mutex::new(Some(door)),
            opened,
        };
        if count == 0 {
            disconnect(&barrier.door);
        }
        barrier
    }

    /// Count one participant in. The last arrival opens the barrier; extra arrivals are ignored.
    pub fn arrive(&self) {
        let previous = self
            .remaining
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1));
        if previous == Ok(1) {
            disconnect(&self.door);
        }
    }

    pub fn remaining(&self) -> usize {
        self.remaining.load(Ordering::Acquire)
    }

    pub fn is_open(&self) -> bool {
        self.remaining() == 0
    }

    /// Block until every participant has arrived, or until shutdown is raised.
    pub fn wait(&self, shutdown: &Shutdown) -> Result<(), TheaterError> {
        select! {
            recv(self.opened) -> _ => Ok(()),
            recv(shutdown.signal()) -> _ => {
                if self.is_open() {
                    Ok(())
                } else {
                    Err(TheaterError::cancelled("waiting for workers to start"))
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::{sync::Arc, thread, time::Instant};

    use super::*;

    #[test]
    fn barrier_opens_after_every_arrival() {
        let barrier = Arc::new(StartupBarrier::new(3));
        let shutdown = Shutdown::new();
        let arrivals = (0..3)
            .map(|i| {
                let barrier = barrier.clone();
                thread::spawn(move || {
                    thread::sleep(Duration::from_millis(5 * i));
                    barrier.arrive();
                })
            })
            .collect::<Vec<_>>();
        barrier.wait(&shutdown).unwrap();
        assert!(barrier.is_open());
        for arrival in arrivals {
            arrival.join().unwrap();
        }
    }

    #[test]
    fn barrier_stays_closed_until_last_arrival() {
        let barrier = StartupBarrier::new(2);
        barrier.arrive();
        assert_eq!(barrier.remaining(), 1);
        assert!(!barrier.is_open());
        barrier.arrive();
        barrier.arrive();
        assert_eq!(barrier.remaining(), 0);
    }

    #[test]
    fn empty_barrier_is_already_open() {
        let barrier = StartupBarrier::new(0);
        barrier.wait(&Shutdown::new()).unwrap();
    }

    #[test]
    fn barrier_wait_is_cancellable() {
        let barrier = Arc::new(StartupBarrier::new(2));
        let shutdown = Arc::new(Shutdown::new());
        barrier.arrive();
        let waiter = {
            let barrier = barrier.clone();
            let shutdown = shutdown.clone();
            thread::spawn(move || barrier.wait(&shutdown))
        };
        thread::sleep(Duration::from_millis(20));
        shutdown.cancel();
        let result = waiter.join().unwrap();
        assert!(result.unwrap_err().is_cancelled());
    }

    #[test]
    fn shutdown_sleep_wakes_early() {
        let shutdown = Arc::new(Shutdown::new());
        assert!(!shutdown.is_cancelled());
        shutdown.sleep(Duration::from_millis(1), "resting").unwrap();

        let sleeper = {
            let shutdown = shutdown.clone();
            thread::spawn(move || {
                let start = Instant::now();
                let result = shutdown.sleep(Duration::from_secs(30), "resting");
                (result, start.elapsed())
            })
        };
        thread::sleep(Duration::from_millis(20));
        shutdown.cancel();
        let (result, elapsed) = sleeper.join().unwrap();
        assert!(result.unwrap_err().is_cancelled());
        assert!(elapsed < Duration::from_secs(10));
        assert!(shutdown.is_cancelled());
    }
}
