use std::{
    collections::VecDeque,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc, Mutex, MutexGuard, PoisonError,
    },
};

use crossbeam::channel::{bounded, select, unbounded, Receiver, Sender};

use crate::{customer::Food, error::TheaterError, movie::Movie, sync::Shutdown};

/// What a customer brings to the counter.
#[derive(Clone, Debug)]
pub struct VisitRequest {
    pub customer: usize,
    pub movie: Arc<Movie>,
    pub food: Option<Food>,
}

/// What the worker hands back at the end of a visit.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum VisitOutcome {
    TicketSold,
    TicketDenied,
    TicketTaken,
    FoodServed(Food),
}

#[derive(Default)]
struct Occupancy {
    current: AtomicUsize,
    peak: AtomicUsize,
}

struct GateState {
    free: usize,
    next_ticket: u64,
    waiters: VecDeque<(u64, Sender<()>)>,
}

/// Fair slot gate. A released slot is handed straight to the customer that has waited
/// longest and only goes back to the free pool when nobody is waiting, so a late arrival
/// can never take a slot ahead of someone already blocked on the gate.
struct Gate {
    state: Mutex<GateState>,
    occupancy: Occupancy,
}

impl Gate {
    fn new(capacity: usize) -> Self {
        Self {
            state: Mutex::new(GateState {
                free: capacity,
                next_ticket: 0,
                waiters: VecDeque::new(),
            }),
            occupancy: Occupancy::default(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, GateState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Take a slot, waiting in line behind earlier customers. `None` if shutdown was
    /// raised first.
    fn acquire(self: &Arc<Self>, shutdown: &Shutdown) -> Option<SlotPermit> {
        let (ticket, grant) = {
            let mut state = self.lock();
            if state.free > 0 && state.waiters.is_empty() {
                state.free -= 1;
                return Some(SlotPermit::new(self.clone()));
            }
            let (send, grant) = bounded(1);
            let ticket = state.next_ticket;
            state.next_ticket += 1;
            state.waiters.push_back((ticket, send));
            (ticket, grant)
        };

        let granted = select! {
            recv(grant) -> granted => granted.is_ok(),
            recv(shutdown.signal()) -> _ => false,
        };
        if granted {
            return Some(SlotPermit::new(self.clone()));
        }

        // a slot may have been handed over just as shutdown was raised
        let mut state = self.lock();
        if grant.try_recv().is_err() {
            state.waiters.retain(|(waiting, _)| *waiting != ticket);
            return None;
        }
        drop(state);
        self.release();
        None
    }

    fn release(&self) {
        let mut state = self.lock();
        while let Some((_, waiter)) = state.waiters.pop_front() {
            if waiter.try_send(()).is_ok() {
                return;
            }
        }
        state.free += 1;
    }

    fn waiting(&self) -> usize {
        self.lock().waiters.len()
    }

    fn free(&self) -> usize {
        self.lock().free
    }
}

/// A reserved seat at the counter. The slot is given back on drop, so a permit is
/// released exactly once whether the visit completes or is abandoned.
struct SlotPermit {
    gate: Arc<Gate>,
}

impl SlotPermit {
    fn new(gate: Arc<Gate>) -> Self {
        let occupancy = &gate.occupancy;
        let now = occupancy.current.fetch_add(1, Ordering::AcqRel) + 1;
        occupancy.peak.fetch_max(now, Ordering::AcqRel);
        Self { gate }
    }
}

impl Drop for SlotPermit {
    fn drop(&mut self) {
        self.gate.occupancy.current.fetch_sub(1, Ordering::AcqRel);
        self.gate.release();
    }
}

/// Private return channel for one visit. Consumed by `complete`, so it fires at most once.
struct Completion(Sender<VisitOutcome>);

impl Completion {
    fn complete(self, outcome: VisitOutcome) -> bool {
        self.0.send(outcome).is_ok()
    }
}

struct Visit {
    request: VisitRequest,
    permit: SlotPermit,
    completion: Completion,
}

/// ## Station
///
/// A service counter where one customer and one worker meet for a single transaction.
///
/// * the slot gate holds `capacity` slots; a customer takes one before queueing and the
///   serving worker gives it back once the visit is over, to the longest waiting customer
///   first
/// * the arrival queue is an unbounded FIFO channel; a single `send` both enqueues the
///   customer and signals a worker, so queue and signal can never drift apart
/// * the completion signal is a one-slot channel private to each visit
///
/// Every blocking step also listens on the run's shutdown signal.
pub struct Station {
    name: String,
    capacity: usize,
    gate: Arc<Gate>,
    arrivals_send: Sender<Visit>,
    arrivals_recv: Receiver<Visit>,
    served: AtomicUsize,
    shutdown: Arc<Shutdown>,
}

impl Station {
    pub fn new(name: impl Into<String>, capacity: usize, shutdown: Arc<Shutdown>) -> Self {
        let capacity = capacity.max(1);
        let (arrivals_send, arrivals_recv) = unbounded();
        Self {
            name: name.into(),
            capacity,
            gate: Arc::new(Gate::new(capacity)),
            arrivals_send,
            arrivals_recv,
            served: AtomicUsize::new(0),
            shutdown,
        }
    }

    fn cancelled(&self, during: &str) -> TheaterError {
        TheaterError::cancelled(&format!("{during} at the {}", self.name))
    }

    /// Customer side of the handshake: reserve a slot, queue up, wait for the worker.
    pub fn visit(&self, request: VisitRequest) -> Result<VisitOutcome, TheaterError> {
        if self.shutdown.is_cancelled() {
            return Err(self.cancelled("waiting for a slot"));
        }

        let permit = self
            .gate
            .acquire(&self.shutdown)
            .ok_or_else(|| self.cancelled("waiting for a slot"))?;

        let (completion, done) = bounded(1);
        self.arrivals_send
            .send(Visit {
                request,
                permit,
                completion: Completion(completion),
            })
            .map_err(|_| self.cancelled("joining the line"))?;

        select! {
            recv(done) -> outcome => outcome.map_err(|_| self.cancelled("being served")),
            recv(self.shutdown.signal()) -> _ => {
                // the worker may have finished just as shutdown was raised
                done.try_recv().map_err(|_| self.cancelled("being served"))
            }
        }
    }

    /// Worker side of the handshake: take the next customer in line, run `service` on
    /// them, signal completion and free their slot. Returns the id of the customer served.
    ///
    /// If `service` fails the visit is abandoned: the customer sees a cancellation and the
    /// slot is still returned.
    pub fn serve_one<F>(&self, service: F) -> Result<usize, TheaterError>
    where
        F: FnOnce(&VisitRequest) -> Result<VisitOutcome, TheaterError>,
    {
        let visit = select! {
            recv(self.arrivals_recv) -> visit => {
                visit.map_err(|_| self.cancelled("waiting for customers"))?
            }
            recv(self.shutdown.signal()) -> _ => {
                return Err(self.cancelled("waiting for customers"))
            }
        };

        let Visit {
            request,
            permit,
            completion,
        } = visit;
        let outcome = service(&request)?;
        self.served.fetch_add(1, Ordering::AcqRel);
        completion.complete(outcome);
        drop(permit);
        Ok(request.customer)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Visits currently holding a slot, queued or being served.
    pub fn occupancy(&self) -> usize {
        self.gate.occupancy.current.load(Ordering::Acquire)
    }

    pub fn peak_occupancy(&self) -> usize {
        self.gate.occupancy.peak.load(Ordering::Acquire)
    }

    pub fn served(&self) -> usize {
        self.served.load(Ordering::Acquire)
    }

    /// Customers in line that no worker has picked up yet.
    pub fn queued(&self) -> usize {
        self.arrivals_recv.len()
    }

    /// Customers blocked on the gate, waiting for a slot to open up.
    pub fn waiting(&self) -> usize {
        self.gate.waiting()
    }

    pub fn free_slots(&self) -> usize {
        self.gate.free()
    }
}

#[cfg(test)]
mod tests {
    use std::{
        sync::Mutex,
        thread,
        time::{Duration, Instant},
    };

    use super::*;

    fn request(customer: usize) -> VisitRequest {
        VisitRequest {
            customer,
            movie: Arc::new(Movie::new("Brazil", 10)),
            food: None,
        }
    }

    fn wait_until(mut condition: impl FnMut() -> bool) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while !condition() {
            assert!(Instant::now() < deadline, "condition never became true");
            thread::sleep(Duration::from_millis(1));
        }
    }

    fn spawn_worker(
        station: &Arc<Station>,
        delay: Duration,
    ) -> thread::JoinHandle<Result<usize, TheaterError>> {
        let station = station.clone();
        thread::spawn(move || {
            let mut served = 0;
            loop {
                match station.serve_one(|_| {
                    assert!(station.occupancy() <= station.capacity());
                    thread::sleep(delay);
                    Ok(VisitOutcome::TicketTaken)
                }) {
                    Ok(_) => served += 1,
                    Err(err) if err.is_cancelled() => return Ok(served),
                    Err(err) => return Err(err),
                }
            }
        })
    }

    fn spawn_customer(
        station: &Arc<Station>,
        customer: usize,
    ) -> thread::JoinHandle<Result<VisitOutcome, TheaterError>> {
        let station = station.clone();
        thread::spawn(move || station.visit(request(customer)))
    }

    #[test]
    fn never_exceeds_capacity() {
        let shutdown = Arc::new(Shutdown::new());
        let station = Arc::new(Station::new("ticket check", 2, shutdown.clone()));
        let workers = (0..4)
            .map(|_| spawn_worker(&station, Duration::from_millis(2)))
            .collect::<Vec<_>>();
        let customers = (0..20)
            .map(|id| spawn_customer(&station, id))
            .collect::<Vec<_>>();

        for customer in customers {
            assert_eq!(customer.join().unwrap().unwrap(), VisitOutcome::TicketTaken);
        }
        shutdown.cancel();
        let served = workers
            .into_iter()
            .map(|worker| worker.join().unwrap().unwrap())
            .sum::<usize>();

        assert_eq!(served, 20);
        assert_eq!(station.served(), 20);
        assert!(station.peak_occupancy() <= 2);
        assert_eq!(station.occupancy(), 0);
        assert_eq!(station.free_slots(), 2);
    }

    #[test]
    fn serves_in_arrival_order() {
        let shutdown = Arc::new(Shutdown::new());
        let station = Arc::new(Station::new("box office", 5, shutdown.clone()));

        // each customer is in line before the next one shows up
        let customers = (0..5)
            .map(|id| {
                let customer = spawn_customer(&station, id);
                wait_until(|| station.queued() == id + 1);
                customer
            })
            .collect::<Vec<_>>();

        let order = (0..5)
            .map(|_| station.serve_one(|_| Ok(VisitOutcome::TicketSold)).unwrap())
            .collect::<Vec<_>>();
        assert_eq!(order, [0, 1, 2, 3, 4]);

        for customer in customers {
            assert_eq!(customer.join().unwrap().unwrap(), VisitOutcome::TicketSold);
        }
        shutdown.cancel();
    }

    /// Line up customers one after the other on a station nobody is serving yet: the
    /// first takes the only slot and queues, the rest block on the gate in order.
    fn line_up(
        station: &Arc<Station>,
        count: usize,
    ) -> Vec<thread::JoinHandle<Result<VisitOutcome, TheaterError>>> {
        (0..count)
            .map(|id| {
                let customer = spawn_customer(station, id);
                wait_until(|| station.queued() + station.waiting() == id + 1);
                customer
            })
            .collect()
    }

    #[test]
    fn single_slot_serves_one_at_a_time() {
        let shutdown = Arc::new(Shutdown::new());
        let station = Arc::new(Station::new("ticket check", 1, shutdown.clone()));
        let spans = Arc::new(Mutex::new(Vec::new()));
        let customers = line_up(&station, 5);
        assert_eq!((station.queued(), station.waiting()), (1, 4));

        let worker = {
            let station = station.clone();
            let spans = spans.clone();
            thread::spawn(move || {
                for _ in 0..5 {
                    station
                        .serve_one(|request| {
                            assert_eq!(station.occupancy(), 1);
                            assert_eq!(station.queued(), 0);
                            let start = Instant::now();
                            thread::sleep(Duration::from_millis(3));
                            spans
                                .lock()
                                .unwrap()
                                .push((request.customer, start, Instant::now()));
                            Ok(VisitOutcome::TicketTaken)
                        })
                        .unwrap();
                }
            })
        };
        for customer in customers {
            customer.join().unwrap().unwrap();
        }
        worker.join().unwrap();
        shutdown.cancel();

        let spans = spans.lock().unwrap();
        let order = spans.iter().map(|(id, _, _)| *id).collect::<Vec<_>>();
        assert_eq!(order, [0, 1, 2, 3, 4]);
        for pair in spans.windows(2) {
            assert!(pair[0].2 <= pair[1].1, "services overlapped");
        }
        assert_eq!(station.peak_occupancy(), 1);
    }

    #[test]
    fn released_slot_goes_to_the_waiting_customer() {
        let shutdown = Arc::new(Shutdown::new());
        let station = Arc::new(Station::new("ticket check", 1, shutdown.clone()));

        for _ in 0..20 {
            let mut customers = line_up(&station, 2);

            // serving the first customer frees the slot, and a newcomer shows up at once
            let first = station.serve_one(|_| Ok(VisitOutcome::TicketTaken)).unwrap();
            customers.push(spawn_customer(&station, 2));

            let order = [first]
                .into_iter()
                .chain((0..2).map(|_| {
                    station
                        .serve_one(|_| Ok(VisitOutcome::TicketTaken))
                        .unwrap()
                }))
                .collect::<Vec<_>>();
            assert_eq!(order, [0, 1, 2]);

            for customer in customers {
                customer.join().unwrap().unwrap();
            }
            assert_eq!(station.free_slots(), 1);
            assert_eq!(station.waiting(), 0);
        }
        shutdown.cancel();
    }

    #[test]
    fn each_visit_completes_once() {
        let shutdown = Arc::new(Shutdown::new());
        let station = Arc::new(Station::new("concession", 3, shutdown.clone()));
        let calls = Arc::new(AtomicUsize::new(0));
        let workers = (0..3)
            .map(|_| {
                let station = station.clone();
                let calls = calls.clone();
                thread::spawn(move || {
                    while station
                        .serve_one(|request| {
                            calls.fetch_add(1, Ordering::SeqCst);
                            Ok(VisitOutcome::FoodServed(request.food.unwrap_or(Food::Soda)))
                        })
                        .is_ok()
                    {}
                })
            })
            .collect::<Vec<_>>();

        let customers = (0..30)
            .map(|id| spawn_customer(&station, id))
            .collect::<Vec<_>>();
        for customer in customers {
            assert_eq!(
                customer.join().unwrap().unwrap(),
                VisitOutcome::FoodServed(Food::Soda)
            );
        }
        shutdown.cancel();
        for worker in workers {
            worker.join().unwrap();
        }
        assert_eq!(calls.load(Ordering::SeqCst), 30);
        assert_eq!(station.served(), 30);
    }

    #[test]
    fn idle_worker_is_released_by_shutdown() {
        let shutdown = Arc::new(Shutdown::new());
        let station = Arc::new(Station::new("box office", 2, shutdown.clone()));
        let worker = spawn_worker(&station, Duration::ZERO);
        thread::sleep(Duration::from_millis(20));
        shutdown.cancel();
        assert_eq!(worker.join().unwrap().unwrap(), 0);
        assert_eq!(station.free_slots(), 2);
        assert_eq!(station.queued(), 0);
    }

    #[test]
    fn waiting_customers_are_released_by_shutdown() {
        let shutdown = Arc::new(Shutdown::new());
        let station = Arc::new(Station::new("ticket check", 1, shutdown.clone()));

        let first = spawn_customer(&station, 0);
        wait_until(|| station.queued() == 1);
        let second = spawn_customer(&station, 1);
        thread::sleep(Duration::from_millis(20));
        assert_eq!(station.free_slots(), 0);

        shutdown.cancel();
        assert!(first.join().unwrap().unwrap_err().is_cancelled());
        assert!(second.join().unwrap().unwrap_err().is_cancelled());

        // the abandoned visit still holds its slot; nothing was double counted
        assert_eq!(station.queued() + station.free_slots(), station.capacity());
        assert_eq!(station.occupancy(), 1);
        assert!(station.visit(request(2)).unwrap_err().is_cancelled());
    }

    #[test]
    fn abandoned_service_returns_the_slot() {
        let shutdown = Arc::new(Shutdown::new());
        let station = Arc::new(Station::new("concession", 1, shutdown.clone()));
        let customer = spawn_customer(&station, 0);
        let (started_send, started) = bounded(1);

        let worker = {
            let station = station.clone();
            let shutdown = shutdown.clone();
            thread::spawn(move || {
                station.serve_one(|_| {
                    started_send.send(()).unwrap();
                    shutdown.sleep(Duration::from_secs(30), "making popcorn")?;
                    Ok(VisitOutcome::FoodServed(Food::Popcorn))
                })
            })
        };
        started.recv().unwrap();
        assert_eq!(station.occupancy(), 1);
        shutdown.cancel();

        assert!(worker.join().unwrap().unwrap_err().is_cancelled());
        assert!(customer.join().unwrap().unwrap_err().is_cancelled());
        assert_eq!(station.served(), 0);
        assert_eq!(station.occupancy(), 0);
        assert_eq!(station.free_slots(), 1);
    }
}
