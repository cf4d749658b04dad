use std::{
    sync::Arc,
    thread::{self, JoinHandle},
};

use rand::{rngs::StdRng, Rng, SeedableRng};

use crate::{
    config_error,
    customer::{Chooser, Customer, CustomerOutcome, RandomChooser},
    error::TheaterError,
    movie::Movie,
    narration::{Event, Narrator},
    report::Report,
    station::Station,
    sync::{Shutdown, StartupBarrier},
    util::timestr,
    worker::{worker, Role},
};

pub type WorkerHandle = JoinHandle<Result<usize, TheaterError>>;

/// Run parameters.
#[derive(Clone, Debug)]
pub struct Config {
    pub box_agents: usize,
    pub ticket_takers: usize,
    pub concession_workers: usize,
    pub customers: usize,
    /// divisor applied to every simulated service time
    pub time_scale: u32,
    pub seed: Option<u64>,
    pub verbose: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            box_agents: 2,
            ticket_takers: 1,
            concession_workers: 1,
            customers: 50,
            time_scale: 60,
            seed: None,
            verbose: false,
        }
    }
}

impl Config {
    pub fn workers(&self, role: Role) -> usize {
        match role {
            Role::BoxOffice => self.box_agents,
            Role::TicketTaker => self.ticket_takers,
            Role::Concession => self.concession_workers,
        }
    }

    pub fn total_workers(&self) -> usize {
        Role::ALL.iter().map(|role| self.workers(*role)).sum()
    }

    pub fn validate(&self) -> Result<(), TheaterError> {
        if let Some(role) = Role::ALL.into_iter().find(|role| self.workers(*role) == 0) {
            return Err(config_error!(
                "the {} needs at least one {}",
                role.station_name(),
                role.title().to_lowercase()
            ));
        }
        if self.time_scale == 0 {
            return Err(config_error!("time scale must be at least 1"));
        }
        Ok(())
    }
}

/// ## Theater
///
/// Shared root of a simulation run. Owns the movies, one `Station` per role (sized to
/// the number of workers staffing it), the startup barrier and the shutdown signal.
///
/// A run goes `open` (staff every station and wait for the barrier), `admit` (spawn
/// customers and join them in order), then `close` (raise shutdown and join the workers).
pub struct Theater {
    config: Config,
    movies: Vec<Arc<Movie>>,
    box_office: Station,
    ticket_check: Station,
    concession: Station,
    barrier: StartupBarrier,
    shutdown: Arc<Shutdown>,
    narrator: Narrator,
}

impl Theater {
    pub fn new(
        config: Config,
        movies: Vec<Arc<Movie>>,
        narrator: Narrator,
    ) -> Result<Arc<Self>, TheaterError> {
        config.validate()?;
        if movies.is_empty() {
            return Err(config_error!("the theater has no movies to show"));
        }

        let shutdown = Arc::new(Shutdown::new());
        let station = |role: Role| {
            Station::new(role.station_name(), config.workers(role), shutdown.clone())
        };
        Ok(Arc::new(Self {
            box_office: station(Role::BoxOffice),
            ticket_check: station(Role::TicketTaker),
            concession: station(Role::Concession),
            barrier: StartupBarrier::new(config.total_workers()),
            shutdown,
            narrator,
            movies,
            config,
        }))
    }

    fn log(&self, msg: String) {
        if self.config.verbose {
            println!("[{}][T] {msg}", timestr());
        }
    }

    pub fn station(&self, role: Role) -> &Station {
        match role {
            Role::BoxOffice => &self.box_office,
            Role::TicketTaker => &self.ticket_check,
            Role::Concession => &self.concession,
        }
    }

    pub fn movies(&self) -> &[Arc<Movie>] {
        &self.movies
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn narrator(&self) -> &Narrator {
        &self.narrator
    }

    pub fn shutdown(&self) -> &Shutdown {
        &self.shutdown
    }

    pub fn barrier(&self) -> &StartupBarrier {
        &self.barrier
    }

    /// Start every worker, then block until all of them have checked in.
    pub fn open(self: &Arc<Self>) -> Result<Vec<WorkerHandle>, TheaterError> {
        self.log(format!("Starting {} workers", self.config.total_workers()));
        let workers = Role::ALL
            .into_iter()
            .flat_map(|role| (0..self.config.workers(role)).map(move |id| (role, id)))
            .map(|(role, id)| {
                let theater = self.clone();
                thread::spawn(move || worker(theater, role, id))
            })
            .collect::<Vec<_>>();

        self.log("Waiting for workers to check in".to_string());
        self.barrier.wait(&self.shutdown)?;
        self.narrator.emit(Event::TheaterOpen);
        Ok(workers)
    }

    /// Let one customer in per chooser and wait for all of them to finish, in id order.
    pub fn admit<C>(
        self: &Arc<Self>,
        choosers: impl IntoIterator<Item = C>,
    ) -> Result<Vec<CustomerOutcome>, TheaterError>
    where
        C: Chooser + Send + 'static,
    {
        if !self.barrier.is_open() {
            return Err(TheaterError::Protocol(format!(
                "customers arrived before every station was staffed ({} workers missing)",
                self.barrier.remaining()
            )));
        }

        let customers = choosers
            .into_iter()
            .enumerate()
            .map(|(id, chooser)| Customer::new(id, &self.movies, chooser))
            .collect::<Result<Vec<_>, _>>()?;
        let customers = customers
            .into_iter()
            .map(|customer| {
                let theater = self.clone();
                thread::spawn(move || customer.run(&theater))
            })
            .collect::<Vec<_>>();

        // every customer is joined even after one fails; the first failure is reported
        self.log(format!("Waiting for {} customers", customers.len()));
        let mut outcomes = Vec::with_capacity(customers.len());
        let mut failure = None;
        for (id, customer) in customers.into_iter().enumerate() {
            let result = customer
                .join()
                .map_err(|_| TheaterError::Thread(format!("Customer {id} panicked")))
                .and_then(|result| result);
            self.narrator.emit(Event::CustomerJoined { customer: id });
            match result {
                Ok(outcome) => outcomes.push(outcome),
                Err(err) => {
                    self.log(format!("Customer {id} failed: {err}"));
                    failure.get_or_insert(err);
                }
            }
        }
        match failure {
            Some(err) => Err(err),
            None => Ok(outcomes),
        }
    }

    /// Raise shutdown and wait for every worker to go home.
    pub fn close(&self, workers: Vec<WorkerHandle>) -> Result<(), TheaterError> {
        self.log("Sending workers home".to_string());
        self.shutdown.cancel();
        let mut failure = None;
        for (index, worker) in workers.into_iter().enumerate() {
            let result = worker
                .join()
                .map_err(|_| TheaterError::Thread(format!("worker {index} panicked")))
                .and_then(|result| result);
            if let Err(err) = result {
                self.log(format!("Worker {index} failed: {err}"));
                failure.get_or_insert(err);
            }
        }
        for role in Role::ALL {
            let station = self.station(role);
            self.log(format!(
                "{}: {}/{} slots free",
                station.name(),
                station.free_slots(),
                station.capacity()
            ));
        }
        self.log("Done".to_string());
        failure.map_or(Ok(()), Err)
    }

    /// Open, let every customer through and close up. The theater is closed and its
    /// workers joined even when a customer fails.
    pub fn host<C>(
        self: &Arc<Self>,
        choosers: impl IntoIterator<Item = C>,
    ) -> Result<Vec<CustomerOutcome>, TheaterError>
    where
        C: Chooser + Send + 'static,
    {
        let workers = self.open()?;
        let admitted = self.admit(choosers);
        let closed = self.close(workers);
        let outcomes = admitted?;
        closed?;
        Ok(outcomes)
    }

    pub fn report(&self, seed: u64, outcomes: &[CustomerOutcome]) -> Report {
        Report::new(
            seed,
            outcomes,
            &self.movies,
            Role::ALL.into_iter().map(|role| self.station(role)),
        )
    }
}

/// Run a whole simulation: staff the theater, let `config.customers` customers through, close up.
pub fn run(
    config: Config,
    movies: Vec<Arc<Movie>>,
    narrator: Narrator,
) -> Result<Report, TheaterError> {
    let seed = config.seed.unwrap_or_else(|| rand::thread_rng().gen());
    let mut master = StdRng::seed_from_u64(seed);
    let customers = config.customers;

    let theater = Theater::new(config, movies, narrator)?;
    let choosers = (0..customers)
        .map(|_| RandomChooser::seeded(master.gen()))
        .collect::<Vec<_>>();
    let outcomes = theater.host(choosers)?;
    Ok(theater.report(seed, &outcomes))
}

/// Fast settings for tests: one millisecond or so per service.
#[cfg(test)]
pub(crate) fn quick_config(
    box_agents: usize,
    ticket_takers: usize,
    concession_workers: usize,
) -> Config {
    Config {
        box_agents,
        ticket_takers,
        concession_workers,
        customers: 0,
        time_scale: 100_000,
        seed: Some(1),
        verbose: false,
    }
}
