use std::{sync::Arc, time::Duration};

use crate::{
    error::TheaterError,
    narration::Event,
    station::{VisitOutcome, VisitRequest},
    theater::Theater,
    util::{numbered, scaled, timestr},
};

/// time to sell a ticket (simulated milliseconds)
pub const BOX_OFFICE_TIME: u64 = 90_000;
/// time to tear a ticket
pub const TICKET_TAKER_TIME: u64 = 15_000;
/// time to fill a food order
pub const CONCESSION_TIME: u64 = 180_000;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Role {
    BoxOffice,
    TicketTaker,
    Concession,
}

impl Role {
    pub const ALL: [Role; 3] = [Role::BoxOffice, Role::TicketTaker, Role::Concession];

    pub fn title(&self) -> &'static str {
        match self {
            Role::BoxOffice => "Box office agent",
            Role::TicketTaker => "Ticket taker",
            Role::Concession => "Concession stand worker",
        }
    }

    pub fn station_name(&self) -> &'static str {
        match self {
            Role::BoxOffice => "box office",
            Role::TicketTaker => "ticket check",
            Role::Concession => "concession stand",
        }
    }

    pub fn service_time(&self) -> u64 {
        match self {
            Role::BoxOffice => BOX_OFFICE_TIME,
            Role::TicketTaker => TICKET_TAKER_TIME,
            Role::Concession => CONCESSION_TIME,
        }
    }
}

/// Handle one customer at the counter: wait out the service time, then do the role's job.
fn serve(
    theater: &Theater,
    role: Role,
    name: &str,
    delay: Duration,
    request: &VisitRequest,
) -> Result<VisitOutcome, TheaterError> {
    let narrator = theater.narrator();
    let shutdown = theater.shutdown();
    let customer = request.customer;

    match role {
        Role::BoxOffice => {
            narrator.emit(Event::Serving {
                worker: name.to_string(),
                customer,
            });
            shutdown.sleep(delay, "selling a ticket")?;

            let movie = request.movie.title.clone();
            if request.movie.try_purchase(1) {
                narrator.emit(Event::TicketSold {
                    worker: name.to_string(),
                    customer,
                    movie,
                });
                Ok(VisitOutcome::TicketSold)
            } else {
                narrator.emit(Event::TicketDenied {
                    worker: name.to_string(),
                    customer,
                    movie,
                });
                Ok(VisitOutcome::TicketDenied)
            }
        }
        Role::TicketTaker => {
            shutdown.sleep(delay, "taking a ticket")?;
            narrator.emit(Event::TicketTaken { customer });
            Ok(VisitOutcome::TicketTaken)
        }
        Role::Concession => {
            let food = request.food.ok_or_else(|| {
                TheaterError::Protocol(format!(
                    "Customer {customer} reached the concession stand without an order"
                ))
            })?;
            narrator.emit(Event::FoodOrdered { customer, food });
            shutdown.sleep(delay, "filling a food order")?;
            narrator.emit(Event::FoodGiven { customer, food });
            Ok(VisitOutcome::FoodServed(food))
        }
    }
}

/// Worker thread: staffs one station, serving customers until the theater shuts down.
/// Returns the number of customers served.
/// * `theater`: shared theater holding the stations, the startup barrier and the shutdown signal
/// * `role`: which station to staff and what to do for each customer
/// * `worker_id`: id of the worker among those sharing its role
pub fn worker(theater: Arc<Theater>, role: Role, worker_id: usize) -> Result<usize, TheaterError> {
    let config = theater.config();
    let name = numbered(role.title(), worker_id, config.workers(role));
    let log = |msg: String| {
        if config.verbose {
            println!("[{}][{name}] {msg}", timestr())
        }
    };

    // starting: announce and check in with the barrier
    theater.narrator().emit(Event::WorkerCreated {
        worker: name.clone(),
    });
    theater.barrier().arrive();
    log("Worker init".to_string());

    let station = theater.station(role);
    let delay = scaled(role.service_time(), config.time_scale);
    let mut served = 0;

    // serving: one full handshake per iteration
    loop {
        let result = station.serve_one(|request| {
            log(format!(
                "Picked up Customer {} ({} still in line)",
                request.customer,
                station.queued()
            ));
            serve(&theater, role, &name, delay, request)
        });
        match result {
            Ok(customer) => {
                log(format!("Finished with Customer {customer}"));
                served += 1;
            }
            Err(err) if err.is_cancelled() => {
                log(format!("{err}"));
                break;
            }
            Err(err) => {
                // a failed worker stops the whole run
                log(format!("Failed: {err}"));
                theater.shutdown().cancel();
                return Err(err);
            }
        }
    }
    log("Exiting".to_string());

    theater.narrator().emit(Event::WorkerStopped {
        worker: name.clone(),
        served,
    });
    Ok(served)
}
