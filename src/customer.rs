use std::{fmt::Display, sync::Arc};

use rand::{rngs::StdRng, seq::SliceRandom, Rng, SeedableRng};
use serde::Serialize;

use crate::{
    config_error,
    error::TheaterError,
    movie::Movie,
    narration::Event,
    station::{VisitOutcome, VisitRequest},
    theater::Theater,
    util::timestr,
    worker::Role,
};

/// chance that a customer with a ticket stops at the concession stand
pub const CONCESSION_PROBABILITY: f64 = 0.5;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
pub enum Food {
    Popcorn,
    Soda,
    Both,
}

impl Food {
    pub const ALL: [Food; 3] = [Food::Popcorn, Food::Soda, Food::Both];
}

impl Display for Food {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Food::Popcorn => "Popcorn",
            Food::Soda => "Soda",
            Food::Both => "Both",
        };
        write!(f, "{name}")
    }
}

/// Source of a customer's decisions.
pub trait Chooser {
    /// Index of the movie to see, out of `choices` movies.
    fn pick_movie(&mut self, choices: usize) -> usize;
    /// What to buy at the concession stand, or `None` to skip it.
    fn pick_food(&mut self) -> Option<Food>;
}

pub struct RandomChooser<R: Rng = StdRng> {
    rng: R,
}

impl RandomChooser<StdRng> {
    pub fn seeded(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }
}

impl<R: Rng> Chooser for RandomChooser<R> {
    fn pick_movie(&mut self, choices: usize) -> usize {
        self.rng.gen_range(0..choices)
    }

    fn pick_food(&mut self) -> Option<Food> {
        if !self.rng.gen_bool(CONCESSION_PROBABILITY) {
            return None;
        }
        Food::ALL.choose(&mut self.rng).copied()
    }
}

/// How a customer's evening ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum CustomerOutcome {
    Entered { food: Option<Food> },
    TurnedAway,
    Cancelled,
}

pub struct Customer<C: Chooser> {
    pub id: usize,
    pub movie: Arc<Movie>,
    pub got_ticket: bool,
    pub food: Option<Food>,
    chooser: C,
}

impl<C: Chooser> Customer<C> {
    /// Create a customer, settling on a movie right away.
    pub fn new(id: usize, movies: &[Arc<Movie>], mut chooser: C) -> Result<Self, TheaterError> {
        if movies.is_empty() {
            return Err(config_error!("there are no movies to choose from"));
        }
        let choice = chooser.pick_movie(movies.len());
        let movie = movies
            .get(choice)
            .cloned()
            .ok_or_else(|| {
                config_error!("Customer {id} picked movie {choice} of {}", movies.len())
            })?;
        Ok(Self {
            id,
            movie,
            got_ticket: false,
            food: None,
            chooser,
        })
    }

    fn request(&self) -> VisitRequest {
        VisitRequest {
            customer: self.id,
            movie: self.movie.clone(),
            food: self.food,
        }
    }

    /// Go through the theater: box office, ticket taker, then maybe the concession stand.
    /// Being interrupted by shutdown is reported as an outcome, not an error.
    pub fn run(mut self, theater: &Theater) -> Result<CustomerOutcome, TheaterError> {
        match self.attend(theater) {
            Err(err) if err.is_cancelled() => {
                theater.narrator().emit(Event::CustomerCancelled {
                    customer: self.id,
                    reason: err.to_string(),
                });
                Ok(CustomerOutcome::Cancelled)
            }
            result => result,
        }
    }

    fn attend(&mut self, theater: &Theater) -> Result<CustomerOutcome, TheaterError> {
        let narrator = theater.narrator();
        narrator.emit(Event::CustomerCreated {
            customer: self.id,
            movie: self.movie.title.clone(),
        });

        if !self.buy_ticket(theater)? {
            narrator.emit(Event::CustomerLeft {
                customer: self.id,
                movie: self.movie.title.clone(),
            });
            return Ok(CustomerOutcome::TurnedAway);
        }
        self.enter_lobby(theater)?;
        self.visit_concessions(theater)?;

        narrator.emit(Event::CustomerEntered {
            customer: self.id,
            movie: self.movie.title.clone(),
        });
        Ok(CustomerOutcome::Entered { food: self.food })
    }

    fn log(&self, theater: &Theater, msg: String) {
        if theater.config().verbose {
            println!("[{}][C{}] {msg}", timestr(), self.id);
        }
    }

    fn buy_ticket(&mut self, theater: &Theater) -> Result<bool, TheaterError> {
        let box_office = theater.station(Role::BoxOffice);
        self.log(
            theater,
            format!(
                "Heading to the box office ({} at the counter, {} waiting for a slot)",
                box_office.occupancy(),
                box_office.waiting()
            ),
        );
        let outcome = box_office.visit(self.request())?;
        self.got_ticket = outcome == VisitOutcome::TicketSold;
        self.log(theater, format!("Box office outcome: {outcome:?}"));
        Ok(self.got_ticket)
    }

    fn enter_lobby(&mut self, theater: &Theater) -> Result<(), TheaterError> {
        theater
            .narrator()
            .emit(Event::InLineForTicketTaker { customer: self.id });
        let outcome = theater.station(Role::TicketTaker).visit(self.request())?;
        self.log(theater, format!("Ticket taker outcome: {outcome:?}"));
        Ok(())
    }

    fn visit_concessions(&mut self, theater: &Theater) -> Result<bool, TheaterError> {
        let Some(food) = self.chooser.pick_food() else {
            self.log(theater, "Skipping the concession stand".to_string());
            return Ok(false);
        };
        self.food = Some(food);
        theater.narrator().emit(Event::InLineForFood {
            customer: self.id,
            food,
        });
        let outcome = theater.station(Role::Concession).visit(self.request())?;
        self.log(theater, format!("Concession outcome: {outcome:?}"));
        Ok(true)
    }
}

/// Chooser that always makes the same decisions.
#[cfg(test)]
pub(crate) struct Scripted {
    pub movie: usize,
    pub food: Option<Food>,
}

#[cfg(test)]
impl Scripted {
    pub fn new(movie: usize, food: Option<Food>) -> Self {
        Self { movie, food }
    }
}

#[cfg(test)]
impl Chooser for Scripted {
    fn pick_movie(&mut self, _choices: usize) -> usize {
        self.movie
    }

    fn pick_food(&mut self) -> Option<Food> {
        self.food
    }
}
