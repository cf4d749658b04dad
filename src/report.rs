use std::{fmt::Display, sync::Arc};

use serde::Serialize;

use crate::{
    customer::{CustomerOutcome, Food},
    movie::Movie,
    station::Station,
};

#[derive(Debug, Default, Serialize)]
pub struct FoodTally {
    pub popcorn: usize,
    pub soda: usize,
    pub both: usize,
}

impl FoodTally {
    fn add(&mut self, food: Food) {
        match food {
            Food::Popcorn => self.popcorn += 1,
            Food::Soda => self.soda += 1,
            Food::Both => self.both += 1,
        }
    }

    pub fn total(&self) -> usize {
        self.popcorn + self.soda + self.both
    }
}

#[derive(Debug, Serialize)]
pub struct MovieReport {
    pub title: String,
    pub initial: usize,
    pub remaining: usize,
    pub sold: usize,
}

#[derive(Debug, Serialize)]
pub struct StationReport {
    pub name: String,
    pub capacity: usize,
    pub served: usize,
    pub peak_occupancy: usize,
}

/// End of run summary.
#[derive(Debug, Serialize)]
pub struct Report {
    pub seed: u64,
    pub customers: usize,
    pub entered: usize,
    pub turned_away: usize,
    pub cancelled: usize,
    pub food: FoodTally,
    pub movies: Vec<MovieReport>,
    pub stations: Vec<StationReport>,
}

impl Report {
    pub fn new<'a>(
        seed: u64,
        outcomes: &[CustomerOutcome],
        movies: &[Arc<Movie>],
        stations: impl IntoIterator<Item = &'a Station>,
    ) -> Self {
        let mut report = Report {
            seed,
            customers: outcomes.len(),
            entered: 0,
            turned_away: 0,
            cancelled: 0,
            food: FoodTally::default(),
            movies: movies
                .iter()
                .map(|movie| MovieReport {
                    title: movie.title.clone(),
                    initial: movie.initial_tickets(),
                    remaining: movie.tickets_available(),
                    sold: movie.tickets_sold(),
                })
                .collect(),
            stations: stations
                .into_iter()
                .map(|station| StationReport {
                    name: station.name().to_string(),
                    capacity: station.capacity(),
                    served: station.served(),
                    peak_occupancy: station.peak_occupancy(),
                })
                .collect(),
        };

        for outcome in outcomes {
            match outcome {
                CustomerOutcome::Entered { food } => {
                    report.entered += 1;
                    if let Some(food) = food {
                        report.food.add(*food);
                    }
                }
                CustomerOutcome::TurnedAway => report.turned_away += 1,
                CustomerOutcome::Cancelled => report.cancelled += 1,
            }
        }
        report
    }
}

impl Display for Report {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "----------------------------")?;
        writeln!(f, "Seed:          {}", self.seed)?;
        writeln!(f, "Customers:     {}", self.customers)?;
        writeln!(f, "Entered:       {}", self.entered)?;
        writeln!(f, "Turned away:   {}", self.turned_away)?;
        if self.cancelled > 0 {
            writeln!(f, "Cancelled:     {}", self.cancelled)?;
        }
        writeln!(
            f,
            "Food orders:   {} ({} popcorn, {} soda, {} both)",
            self.food.total(),
            self.food.popcorn,
            self.food.soda,
            self.food.both
        )?;
        writeln!(f)?;
        writeln!(f, "Movies:")?;
        for movie in &self.movies {
            writeln!(
                f,
                "  {:<24} {:>4} sold, {:>4} left",
                movie.title, movie.sold, movie.remaining
            )?;
        }
        writeln!(f)?;
        writeln!(f, "Stations:")?;
        for station in &self.stations {
            writeln!(
                f,
                "  {:<24} {:>4} served, peak {}/{}",
                station.name, station.served, station.peak_occupancy, station.capacity
            )?;
        }
        write!(f, "----------------------------")
    }
}
