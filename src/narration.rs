use std::fmt::Display;

use crossbeam::channel::Sender;

use crate::customer::Food;

/// Something a spectator of the theater could see happen.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Event {
    WorkerCreated { worker: String },
    TheaterOpen,
    CustomerCreated { customer: usize, movie: String },
    Serving { worker: String, customer: usize },
    TicketSold { worker: String, customer: usize, movie: String },
    TicketDenied { worker: String, customer: usize, movie: String },
    CustomerLeft { customer: usize, movie: String },
    InLineForTicketTaker { customer: usize },
    TicketTaken { customer: usize },
    InLineForFood { customer: usize, food: Food },
    FoodOrdered { customer: usize, food: Food },
    FoodGiven { customer: usize, food: Food },
    CustomerEntered { customer: usize, movie: String },
    CustomerCancelled { customer: usize, reason: String },
    CustomerJoined { customer: usize },
    WorkerStopped { worker: String, served: usize },
}

impl Event {
    /// Customer the event concerns, if any.
    #[cfg(test)]
    pub fn customer(&self) -> Option<usize> {
        match self {
            Event::WorkerCreated { .. } | Event::TheaterOpen | Event::WorkerStopped { .. } => None,
            Event::CustomerCreated { customer, .. }
            | Event::Serving { customer, .. }
            | Event::TicketSold { customer, .. }
            | Event::TicketDenied { customer, .. }
            | Event::CustomerLeft { customer, .. }
            | Event::InLineForTicketTaker { customer }
            | Event::TicketTaken { customer }
            | Event::InLineForFood { customer, .. }
            | Event::FoodOrdered { customer, .. }
            | Event::FoodGiven { customer, .. }
            | Event::CustomerEntered { customer, .. }
            | Event::CustomerCancelled { customer, .. }
            | Event::CustomerJoined { customer } => Some(*customer),
        }
    }
}

impl Display for Event {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Event::WorkerCreated { worker } => write!(f, "{worker} created"),
            Event::TheaterOpen => write!(f, "Theater is open"),
            Event::CustomerCreated { customer, movie } => {
                write!(f, "Customer {customer} created, buying ticket to {movie}")
            }
            Event::Serving { worker, customer } => {
                write!(f, "{worker} serving Customer {customer}")
            }
            Event::TicketSold { worker, customer, movie } => {
                write!(f, "{worker} sold ticket for {movie} to Customer {customer}")
            }
            Event::TicketDenied { worker, customer, movie } => write!(
                f,
                "{worker} was unable to sell ticket for {movie} to Customer {customer}"
            ),
            Event::CustomerLeft { customer, movie } => write!(
                f,
                "Customer {customer} did not get a ticket to {movie} and left"
            ),
            Event::InLineForTicketTaker { customer } => {
                write!(f, "Customer {customer} in line to see ticket taker")
            }
            Event::TicketTaken { customer } => write!(f, "Ticket taken from Customer {customer}"),
            Event::InLineForFood { customer, food } => {
                write!(f, "Customer {customer} in line to buy {food}")
            }
            Event::FoodOrdered { customer, food } => {
                write!(f, "Order for {food} from Customer {customer}")
            }
            Event::FoodGiven { customer, food } => write!(f, "{food} given to Customer {customer}"),
            Event::CustomerEntered { customer, movie } => {
                write!(f, "Customer {customer} entered theater to see {movie}")
            }
            Event::CustomerCancelled { customer, reason } => {
                write!(f, "Customer {customer} gave up: {reason}")
            }
            Event::CustomerJoined { customer } => write!(f, "Joined customer {customer}"),
            Event::WorkerStopped { worker, served } => {
                write!(f, "{worker} went home after serving {served} customers")
            }
        }
    }
}

/// Prints narrative events and optionally forwards them to a listener.
#[derive(Clone, Default)]
pub struct Narrator {
    quiet: bool,
    sink: Option<Sender<Event>>,
}

impl Narrator {
    pub fn new(quiet: bool) -> Self {
        Self { quiet, sink: None }
    }

    pub fn with_sink(mut self, sink: Sender<Event>) -> Self {
        self.sink = Some(sink);
        self
    }

    pub fn emit(&self, event: Event) {
        if !self.quiet {
            println!("{event}");
        }
        if let Some(sink) = &self.sink {
            // a listener that went away just stops listening
            let _ = sink.send(event);
        }
    }
}
