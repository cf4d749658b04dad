use std::path::PathBuf;

use clap::Parser;
use error::TheaterError;
use movie::load_movies;
use narration::Narrator;
use theater::Config;

mod customer;
mod error;
mod movie;
mod narration;
mod report;
mod station;
mod sync;
mod theater;
mod util;
mod worker;

#[derive(Parser)]
#[clap(about, version)]
struct Args {
    /// Movie list, one `<title>\t<tickets>` entry per line
    #[arg(required = true)]
    movie_file: PathBuf,

    /// Number of box office agents
    #[arg(long, default_value_t = 2)]
    box_agents: usize,

    /// Number of ticket takers
    #[arg(long, default_value_t = 1)]
    ticket_takers: usize,

    /// Number of concession stand workers
    #[arg(long, default_value_t = 1)]
    concession_workers: usize,

    /// Number of customers to let through
    #[arg(long, default_value_t = 50)]
    customers: usize,

    /// Divisor applied to every simulated service time
    #[arg(long, default_value_t = 60)]
    time_scale: u32,

    /// Seed for customer choices; random when omitted
    #[arg(long)]
    seed: Option<u64>,

    /// Print timestamped protocol tracing
    #[arg(short, long)]
    verbose: bool,

    /// Hide the narrative
    #[arg(short, long)]
    quiet: bool,

    /// Print the end of run report as JSON
    #[arg(long)]
    json: bool,
}

// Usage: theater movies.txt --customers 20 --time-scale 600
fn main() -> Result<(), TheaterError> {
    let args = Args::parse();

    let config = Config {
        box_agents: args.box_agents,
        ticket_takers: args.ticket_takers,
        concession_workers: args.concession_workers,
        customers: args.customers,
        time_scale: args.time_scale,
        seed: args.seed,
        verbose: args.verbose,
    };
    config.validate()?;
    let movies = load_movies(&args.movie_file)?;

    let report = theater::run(config, movies, Narrator::new(args.quiet || args.json))?;
    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("{report}");
    }
    Ok(())
}
