use std::{
    fmt::Display,
    fs,
    path::Path,
    sync::{Arc, Mutex, PoisonError},
};

use anyhow::Context;

use crate::{config_error, error::TheaterError};

/// A movie with a title and a ticket counter.
#[derive(Debug)]
pub struct Movie {
    pub title: String,
    initial: usize,
    available: Mutex<usize>,
}

impl Movie {
    pub fn new(title: impl Into<String>, tickets: usize) -> Self {
        Self {
            title: title.into(),
            initial: tickets,
            available: Mutex::new(tickets),
        }
    }

    /// Take `count` tickets if that many are left. Leaves the counter untouched otherwise.
    pub fn try_purchase(&self, count: usize) -> bool {
        let mut available = self
            .available
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if *available >= count {
            *available -= count;
            true
        } else {
            false
        }
    }

    pub fn tickets_available(&self) -> usize {
        *self
            .available
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    pub fn initial_tickets(&self) -> usize {
        self.initial
    }

    pub fn tickets_sold(&self) -> usize {
        self.initial - self.tickets_available()
    }
}

impl Display for Movie {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}", self.title, self.tickets_available())
    }
}

/// Parse a movie list: one `<title>\t<tickets>` entry per line, blank lines ignored.
pub fn parse_movies(content: &str) -> Result<Vec<Arc<Movie>>, TheaterError> {
    let movies = content
        .lines()
        .enumerate()
        .map(|(index, line)| (index + 1, line.trim()))
        .filter(|(_, line)| !line.is_empty())
        .map(|(line_no, line)| -> Result<_, TheaterError> {
            let (title, tickets) = line
                .split_once('\t')
                .ok_or_else(|| config_error!("line {line_no}: expected <title><tab><tickets>"))?;
            let title = title.trim();
            if title.is_empty() {
                return Err(config_error!("line {line_no}: movie title is empty"));
            }
            let tickets = tickets.trim().parse::<usize>().map_err(|err| {
                config_error!("line {line_no}: invalid ticket count {tickets:?}: {err}")
            })?;
            Ok(Arc::new(Movie::new(title, tickets)))
        })
        .collect::<Result<Vec<_>, _>>()?;

    if movies.is_empty() {
        return Err(config_error!("movie list is empty"));
    }
    Ok(movies)
}

/// Load the movie list from a file.
pub fn load_movies(path: impl AsRef<Path>) -> Result<Vec<Arc<Movie>>, TheaterError> {
    let path = path.as_ref();
    let content = fs::read_to_string(path)
        .with_context(|| format!("Movie file {} could not be opened", path.display()))?;
    parse_movies(&content)
}
