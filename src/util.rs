use std::time::Duration;

use chrono::Utc;

pub fn timestr() -> String {
    Utc::now().format("%T.%f").to_string()
}

/// Shrink a simulated duration (in milliseconds) by the run's time scale.
pub fn scaled(millis: u64, time_scale: u32) -> Duration {
    Duration::from_millis(millis) / time_scale.max(1)
}

/// Append a worker's id to its title unless it is the only one of its kind.
pub fn numbered(title: &str, id: usize, of: usize) -> String {
    if of == 1 {
        title.to_string()
    } else {
        format!("{title} {id}")
    }
}
