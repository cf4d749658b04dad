use thiserror::Error;

#[macro_export]
macro_rules! config_error {
    ($($arg:tt)*) => {
        $crate::error::TheaterError::Configuration(format!($($arg)*))
    };
}

#[derive(Error, Debug)]
pub enum TheaterError {
    /// Bad movie source or run parameters. Fatal, raised before anything is spawned.
    #[error("Configuration error: {0}")]
    Configuration(String),
    /// A blocked wait was interrupted by shutdown.
    #[error("Cancelled while {0}")]
    Cancelled(String),
    /// A worker was handed a visit it cannot serve.
    #[error("Protocol error: {0}")]
    Protocol(String),
    #[error("Thread error: {0}")]
    Thread(String),
    #[error("Report error: {0}")]
    Report(#[from] serde_json::Error),
}

impl TheaterError {
    pub fn cancelled(during: &str) -> Self {
        TheaterError::Cancelled(during.to_string())
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, TheaterError::Cancelled(_))
    }
}

impl From<anyhow::Error> for TheaterError {
    fn from(value: anyhow::Error) -> Self {
        TheaterError::Configuration(
            value
                .chain()
                .map(|err| err.to_string())
                .collect::<Vec<_>>()
                .join(": "),
        )
    }
}
