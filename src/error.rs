use thiserror::Error;

/// Failures reported by a sensor source
#[derive(Error, Debug)]
pub enum SensorError {
    #[error("Sensor disconnected: {0}")]
    Disconnected(String),

    #[error("Malformed record on line {line}: {reason}")]
    Malformed { line: usize, reason: String },

    #[error("Sensor I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Source has no more samples. Not a failure for the session.
    #[error("End of sample stream")]
    EndOfStream,
}

/// Roll monitor error types
#[derive(Error, Debug)]
pub enum MonitorError {
    #[error("Invalid initial heading: {0}")]
    InvalidHeading(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error(transparent)]
    Sensor(#[from] SensorError),

    #[error("Report sink failed: {0}")]
    Sink(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, MonitorError>;
