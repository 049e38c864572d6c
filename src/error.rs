use thiserror::Error;

#[derive(Error, Debug)]
pub enum AnalyticsError {
    #[error("Data unavailable: {0}")]
    DataUnavailable(String),

    #[error("Required column not found in source: {0}")]
    MissingColumn(String),

    #[error("Invalid record on row {row}: {details}")]
    InvalidRecord { row: usize, details: String },

    #[error("Insufficient history for forecast: {available} months available, {required} required")]
    InsufficientHistory { available: usize, required: usize },

    #[error("Forecast model fit failed: {0}")]
    FitFailure(String),

    #[error("Forecast deadline exceeded after {elapsed_ms} ms")]
    DeadlineExceeded { elapsed_ms: u128 },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Date calculation error: {0}")]
    DateError(String),

    #[error("CSV error: {0}")]
    CsvError(#[from] csv::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

impl AnalyticsError {
    /// True for the variants a dashboard should render as "no data" rather than as a fault.
    pub fn is_unavailable(&self) -> bool {
        matches!(
            self,
            AnalyticsError::DataUnavailable(_) | AnalyticsError::InsufficientHistory { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, AnalyticsError>;
