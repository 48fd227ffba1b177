use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("{period}: end date cannot be earlier than or equal to start date")]
    DateOrder { period: &'static str },

    #[error("Failed to parse date: {0}")]
    DateParse(#[from] chrono::ParseError),

    #[error("Invalid area of interest: {0}")]
    Aoi(String),

    #[error("{name} threshold {value} must be within [-1, 1]")]
    Threshold { name: &'static str, value: f32 },

    #[error("QA60 {name} {value} must be below 16")]
    QaBit { name: &'static str, value: u8 },

    #[error("max_cloud_percentage {0} must be within [0, 100]")]
    CloudPercentage(f64),

    #[error("{name} must be positive, got {value}")]
    NotPositive { name: &'static str, value: f64 },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse JSON: {0}")]
    Json(#[from] serde_json::Error),
}
