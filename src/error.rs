use thiserror::Error;

#[derive(Error, Debug)]
pub enum BeatError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Kafka error: {0}")]
    Kafka(#[from] rdkafka::error::KafkaError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Regex error: {0}")]
    Regex(#[from] regex::Error),

    #[error("Connectivity error: {0}")]
    Connectivity(String),

    #[error("Broker error: {0}")]
    Broker(String),

    #[error("Coordinator error: {0}")]
    Coordinator(String),

    #[error("HTTP server error: {0}")]
    Http(String),
}

pub type Result<T> = std::result::Result<T, BeatError>;
