use thiserror::Error;

pub type Result<T> = std::result::Result<T, PortfolioError>;

#[derive(Error, Debug)]
pub enum PortfolioError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Vector store error: {0}")]
    Database(String),

    #[error("Embedding error: {0}")]
    Embedding(String),

    #[error("Completion error: {0}")]
    Completion(String),

    #[error("Ingestion error: {0}")]
    Ingest(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Other error: {0}")]
    Other(#[from] anyhow::Error),
}

impl From<config::ConfigError> for PortfolioError {
    #[inline]
    fn from(e: config::ConfigError) -> Self {
        PortfolioError::Config(e.to_string())
    }
}

pub mod agent;
pub mod commands;
pub mod completion;
pub mod config;
pub mod embeddings;
pub mod index;
pub mod loader;
pub mod prompt;
pub mod retriever;
pub mod server;
