use thiserror::Error;

pub type Result<T> = std::result::Result<T, RagError>;

#[derive(Error, Debug)]
pub enum RagError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Record store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("Similarity backend unavailable: {0}")]
    BackendUnavailable(String),

    #[error("Completion error: {0}")]
    Completion(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("MCP error: {0}")]
    Mcp(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Other error: {0}")]
    Other(#[from] anyhow::Error),
}

pub mod answer;
pub mod commands;
pub mod completion;
pub mod config;
pub mod database;
pub mod embeddings;
pub mod http;
pub mod mcp;
pub mod retrieval;
