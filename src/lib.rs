use thiserror::Error;

pub type Result<T> = std::result::Result<T, SupportError>;

#[derive(Error, Debug)]
pub enum SupportError {
    #[error("Record is missing required field: {field}")]
    MissingField { field: &'static str },

    #[error("Index creation error: {0}")]
    IndexCreation(String),

    #[error("Data load error: {0}")]
    DataLoad(String),

    #[error("Retrieval error: {0}")]
    Retrieval(String),

    #[error("Completion error: {0}")]
    Completion(String),

    #[error("Embedding error: {0}")]
    Embedding(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Other error: {0}")]
    Other(#[from] anyhow::Error),
}

pub mod app_description;
pub mod chat;
pub mod commands;
pub mod completion;
pub mod config;
pub mod conversation;
pub mod embeddings;
pub mod http;
pub mod indexer;
pub mod openai;
pub mod records;
pub mod retrieval;
pub mod server;
pub mod vector_index;

#[cfg(test)]
pub(crate) mod test_support;
