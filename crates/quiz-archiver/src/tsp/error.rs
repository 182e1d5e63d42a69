use thiserror::Error;

#[derive(Error, Debug)]
pub enum TspError {
    #[error("Invalid timestamp request input: {0}")]
    InvalidInput(String),

    #[error("Failed to generate nonce: {0}")]
    Entropy(#[from] getrandom::Error),

    #[error("Failed to reach TSP server: {0}")]
    Transport(String),

    #[error("Unexpected TSP server response: {0}")]
    Protocol(String),
}
