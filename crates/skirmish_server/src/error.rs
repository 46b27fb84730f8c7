//! Server error types.

use skirmish_core::error::GameError;
use thiserror::Error;

use crate::lobby::LobbyError;

/// Error type for server operations.
#[derive(Error, Debug)]
pub enum ServerError {
    /// Config or catalog file not found.
    #[error("File not found: {0}")]
    FileNotFound(String),
    /// Failed to read a file.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    /// Failed to parse RON config.
    #[error("Failed to parse config: {0}")]
    ConfigParse(#[from] ron::error::SpannedError),
    /// Config parsed but is inconsistent.
    #[error("Invalid config: {0}")]
    InvalidConfig(String),
    /// Template, codec or simulation failure.
    #[error("Game error: {0}")]
    Game(#[from] GameError),
    /// Certificate or key rejected.
    #[error("TLS configuration error: {0}")]
    Tls(String),
    /// QUIC connection failed or closed.
    #[error("Connection error: {0}")]
    Connection(#[from] quinn::ConnectionError),
    /// Failed writing to a stream.
    #[error("Stream write error: {0}")]
    Write(#[from] quinn::WriteError),
    /// Failed reading from a stream.
    #[error("Stream read error: {0}")]
    Read(#[from] quinn::ReadExactError),
    /// Stream was already finished.
    #[error("Stream closed: {0}")]
    ClosedStream(#[from] quinn::ClosedStream),
    /// Peer sent something out of order.
    #[error("Protocol violation: {0}")]
    Protocol(String),
    /// Slot claim refused by the lobby.
    #[error("Join rejected: {0}")]
    Rejected(#[from] LobbyError),
    /// The match loop task panicked or was cancelled.
    #[error("Match loop task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
    /// The match loop is no longer running.
    #[error("Match loop has shut down")]
    LoopClosed,
}

/// Result type for server operations.
pub type Result<T> = std::result::Result<T, ServerError>;
