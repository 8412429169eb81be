pub mod parser;

pub use parser::{parse_uci_message, UciMessage};

/// Errors surfaced by an engine session.
#[derive(Debug, thiserror::Error)]
pub enum UciError {
    #[error("failed to spawn engine: {0}")]
    SpawnFailed(std::io::Error),
    #[error("engine has no stdin")]
    NoStdin,
    #[error("engine has no stdout")]
    NoStdout,
    #[error("engine stdin write failed: {0}")]
    WriteFailed(std::io::Error),
    #[error(
        "unterminated line of {} bytes overflows the {} byte line buffer ({} bytes free)",
        .line.len(),
        .buffer_size,
        .buffer_free
    )]
    LineBufferOverflow {
        /// The unterminated line that caused the overflow.
        line: String,
        /// Configured size of the line buffer.
        buffer_size: usize,
        /// Free bytes in the buffer when the overflowing write arrived.
        buffer_free: usize,
    },
    #[error("malformed UCI message: {0}")]
    MalformedMessage(String),
    #[error("unknown UCI message: {0}")]
    UnknownMessage(String),
    #[error("timed out waiting for engine")]
    Timeout,
    #[error("invalid engine option in config: {0}")]
    InvalidOption(String),
    #[error("invalid engine config: {0}")]
    InvalidConfig(String),
    #[error("config I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("config parse error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("engine session faulted, reader terminated")]
    SessionFaulted,
    #[error("engine has already exited")]
    AlreadyExited,
    #[error("uci handshake already performed")]
    HandshakeComplete,
}
