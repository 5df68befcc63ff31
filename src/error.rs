use thiserror::Error;

pub type Result<T> = std::result::Result<T, BifrostError>;

/// Unified error type for the Bifrost server
#[derive(Debug, Error)]
pub enum BifrostError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid bind address: {0}")]
    InvalidBindAddress(String),
    #[error("Invalid authoritative zone: {0}")]
    InvalidZone(String),
    #[error("Invalid port range: {0}..{1}")]
    InvalidPortRange(u16, u16),
    #[error("Configuration parse error: {0}")]
    ConfigParseError(String),

    #[error("DNS packet error: {0}")]
    Packet(#[from] ParseError),

    #[error("Zone parse error: {0}")]
    ZoneParseError(String),

    #[error("Server is shutting down")]
    ServerShutdown,
}

/// Wire-level DNS parse and encode failures
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("Invalid DNS header")]
    InvalidHeader,
    #[error("Invalid DNS label")]
    InvalidLabel,
    #[error("Invalid question section")]
    InvalidQuestionSection,
    #[error("Invalid resource record")]
    InvalidResourceRecord,
    #[error("Packet truncated mid-field")]
    UnexpectedEof,
    #[error("Invalid bit stream: {0}")]
    InvalidBitStream(String),
}

impl From<std::io::Error> for ParseError {
    fn from(err: std::io::Error) -> Self {
        if err.kind() == std::io::ErrorKind::UnexpectedEof {
            ParseError::UnexpectedEof
        } else {
            ParseError::InvalidBitStream(err.to_string())
        }
    }
}
