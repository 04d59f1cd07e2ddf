//! Error handling for zonewalk

use thiserror::Error;

/// Main error type for zonewalk
#[derive(Error, Debug)]
pub enum WalkError {
    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Bootstrap error for '{domain}': {message}")]
    Bootstrap { domain: String, message: String },

    #[error("Transport error talking to {server}: {message}")]
    Transport {
        server: String,
        message: String,
        timed_out: bool,
    },

    #[error("Bad response from {server}: {message}")]
    Responder { server: String, message: String },

    #[error("Consistency error: {message}")]
    Consistency { message: String },

    #[error("Invalid record: {message}")]
    InvalidRecord {
        message: String,
        line: Option<String>,
    },

    #[error("Invalid NSEC3 input: {message}")]
    Hash { message: String },

    #[error("DNS protocol error: {message}")]
    Protocol { message: String },

    #[error("IO error: {message}")]
    Io {
        message: String,
        path: Option<String>,
    },
}

impl WalkError {
    /// Create a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Create a bootstrap error
    pub fn bootstrap(domain: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Bootstrap {
            domain: domain.into(),
            message: message.into(),
        }
    }

    /// Create a transport error
    pub fn transport(
        server: impl Into<String>,
        message: impl Into<String>,
        timed_out: bool,
    ) -> Self {
        Self::Transport {
            server: server.into(),
            message: message.into(),
            timed_out,
        }
    }

    /// Create a responder error
    pub fn responder(server: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Responder {
            server: server.into(),
            message: message.into(),
        }
    }

    /// Create a consistency error
    pub fn consistency(message: impl Into<String>) -> Self {
        Self::Consistency {
            message: message.into(),
        }
    }

    /// Create an invalid-record error
    pub fn invalid_record(message: impl Into<String>, line: Option<String>) -> Self {
        Self::InvalidRecord {
            message: message.into(),
            line,
        }
    }

    /// Create an invalid-hash-input error
    pub fn hash(message: impl Into<String>) -> Self {
        Self::Hash {
            message: message.into(),
        }
    }

    /// Create an IO error
    pub fn io(message: impl Into<String>, path: Option<String>) -> Self {
        Self::Io {
            message: message.into(),
            path,
        }
    }

    /// Check whether this error means the peer is unreachable, so the
    /// caller should back off instead of reporting it.
    pub fn is_no_connection(&self) -> bool {
        match self {
            Self::Transport {
                message, timed_out, ..
            } => {
                *timed_out
                    || message.contains("no route")
                    || message.contains("unreachable")
                    || message.contains("timed out")
            }
            _ => false,
        }
    }
}

/// Convert from common error types
impl From<std::io::Error> for WalkError {
    fn from(err: std::io::Error) -> Self {
        Self::io(err.to_string(), None)
    }
}

impl From<hickory_proto::error::ProtoError> for WalkError {
    fn from(err: hickory_proto::error::ProtoError) -> Self {
        Self::Protocol {
            message: err.to_string(),
        }
    }
}

/// Result type alias for convenience
pub type Result<T> = std::result::Result<T, WalkError>;
