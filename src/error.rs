//! Error types for the distribution engine
//!
//! This module defines the error type shared by all components of the
//! engine.

use std::fmt;

/// Error type for engine operations
#[derive(Debug, Clone)]
pub enum EngineError {
    /// Wire or record decoding errors
    Parse {
        message: String,
        source: Option<String>,
    },

    /// On-disk storage errors
    Storage {
        message: String,
        path: Option<String>,
        source: Option<String>,
    },

    /// Face (transport) errors
    Face {
        message: String,
        source: Option<String>,
    },

    /// A received or loaded object failed name-chain verification
    Verification { name: String },

    /// Prefix registration was refused by the face
    Registration { prefix: String, reason: String },

    /// Configuration errors
    Config {
        message: String,
        field: Option<String>,
    },
}

impl EngineError {
    /// Create a new Parse error
    pub fn parse_error(message: impl Into<String>) -> Self {
        EngineError::Parse {
            message: message.into(),
            source: None,
        }
    }

    /// Create a new Parse error with source
    pub fn parse_error_with_source(message: impl Into<String>, source: impl Into<String>) -> Self {
        EngineError::Parse {
            message: message.into(),
            source: Some(source.into()),
        }
    }

    /// Create a new Storage error
    pub fn storage_error(message: impl Into<String>) -> Self {
        EngineError::Storage {
            message: message.into(),
            path: None,
            source: None,
        }
    }

    /// Create a new Storage error with path
    pub fn storage_error_with_path(message: impl Into<String>, path: impl Into<String>) -> Self {
        EngineError::Storage {
            message: message.into(),
            path: Some(path.into()),
            source: None,
        }
    }

    /// Create a new Storage error with path and source
    pub fn storage_error_full(
        message: impl Into<String>,
        path: impl Into<String>,
        source: impl Into<String>,
    ) -> Self {
        EngineError::Storage {
            message: message.into(),
            path: Some(path.into()),
            source: Some(source.into()),
        }
    }

    /// Create a new Face error
    pub fn face_error(message: impl Into<String>) -> Self {
        EngineError::Face {
            message: message.into(),
            source: None,
        }
    }

    /// Create a new Verification error
    pub fn verification_error(name: impl Into<String>) -> Self {
        EngineError::Verification { name: name.into() }
    }

    /// Create a new Registration error
    pub fn registration_error(prefix: impl Into<String>, reason: impl Into<String>) -> Self {
        EngineError::Registration {
            prefix: prefix.into(),
            reason: reason.into(),
        }
    }

    /// Create a new Config error
    pub fn config_error(message: impl Into<String>) -> Self {
        EngineError::Config {
            message: message.into(),
            field: None,
        }
    }

    /// Create a new Config error with field
    pub fn config_error_with_field(message: impl Into<String>, field: impl Into<String>) -> Self {
        EngineError::Config {
            message: message.into(),
            field: Some(field.into()),
        }
    }
}

impl fmt::Display for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EngineError::Parse { message, source } => {
                if let Some(src) = source {
                    write!(f, "Parse error: {} (source: {})", message, src)
                } else {
                    write!(f, "Parse error: {}", message)
                }
            }
            EngineError::Storage {
                message,
                path,
                source,
            } => match (path, source) {
                (Some(p), Some(s)) => {
                    write!(f, "Storage error: {} (path: {}, source: {})", message, p, s)
                }
                (Some(p), None) => write!(f, "Storage error: {} (path: {})", message, p),
                (None, Some(s)) => write!(f, "Storage error: {} (source: {})", message, s),
                (None, None) => write!(f, "Storage error: {}", message),
            },
            EngineError::Face { message, source } => {
                if let Some(src) = source {
                    write!(f, "Face error: {} (source: {})", message, src)
                } else {
                    write!(f, "Face error: {}", message)
                }
            }
            EngineError::Verification { name } => {
                write!(f, "Verification failed for {}", name)
            }
            EngineError::Registration { prefix, reason } => {
                write!(f, "Failed to register prefix {}: {}", prefix, reason)
            }
            EngineError::Config { message, field } => {
                if let Some(field_val) = field {
                    write!(f, "Config error: {} (field: {})", message, field_val)
                } else {
                    write!(f, "Config error: {}", message)
                }
            }
        }
    }
}

impl std::error::Error for EngineError {}

impl From<std::io::Error> for EngineError {
    fn from(err: std::io::Error) -> Self {
        EngineError::Storage {
            message: err.to_string(),
            path: None,
            source: Some(err.kind().to_string()),
        }
    }
}

impl From<serde_bencode::Error> for EngineError {
    fn from(err: serde_bencode::Error) -> Self {
        EngineError::parse_error_with_source("Failed to decode bencoded record", err.to_string())
    }
}
