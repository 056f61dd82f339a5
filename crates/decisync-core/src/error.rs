use std::fmt;

use thiserror::Error;

/// Status used when the upstream could not be reached at all.
pub const TRANSPORT_STATUS: u16 = 0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Upstream answered 404 for the requested resource.
    NotFound,
    /// Upstream rejected the call, or could not be reached (status 0).
    Api,
    /// A response body did not have the expected shape.
    Decode,
    /// Arguments were rejected before any request was made.
    InvalidInput,
    /// The decision store failed to read or write.
    Storage,
    /// The generative-text service failed.
    Generation,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::NotFound => "not_found",
            Self::Api => "api",
            Self::Decode => "decode",
            Self::InvalidInput => "invalid_input",
            Self::Storage => "storage",
            Self::Generation => "generation",
        };
        f.write_str(label)
    }
}

/// Tagged error shared by every stage of the pipeline.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{kind} error (status {status}): {context}")]
pub struct DecisionError {
    pub kind: ErrorKind,
    pub status: u16,
    pub context: String,
}

impl DecisionError {
    pub fn new(kind: ErrorKind, status: u16, context: impl Into<String>) -> Self {
        Self {
            kind,
            status,
            context: context.into(),
        }
    }

    pub fn not_found(context: impl Into<String>) -> Self {
        Self::new(ErrorKind::NotFound, 404, context)
    }

    pub fn api(status: u16, context: impl Into<String>) -> Self {
        Self::new(ErrorKind::Api, status, context)
    }

    pub fn transport(context: impl Into<String>) -> Self {
        Self::new(ErrorKind::Api, TRANSPORT_STATUS, context)
    }

    pub fn decode(status: u16, context: impl Into<String>) -> Self {
        Self::new(ErrorKind::Decode, status, context)
    }

    pub fn invalid_input(context: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidInput, TRANSPORT_STATUS, context)
    }

    pub fn storage(context: impl Into<String>) -> Self {
        Self::new(ErrorKind::Storage, TRANSPORT_STATUS, context)
    }

    pub fn generation(status: u16, context: impl Into<String>) -> Self {
        Self::new(ErrorKind::Generation, status, context)
    }

    pub fn is_not_found(&self) -> bool {
        self.kind == ErrorKind::NotFound
    }

    /// True when the service was never reached, as opposed to rejecting the call.
    pub fn is_transport(&self) -> bool {
        self.kind == ErrorKind::Api && self.status == TRANSPORT_STATUS
    }
}
