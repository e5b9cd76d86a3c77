use thiserror::Error;

#[derive(Debug, Error)]
pub enum LinkError {
    #[error("serial port error: {0}")]
    Serial(#[from] serialport::Error),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("radio link closed")]
    Closed,
    #[error("frame too large ({0} bytes)")]
    FrameTooLarge(usize),
}

/// Why a trace produced no usable signal reading.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum TraceError {
    #[error("timed out waiting for trace response")]
    Timeout,
    #[error("trace response carried {0} path hops, need at least 2")]
    InsufficientPath(usize),
    #[error("radio link failure: {0}")]
    LinkFailure(String),
    #[error("invalid mesh identity: {0:?}")]
    InvalidIdentity(String),
}

impl From<LinkError> for TraceError {
    fn from(err: LinkError) -> Self {
        TraceError::LinkFailure(err.to_string())
    }
}
