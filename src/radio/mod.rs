mod error;
mod frame;
mod link;
mod manager;
#[cfg(test)]
pub(crate) mod mock;
mod serial;
mod trace;

pub use error::{LinkError, TraceError};
pub use manager::{RadioLease, RadioManager, RadioStatus};
pub use serial::SerialConnector;
pub use trace::{routing_hash, TraceClient, TraceResult, DEFAULT_TRACE_TIMEOUT};
