use async_trait::async_trait;
use tokio::sync::mpsc;

use super::error::LinkError;

/// One hop of a trace response path.
#[derive(Debug, Clone, PartialEq)]
pub struct PathHop {
    /// Routing hash of the hop, absent for the final leg back to us.
    pub hash: Option<u8>,
    pub snr: f32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TraceCompletion {
    pub tag: u32,
    pub path: Vec<PathHop>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum LinkEvent {
    TraceData(TraceCompletion),
    /// The radio answered a command with an error code.
    CommandRejected { code: Option<u8> },
    /// The byte stream failed; no further events will arrive.
    Disconnected,
}

pub type EventSender = mpsc::UnboundedSender<LinkEvent>;

/// An open connection to a radio.
#[async_trait]
pub trait RadioLink: Send + Sync {
    /// Writes a trace command. Completion arrives later on the event feed.
    async fn send_trace(&self, tag: u32, path: &[u8]) -> Result<(), LinkError>;

    fn is_alive(&self) -> bool;

    /// Stops the event feed and releases the device. Safe to call repeatedly.
    fn close(&self);
}

/// Opens radio links, wiring their event feed into `events`.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn open(&self, events: EventSender) -> Result<Box<dyn RadioLink>, LinkError>;

    /// Human readable device description for logs and status messages.
    fn describe(&self) -> String;
}
