use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use log::{debug, error, info, warn};
use serde::Serialize;
use tokio::sync::{mpsc, oneshot, Mutex};
use tokio::task::JoinHandle;
use tokio::time::Instant;

use super::error::{LinkError, TraceError};
use super::link::{Connector, LinkEvent, RadioLink, TraceCompletion};

/// Number of identity characters the radio uses as a path hint (one hex byte).
pub const ROUTING_HASH_LEN: usize = 2;

pub const DEFAULT_TRACE_TIMEOUT: Duration = Duration::from_secs(10);

type Pending = Arc<StdMutex<HashMap<u32, oneshot::Sender<Result<TraceCompletion, TraceError>>>>>;

/// Signal-to-noise ratio in each direction of a successful trace, in dB.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct TraceResult {
    pub snr_to_target: f32,
    pub snr_from_target: f32,
}

impl TraceResult {
    /// Recorded in place of a reading when the trace failed.
    pub const FAILED: TraceResult = TraceResult {
        snr_to_target: 0.0,
        snr_from_target: 0.0,
    };

    fn from_completion(completion: &TraceCompletion) -> Result<Self, TraceError> {
        match completion.path.as_slice() {
            [forward, reverse, ..] => Ok(TraceResult {
                snr_to_target: forward.snr,
                snr_from_target: reverse.snr,
            }),
            path => Err(TraceError::InsufficientPath(path.len())),
        }
    }
}

#[derive(Debug, Clone)]
pub struct TraceRequest {
    pub routing_hash: u8,
    pub tag: u32,
}

/// Derives the one-byte path hint from a node's mesh identity.
pub fn routing_hash(identity: &str) -> Result<u8, TraceError> {
    let prefix = identity
        .get(..ROUTING_HASH_LEN)
        .filter(|p| p.bytes().all(|b| b.is_ascii_hexdigit()))
        .ok_or_else(|| TraceError::InvalidIdentity(identity.to_string()))?;
    u8::from_str_radix(prefix, 16).map_err(|_| TraceError::InvalidIdentity(identity.to_string()))
}

/// Turns the radio's fire-and-forget trace command into a timeout-bounded call.
pub struct TraceClient {
    link: Arc<dyn RadioLink>,
    pending: Pending,
    faulted: Arc<AtomicBool>,
    in_flight: Mutex<()>,
    timeout: Duration,
    dispatcher: JoinHandle<()>,
}

impl TraceClient {
    pub async fn open(connector: &dyn Connector, timeout: Duration) -> Result<Self, LinkError> {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let link: Arc<dyn RadioLink> = Arc::from(connector.open(events_tx).await?);

        let pending: Pending = Arc::new(StdMutex::new(HashMap::new()));
        let faulted = Arc::new(AtomicBool::new(false));
        let dispatcher = tokio::spawn(dispatch_events(
            events_rx,
            link.clone(),
            pending.clone(),
            faulted.clone(),
        ));

        Ok(Self {
            link,
            pending,
            faulted,
            in_flight: Mutex::new(()),
            timeout,
            dispatcher,
        })
    }

    pub fn is_alive(&self) -> bool {
        !self.is_faulted() && self.link.is_alive()
    }

    /// True once the link reported a hard failure; the client will not recover.
    pub fn is_faulted(&self) -> bool {
        self.faulted.load(Ordering::Acquire)
    }

    pub async fn measure(&self, identity: &str) -> Result<TraceResult, TraceError> {
        let routing_hash = routing_hash(identity)?;

        let _turn = self.in_flight.lock().await;
        if self.is_faulted() {
            return Err(TraceError::LinkFailure("radio link faulted".into()));
        }

        let (registration, response) = self.register();
        let request = TraceRequest {
            routing_hash,
            tag: registration.tag,
        };
        info!(
            "Sending trace to {} (hash: {:02x}, tag: {:08x})",
            identity, request.routing_hash, request.tag
        );

        let started = Instant::now();
        self.link
            .send_trace(request.tag, &[request.routing_hash])
            .await?;

        let completion = match tokio::time::timeout(self.timeout, response).await {
            Ok(Ok(result)) => result?,
            Ok(Err(_)) => return Err(TraceError::LinkFailure("event feed closed".into())),
            Err(_) => {
                error!(
                    "Timeout waiting for trace response after {:.2}s",
                    started.elapsed().as_secs_f64()
                );
                return Err(TraceError::Timeout);
            }
        };
        drop(registration);

        info!(
            "Trace response received in {:.2}s ({} hops)",
            started.elapsed().as_secs_f64(),
            completion.path.len()
        );
        TraceResult::from_completion(&completion)
    }

    fn register(
        &self,
    ) -> (
        Registration,
        oneshot::Receiver<Result<TraceCompletion, TraceError>>,
    ) {
        let (tx, rx) = oneshot::channel();
        let mut pending = self.pending.lock().unwrap_or_else(|e| e.into_inner());
        let tag = loop {
            let candidate = rand::random::<u32>();
            if candidate != 0 && !pending.contains_key(&candidate) {
                break candidate;
            }
        };
        pending.insert(tag, tx);
        (
            Registration {
                tag,
                pending: self.pending.clone(),
            },
            rx,
        )
    }

    #[cfg(test)]
    pub(crate) fn pending_count(&self) -> usize {
        self.pending.lock().unwrap().len()
    }
}

impl Drop for TraceClient {
    fn drop(&mut self) {
        self.link.close();
        self.dispatcher.abort();
        debug!("Trace client released");
    }
}

/// Removes a correlation slot when the waiting call finishes, however it finishes.
struct Registration {
    tag: u32,
    pending: Pending,
}

impl Drop for Registration {
    fn drop(&mut self) {
        self.pending
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&self.tag);
    }
}

async fn dispatch_events(
    mut events: mpsc::UnboundedReceiver<LinkEvent>,
    link: Arc<dyn RadioLink>,
    pending: Pending,
    faulted: Arc<AtomicBool>,
) {
    while let Some(event) = events.recv().await {
        match event {
            LinkEvent::TraceData(completion) => {
                let waiter = pending
                    .lock()
                    .unwrap_or_else(|e| e.into_inner())
                    .remove(&completion.tag);
                match waiter {
                    Some(tx) => {
                        let _ = tx.send(Ok(completion));
                    }
                    None => warn!(
                        "Dropping trace data with unknown tag {:08x}",
                        completion.tag
                    ),
                }
            }
            LinkEvent::CommandRejected { code } => {
                warn!("Radio rejected command (code: {:?})", code);
                fail_all(&pending, TraceError::LinkFailure("radio rejected trace".into()));
            }
            LinkEvent::Disconnected => {
                error!("Radio link disconnected");
                fault(&link, &faulted);
                fail_all(&pending, TraceError::LinkFailure("radio disconnected".into()));
                return;
            }
        }
    }
    fault(&link, &faulted);
    fail_all(&pending, TraceError::LinkFailure("event feed closed".into()));
}

/// Marks the client dead and releases the device, even while leases remain.
fn fault(link: &Arc<dyn RadioLink>, faulted: &AtomicBool) {
    link.close();
    faulted.store(true, Ordering::Release);
}

fn fail_all(pending: &Pending, err: TraceError) {
    let waiters: Vec<_> = pending
        .lock()
        .unwrap_or_else(|e| e.into_inner())
        .drain()
        .collect();
    for (_, tx) in waiters {
        let _ = tx.send(Err(err.clone()));
    }
}
