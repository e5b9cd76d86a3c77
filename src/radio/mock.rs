//! Scripted in-process radio used by tests.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use async_trait::async_trait;

use super::error::LinkError;
use super::link::{Connector, EventSender, LinkEvent, PathHop, RadioLink, TraceCompletion};

#[derive(Debug, Clone)]
pub enum Reply {
    Path { snrs: Vec<f32>, delay: Duration },
    Silent,
    Reject,
    Disconnect,
    WriteFails,
}

impl Reply {
    pub fn path(snrs: &[f32]) -> Self {
        Self::delayed(snrs, Duration::ZERO)
    }

    pub fn delayed(snrs: &[f32], delay: Duration) -> Self {
        Reply::Path {
            snrs: snrs.to_vec(),
            delay,
        }
    }
}

#[derive(Debug, Clone)]
pub struct SentTrace {
    pub tag: u32,
    pub path: Vec<u8>,
    pub at: Instant,
}

#[derive(Default)]
struct Shared {
    script: Mutex<VecDeque<Reply>>,
    sent: Mutex<Vec<SentTrace>>,
    events: Mutex<Option<EventSender>>,
    outstanding: AtomicUsize,
    max_outstanding: AtomicUsize,
    opens: AtomicUsize,
    closes: AtomicUsize,
    refuse_open: AtomicBool,
}

#[derive(Clone, Default)]
pub struct ScriptedConnector {
    shared: Arc<Shared>,
}

impl ScriptedConnector {
    pub fn new(script: Vec<Reply>) -> Self {
        let connector = Self::default();
        *connector.shared.script.lock().unwrap() = script.into();
        connector
    }

    pub fn refusing() -> Self {
        let connector = Self::default();
        connector.shared.refuse_open.store(true, Ordering::SeqCst);
        connector
    }

    pub fn set_refuse_open(&self, refuse: bool) {
        self.shared.refuse_open.store(refuse, Ordering::SeqCst);
    }

    pub fn push_reply(&self, reply: Reply) {
        self.shared.script.lock().unwrap().push_back(reply);
    }

    pub fn sent(&self) -> Vec<SentTrace> {
        self.shared.sent.lock().unwrap().clone()
    }

    pub fn max_outstanding(&self) -> usize {
        self.shared.max_outstanding.load(Ordering::SeqCst)
    }

    pub fn opens(&self) -> usize {
        self.shared.opens.load(Ordering::SeqCst)
    }

    pub fn closes(&self) -> usize {
        self.shared.closes.load(Ordering::SeqCst)
    }

    /// Delivers a completion for `tag` as if it had been delayed on air.
    pub fn inject_late(&self, tag: u32, snrs: &[f32]) {
        if let Some(events) = self.shared.events.lock().unwrap().as_ref() {
            let _ = events.send(LinkEvent::TraceData(completion(tag, snrs)));
        }
    }
}

#[async_trait]
impl Connector for ScriptedConnector {
    async fn open(&self, events: EventSender) -> Result<Box<dyn RadioLink>, LinkError> {
        if self.shared.refuse_open.load(Ordering::SeqCst) {
            return Err(LinkError::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                "no radio attached",
            )));
        }
        self.shared.opens.fetch_add(1, Ordering::SeqCst);
        *self.shared.events.lock().unwrap() = Some(events);
        Ok(Box::new(ScriptedLink {
            shared: self.shared.clone(),
            alive: AtomicBool::new(true),
            closed: AtomicBool::new(false),
        }))
    }

    fn describe(&self) -> String {
        "scripted".into()
    }
}

struct ScriptedLink {
    shared: Arc<Shared>,
    alive: AtomicBool,
    closed: AtomicBool,
}

#[async_trait]
impl RadioLink for ScriptedLink {
    async fn send_trace(&self, tag: u32, path: &[u8]) -> Result<(), LinkError> {
        let reply = self
            .shared
            .script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Reply::Silent);
        if matches!(reply, Reply::WriteFails) {
            return Err(LinkError::Closed);
        }

        self.shared.sent.lock().unwrap().push(SentTrace {
            tag,
            path: path.to_vec(),
            at: Instant::now(),
        });
        let now = self.shared.outstanding.fetch_add(1, Ordering::SeqCst) + 1;
        self.shared.max_outstanding.fetch_max(now, Ordering::SeqCst);

        let Some(events) = self.shared.events.lock().unwrap().clone() else {
            return Err(LinkError::Closed);
        };
        match reply {
            Reply::Path { snrs, delay } => {
                let shared = self.shared.clone();
                tokio::spawn(async move {
                    tokio::time::sleep(delay).await;
                    shared.outstanding.fetch_sub(1, Ordering::SeqCst);
                    let _ = events.send(LinkEvent::TraceData(completion(tag, &snrs)));
                });
            }
            Reply::Reject => {
                self.shared.outstanding.fetch_sub(1, Ordering::SeqCst);
                let _ = events.send(LinkEvent::CommandRejected { code: Some(1) });
            }
            Reply::Disconnect => {
                self.shared.outstanding.fetch_sub(1, Ordering::SeqCst);
                self.alive.store(false, Ordering::SeqCst);
                let _ = events.send(LinkEvent::Disconnected);
            }
            Reply::Silent => {
                // the probe is lost; nothing ever comes back
                self.shared.outstanding.fetch_sub(1, Ordering::SeqCst);
            }
            Reply::WriteFails => unreachable!(),
        }
        Ok(())
    }

    fn is_alive(&self) -> bool {
        self.alive.load(Ordering::SeqCst)
    }

    fn close(&self) {
        self.alive.store(false, Ordering::SeqCst);
        if !self.closed.swap(true, Ordering::SeqCst) {
            self.shared.closes.fetch_add(1, Ordering::SeqCst);
        }
    }
}

fn completion(tag: u32, snrs: &[f32]) -> TraceCompletion {
    TraceCompletion {
        tag,
        path: snrs
            .iter()
            .map(|snr| PathHop {
                hash: Some(0x46),
                snr: *snr,
            })
            .collect(),
    }
}
