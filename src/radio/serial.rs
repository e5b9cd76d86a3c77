use std::io::{self, Read, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use async_trait::async_trait;
use serialport::SerialPort;

use super::error::LinkError;
use super::frame::{self, FrameDecoder};
use super::link::{Connector, EventSender, LinkEvent, RadioLink};

const READ_TIMEOUT: Duration = Duration::from_millis(200);

pub struct SerialConnector {
    port: String,
    baud_rate: u32,
    /// Reader thread of the most recently opened link.
    reader: Mutex<Option<JoinHandle<()>>>,
}

impl SerialConnector {
    pub fn new(port: String, baud_rate: u32) -> Self {
        Self {
            port,
            baud_rate,
            reader: Mutex::new(None),
        }
    }

    fn take_reader(&self) -> Option<JoinHandle<()>> {
        self.reader.lock().unwrap_or_else(|e| e.into_inner()).take()
    }
}

#[async_trait]
impl Connector for SerialConnector {
    async fn open(&self, events: EventSender) -> Result<Box<dyn RadioLink>, LinkError> {
        let port_name = self.port.clone();
        let baud_rate = self.baud_rate;
        let previous = self.take_reader();
        let port = tokio::task::spawn_blocking(move || {
            // the old reader still holds a clone of the port until it notices the close
            if let Some(reader) = previous {
                let _ = reader.join();
            }
            serialport::new(&port_name, baud_rate)
                .timeout(READ_TIMEOUT)
                .open()
        })
        .await
        .map_err(|e| LinkError::Io(io::Error::other(e)))??;

        let reader = port.try_clone()?;
        let alive = Arc::new(AtomicBool::new(true));
        let closing = Arc::new(AtomicBool::new(false));

        let link = SerialLink {
            port_name: self.port.clone(),
            writer: Mutex::new(Some(port)),
            alive: alive.clone(),
            closing: closing.clone(),
        };

        let port_name = self.port.clone();
        let handle = thread::spawn(move || read_loop(reader, port_name, events, alive, closing));
        *self.reader.lock().unwrap_or_else(|e| e.into_inner()) = Some(handle);

        if let Err(e) = link.write_payload(&frame::app_start()) {
            link.close();
            return Err(e);
        }
        log::info!(
            "Connected to MeshCore radio on {} at {} baud",
            self.port,
            self.baud_rate
        );
        Ok(Box::new(link))
    }

    fn describe(&self) -> String {
        self.port.clone()
    }
}

pub struct SerialLink {
    port_name: String,
    /// Emptied on close, which releases the device.
    writer: Mutex<Option<Box<dyn SerialPort>>>,
    alive: Arc<AtomicBool>,
    closing: Arc<AtomicBool>,
}

impl SerialLink {
    fn write_payload(&self, payload: &[u8]) -> Result<(), LinkError> {
        if self.closing.load(Ordering::Acquire) || !self.alive.load(Ordering::Acquire) {
            return Err(LinkError::Closed);
        }
        let frame = frame::encode(payload)?;
        let mut writer = self.writer.lock().unwrap_or_else(|e| e.into_inner());
        let port = writer.as_mut().ok_or(LinkError::Closed)?;
        port.write_all(&frame)?;
        port.flush()?;
        Ok(())
    }
}

#[async_trait]
impl RadioLink for SerialLink {
    async fn send_trace(&self, tag: u32, path: &[u8]) -> Result<(), LinkError> {
        self.write_payload(&frame::send_trace(tag, path))
    }

    fn is_alive(&self) -> bool {
        self.alive.load(Ordering::Acquire)
    }

    fn close(&self) {
        if !self.closing.swap(true, Ordering::AcqRel) {
            log::info!("Closing radio link on {}", self.port_name);
        }
        self.alive.store(false, Ordering::Release);
        self.writer.lock().unwrap_or_else(|e| e.into_inner()).take();
    }
}

fn read_loop(
    mut port: Box<dyn SerialPort>,
    port_name: String,
    events: EventSender,
    alive: Arc<AtomicBool>,
    closing: Arc<AtomicBool>,
) {
    let mut decoder = FrameDecoder::new();
    let mut buf = [0u8; 256];

    while !closing.load(Ordering::Acquire) {
        match port.read(&mut buf) {
            Ok(0) => {
                log::warn!("Serial port {} reached end of stream", port_name);
                break;
            }
            Ok(n) => {
                decoder.push(&buf[..n]);
                while let Some(payload) = decoder.next_frame() {
                    if let Some(event) = frame::decode_event(&payload) {
                        if events.send(event).is_err() {
                            // nobody is listening any more
                            alive.store(false, Ordering::Release);
                            return;
                        }
                    }
                }
            }
            Err(e) if matches!(e.kind(), io::ErrorKind::TimedOut | io::ErrorKind::Interrupted) => {
                continue
            }
            Err(e) => {
                log::error!("Serial read error on {}: {}", port_name, e);
                break;
            }
        }
    }

    alive.store(false, Ordering::Release);
    if !closing.load(Ordering::Acquire) {
        let _ = events.send(LinkEvent::Disconnected);
    }
}
