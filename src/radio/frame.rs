//! MeshCore companion-radio serial framing.
//!
//! Frames written to the radio start with `<`, frames read from it with `>`.
//! Both carry a little-endian `u16` payload length after the marker.

use log::{debug, warn};

use super::error::LinkError;
use super::link::{LinkEvent, PathHop, TraceCompletion};

pub const MAX_PAYLOAD: usize = 300;

const HOST_MARKER: u8 = b'<';
const RADIO_MARKER: u8 = b'>';

pub const CMD_APP_START: u8 = 0x01;
pub const CMD_SEND_TRACE_PATH: u8 = 0x24;

pub const RESP_CODE_ERR: u8 = 0x01;
pub const RESP_CODE_SENT: u8 = 0x06;
pub const PUSH_CODE_TRACE_DATA: u8 = 0x89;

const APP_NAME: &[u8] = b"signal-mapper";
const APP_TARGET_VERSION: u8 = 0x03;

/// Wraps a payload in a host-to-radio frame.
pub fn encode(payload: &[u8]) -> Result<Vec<u8>, LinkError> {
    if payload.len() > MAX_PAYLOAD {
        return Err(LinkError::FrameTooLarge(payload.len()));
    }
    let len = payload.len() as u16;
    let mut frame = Vec::with_capacity(payload.len() + 3);
    frame.push(HOST_MARKER);
    frame.extend_from_slice(&len.to_le_bytes());
    frame.extend_from_slice(payload);
    Ok(frame)
}

pub fn app_start() -> Vec<u8> {
    let mut payload = vec![CMD_APP_START, APP_TARGET_VERSION];
    payload.extend_from_slice(&[b' '; 6]);
    payload.extend_from_slice(APP_NAME);
    payload
}

pub fn send_trace(tag: u32, path: &[u8]) -> Vec<u8> {
    let mut payload = Vec::with_capacity(10 + path.len());
    payload.push(CMD_SEND_TRACE_PATH);
    payload.extend_from_slice(&tag.to_le_bytes());
    // auth code, unused for repeater traces
    payload.extend_from_slice(&0u32.to_le_bytes());
    // flags
    payload.push(0);
    payload.extend_from_slice(path);
    payload
}

/// Incremental decoder for the radio-to-host byte stream.
#[derive(Debug, Default)]
pub struct FrameDecoder {
    buf: Vec<u8>,
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    /// Pops the next complete payload, discarding bytes that cannot start a frame.
    pub fn next_frame(&mut self) -> Option<Vec<u8>> {
        loop {
            let start = match self.buf.iter().position(|b| *b == RADIO_MARKER) {
                Some(idx) => idx,
                None => {
                    self.buf.clear();
                    return None;
                }
            };
            if start > 0 {
                debug!("Skipping {} bytes of unframed serial data", start);
                self.buf.drain(..start);
            }
            if self.buf.len() < 3 {
                return None;
            }

            let len = u16::from_le_bytes([self.buf[1], self.buf[2]]) as usize;
            if len > MAX_PAYLOAD {
                warn!("Dropping frame with oversized length {}", len);
                self.buf.drain(..1);
                continue;
            }
            if self.buf.len() < 3 + len {
                return None;
            }

            let payload = self.buf[3..3 + len].to_vec();
            self.buf.drain(..3 + len);
            return Some(payload);
        }
    }
}

/// Interprets a radio payload. Frames the trace path does not care about yield `None`.
pub fn decode_event(payload: &[u8]) -> Option<LinkEvent> {
    let (&code, body) = payload.split_first()?;
    match code {
        PUSH_CODE_TRACE_DATA => match parse_trace_data(body) {
            Some(completion) => Some(LinkEvent::TraceData(completion)),
            None => {
                warn!("Malformed trace data frame ({} bytes)", payload.len());
                None
            }
        },
        RESP_CODE_ERR => Some(LinkEvent::CommandRejected {
            code: body.first().copied(),
        }),
        RESP_CODE_SENT => {
            debug!("Radio acknowledged trace transmission");
            None
        }
        other => {
            debug!("Ignoring radio frame with code 0x{:02x}", other);
            None
        }
    }
}

fn parse_trace_data(body: &[u8]) -> Option<TraceCompletion> {
    // reserved, path_len, flags, tag[4], auth[4]
    if body.len() < 11 {
        return None;
    }
    let path_len = body[1] as usize;
    let tag = u32::from_le_bytes(body[3..7].try_into().ok()?);
    let hashes = body.get(11..11 + path_len)?;
    let snrs = body.get(11 + path_len..11 + 2 * path_len)?;
    let final_snr = *body.get(11 + 2 * path_len)?;

    let mut path: Vec<PathHop> = hashes
        .iter()
        .zip(snrs)
        .map(|(hash, snr)| PathHop {
            hash: Some(*hash),
            snr: quarter_db(*snr),
        })
        .collect();
    path.push(PathHop {
        hash: None,
        snr: quarter_db(final_snr),
    });

    Some(TraceCompletion { tag, path })
}

fn quarter_db(raw: u8) -> f32 {
    (raw as i8) as f32 / 4.0
}

#[cfg(test)]
pub(crate) fn trace_data_frame(tag: u32, hashes: &[u8], snrs: &[i8], final_snr: i8) -> Vec<u8> {
    let mut payload = vec![PUSH_CODE_TRACE_DATA, 0, hashes.len() as u8, 0];
    payload.extend_from_slice(&tag.to_le_bytes());
    payload.extend_from_slice(&0u32.to_le_bytes());
    payload.extend_from_slice(hashes);
    payload.extend(snrs.iter().map(|s| *s as u8));
    payload.push(final_snr as u8);
    payload
}

#[cfg(test)]
mod tests {
    use super::*;

    fn radio_frame(payload: &[u8]) -> Vec<u8> {
        let mut frame = vec![RADIO_MARKER];
        frame.extend_from_slice(&(payload.len() as u16).to_le_bytes());
        frame.extend_from_slice(payload);
        frame
    }

    #[test]
    fn trace_command_layout() {
        let payload = send_trace(0x0102_0304, &[0x46]);
        assert_eq!(payload[0], CMD_SEND_TRACE_PATH);
        assert_eq!(&payload[1..5], &[0x04, 0x03, 0x02, 0x01]);
        assert_eq!(&payload[5..9], &[0, 0, 0, 0]);
        assert_eq!(payload[9], 0);
        assert_eq!(&payload[10..], &[0x46]);

        let frame = encode(&payload).unwrap();
        assert_eq!(frame[0], b'<');
        assert_eq!(u16::from_le_bytes([frame[1], frame[2]]) as usize, payload.len());
    }

    #[test]
    fn encode_rejects_oversized_payload() {
        let payload = vec![0u8; MAX_PAYLOAD + 1];
        assert!(matches!(encode(&payload), Err(LinkError::FrameTooLarge(_))));
    }

    #[test]
    fn decoder_handles_split_and_garbage() {
        let payload = trace_data_frame(7, &[0x46], &[32], 20);
        let frame = radio_frame(&payload);

        let mut decoder = FrameDecoder::new();
        decoder.push(b"\x00noise");
        decoder.push(&frame[..4]);
        assert_eq!(decoder.next_frame(), None);
        decoder.push(&frame[4..]);
        assert_eq!(decoder.next_frame(), Some(payload));
        assert_eq!(decoder.next_frame(), None);
    }

    #[test]
    fn decoder_skips_oversized_length() {
        let mut decoder = FrameDecoder::new();
        decoder.push(&[RADIO_MARKER, 0xff, 0xff]);
        let ok = radio_frame(&[RESP_CODE_SENT]);
        decoder.push(&ok);
        assert_eq!(decoder.next_frame(), Some(vec![RESP_CODE_SENT]));
    }

    #[test]
    fn trace_data_yields_hops_in_quarter_db() {
        let payload = trace_data_frame(0xdead_beef, &[0x46], &[32], -8);
        let Some(LinkEvent::TraceData(completion)) = decode_event(&payload) else {
            panic!("expected trace data");
        };
        assert_eq!(completion.tag, 0xdead_beef);
        assert_eq!(completion.path.len(), 2);
        assert_eq!(completion.path[0].hash, Some(0x46));
        assert_eq!(completion.path[0].snr, 8.0);
        assert_eq!(completion.path[1].hash, None);
        assert_eq!(completion.path[1].snr, -2.0);
    }

    #[test]
    fn truncated_trace_data_is_dropped() {
        let mut payload = trace_data_frame(1, &[0x46, 0x12], &[4, 4], 4);
        payload.truncate(payload.len() - 2);
        assert!(decode_event(&payload).is_none());
    }

    #[test]
    fn error_response_is_rejection() {
        assert!(matches!(
            decode_event(&[RESP_CODE_ERR, 2]),
            Some(LinkEvent::CommandRejected { code: Some(2) })
        ));
    }
}
