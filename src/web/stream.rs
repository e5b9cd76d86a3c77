//! WebSocket endpoint the phone streams GPS fixes and measurement requests over.

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::IntoResponse,
};
use futures::{Sink, SinkExt, Stream, StreamExt};
use log::{debug, error, warn};
use std::fmt::Display;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::session::{Outbound, SessionActor};

use super::server::AppState;

static NEXT_CONNECTION: AtomicU64 = AtomicU64::new(1);

pub async fn signal_stream(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: AppState) {
    let name = format!("conn-{}", NEXT_CONNECTION.fetch_add(1, Ordering::Relaxed));
    let (sender, receiver) = socket.split();
    let actor = SessionActor::new(name.clone(), state.radio.clone(), state.store.clone());
    run_session(&name, actor, sender, receiver).await;
}

/// Feeds client frames to `actor` one at a time until either side goes away.
async fn run_session<S, R>(name: &str, mut actor: SessionActor, mut sender: S, mut receiver: R)
where
    S: Sink<Message> + Unpin,
    S::Error: Display,
    R: Stream<Item = Result<Message, axum::Error>> + Unpin,
{
    for reply in actor.open().await {
        if send(&mut sender, &reply).await.is_err() {
            actor.close();
            return;
        }
    }

    while let Some(msg) = receiver.next().await {
        match msg {
            Ok(Message::Text(text)) => {
                if let Some(reply) = actor.handle_text(text.as_str()).await {
                    if let Err(e) = send(&mut sender, &reply).await {
                        debug!("[{}] Client gone ({}), discarding {:?}", name, e, reply);
                        break;
                    }
                }
            }
            Ok(Message::Close(frame)) => {
                debug!("[{}] Client sent close: {:?}", name, frame);
                break;
            }
            Ok(_) => {
                // binary frames carry nothing for us; pings are answered by axum
            }
            Err(e) => {
                warn!("[{}] WebSocket error: {}", name, e);
                break;
            }
        }
    }

    actor.close();
}

async fn send<S>(sender: &mut S, reply: &Outbound) -> Result<(), S::Error>
where
    S: Sink<Message> + Unpin,
{
    let json = match serde_json::to_string(reply) {
        Ok(json) => json,
        Err(e) => {
            error!("Failed to serialize reply: {}", e);
            return Ok(());
        }
    };
    sender.send(Message::Text(json.into())).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::radio::mock::{Reply, ScriptedConnector};
    use crate::radio::RadioManager;
    use crate::store::memory::MemoryStore;
    use futures::channel::mpsc;
    use std::sync::Arc;
    use std::time::Duration;

    fn text(s: &str) -> Result<Message, axum::Error> {
        Ok(Message::Text(s.to_string().into()))
    }

    #[tokio::test]
    async fn reply_to_departed_client_is_discarded_after_saving() {
        let connector = ScriptedConnector::new(vec![Reply::delayed(
            &[8.0, 5.0],
            Duration::from_millis(100),
        )]);
        let radio = RadioManager::new(Arc::new(connector.clone()), Duration::from_secs(1));
        let store = Arc::new(MemoryStore::with_field_test("ft1", "46381bfb67f7", true));
        let actor = SessionActor::new("test".into(), radio.clone(), store.clone());

        let incoming = futures::stream::iter(vec![
            text(r#"{"type":"gps_data","data":{"latitude":51.5,"longitude":-0.12}}"#),
            text(r#"{"type":"request_measurement","data":{"field_test_id":"ft1"}}"#),
        ]);
        let (outgoing, mut client) = mpsc::unbounded::<Message>();

        let hang_up = async move {
            // greeting and radio status, then the phone disappears mid-trace
            assert!(client.next().await.is_some());
            assert!(client.next().await.is_some());
            drop(client);
        };
        tokio::join!(run_session("test", actor, outgoing, incoming), hang_up);

        let samples = store.samples();
        assert_eq!(samples.len(), 1);
        assert!(samples[0].trace_success);
        assert_eq!(samples[0].snr_to_target, 8.0);
        assert_eq!(radio.holders(), 0);
    }
}
