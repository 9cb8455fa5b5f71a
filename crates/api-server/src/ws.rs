//! WebSocket progress pushes.
//!
//! Each connection gets an id and an unbounded outbound channel in the
//! subscriber registry. Pushes ride that channel; the socket task only
//! serializes and forwards. Dropped sockets are detected on the next
//! push and pruned by the notifier.

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::Response;
use futures_util::{Sink, SinkExt, StreamExt};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::types::{WsClientMessage, WsServerMessage};
use crate::ApiState;

pub async fn ws_handler(State(state): State<ApiState>, ws: WebSocketUpgrade) -> Response {
    ws.on_upgrade(move |socket| handle_socket(state, socket))
}

async fn handle_socket(state: ApiState, socket: WebSocket) {
    let conn_id = Uuid::new_v4().to_string();
    let (tx, mut rx) = mpsc::unbounded_channel();
    state.subscribers.register(&conn_id, tx).await;
    info!("WebSocket connection {} established", conn_id);

    let (mut sink, mut stream) = socket.split();

    let hello = WsServerMessage::Connection {
        id: conn_id.clone(),
    };
    if send_json(&mut sink, &hello).await.is_err() {
        state.subscribers.unregister(&conn_id).await;
        return;
    }

    // Outbound: registry channel -> socket
    let push_conn_id = conn_id.clone();
    let mut push_task = tokio::spawn(async move {
        while let Some(document) = rx.recv().await {
            let msg = WsServerMessage::Progress { document };
            if send_json(&mut sink, &msg).await.is_err() {
                debug!("Connection {} went away mid-push", push_conn_id);
                break;
            }
        }
    });

    // Inbound: subscribe requests until the client hangs up
    loop {
        tokio::select! {
            _ = &mut push_task => break,
            incoming = stream.next() => {
                match incoming {
                    Some(Ok(Message::Text(text))) => {
                        match serde_json::from_str::<WsClientMessage>(&text) {
                            Ok(WsClientMessage::Subscribe { job_id }) => {
                                info!("Connection {} subscribed to job {}", conn_id, job_id);
                                state.subscribers.subscribe(&conn_id, &job_id).await;
                            }
                            Err(e) => {
                                warn!("Connection {} sent an unparseable message: {}", conn_id, e);
                            }
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        debug!("Connection {} read error: {}", conn_id, e);
                        break;
                    }
                }
            }
        }
    }

    push_task.abort();
    state.subscribers.unregister(&conn_id).await;
    info!("WebSocket connection {} closed", conn_id);
}

async fn send_json(
    sink: &mut (impl Sink<Message, Error = axum::Error> + Unpin),
    msg: &WsServerMessage,
) -> Result<(), axum::Error> {
    let raw = serde_json::to_string(msg).map_err(axum::Error::new)?;
    sink.send(Message::Text(raw.into())).await
}
