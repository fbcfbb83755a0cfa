//! WebSocket endpoint.
//!
//! Each connection becomes one subscriber. Inbound text messages are
//! forwarded to the simulation untouched; frames from the subscriber channel
//! are written back as binary (snapshots) or text (state) messages.

use std::future::Future;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use futures::{SinkExt, StreamExt};
use tokio::net::TcpListener;
use tracing::{debug, info};

use crate::orchestrator::broadcast::{Frame, SimulationHandle};

pub fn router(handle: SimulationHandle) -> Router {
    Router::new().route("/ws", get(upgrade)).with_state(handle)
}

/// Serve until `shutdown` resolves
pub async fn serve<F>(listener: TcpListener, handle: SimulationHandle, shutdown: F) -> std::io::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    if let Ok(addr) = listener.local_addr() {
        info!(%addr, "listening");
    }
    axum::serve(listener, router(handle)).with_graceful_shutdown(shutdown).await
}

async fn upgrade(ws: WebSocketUpgrade, State(handle): State<SimulationHandle>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| session(socket, handle))
}

async fn session(socket: WebSocket, handle: SimulationHandle) {
    let Some(subscription) = handle.subscribe().await else {
        return;
    };
    let id = subscription.id;
    let mut frames = subscription.frames;
    let (mut sink, mut stream) = socket.split();

    let writer = tokio::spawn(async move {
        while let Some(frame) = frames.recv().await {
            let message = match frame {
                Frame::Snapshot(bytes) => Message::Binary(bytes.to_vec()),
                Frame::State(json) => Message::Text(json.to_string()),
            };
            if sink.send(message).await.is_err() {
                break;
            }
        }
    });

    while let Some(message) = stream.next().await {
        match message {
            Ok(Message::Text(text)) => handle.submit_text(text),
            Ok(Message::Close(_)) => break,
            Ok(_) => {}
            Err(e) => {
                debug!(error = %e, "websocket receive failed");
                break;
            }
        }
    }

    handle.unsubscribe(id);
    writer.abort();
}
