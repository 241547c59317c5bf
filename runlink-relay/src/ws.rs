use std::sync::Arc;

use axum::extract::ws::{Message as WsFrame, WebSocket};
use axum::extract::{State, WebSocketUpgrade};
use axum::response::IntoResponse;
use futures::{SinkExt, StreamExt};
use tracing::{debug, info, warn};

use runlink_core::ChannelEvent;

use crate::state::AppState;

pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

/// Server-side direction fix-ups: a client asks to send or decline an
/// invoice; the counterpart is told it received one or that it was declined.
fn relayed(event: ChannelEvent) -> ChannelEvent {
    match event {
        ChannelEvent::SendInvoice { invoice } => ChannelEvent::ReceiveInvoice { invoice },
        ChannelEvent::DeclineInvoice { invoice_id } => {
            ChannelEvent::InvoiceDeclined { invoice_id }
        }
        other => other,
    }
}

async fn handle_socket(socket: WebSocket, state: Arc<AppState>) {
    let (mut sender, mut receiver) = socket.split();

    // The first frame must be a join carrying the context and credentials.
    let (context_id, sender_id) = loop {
        match receiver.next().await {
            Some(Ok(WsFrame::Text(text))) => {
                match serde_json::from_str::<ChannelEvent>(&text) {
                    Ok(ChannelEvent::Join {
                        context_id,
                        sender_id,
                        token,
                        ..
                    }) => {
                        if !state.authorize(&token) {
                            warn!(context = %context_id, "join rejected: bad credentials");
                            return;
                        }
                        break (context_id.to_string(), sender_id);
                    }
                    Ok(_) => {
                        debug!("dropping pre-join frame");
                        continue;
                    }
                    Err(err) => {
                        warn!(error = %err, "unparseable frame before join");
                        return;
                    }
                }
            }
            Some(Ok(WsFrame::Close(_))) | None => return,
            Some(Ok(_)) => continue,
            Some(Err(_)) => return,
        }
    };

    info!(context = %context_id, sender = %sender_id, "participant joined");
    let (history, mut room_rx) = state.join_room(&context_id).await;

    // Replay history to the new participant
    let history_event = ChannelEvent::History { messages: history };
    if let Ok(json) = serde_json::to_string(&history_event) {
        if sender.send(WsFrame::Text(json.into())).await.is_err() {
            return;
        }
    }

    // Forward room traffic to this socket, skipping its own echoes
    let self_id = sender_id.clone();
    let mut send_task = tokio::spawn(async move {
        while let Ok((from, event)) = room_rx.recv().await {
            if from == self_id {
                continue;
            }
            if let Ok(json) = serde_json::to_string(&event) {
                if sender.send(WsFrame::Text(json.into())).await.is_err() {
                    break;
                }
            }
        }
    });

    // Relay frames from this socket into the room
    let recv_state = state.clone();
    let recv_context = context_id.clone();
    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(frame)) = receiver.next().await {
            match frame {
                WsFrame::Text(text) => match serde_json::from_str::<ChannelEvent>(&text) {
                    Ok(event) => {
                        recv_state
                            .publish(&recv_context, &sender_id, relayed(event))
                            .await;
                    }
                    Err(err) => debug!(error = %err, "dropping unparseable frame"),
                },
                WsFrame::Close(_) => break,
                _ => {}
            }
        }
    });

    // Wait for either task to finish
    tokio::select! {
        _ = &mut send_task => {
            recv_task.abort();
        }
        _ = &mut recv_task => {
            send_task.abort();
        }
    }
    info!(context = %context_id, "participant left");
}
