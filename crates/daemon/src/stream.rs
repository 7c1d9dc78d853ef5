// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! WebSocket subscription endpoint: the first client frame
//! declares topic interests; every matching status event is pushed as a
//! `{type, data, timestamp}` frame. A subscriber that falls behind the
//! broadcast backlog is disconnected — producers never wait.

use crate::state::AppState;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use oc_core::Topic;
use oc_wire::{StreamFrame, SubscribeRequest};
use tokio::sync::broadcast::error::RecvError;

pub async fn subscribe(
    State(state): State<AppState>,
    upgrade: WebSocketUpgrade,
) -> impl IntoResponse {
    upgrade.on_upgrade(move |socket| session(socket, state))
}

async fn read_subscribe(rx: &mut SplitStream<WebSocket>) -> Option<Vec<Topic>> {
    loop {
        match rx.next().await {
            Some(Ok(Message::Text(text))) => {
                match serde_json::from_str::<SubscribeRequest>(&text) {
                    Ok(request) => return Some(request.topics),
                    Err(_) => return None,
                }
            }
            Some(Ok(Message::Ping(_) | Message::Pong(_))) => continue,
            _ => return None,
        }
    }
}

async fn session(socket: WebSocket, state: AppState) {
    let (mut tx, mut rx): (SplitSink<WebSocket, Message>, SplitStream<WebSocket>) =
        socket.split();

    // First frame: topic declaration.
    let Some(mut topics) = read_subscribe(&mut rx).await else {
        let _ = tx.close().await;
        return;
    };
    tracing::info!(topics = topics.len(), "stream subscriber connected");

    let mut events = state.bus.subscribe();
    loop {
        tokio::select! {
            received = events.recv() => match received {
                Ok(event) => {
                    if !event.topics().iter().any(|t| topics.contains(t)) {
                        continue;
                    }
                    let frame = StreamFrame::from_event(&event);
                    let Ok(text) = serde_json::to_string(&frame) else { continue };
                    if tx.send(Message::Text(text)).await.is_err() {
                        break;
                    }
                }
                Err(RecvError::Lagged(dropped)) => {
                    // Bounded backlog exceeded: cut the slow subscriber.
                    tracing::warn!(dropped, "stream subscriber too slow, disconnecting");
                    let _ = tx.close().await;
                    break;
                }
                Err(RecvError::Closed) => break,
            },
            incoming = rx.next() => match incoming {
                // Later frames may re-declare interests.
                Some(Ok(Message::Text(text))) => {
                    if let Ok(request) = serde_json::from_str::<SubscribeRequest>(&text) {
                        topics = request.topics;
                    }
                }
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(_)) => {}
                Some(Err(_)) => break,
            },
        }
    }
    tracing::debug!("stream subscriber disconnected");
}
