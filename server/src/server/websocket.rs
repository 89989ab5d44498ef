use crate::relay::{RelayOutcome, StreamRelay, Subscriber, SubscriberGone};
use async_trait::async_trait;
use axum::{
    extract::{
        Path, State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    response::Response,
};
use futures_util::{
    SinkExt, StreamExt,
    stream::{SplitSink, SplitStream},
};
use tokio::sync::watch;
use tracing::{debug, error, info};
use uuid::Uuid;

use super::state::AppState;

/// Relay subscriber writing to the send half of a WebSocket.
///
/// Disconnects are observed through `gone`, which the read half flips once
/// the client closes or the socket errors.
struct WsSubscriber {
    sender: SplitSink<WebSocket, Message>,
    gone: watch::Receiver<bool>,
}

impl WsSubscriber {
    async fn close(mut self) {
        let _ = self.sender.send(Message::Close(None)).await;
        let _ = self.sender.close().await;
    }
}

#[async_trait]
impl Subscriber for WsSubscriber {
    async fn deliver(&mut self, payload: String) -> Result<(), SubscriberGone> {
        self.sender
            .send(Message::Text(payload))
            .await
            .map_err(|_| SubscriberGone)
    }

    async fn closed(&mut self) {
        loop {
            if *self.gone.borrow_and_update() {
                return;
            }
            if self.gone.changed().await.is_err() {
                return;
            }
        }
    }
}

/// Drain the read half until the client goes away. Client messages carry no
/// meaning on this stream and are ignored.
async fn watch_for_disconnect(
    connection_id: Uuid,
    mut receiver: SplitStream<WebSocket>,
    gone: watch::Sender<bool>,
) {
    while let Some(result) = receiver.next().await {
        match result {
            Ok(Message::Close(_)) => {
                debug!("Client {} requested close", connection_id);
                break;
            }
            Ok(_) => {}
            Err(e) => {
                debug!("WebSocket error for {}: {}", connection_id, e);
                break;
            }
        }
    }
    let _ = gone.send(true);
}

/// WebSocket upgrade handler for GET /ws/:test_id
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    Path(test_id): Path<String>,
    State(state): State<AppState>,
) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, test_id, state))
}

/// Stream one test's results over a WebSocket connection
async fn handle_socket(socket: WebSocket, test_id: String, state: AppState) {
    let connection_id = Uuid::new_v4();
    info!(
        "New stream connection {} for test {}",
        connection_id, test_id
    );

    let (sender, receiver) = socket.split();
    let (gone_tx, gone_rx) = watch::channel(false);
    let read_task = tokio::spawn(watch_for_disconnect(connection_id, receiver, gone_tx));

    let mut subscriber = WsSubscriber {
        sender,
        gone: gone_rx,
    };
    let relay = StreamRelay::new(state.store.clone(), state.poll_interval);

    match relay.run(&test_id, &mut subscriber).await {
        Ok(RelayOutcome::Completed { .. }) => subscriber.close().await,
        Ok(RelayOutcome::Disconnected { .. }) => {}
        Err(e) => {
            error!("Stream for test {} failed: {}", test_id, e);
            subscriber.close().await;
        }
    }

    read_task.abort();
    info!("Stream connection closed: {}", connection_id);
}
