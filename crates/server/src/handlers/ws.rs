// WebSocket feed of change events for one project or version room.
// Push-only: clients listen, they never publish.

use axum::{
    extract::{
        ws::{Message, WebSocket},
        Query, State, WebSocketUpgrade,
    },
    response::Response,
};
use futures::{Sink, SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::broadcast::{self, error::RecvError};

use crate::{
    db::Database,
    error::{AppError, Result},
    middleware::auth::decode_token,
    services::{access, notify::ChangeEvent},
    AppState,
};

#[derive(Debug, Deserialize)]
pub struct WsQuery {
    pub token: String,
    pub room: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Room {
    Project(String),
    Version(String),
}

impl Room {
    fn parse(room: &str) -> Result<Self> {
        match room.split_once(':') {
            Some(("project", id)) => Ok(Self::Project(id.to_string())),
            Some(("version", id)) => Ok(Self::Version(id.to_string())),
            _ => Err(AppError::BadRequest("Unknown room".to_string())),
        }
    }

    async fn authorize(&self, db: &Database, user_id: &str) -> Result<()> {
        let mut conn = db.pool.acquire().await?;
        match self {
            Self::Project(id) => access::resolve_project_access(&mut conn, user_id, id).await?,
            Self::Version(id) => access::resolve_version_access(&mut conn, user_id, id).await?,
        };
        Ok(())
    }
}

pub async fn ws_handler(
    ws: WebSocketUpgrade,
    Query(query): Query<WsQuery>,
    State(state): State<AppState>,
) -> Result<Response> {
    // Browsers cannot set headers on upgrade requests, so the token rides in the query
    let user = decode_token(&query.token, &state.config.jwt_secret)?;

    let room = Room::parse(&query.room)?;
    room.authorize(&state.db, &user.id).await?;

    let events = state.notifier.subscribe(&query.room).await;
    tracing::debug!(room = %query.room, user_id = %user.id, "subscribed to changes");

    Ok(ws.on_upgrade(move |socket| handle_socket(socket, events, state.db, user.id, room)))
}

async fn handle_socket(
    socket: WebSocket,
    events: broadcast::Receiver<ChangeEvent>,
    db: Database,
    user_id: String,
    room: Room,
) {
    let (sender, mut receiver) = socket.split();

    let forward_task = tokio::spawn(forward_events(sender, events, db, user_id, room));

    // Only watch for the client going away
    while let Some(Ok(msg)) = receiver.next().await {
        if let Message::Close(_) = msg {
            break;
        }
    }

    forward_task.abort();
}

// Access is resolved again before every event.
async fn forward_events<S>(
    mut sender: S,
    mut events: broadcast::Receiver<ChangeEvent>,
    db: Database,
    user_id: String,
    room: Room,
) where
    S: Sink<Message> + Unpin,
{
    loop {
        let event = match events.recv().await {
            Ok(event) => event,
            Err(RecvError::Lagged(skipped)) => {
                tracing::debug!(skipped, "subscriber lagged");
                continue;
            }
            Err(RecvError::Closed) => break,
        };

        if let Err(e) = room.authorize(&db, &user_id).await {
            tracing::debug!(user_id = %user_id, error = %e, "closing change feed");
            let _ = sender.send(Message::Close(None)).await;
            break;
        }

        let payload = match serde_json::to_string(&event) {
            Ok(payload) => payload,
            Err(e) => {
                tracing::warn!(error = %e, "failed to encode change event");
                continue;
            }
        };

        if sender.send(Message::Text(payload)).await.is_err() {
            break;
        }
    }
}
