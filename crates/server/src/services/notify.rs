// Best-effort change notifications for live viewers. Publishing happens after
// the write has committed and can never fail the write.

use std::collections::HashMap;
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::{broadcast, RwLock};

const ROOM_CAPACITY: usize = 256;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ChangeEvent {
    VersionCreated {
        project_id: String,
        version_id: String,
    },
    CommentCreated {
        version_id: String,
        comment_id: String,
    },
    ReactionAdded {
        version_id: String,
        comment_id: String,
        kind: String,
    },
}

impl ChangeEvent {
    pub fn room(&self) -> String {
        match self {
            Self::VersionCreated { project_id, .. } => project_room(project_id),
            Self::CommentCreated { version_id, .. } | Self::ReactionAdded { version_id, .. } => {
                version_room(version_id)
            }
        }
    }
}

pub fn project_room(project_id: &str) -> String {
    format!("project:{project_id}")
}

pub fn version_room(version_id: &str) -> String {
    format!("version:{version_id}")
}

#[derive(Clone, Default)]
pub struct ChangeNotifier {
    rooms: Arc<RwLock<HashMap<String, broadcast::Sender<ChangeEvent>>>>,
}

impl ChangeNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn subscribe(&self, room: &str) -> broadcast::Receiver<ChangeEvent> {
        {
            let rooms = self.rooms.read().await;
            if let Some(sender) = rooms.get(room) {
                return sender.subscribe();
            }
        }

        let mut rooms = self.rooms.write().await;
        rooms
            .entry(room.to_string())
            .or_insert_with(|| broadcast::channel(ROOM_CAPACITY).0)
            .subscribe()
    }

    pub async fn publish(&self, event: ChangeEvent) {
        let room = event.room();

        let delivered = {
            let rooms = self.rooms.read().await;
            match rooms.get(&room) {
                Some(sender) => sender.send(event).is_ok(),
                None => {
                    tracing::debug!(room = %room, "no subscribers for change event");
                    return;
                }
            }
        };

        if !delivered {
            tracing::debug!(room = %room, "dropping idle room");
            let mut rooms = self.rooms.write().await;
            if rooms.get(&room).is_some_and(|s| s.receiver_count() == 0) {
                rooms.remove(&room);
            }
        }
    }
}
