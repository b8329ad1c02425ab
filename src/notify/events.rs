use serde::Serialize;

use crate::types::NodeKind;

/// Message published to a project's real-time room after a tree change.
#[derive(Debug, Clone, Serialize)]
#[serde(
    tag = "type",
    content = "payload",
    rename_all = "camelCase",
    rename_all_fields = "camelCase"
)]
pub enum TreeEvent {
    NewFolder {
        folder_id: String,
        parent_id: String,
        name: String,
        tree_version: i64,
    },
    NewDoc {
        doc_id: String,
        parent_id: String,
        name: String,
        tree_version: i64,
    },
    NewFile {
        file_id: String,
        parent_id: String,
        name: String,
        hash: String,
        size: i64,
        tree_version: i64,
    },
    EntityRemoved {
        entity_id: String,
        tree_version: i64,
    },
    EntityMoved {
        entity_id: String,
        new_parent_id: String,
        tree_version: i64,
    },
    EntityRenamed {
        entity_id: String,
        new_name: String,
        tree_version: i64,
    },
    RootDocChanged {
        doc_id: String,
    },
    AccessChanged {
        epoch: i64,
    },
}

/// A [`TreeEvent`] addressed to the room of one project.
#[derive(Debug, Clone, Serialize)]
pub struct RoomMessage {
    pub room: String,
    pub message: TreeEvent,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum UpdateType {
    Add,
    Delete,
    Rename,
    Move,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PathUpdate {
    #[serde(rename = "type")]
    pub update_type: UpdateType,
    pub id: String,
    pub kind: NodeKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub old_path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub new_path: Option<String>,
}

impl PathUpdate {
    pub fn add(id: &str, kind: NodeKind, path: &str) -> Self {
        Self {
            update_type: UpdateType::Add,
            id: id.to_string(),
            kind,
            old_path: None,
            new_path: Some(path.to_string()),
        }
    }

    pub fn delete(id: &str, kind: NodeKind, path: &str) -> Self {
        Self {
            update_type: UpdateType::Delete,
            id: id.to_string(),
            kind,
            old_path: Some(path.to_string()),
            new_path: None,
        }
    }

    pub fn relocate(
        update_type: UpdateType,
        id: &str,
        kind: NodeKind,
        old_path: &str,
        new_path: &str,
    ) -> Self {
        Self {
            update_type,
            id: id.to_string(),
            kind,
            old_path: Some(old_path.to_string()),
            new_path: Some(new_path.to_string()),
        }
    }
}

/// Path changes of one committed mutation, sent to the content-sync service.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ContentSyncUpdate {
    pub project_id: String,
    pub version: i64,
    pub updates: Vec<PathUpdate>,
}

/// Everything published for one committed mutation.
#[derive(Debug, Clone)]
pub struct Notification {
    pub project_id: String,
    pub events: Vec<TreeEvent>,
    pub content: Option<ContentSyncUpdate>,
}

impl Notification {
    pub fn new(project_id: &str) -> Self {
        Self {
            project_id: project_id.to_string(),
            events: Vec::new(),
            content: None,
        }
    }

    #[must_use]
    pub fn event(mut self, event: TreeEvent) -> Self {
        self.events.push(event);
        self
    }

    #[must_use]
    pub fn content(mut self, version: i64, updates: Vec<PathUpdate>) -> Self {
        if !updates.is_empty() {
            self.content = Some(ContentSyncUpdate {
                project_id: self.project_id.clone(),
                version,
                updates,
            });
        }
        self
    }
}
