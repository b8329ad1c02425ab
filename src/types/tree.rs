use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeKind {
    Folder,
    Doc,
    File,
}

impl NodeKind {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Folder => "folder",
            Self::Doc => "doc",
            Self::File => "file",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "folder" => Some(Self::Folder),
            "doc" => Some(Self::Doc),
            "file" => Some(Self::File),
            _ => None,
        }
    }
}

/// A row of `tree_nodes`. `deleted_at` is `None` while the node is live.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TreeNode {
    pub id: String,
    pub project_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
    pub kind: NodeKind,
    pub path: String,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deleted_at: Option<DateTime<Utc>>,
}

impl TreeNode {
    pub fn name(&self) -> &str {
        crate::store::path::leaf_name(&self.path)
    }

    pub fn is_live(&self) -> bool {
        self.deleted_at.is_none()
    }
}

/// Common header shared by every element of a project tree.
#[derive(Debug, Clone, Serialize)]
pub struct EntryHeader {
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
    pub name: String,
    pub path: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum EntryPayload {
    Folder,
    Doc {
        version: i64,
    },
    File {
        hash: String,
        size: i64,
        #[serde(skip_serializing_if = "Option::is_none")]
        linked_file_data: Option<serde_json::Value>,
    },
}

/// One live element of a project tree, as returned by tree listings.
#[derive(Debug, Clone, Serialize)]
pub struct TreeEntry {
    #[serde(flatten)]
    pub header: EntryHeader,
    #[serde(flatten)]
    pub payload: EntryPayload,
}

impl TreeEntry {
    pub fn kind(&self) -> NodeKind {
        match self.payload {
            EntryPayload::Folder => NodeKind::Folder,
            EntryPayload::Doc { .. } => NodeKind::Doc,
            EntryPayload::File { .. } => NodeKind::File,
        }
    }
}

/// A doc or file whose path changed as part of a structural mutation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NodePath {
    pub id: String,
    pub kind: NodeKind,
    pub path: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct Created {
    pub id: String,
    pub path: String,
    pub version: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct Moved {
    pub version: i64,
    pub old_path: String,
    pub path: String,
}

/// Result of a folder move or rename.
#[derive(Debug, Clone, Serialize)]
pub struct MovedFolder {
    pub version: i64,
    pub old_path: String,
    pub path: String,
    /// Docs and files below the folder with their rewritten paths.
    pub descendants: Vec<NodePath>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DeletedSubtree {
    pub version: i64,
    /// Every node tombstoned by the delete, the folder itself included.
    pub deleted: Vec<NodePath>,
}

#[derive(Debug, Clone, Serialize)]
pub struct EnsuredDoc {
    pub doc_id: String,
    pub path: String,
    pub version: i64,
    pub created: bool,
    /// Id of a file that was deleted to make room for the doc.
    pub replaced_file_id: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct FinalizedFile {
    pub file_id: String,
    pub path: String,
    pub version: i64,
    /// Live node that previously occupied the path and was soft-deleted.
    pub replaced: Option<NodePath>,
}
