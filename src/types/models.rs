use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{AccessSource, PrivilegeLevel, PublicAccessLevel};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Project {
    pub id: String,
    pub name: String,
    pub owner_id: String,
    pub epoch: i64,
    pub tree_version: i64,
    pub compiler: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_name: Option<String>,
    pub public_access_level: PublicAccessLevel,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub root_doc_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub last_updated_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_updated_by: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_opened_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deleted_at: Option<DateTime<Utc>>,
}

/// Fields supplied when creating a project.
#[derive(Debug, Clone, Deserialize)]
pub struct NewProject {
    pub name: String,
    pub owner_id: String,
    #[serde(default = "default_compiler")]
    pub compiler: String,
    #[serde(default)]
    pub image_name: Option<String>,
}

fn default_compiler() -> String {
    "pdflatex".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectMember {
    pub project_id: String,
    pub user_id: String,
    pub access_source: AccessSource,
    pub privilege_level: PrivilegeLevel,
    pub archived: bool,
    pub trashed: bool,
}

/// Doc content row. The version counter belongs to the content-sync service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Doc {
    pub id: String,
    pub snapshot: String,
    pub version: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileMeta {
    pub id: String,
    pub hash: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub linked_file_data: Option<serde_json::Value>,
    pub size: i64,
    pub pending: bool,
}

/// Metadata recorded for a file before its blob is durably stored.
#[derive(Debug, Clone)]
pub struct PendingFile {
    pub hash: String,
    pub size: i64,
    pub linked_file_data: Option<serde_json::Value>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessTokens {
    pub read_only: String,
    pub read_and_write: String,
    #[serde(skip)]
    pub read_and_write_prefix: String,
}

/// Everything the authorization resolver needs to know about a project for
/// one user. Loaded in a single query.
#[derive(Debug, Clone)]
pub struct ProjectAccess {
    pub project_id: String,
    pub owner_id: String,
    pub epoch: i64,
    pub public_access_level: PublicAccessLevel,
    pub deleted: bool,
    pub read_only_token: Option<String>,
    pub read_and_write_token: Option<String>,
    pub member: Option<ProjectMember>,
}

/// Rows removed by a retention purge. File ids are returned so their blobs
/// can be deleted afterwards.
#[derive(Debug, Clone, Default)]
pub struct PurgedProjects {
    pub project_ids: Vec<String>,
    pub file_ids: Vec<String>,
}
