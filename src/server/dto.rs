use serde::{Deserialize, Serialize};

use crate::auth::Authorization;
use crate::types::{PrivilegeLevel, Project, ProjectMember, PublicAccessLevel};

#[derive(Debug, Deserialize)]
pub struct CreateProjectRequest {
    pub name: String,
    #[serde(default)]
    pub compiler: Option<String>,
    #[serde(default)]
    pub image_name: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ProjectWithAccess {
    #[serde(flatten)]
    pub project: Project,
    pub access: Authorization,
}

#[derive(Debug, Serialize)]
pub struct ProjectListItem {
    #[serde(flatten)]
    pub project: Project,
    pub access_source: crate::types::AccessSource,
    pub privilege_level: PrivilegeLevel,
    pub archived: bool,
    pub trashed: bool,
}

impl From<(Project, ProjectMember)> for ProjectListItem {
    fn from((project, member): (Project, ProjectMember)) -> Self {
        Self {
            project,
            access_source: member.access_source,
            privilege_level: member.privilege_level,
            archived: member.archived,
            trashed: member.trashed,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct MemberFlagsRequest {
    #[serde(default)]
    pub archived: bool,
    #[serde(default)]
    pub trashed: bool,
}

#[derive(Debug, Deserialize)]
pub struct RootDocRequest {
    pub doc_id: String,
}

#[derive(Debug, Deserialize)]
pub struct AddMemberRequest {
    pub user_id: String,
    pub privilege_level: PrivilegeLevel,
}

#[derive(Debug, Deserialize)]
pub struct TransferOwnershipRequest {
    pub user_id: String,
}

#[derive(Debug, Deserialize)]
pub struct PublicAccessRequest {
    pub public_access_level: PublicAccessLevel,
}

#[derive(Debug, Serialize)]
pub struct EpochResponse {
    pub epoch: i64,
}

#[derive(Debug, Deserialize)]
pub struct CreateFolderRequest {
    pub parent_id: String,
    pub name: String,
}

#[derive(Debug, Deserialize)]
pub struct CreateDocRequest {
    pub parent_id: String,
    pub name: String,
    #[serde(default)]
    pub snapshot: String,
}

#[derive(Debug, Deserialize)]
pub struct UploadFileParams {
    pub parent_id: String,
    pub name: String,
}

#[derive(Debug, Deserialize)]
pub struct MoveRequest {
    pub parent_id: String,
}

#[derive(Debug, Deserialize)]
pub struct RenameRequest {
    pub name: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct RestoreDocRequest {
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct LookupParams {
    pub path: String,
}
