pub mod path;
mod schema;
mod sqlite;
mod tree;

pub use schema::LIVE;
pub use sqlite::SqliteStore;

use chrono::{DateTime, Utc};

use crate::error::Result;
use crate::types::*;

/// Store defines the database interface.
///
/// Every structural mutation takes the acting user and runs as one
/// transaction whose first statement checks that the user holds at least
/// read-and-write privilege on a live project containing the target. A
/// failed check, a missing project and a missing node all surface as
/// [`crate::error::Error::NotFoundOrNotAuthorized`].
pub trait Store: Send + Sync {
    fn initialize(&self) -> Result<()>;

    // Project operations
    fn create_project(&self, project: &NewProject) -> Result<Project>;
    fn get_project(&self, id: &str) -> Result<Option<Project>>;
    fn list_user_projects(&self, user_id: &str) -> Result<Vec<(Project, ProjectMember)>>;
    fn soft_delete_project(&self, project_id: &str, user_id: &str) -> Result<()>;
    fn restore_project(&self, project_id: &str, user_id: &str) -> Result<()>;
    fn purge_deleted_projects(&self, cutoff: DateTime<Utc>) -> Result<PurgedProjects>;
    fn touch_project_opened(&self, project_id: &str) -> Result<()>;
    fn set_root_doc(&self, project_id: &str, user_id: &str, doc_id: &str) -> Result<()>;

    // Membership operations (each bumps the project epoch)
    fn add_member(
        &self,
        project_id: &str,
        owner_id: &str,
        user_id: &str,
        privilege: PrivilegeLevel,
    ) -> Result<i64>;
    fn remove_member(&self, project_id: &str, owner_id: &str, user_id: &str) -> Result<i64>;
    fn transfer_ownership(&self, project_id: &str, owner_id: &str, new_owner_id: &str)
    -> Result<i64>;
    fn set_public_access_level(
        &self,
        project_id: &str,
        owner_id: &str,
        level: PublicAccessLevel,
    ) -> Result<i64>;
    fn add_token_member(
        &self,
        project_id: &str,
        user_id: &str,
        privilege: PrivilegeLevel,
    ) -> Result<i64>;
    fn set_member_flags(
        &self,
        project_id: &str,
        user_id: &str,
        archived: bool,
        trashed: bool,
    ) -> Result<()>;
    fn get_member(&self, project_id: &str, user_id: &str) -> Result<Option<ProjectMember>>;
    fn list_members(&self, project_id: &str) -> Result<Vec<ProjectMember>>;

    // Authorization and access tokens
    fn get_project_access(&self, project_id: &str, user_id: Option<&str>)
    -> Result<Option<ProjectAccess>>;
    fn set_access_tokens(&self, project_id: &str, tokens: &AccessTokens) -> Result<AccessTokens>;
    fn find_project_by_read_only_token(&self, token: &str) -> Result<Option<String>>;
    fn find_project_by_read_and_write_prefix(&self, prefix: &str) -> Result<Option<String>>;

    // Tree reads
    fn get_tree_node(&self, project_id: &str, id: &str) -> Result<Option<TreeNode>>;
    fn get_root_folder(&self, project_id: &str) -> Result<TreeNode>;
    fn list_tree(&self, project_id: &str) -> Result<Vec<TreeEntry>>;
    fn list_folder_child_names(&self, project_id: &str, folder_id: &str) -> Result<Vec<String>>;
    fn list_deleted_docs(&self, project_id: &str) -> Result<Vec<TreeNode>>;
    fn get_doc(&self, project_id: &str, id: &str) -> Result<Option<Doc>>;
    fn get_file(&self, project_id: &str, id: &str) -> Result<Option<FileMeta>>;

    // Structural mutations
    fn add_folder(&self, project_id: &str, user_id: &str, parent_id: &str, name: &str)
    -> Result<Created>;
    fn create_doc(
        &self,
        project_id: &str,
        user_id: &str,
        parent_id: &str,
        name: &str,
        snapshot: &str,
    ) -> Result<Created>;
    fn ensure_is_doc(
        &self,
        project_id: &str,
        user_id: &str,
        parent_id: &str,
        name: &str,
        snapshot: &str,
    ) -> Result<EnsuredDoc>;
    fn prepare_file_creation(
        &self,
        project_id: &str,
        user_id: &str,
        parent_id: &str,
        name: &str,
        file: &PendingFile,
    ) -> Result<String>;
    fn finalize_file_creation(
        &self,
        project_id: &str,
        user_id: &str,
        file_id: &str,
    ) -> Result<FinalizedFile>;
    fn delete_doc(&self, project_id: &str, user_id: &str, doc_id: &str) -> Result<DeletedSubtree>;
    fn delete_file(&self, project_id: &str, user_id: &str, file_id: &str)
    -> Result<DeletedSubtree>;
    fn delete_folder(&self, project_id: &str, user_id: &str, folder_id: &str)
    -> Result<DeletedSubtree>;
    fn move_doc(&self, project_id: &str, user_id: &str, doc_id: &str, parent_id: &str)
    -> Result<Moved>;
    fn move_file(&self, project_id: &str, user_id: &str, file_id: &str, parent_id: &str)
    -> Result<Moved>;
    fn move_folder(
        &self,
        project_id: &str,
        user_id: &str,
        folder_id: &str,
        parent_id: &str,
    ) -> Result<MovedFolder>;
    fn rename_doc(&self, project_id: &str, user_id: &str, doc_id: &str, name: &str)
    -> Result<Moved>;
    fn rename_file(&self, project_id: &str, user_id: &str, file_id: &str, name: &str)
    -> Result<Moved>;
    fn rename_folder(
        &self,
        project_id: &str,
        user_id: &str,
        folder_id: &str,
        name: &str,
    ) -> Result<MovedFolder>;
    fn restore_doc(&self, project_id: &str, user_id: &str, doc_id: &str, name: &str)
    -> Result<Moved>;

    // Maintenance
    /// Removes pending file placeholders created before `cutoff` and returns
    /// their ids so the matching blobs can be deleted.
    fn collect_pending_files(&self, cutoff: DateTime<Utc>) -> Result<Vec<String>>;

    fn close(&self) -> Result<()>;
}
