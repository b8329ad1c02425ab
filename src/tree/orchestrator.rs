use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::Serialize;

use super::name::{unique_name, validate_name};
use super::walk::TreeIndex;
use crate::auth::{Authorization, TokenGenerator, TokenKind, lookup_key, parse_token, resolve};
use crate::blob::{BlobStore, content_hash};
use crate::error::{Error, Result};
use crate::notify::{Notification, Notifier, PathUpdate, TreeEvent, UpdateType};
use crate::store::Store;
use crate::store::path::{leaf_name, rebase};
use crate::types::*;

/// Counts reported by [`FileTree::collect_garbage`].
#[derive(Debug, Clone, Default, Serialize)]
pub struct GarbageReport {
    pub pending_files: usize,
    pub purged_projects: usize,
    pub blobs_deleted: usize,
}

/// Entry point for every tree operation. Validates input, runs the store
/// transaction, and hands the committed change to the [`Notifier`].
pub struct FileTree {
    store: Arc<dyn Store>,
    blobs: Arc<dyn BlobStore>,
    notifier: Notifier,
    tokens: TokenGenerator,
}

impl FileTree {
    pub fn new(store: Arc<dyn Store>, blobs: Arc<dyn BlobStore>, notifier: Notifier) -> Self {
        Self {
            store,
            blobs,
            notifier,
            tokens: TokenGenerator::new(),
        }
    }

    pub fn store(&self) -> &dyn Store {
        self.store.as_ref()
    }

    fn notify(&self, notification: Notification) {
        self.notifier.dispatch(notification);
    }

    fn access_changed(&self, project_id: &str, epoch: i64) {
        self.notify(Notification::new(project_id).event(TreeEvent::AccessChanged { epoch }));
    }

    // Projects

    pub fn create_project(&self, project: &NewProject) -> Result<Project> {
        validate_name(&project.name)?;
        self.store.create_project(project)
    }

    pub fn list_projects(&self, user_id: &str) -> Result<Vec<(Project, ProjectMember)>> {
        self.store.list_user_projects(user_id)
    }

    /// Loads the project for a caller that may read it and records the visit.
    pub fn open_project(
        &self,
        project_id: &str,
        user_id: Option<&str>,
        token: Option<&str>,
    ) -> Result<(Project, Authorization)> {
        let auth = self.authorize(project_id, user_id, token)?;
        let project = self
            .store
            .get_project(project_id)?
            .ok_or(Error::NotFoundOrNotAuthorized)?;
        self.store.touch_project_opened(project_id)?;
        Ok((project, auth))
    }

    pub fn soft_delete_project(&self, project_id: &str, user_id: &str) -> Result<()> {
        self.store.soft_delete_project(project_id, user_id)
    }

    pub fn restore_project(&self, project_id: &str, user_id: &str) -> Result<()> {
        self.store.restore_project(project_id, user_id)?;
        if let Some(project) = self.store.get_project(project_id)? {
            self.access_changed(project_id, project.epoch);
        }
        Ok(())
    }

    pub fn set_root_doc(&self, project_id: &str, user_id: &str, doc_id: &str) -> Result<()> {
        self.store.set_root_doc(project_id, user_id, doc_id)?;
        self.notify(Notification::new(project_id).event(TreeEvent::RootDocChanged {
            doc_id: doc_id.to_string(),
        }));
        Ok(())
    }

    pub fn set_member_flags(
        &self,
        project_id: &str,
        user_id: &str,
        archived: bool,
        trashed: bool,
    ) -> Result<()> {
        self.store
            .set_member_flags(project_id, user_id, archived, trashed)
    }

    // Sharing

    pub fn add_member(
        &self,
        project_id: &str,
        owner_id: &str,
        user_id: &str,
        privilege: PrivilegeLevel,
    ) -> Result<i64> {
        let epoch = self
            .store
            .add_member(project_id, owner_id, user_id, privilege)?;
        self.access_changed(project_id, epoch);
        Ok(epoch)
    }

    pub fn remove_member(&self, project_id: &str, owner_id: &str, user_id: &str) -> Result<i64> {
        let epoch = self.store.remove_member(project_id, owner_id, user_id)?;
        self.access_changed(project_id, epoch);
        Ok(epoch)
    }

    pub fn list_members(
        &self,
        project_id: &str,
        user_id: &str,
    ) -> Result<Vec<ProjectMember>> {
        self.authorize(project_id, Some(user_id), None)?;
        self.store.list_members(project_id)
    }

    pub fn transfer_ownership(
        &self,
        project_id: &str,
        owner_id: &str,
        new_owner_id: &str,
    ) -> Result<i64> {
        let epoch = self
            .store
            .transfer_ownership(project_id, owner_id, new_owner_id)?;
        self.access_changed(project_id, epoch);
        Ok(epoch)
    }

    /// Switching to token-based sharing makes sure both tokens exist.
    pub fn set_public_access_level(
        &self,
        project_id: &str,
        owner_id: &str,
        level: PublicAccessLevel,
    ) -> Result<i64> {
        if level == PublicAccessLevel::TokenBased {
            self.ensure_access_tokens(project_id, owner_id)?;
        }
        let epoch = self
            .store
            .set_public_access_level(project_id, owner_id, level)?;
        self.access_changed(project_id, epoch);
        Ok(epoch)
    }

    /// Returns the project's sharing tokens, generating them on first use.
    /// Only the owner may see them.
    pub fn ensure_access_tokens(&self, project_id: &str, owner_id: &str) -> Result<AccessTokens> {
        let auth = self.authorize(project_id, Some(owner_id), None)?;
        if auth.privilege_level != PrivilegeLevel::Owner {
            return Err(Error::NotFoundOrNotAuthorized);
        }
        self.tokens.ensure_tokens(self.store.as_ref(), project_id)
    }

    /// Opens the project a sharing link points at. The token alone locates
    /// the project; a signed-in caller is then recorded as a token member.
    pub fn join_by_token(
        &self,
        user_id: Option<&str>,
        token: &str,
    ) -> Result<(Project, Authorization)> {
        let kind = parse_token(token).map_err(|_| Error::NotFoundOrNotAuthorized)?;
        let key = lookup_key(token, kind);
        let project_id = match kind {
            TokenKind::ReadOnly => self.store.find_project_by_read_only_token(key)?,
            TokenKind::ReadAndWrite => self.store.find_project_by_read_and_write_prefix(key)?,
        }
        .ok_or(Error::NotFoundOrNotAuthorized)?;

        self.open_project(&project_id, user_id, Some(token))
    }

    /// Resolves the caller's privilege on a project. A signed-in user who
    /// gains access by presenting a token is recorded as a token member.
    pub fn authorize(
        &self,
        project_id: &str,
        user_id: Option<&str>,
        token: Option<&str>,
    ) -> Result<Authorization> {
        let access = self
            .store
            .get_project_access(project_id, user_id)?
            .ok_or(Error::NotFoundOrNotAuthorized)?;
        let mut auth = resolve(&access, user_id, token)?;

        let recorded = access.member.as_ref().map(|m| m.privilege_level);
        if let Some(user) = user_id {
            if auth.is_token_member && recorded < Some(auth.privilege_level) {
                auth.epoch = self
                    .store
                    .add_token_member(project_id, user, auth.privilege_level)?;
                tracing::info!(project_id, user_id = user, privilege = %auth.privilege_level, "granted token access");
            }
        }
        Ok(auth)
    }

    // Tree reads

    pub fn get_project_tree(
        &self,
        project_id: &str,
        user_id: Option<&str>,
        token: Option<&str>,
    ) -> Result<Vec<TreeEntry>> {
        self.authorize(project_id, user_id, token)?;
        self.store.list_tree(project_id)
    }

    pub fn find_entry_by_path(
        &self,
        project_id: &str,
        user_id: Option<&str>,
        token: Option<&str>,
        path: &str,
    ) -> Result<TreeEntry> {
        let entries = self.get_project_tree(project_id, user_id, token)?;
        TreeIndex::build(entries)
            .find_by_path(path)
            .cloned()
            .ok_or(Error::NotFoundOrNotAuthorized)
    }

    pub fn list_deleted_docs(&self, project_id: &str, user_id: &str) -> Result<Vec<TreeNode>> {
        self.authorize(project_id, Some(user_id), None)?;
        self.store.list_deleted_docs(project_id)
    }

    pub async fn read_file(
        &self,
        project_id: &str,
        user_id: Option<&str>,
        token: Option<&str>,
        file_id: &str,
    ) -> Result<(FileMeta, Bytes)> {
        self.authorize(project_id, user_id, token)?;
        let live = self
            .store
            .get_tree_node(project_id, file_id)?
            .is_some_and(|n| n.kind == NodeKind::File && n.is_live());
        if !live {
            return Err(Error::NotFoundOrNotAuthorized);
        }
        let meta = self
            .store
            .get_file(project_id, file_id)?
            .filter(|f| !f.pending)
            .ok_or(Error::NotFoundOrNotAuthorized)?;
        let data = self.blobs.get(file_id).await?;
        Ok((meta, data))
    }

    // Structural mutations

    pub fn add_folder(
        &self,
        project_id: &str,
        user_id: &str,
        parent_id: &str,
        name: &str,
    ) -> Result<Created> {
        validate_name(name)?;
        let created = self.store.add_folder(project_id, user_id, parent_id, name)?;

        self.notify(Notification::new(project_id).event(TreeEvent::NewFolder {
            folder_id: created.id.clone(),
            parent_id: parent_id.to_string(),
            name: name.to_string(),
            tree_version: created.version,
        }));
        Ok(created)
    }

    pub fn create_doc(
        &self,
        project_id: &str,
        user_id: &str,
        parent_id: &str,
        name: &str,
        snapshot: &str,
    ) -> Result<Created> {
        validate_name(name)?;
        let created = self
            .store
            .create_doc(project_id, user_id, parent_id, name, snapshot)?;

        self.notify(
            Notification::new(project_id)
                .event(TreeEvent::NewDoc {
                    doc_id: created.id.clone(),
                    parent_id: parent_id.to_string(),
                    name: name.to_string(),
                    tree_version: created.version,
                })
                .content(
                    created.version,
                    vec![PathUpdate::add(&created.id, NodeKind::Doc, &created.path)],
                ),
        );
        Ok(created)
    }

    /// Creates the doc, or returns the one already at that path. Safe to
    /// repeat after a client retry.
    pub fn ensure_is_doc(
        &self,
        project_id: &str,
        user_id: &str,
        parent_id: &str,
        name: &str,
        snapshot: &str,
    ) -> Result<EnsuredDoc> {
        validate_name(name)?;
        let ensured = self
            .store
            .ensure_is_doc(project_id, user_id, parent_id, name, snapshot)?;
        if !ensured.created {
            return Ok(ensured);
        }

        let mut notification = Notification::new(project_id);
        let mut updates = Vec::new();
        if let Some(file_id) = &ensured.replaced_file_id {
            notification = notification.event(TreeEvent::EntityRemoved {
                entity_id: file_id.clone(),
                tree_version: ensured.version,
            });
            updates.push(PathUpdate::delete(file_id, NodeKind::File, &ensured.path));
        }
        updates.push(PathUpdate::add(&ensured.doc_id, NodeKind::Doc, &ensured.path));

        self.notify(
            notification
                .event(TreeEvent::NewDoc {
                    doc_id: ensured.doc_id.clone(),
                    parent_id: parent_id.to_string(),
                    name: name.to_string(),
                    tree_version: ensured.version,
                })
                .content(ensured.version, updates),
        );
        Ok(ensured)
    }

    /// Stores an uploaded file in two phases: an invisible placeholder row,
    /// then the blob, then the row is made live. If the last step fails the
    /// blob is removed; the placeholder is left for garbage collection.
    pub async fn upload_file(
        &self,
        project_id: &str,
        user_id: &str,
        parent_id: &str,
        name: &str,
        data: Bytes,
        linked_file_data: Option<serde_json::Value>,
    ) -> Result<FinalizedFile> {
        validate_name(name)?;
        let pending = PendingFile {
            hash: content_hash(&data),
            size: data.len() as i64,
            linked_file_data,
        };

        let file_id = self
            .store
            .prepare_file_creation(project_id, user_id, parent_id, name, &pending)?;
        self.blobs.put(&file_id, data).await?;

        let finalized = match self.store.finalize_file_creation(project_id, user_id, &file_id) {
            Ok(finalized) => finalized,
            Err(e) => {
                if let Err(cleanup) = self.blobs.delete(&file_id).await {
                    tracing::warn!(project_id, file_id, "failed to remove orphaned blob: {cleanup}");
                }
                return Err(e);
            }
        };

        let mut notification = Notification::new(project_id);
        let mut updates = Vec::new();
        if let Some(replaced) = &finalized.replaced {
            notification = notification.event(TreeEvent::EntityRemoved {
                entity_id: replaced.id.clone(),
                tree_version: finalized.version,
            });
            updates.push(PathUpdate::delete(&replaced.id, replaced.kind, &replaced.path));
        }
        updates.push(PathUpdate::add(&finalized.file_id, NodeKind::File, &finalized.path));

        self.notify(
            notification
                .event(TreeEvent::NewFile {
                    file_id: finalized.file_id.clone(),
                    parent_id: parent_id.to_string(),
                    name: name.to_string(),
                    hash: pending.hash,
                    size: pending.size,
                    tree_version: finalized.version,
                })
                .content(finalized.version, updates),
        );
        Ok(finalized)
    }

    pub fn delete_entity(
        &self,
        project_id: &str,
        user_id: &str,
        kind: NodeKind,
        entity_id: &str,
    ) -> Result<DeletedSubtree> {
        let deleted = match kind {
            NodeKind::Doc => self.store.delete_doc(project_id, user_id, entity_id)?,
            NodeKind::File => self.store.delete_file(project_id, user_id, entity_id)?,
            NodeKind::Folder => self.store.delete_folder(project_id, user_id, entity_id)?,
        };

        let updates = deleted
            .deleted
            .iter()
            .filter(|n| n.kind != NodeKind::Folder)
            .map(|n| PathUpdate::delete(&n.id, n.kind, &n.path))
            .collect();
        self.notify(
            Notification::new(project_id)
                .event(TreeEvent::EntityRemoved {
                    entity_id: entity_id.to_string(),
                    tree_version: deleted.version,
                })
                .content(deleted.version, updates),
        );
        Ok(deleted)
    }

    pub fn move_entity(
        &self,
        project_id: &str,
        user_id: &str,
        kind: NodeKind,
        entity_id: &str,
        parent_id: &str,
    ) -> Result<Moved> {
        let (moved, updates) = match kind {
            NodeKind::Doc | NodeKind::File => {
                let moved = if kind == NodeKind::Doc {
                    self.store.move_doc(project_id, user_id, entity_id, parent_id)?
                } else {
                    self.store.move_file(project_id, user_id, entity_id, parent_id)?
                };
                let update =
                    PathUpdate::relocate(UpdateType::Move, entity_id, kind, &moved.old_path, &moved.path);
                (moved, vec![update])
            }
            NodeKind::Folder => {
                let moved = self
                    .store
                    .move_folder(project_id, user_id, entity_id, parent_id)?;
                folder_updates(UpdateType::Move, moved)
            }
        };

        self.notify(
            Notification::new(project_id)
                .event(TreeEvent::EntityMoved {
                    entity_id: entity_id.to_string(),
                    new_parent_id: parent_id.to_string(),
                    tree_version: moved.version,
                })
                .content(moved.version, updates),
        );
        Ok(moved)
    }

    pub fn rename_entity(
        &self,
        project_id: &str,
        user_id: &str,
        kind: NodeKind,
        entity_id: &str,
        name: &str,
    ) -> Result<Moved> {
        validate_name(name)?;
        let (renamed, updates) = match kind {
            NodeKind::Doc | NodeKind::File => {
                let renamed = if kind == NodeKind::Doc {
                    self.store.rename_doc(project_id, user_id, entity_id, name)?
                } else {
                    self.store.rename_file(project_id, user_id, entity_id, name)?
                };
                let update = PathUpdate::relocate(
                    UpdateType::Rename,
                    entity_id,
                    kind,
                    &renamed.old_path,
                    &renamed.path,
                );
                (renamed, vec![update])
            }
            NodeKind::Folder => {
                let renamed = self
                    .store
                    .rename_folder(project_id, user_id, entity_id, name)?;
                folder_updates(UpdateType::Rename, renamed)
            }
        };

        self.notify(
            Notification::new(project_id)
                .event(TreeEvent::EntityRenamed {
                    entity_id: entity_id.to_string(),
                    new_name: name.to_string(),
                    tree_version: renamed.version,
                })
                .content(renamed.version, updates),
        );
        Ok(renamed)
    }

    /// Brings a deleted doc back into the root folder. Without a requested
    /// name the doc keeps its old one; either way a suffix is added if the
    /// root folder already has a child by that name.
    pub fn restore_doc(
        &self,
        project_id: &str,
        user_id: &str,
        doc_id: &str,
        name: Option<&str>,
    ) -> Result<Moved> {
        self.authorize(project_id, Some(user_id), None)?;
        let doc = self
            .store
            .get_tree_node(project_id, doc_id)?
            .filter(|n| n.kind == NodeKind::Doc && !n.is_live())
            .ok_or(Error::NotFoundOrNotAuthorized)?;

        let wanted = name.unwrap_or_else(|| leaf_name(&doc.path));
        validate_name(wanted)?;

        let root = self.store.get_root_folder(project_id)?;
        let taken = self.store.list_folder_child_names(project_id, &root.id)?;
        let name = unique_name(wanted, &taken);

        let restored = self.store.restore_doc(project_id, user_id, doc_id, &name)?;

        self.notify(
            Notification::new(project_id)
                .event(TreeEvent::NewDoc {
                    doc_id: doc_id.to_string(),
                    parent_id: root.id,
                    name,
                    tree_version: restored.version,
                })
                .content(
                    restored.version,
                    vec![PathUpdate::add(doc_id, NodeKind::Doc, &restored.path)],
                ),
        );
        Ok(restored)
    }

    // Maintenance

    /// Removes file placeholders abandoned for longer than `grace`, purges
    /// projects soft-deleted more than `retention` ago, and deletes the blobs
    /// of both.
    pub async fn collect_garbage(&self, grace: Duration, retention: Duration) -> Result<GarbageReport> {
        let now = Utc::now();
        let cutoff = |age: Duration| {
            chrono::Duration::from_std(age)
                .ok()
                .and_then(|age| now.checked_sub_signed(age))
                .unwrap_or(DateTime::<Utc>::MIN_UTC)
        };
        let pending_cutoff = cutoff(grace);
        let purge_cutoff = cutoff(retention);

        let pending = self.store.collect_pending_files(pending_cutoff)?;
        let purged = self.store.purge_deleted_projects(purge_cutoff)?;

        let mut report = GarbageReport {
            pending_files: pending.len(),
            purged_projects: purged.project_ids.len(),
            blobs_deleted: 0,
        };

        for file_id in pending.iter().chain(&purged.file_ids) {
            match self.blobs.delete(file_id).await {
                Ok(true) => report.blobs_deleted += 1,
                Ok(false) => {}
                Err(e) => tracing::warn!(file_id, "failed to delete blob: {e}"),
            }
        }

        tracing::info!(
            pending_files = report.pending_files,
            purged_projects = report.purged_projects,
            blobs_deleted = report.blobs_deleted,
            "garbage collection finished"
        );
        Ok(report)
    }
}

/// Content-sync updates for a folder move or rename: one per doc or file
/// below it, carrying both the old and new path.
fn folder_updates(update_type: UpdateType, moved: MovedFolder) -> (Moved, Vec<PathUpdate>) {
    let updates = moved
        .descendants
        .iter()
        .filter_map(|n| {
            let old = rebase(&n.path, &moved.path, &moved.old_path)?;
            Some(PathUpdate::relocate(update_type, &n.id, n.kind, &old, &n.path))
        })
        .collect();

    (
        Moved {
            version: moved.version,
            old_path: moved.old_path,
            path: moved.path,
        },
        updates,
    )
}
