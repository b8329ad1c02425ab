//! Structural tree mutations.
//!
//! Each function runs inside a transaction opened by [`super::SqliteStore`]
//! and starts with a gate query joining the target node, its live project and
//! the acting user's membership row. Subtree operations touch every affected
//! row with a single prefix-matched statement, so a folder and its
//! descendants always move, rename or disappear together.
//!
//! Prefixes are compared with `substr(path, 1, length(?)) = ?` rather than
//! `LIKE`, so `%` and `_` in user-supplied names match literally.
//!
//! Name uniqueness is enforced by the `rtrim(path, '/')` index, so every
//! statement that writes a path is also the duplicate-name check.

use chrono::{Duration, Utc};
use rusqlite::{Connection, OptionalExtension, params};
use uuid::Uuid;

use super::path::{folder_path, is_within, leaf_name, leaf_path, name_key, parent_path};
use super::schema::LIVE;
use super::sqlite::{format_datetime, parse_kind};
use crate::error::{DbResultExt, Error, Result};
use crate::types::*;

/// Attempts made by `ensure_is_doc` before giving up on a path that keeps
/// being reoccupied.
const MAX_ENSURE_ATTEMPTS: usize = 3;

// Token members only write while the project is still shared by token.
const GATE_LIVE: &str = "SELECT n.parent_id, n.path
     FROM tree_nodes n
     JOIN projects p ON p.id = n.project_id AND p.deleted_at IS NULL
     JOIN project_members m
       ON m.project_id = p.id AND m.user_id = ?3 AND m.privilege_level >= ?4
      AND (m.access_source != 'token' OR p.public_access_level = 'tokenBased')
     WHERE n.id = ?1 AND n.project_id = ?2 AND n.kind = ?5 AND n.deleted_at = ?6";

const GATE_DELETED: &str = "SELECT n.parent_id, n.path
     FROM tree_nodes n
     JOIN projects p ON p.id = n.project_id AND p.deleted_at IS NULL
     JOIN project_members m
       ON m.project_id = p.id AND m.user_id = ?3 AND m.privilege_level >= ?4
      AND (m.access_source != 'token' OR p.public_access_level = 'tokenBased')
     WHERE n.id = ?1 AND n.project_id = ?2 AND n.kind = ?5 AND n.deleted_at != ?6";

const GATE_PENDING_FILE: &str = "SELECT parent.path, n.path
     FROM tree_nodes n
     JOIN files f ON f.id = n.id AND f.pending = 1
     JOIN tree_nodes parent ON parent.id = n.parent_id AND parent.deleted_at = ?5
     JOIN projects p ON p.id = n.project_id AND p.deleted_at IS NULL
     JOIN project_members m
       ON m.project_id = p.id AND m.user_id = ?3 AND m.privilege_level >= ?4
      AND (m.access_source != 'token' OR p.public_access_level = 'tokenBased')
     WHERE n.id = ?1 AND n.project_id = ?2 AND n.kind = 'file' AND n.deleted_at != ?5";

/// A node that passed the gate.
struct Target {
    id: String,
    parent_id: Option<String>,
    path: String,
}

#[derive(Clone, Copy)]
enum Liveness {
    Live,
    Deleted,
}

struct NewNode<'a> {
    id: &'a str,
    project_id: &'a str,
    parent_id: Option<&'a str>,
    kind: NodeKind,
    path: &'a str,
    created_at: &'a str,
    deleted_at: &'a str,
}

fn gate(
    conn: &Connection,
    op: &'static str,
    project_id: &str,
    user_id: &str,
    node_id: &str,
    kind: NodeKind,
    liveness: Liveness,
) -> Result<Target> {
    let sql = match liveness {
        Liveness::Live => GATE_LIVE,
        Liveness::Deleted => GATE_DELETED,
    };

    conn.query_row(
        sql,
        params![
            node_id,
            project_id,
            user_id,
            PrivilegeLevel::ReadAndWrite.as_i64(),
            kind.as_str(),
            LIVE
        ],
        |row| {
            Ok(Target {
                id: node_id.to_string(),
                parent_id: row.get(0)?,
                path: row.get(1)?,
            })
        },
    )
    .optional()
    .during(op)?
    .ok_or(Error::NotFoundOrNotAuthorized)
}

/// Looks up a live folder of the same project. Only called after the gate
/// has already established the caller's privilege on the project.
fn live_folder(conn: &Connection, op: &'static str, project_id: &str, id: &str) -> Result<Target> {
    conn.query_row(
        "SELECT parent_id, path FROM tree_nodes
         WHERE id = ?1 AND project_id = ?2 AND kind = 'folder' AND deleted_at = ?3",
        params![id, project_id, LIVE],
        |row| {
            Ok(Target {
                id: id.to_string(),
                parent_id: row.get(0)?,
                path: row.get(1)?,
            })
        },
    )
    .optional()
    .during(op)?
    .ok_or(Error::NotFoundOrNotAuthorized)
}

fn root_folder(conn: &Connection, op: &'static str, project_id: &str) -> Result<Target> {
    conn.query_row(
        "SELECT id, path FROM tree_nodes WHERE project_id = ?1 AND parent_id IS NULL",
        params![project_id],
        |row| {
            Ok(Target {
                id: row.get(0)?,
                parent_id: None,
                path: row.get(1)?,
            })
        },
    )
    .optional()
    .during(op)?
    .ok_or(Error::NotFoundOrNotAuthorized)
}

fn insert_node(conn: &Connection, op: &'static str, node: &NewNode<'_>) -> Result<()> {
    conn.execute(
        "INSERT INTO tree_nodes (id, project_id, parent_id, kind, path, created_at, deleted_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            node.id,
            node.project_id,
            node.parent_id,
            node.kind.as_str(),
            node.path,
            node.created_at,
            node.deleted_at,
        ],
    )
    .on_duplicate(op)?;
    Ok(())
}

fn insert_doc(conn: &Connection, op: &'static str, id: &str, snapshot: &str) -> Result<()> {
    conn.execute(
        "INSERT INTO docs (id, snapshot, version) VALUES (?1, ?2, 0)",
        params![id, snapshot],
    )
    .during(op)?;
    Ok(())
}

/// The live node whose name collides with `path`, whatever its kind.
fn find_live_at_path(
    conn: &Connection,
    op: &'static str,
    project_id: &str,
    path: &str,
) -> Result<Option<NodePath>> {
    conn.query_row(
        "SELECT id, kind, path FROM tree_nodes
         WHERE project_id = ?1 AND rtrim(path, '/') = ?2 AND deleted_at = ?3",
        params![project_id, name_key(path), LIVE],
        |row| {
            Ok(NodePath {
                id: row.get(0)?,
                kind: parse_kind(&row.get::<_, String>(1)?),
                path: row.get(2)?,
            })
        },
    )
    .optional()
    .during(op)
}

fn tombstone(conn: &Connection, op: &'static str, id: &str, at: &str) -> Result<()> {
    conn.execute(
        "UPDATE tree_nodes SET deleted_at = ?2 WHERE id = ?1 AND deleted_at = ?3",
        params![id, at, LIVE],
    )
    .during(op)?;
    Ok(())
}

/// Clears `root_doc_id` if it points at a node tombstoned at `deleted_at`.
fn clear_root_doc(conn: &Connection, op: &'static str, project_id: &str, deleted_at: &str) -> Result<()> {
    conn.execute(
        "UPDATE projects SET root_doc_id = NULL
         WHERE id = ?1 AND root_doc_id IN (
             SELECT id FROM tree_nodes WHERE project_id = ?1 AND deleted_at = ?2
         )",
        params![project_id, deleted_at],
    )
    .during(op)?;
    Ok(())
}

fn bump_tree_version(
    conn: &Connection,
    op: &'static str,
    project_id: &str,
    user_id: &str,
    at: &str,
) -> Result<i64> {
    conn.query_row(
        "UPDATE projects
         SET tree_version = tree_version + 1, last_updated_at = ?2, last_updated_by = ?3
         WHERE id = ?1
         RETURNING tree_version",
        params![project_id, at, user_id],
        |row| row.get(0),
    )
    .during(op)
}

fn current_tree_version(conn: &Connection, op: &'static str, project_id: &str) -> Result<i64> {
    conn.query_row(
        "SELECT tree_version FROM projects WHERE id = ?1",
        params![project_id],
        |row| row.get(0),
    )
    .during(op)
}

fn collect_node_paths(
    conn: &Connection,
    op: &'static str,
    sql: &str,
    params: impl rusqlite::Params,
) -> Result<Vec<NodePath>> {
    let mut stmt = conn.prepare(sql).during(op)?;
    let rows = stmt
        .query_map(params, |row| {
            Ok(NodePath {
                id: row.get(0)?,
                kind: parse_kind(&row.get::<_, String>(1)?),
                path: row.get(2)?,
            })
        })
        .during(op)?;

    rows.collect::<std::result::Result<Vec<_>, _>>()
        .on_duplicate(op)
}

/// Rewrites the path of every live node below `old_prefix`, except `skip_id`,
/// by swapping the prefix for `new_prefix`.
fn rewrite_descendants(
    conn: &Connection,
    op: &'static str,
    project_id: &str,
    old_prefix: &str,
    new_prefix: &str,
    skip_id: &str,
) -> Result<Vec<NodePath>> {
    let rewritten = collect_node_paths(
        conn,
        op,
        "UPDATE tree_nodes SET path = ?1 || substr(path, length(?2) + 1)
         WHERE project_id = ?3 AND deleted_at = ?4 AND id != ?5
           AND substr(path, 1, length(?2)) = ?2
         RETURNING id, kind, path",
        params![new_prefix, old_prefix, project_id, LIVE, skip_id],
    )?;

    Ok(rewritten
        .into_iter()
        .filter(|n| n.kind != NodeKind::Folder)
        .collect())
}

fn now_stamp() -> String {
    format_datetime(&Utc::now())
}

pub(super) fn add_folder(
    conn: &Connection,
    project_id: &str,
    user_id: &str,
    parent_id: &str,
    name: &str,
) -> Result<Created> {
    const OP: &str = "add_folder";

    let parent = gate(conn, OP, project_id, user_id, parent_id, NodeKind::Folder, Liveness::Live)?;
    let stamp = now_stamp();
    let id = Uuid::new_v4().to_string();
    let path = folder_path(&parent.path, name);

    insert_node(
        conn,
        OP,
        &NewNode {
            id: &id,
            project_id,
            parent_id: Some(&parent.id),
            kind: NodeKind::Folder,
            path: &path,
            created_at: &stamp,
            deleted_at: LIVE,
        },
    )?;
    let version = bump_tree_version(conn, OP, project_id, user_id, &stamp)?;

    Ok(Created { id, path, version })
}

pub(super) fn create_doc(
    conn: &Connection,
    project_id: &str,
    user_id: &str,
    parent_id: &str,
    name: &str,
    snapshot: &str,
) -> Result<Created> {
    const OP: &str = "create_doc";

    let parent = gate(conn, OP, project_id, user_id, parent_id, NodeKind::Folder, Liveness::Live)?;
    let stamp = now_stamp();
    let id = Uuid::new_v4().to_string();
    let path = leaf_path(&parent.path, name);

    insert_node(
        conn,
        OP,
        &NewNode {
            id: &id,
            project_id,
            parent_id: Some(&parent.id),
            kind: NodeKind::Doc,
            path: &path,
            created_at: &stamp,
            deleted_at: LIVE,
        },
    )?;
    insert_doc(conn, OP, &id, snapshot)?;
    let version = bump_tree_version(conn, OP, project_id, user_id, &stamp)?;

    Ok(Created { id, path, version })
}

/// Creates a doc at `parent/name`, or reuses the doc already there. A file
/// occupying the path is deleted first; a folder is a conflict.
pub(super) fn ensure_is_doc(
    conn: &Connection,
    project_id: &str,
    user_id: &str,
    parent_id: &str,
    name: &str,
    snapshot: &str,
) -> Result<EnsuredDoc> {
    const OP: &str = "ensure_is_doc";

    let parent = gate(conn, OP, project_id, user_id, parent_id, NodeKind::Folder, Liveness::Live)?;
    let stamp = now_stamp();
    let path = leaf_path(&parent.path, name);
    let mut replaced_file_id = None;

    for _ in 0..MAX_ENSURE_ATTEMPTS {
        let id = Uuid::new_v4().to_string();
        let inserted = insert_node(
            conn,
            OP,
            &NewNode {
                id: &id,
                project_id,
                parent_id: Some(&parent.id),
                kind: NodeKind::Doc,
                path: &path,
                created_at: &stamp,
                deleted_at: LIVE,
            },
        );

        match inserted {
            Ok(()) => {
                insert_doc(conn, OP, &id, snapshot)?;
                let version = bump_tree_version(conn, OP, project_id, user_id, &stamp)?;
                return Ok(EnsuredDoc {
                    doc_id: id,
                    path,
                    version,
                    created: true,
                    replaced_file_id,
                });
            }
            Err(Error::DuplicateNameInFolder) => {}
            Err(e) => return Err(e),
        }

        match find_live_at_path(conn, OP, project_id, &path)? {
            Some(existing) if existing.kind == NodeKind::Doc => {
                let version = current_tree_version(conn, OP, project_id)?;
                return Ok(EnsuredDoc {
                    doc_id: existing.id,
                    path,
                    version,
                    created: false,
                    replaced_file_id,
                });
            }
            Some(existing) if existing.kind == NodeKind::File => {
                tombstone(conn, OP, &existing.id, &stamp)?;
                replaced_file_id = Some(existing.id);
            }
            Some(_) => return Err(Error::DuplicateNameInFolder),
            None => {}
        }
    }

    Err(Error::DuplicateNameInFolder)
}

/// Inserts a tombstoned file node and its pending row. The node stays
/// invisible until [`finalize_file_creation`] runs.
pub(super) fn prepare_file_creation(
    conn: &Connection,
    project_id: &str,
    user_id: &str,
    parent_id: &str,
    name: &str,
    file: &PendingFile,
) -> Result<String> {
    const OP: &str = "prepare_file_creation";

    let parent = gate(conn, OP, project_id, user_id, parent_id, NodeKind::Folder, Liveness::Live)?;
    let created_at = Utc::now();
    let placeholder = created_at - Duration::microseconds(1);
    let id = Uuid::new_v4().to_string();
    let path = leaf_path(&parent.path, name);

    insert_node(
        conn,
        OP,
        &NewNode {
            id: &id,
            project_id,
            parent_id: Some(&parent.id),
            kind: NodeKind::File,
            path: &path,
            created_at: &format_datetime(&created_at),
            deleted_at: &format_datetime(&placeholder),
        },
    )?;

    conn.execute(
        "INSERT INTO files (id, hash, linked_file_data, size, pending) VALUES (?1, ?2, ?3, ?4, 1)",
        params![
            id,
            file.hash,
            file.linked_file_data.as_ref().map(|v| v.to_string()),
            file.size,
        ],
    )
    .during(OP)?;

    Ok(id)
}

pub(super) fn finalize_file_creation(
    conn: &Connection,
    project_id: &str,
    user_id: &str,
    file_id: &str,
) -> Result<FinalizedFile> {
    const OP: &str = "finalize_file_creation";

    let (parent, placeholder): (String, String) = conn
        .query_row(
            GATE_PENDING_FILE,
            params![
                file_id,
                project_id,
                user_id,
                PrivilegeLevel::ReadAndWrite.as_i64(),
                LIVE
            ],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .optional()
        .during(OP)?
        .ok_or(Error::NotFoundOrNotAuthorized)?;
    // The parent may have moved or been renamed since the upload began.
    let path = leaf_path(&parent, leaf_name(&placeholder));

    let stamp = now_stamp();
    let replaced = find_live_at_path(conn, OP, project_id, &path)?;
    if let Some(existing) = &replaced {
        if existing.kind == NodeKind::Folder {
            return Err(Error::DuplicateNameInFolder);
        }
        tombstone(conn, OP, &existing.id, &stamp)?;
        clear_root_doc(conn, OP, project_id, &stamp)?;
    }

    conn.execute(
        "UPDATE tree_nodes SET path = ?2, deleted_at = ?3 WHERE id = ?1",
        params![file_id, path, LIVE],
    )
    .on_duplicate(OP)?;
    conn.execute("UPDATE files SET pending = 0 WHERE id = ?1", params![file_id])
        .during(OP)?;
    let version = bump_tree_version(conn, OP, project_id, user_id, &stamp)?;

    Ok(FinalizedFile {
        file_id: file_id.to_string(),
        path,
        version,
        replaced,
    })
}

pub(super) fn delete_leaf(
    conn: &Connection,
    op: &'static str,
    project_id: &str,
    user_id: &str,
    node_id: &str,
    kind: NodeKind,
) -> Result<DeletedSubtree> {
    let target = gate(conn, op, project_id, user_id, node_id, kind, Liveness::Live)?;
    let stamp = now_stamp();

    tombstone(conn, op, &target.id, &stamp)?;
    clear_root_doc(conn, op, project_id, &stamp)?;
    let version = bump_tree_version(conn, op, project_id, user_id, &stamp)?;

    Ok(DeletedSubtree {
        version,
        deleted: vec![NodePath {
            id: target.id,
            kind,
            path: target.path,
        }],
    })
}

pub(super) fn delete_folder(
    conn: &Connection,
    project_id: &str,
    user_id: &str,
    folder_id: &str,
) -> Result<DeletedSubtree> {
    const OP: &str = "delete_folder";

    let folder = gate(conn, OP, project_id, user_id, folder_id, NodeKind::Folder, Liveness::Live)?;
    if folder.parent_id.is_none() {
        return Err(Error::CannotMutateRootFolder);
    }
    let stamp = now_stamp();

    let deleted = collect_node_paths(
        conn,
        OP,
        "UPDATE tree_nodes SET deleted_at = ?1
         WHERE project_id = ?2 AND deleted_at = ?3 AND substr(path, 1, length(?4)) = ?4
         RETURNING id, kind, path",
        params![stamp, project_id, LIVE, folder.path],
    )?;
    clear_root_doc(conn, OP, project_id, &stamp)?;
    let version = bump_tree_version(conn, OP, project_id, user_id, &stamp)?;

    Ok(DeletedSubtree { version, deleted })
}

pub(super) fn move_leaf(
    conn: &Connection,
    op: &'static str,
    project_id: &str,
    user_id: &str,
    node_id: &str,
    kind: NodeKind,
    parent_id: &str,
) -> Result<Moved> {
    let node = gate(conn, op, project_id, user_id, node_id, kind, Liveness::Live)?;
    let parent = live_folder(conn, op, project_id, parent_id)?;
    let path = leaf_path(&parent.path, leaf_name(&node.path));

    conn.execute(
        "UPDATE tree_nodes SET parent_id = ?2, path = ?3 WHERE id = ?1",
        params![node.id, parent.id, path],
    )
    .on_duplicate(op)?;
    let version = bump_tree_version(conn, op, project_id, user_id, &now_stamp())?;

    Ok(Moved {
        version,
        old_path: node.path,
        path,
    })
}

pub(super) fn rename_leaf(
    conn: &Connection,
    op: &'static str,
    project_id: &str,
    user_id: &str,
    node_id: &str,
    kind: NodeKind,
    name: &str,
) -> Result<Moved> {
    let node = gate(conn, op, project_id, user_id, node_id, kind, Liveness::Live)?;
    let path = leaf_path(parent_path(&node.path), name);

    conn.execute(
        "UPDATE tree_nodes SET path = ?2 WHERE id = ?1",
        params![node.id, path],
    )
    .on_duplicate(op)?;
    let version = bump_tree_version(conn, op, project_id, user_id, &now_stamp())?;

    Ok(Moved {
        version,
        old_path: node.path,
        path,
    })
}

/// Gives `folder` the path `new_parent.path + name + "/"` and carries every
/// live descendant along by prefix substitution.
fn relocate_folder(
    conn: &Connection,
    op: &'static str,
    project_id: &str,
    user_id: &str,
    folder: Target,
    new_parent: &Target,
    name: &str,
) -> Result<MovedFolder> {
    let path = folder_path(&new_parent.path, name);

    conn.execute(
        "UPDATE tree_nodes SET parent_id = ?2, path = ?3 WHERE id = ?1",
        params![folder.id, new_parent.id, path],
    )
    .on_duplicate(op)?;
    let descendants = rewrite_descendants(conn, op, project_id, &folder.path, &path, &folder.id)?;
    let version = bump_tree_version(conn, op, project_id, user_id, &now_stamp())?;

    Ok(MovedFolder {
        version,
        old_path: folder.path,
        path,
        descendants,
    })
}

pub(super) fn move_folder(
    conn: &Connection,
    project_id: &str,
    user_id: &str,
    folder_id: &str,
    parent_id: &str,
) -> Result<MovedFolder> {
    const OP: &str = "move_folder";

    let folder = gate(conn, OP, project_id, user_id, folder_id, NodeKind::Folder, Liveness::Live)?;
    if folder.parent_id.is_none() {
        return Err(Error::CannotMutateRootFolder);
    }
    let target = live_folder(conn, OP, project_id, parent_id)?;
    if is_within(&target.path, &folder.path) {
        return Err(Error::CannotMoveIntoSelfOrDescendant);
    }

    let name = leaf_name(&folder.path).to_string();
    relocate_folder(conn, OP, project_id, user_id, folder, &target, &name)
}

pub(super) fn rename_folder(
    conn: &Connection,
    project_id: &str,
    user_id: &str,
    folder_id: &str,
    name: &str,
) -> Result<MovedFolder> {
    const OP: &str = "rename_folder";

    let folder = gate(conn, OP, project_id, user_id, folder_id, NodeKind::Folder, Liveness::Live)?;
    let Some(parent_id) = folder.parent_id.clone() else {
        return Err(Error::CannotMutateRootFolder);
    };
    let parent = live_folder(conn, OP, project_id, &parent_id)?;

    relocate_folder(conn, OP, project_id, user_id, folder, &parent, name)
}

/// Brings a deleted doc back as a child of the root folder.
pub(super) fn restore_doc(
    conn: &Connection,
    project_id: &str,
    user_id: &str,
    doc_id: &str,
    name: &str,
) -> Result<Moved> {
    const OP: &str = "restore_doc";

    let doc = gate(conn, OP, project_id, user_id, doc_id, NodeKind::Doc, Liveness::Deleted)?;
    let root = root_folder(conn, OP, project_id)?;
    let path = leaf_path(&root.path, name);

    conn.execute(
        "UPDATE tree_nodes SET parent_id = ?2, path = ?3, deleted_at = ?4 WHERE id = ?1",
        params![doc.id, root.id, path, LIVE],
    )
    .on_duplicate(OP)?;
    let version = bump_tree_version(conn, OP, project_id, user_id, &now_stamp())?;

    Ok(Moved {
        version,
        old_path: doc.path,
        path,
    })
}

/// Points the project's root doc at a live doc. Not a structural change, so
/// the tree version is left alone.
pub(super) fn set_root_doc(
    conn: &Connection,
    project_id: &str,
    user_id: &str,
    doc_id: &str,
) -> Result<()> {
    const OP: &str = "set_root_doc";

    let doc = gate(conn, OP, project_id, user_id, doc_id, NodeKind::Doc, Liveness::Live)?;
    conn.execute(
        "UPDATE projects SET root_doc_id = ?2, last_updated_at = ?3, last_updated_by = ?4
         WHERE id = ?1",
        params![project_id, doc.id, now_stamp(), user_id],
    )
    .during(OP)?;
    Ok(())
}
