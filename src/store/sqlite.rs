use std::path::Path;
use std::sync::Mutex;

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{Connection, OptionalExtension, Row, Transaction, TransactionBehavior, params};
use uuid::Uuid;

use super::Store;
use super::path::{ROOT_PATH, leaf_name};
use super::schema::{LIVE, SCHEMA};
use super::tree;
use crate::error::{DbResultExt, Error, Result, is_unique_violation};
use crate::types::*;

pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    pub fn new<P: AsRef<Path>>(db_path: P) -> Result<Self> {
        let conn = Connection::open(db_path).during("open")?;

        conn.pragma_update(None, "foreign_keys", "ON")
            .during("open")?;
        conn.pragma_update(None, "journal_mode", "WAL")
            .during("open")?;
        conn.busy_timeout(std::time::Duration::from_secs(5))
            .during("open")?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> std::sync::MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Runs `f` inside an immediate transaction, committing only if it
    /// succeeds. Dropping the transaction on error rolls everything back.
    fn write<T>(&self, op: &'static str, f: impl FnOnce(&Transaction<'_>) -> Result<T>) -> Result<T> {
        let mut conn = self.conn();
        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .during(op)?;
        let out = f(&tx)?;
        tx.commit().during(op)?;
        Ok(out)
    }
}

pub(super) fn parse_datetime(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .or_else(|_| {
            // Handle SQLite's default datetime format: "YYYY-MM-DD HH:MM:SS"
            chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S").map(|ndt| ndt.and_utc())
        })
        .unwrap_or_else(|e| {
            tracing::error!("Invalid datetime in database: '{}' - {}", s, e);
            Utc::now()
        })
}

/// Fixed-width RFC 3339 with microseconds, so stored timestamps compare
/// correctly as strings and a one-microsecond offset survives the round trip.
pub(super) fn format_datetime(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_deleted_at(s: &str) -> Option<DateTime<Utc>> {
    if s == LIVE {
        None
    } else {
        Some(parse_datetime(s))
    }
}

pub(super) fn parse_kind(s: &str) -> NodeKind {
    NodeKind::parse(s).unwrap_or_else(|| {
        tracing::error!("Invalid node kind in database: '{}'", s);
        NodeKind::File
    })
}

fn parse_privilege(value: i64) -> PrivilegeLevel {
    PrivilegeLevel::from_i64(value).unwrap_or_else(|| {
        tracing::error!("Invalid privilege level in database: {}", value);
        PrivilegeLevel::ReadOnly
    })
}

fn parse_access_source(s: &str) -> AccessSource {
    AccessSource::parse(s).unwrap_or_else(|| {
        tracing::error!("Invalid access source in database: '{}'", s);
        AccessSource::Invite
    })
}

fn parse_public_access(s: &str) -> PublicAccessLevel {
    PublicAccessLevel::parse(s).unwrap_or_default()
}

const PROJECT_COLUMNS: &str = "id, name, owner_id, epoch, tree_version, compiler, image_name,
     public_access_level, root_doc_id, created_at, last_updated_at, last_updated_by,
     last_opened_at, deleted_at";

fn project_from_row(row: &Row<'_>) -> rusqlite::Result<Project> {
    Ok(Project {
        id: row.get(0)?,
        name: row.get(1)?,
        owner_id: row.get(2)?,
        epoch: row.get(3)?,
        tree_version: row.get(4)?,
        compiler: row.get(5)?,
        image_name: row.get(6)?,
        public_access_level: parse_public_access(&row.get::<_, String>(7)?),
        root_doc_id: row.get(8)?,
        created_at: parse_datetime(&row.get::<_, String>(9)?),
        last_updated_at: parse_datetime(&row.get::<_, String>(10)?),
        last_updated_by: row.get(11)?,
        last_opened_at: row.get::<_, Option<String>>(12)?.map(|s| parse_datetime(&s)),
        deleted_at: row.get::<_, Option<String>>(13)?.map(|s| parse_datetime(&s)),
    })
}

fn member_from_row(row: &Row<'_>, offset: usize) -> rusqlite::Result<ProjectMember> {
    Ok(ProjectMember {
        project_id: row.get(offset)?,
        user_id: row.get(offset + 1)?,
        access_source: parse_access_source(&row.get::<_, String>(offset + 2)?),
        privilege_level: parse_privilege(row.get(offset + 3)?),
        archived: row.get(offset + 4)?,
        trashed: row.get(offset + 5)?,
    })
}

fn node_from_row(row: &Row<'_>) -> rusqlite::Result<TreeNode> {
    Ok(TreeNode {
        id: row.get(0)?,
        project_id: row.get(1)?,
        parent_id: row.get(2)?,
        kind: parse_kind(&row.get::<_, String>(3)?),
        path: row.get(4)?,
        created_at: parse_datetime(&row.get::<_, String>(5)?),
        deleted_at: parse_deleted_at(&row.get::<_, String>(6)?),
    })
}

fn require_owner(conn: &Connection, op: &'static str, project_id: &str, owner_id: &str) -> Result<()> {
    conn.query_row(
        "SELECT 1 FROM projects WHERE id = ?1 AND owner_id = ?2 AND deleted_at IS NULL",
        params![project_id, owner_id],
        |_| Ok(()),
    )
    .optional()
    .during(op)?
    .ok_or(Error::NotFoundOrNotAuthorized)
}

fn bump_epoch(conn: &Connection, op: &'static str, project_id: &str) -> Result<i64> {
    conn.query_row(
        "UPDATE projects SET epoch = epoch + 1 WHERE id = ?1 RETURNING epoch",
        params![project_id],
        |row| row.get(0),
    )
    .during(op)
}

fn current_epoch(conn: &Connection, op: &'static str, project_id: &str) -> Result<i64> {
    conn.query_row(
        "SELECT epoch FROM projects WHERE id = ?1",
        params![project_id],
        |row| row.get(0),
    )
    .during(op)
}

impl Store for SqliteStore {
    fn initialize(&self) -> Result<()> {
        let conn = self.conn();
        conn.execute_batch(SCHEMA).during("initialize")?;
        Ok(())
    }

    // Project operations

    fn create_project(&self, project: &NewProject) -> Result<Project> {
        const OP: &str = "create_project";

        let now = Utc::now();
        let stamp = format_datetime(&now);
        let id = Uuid::new_v4().to_string();
        let root_id = Uuid::new_v4().to_string();

        self.write(OP, |tx| {
            tx.execute(
                "INSERT INTO projects (id, name, owner_id, epoch, tree_version, compiler, image_name,
                                       public_access_level, created_at, last_updated_at, last_updated_by)
                 VALUES (?1, ?2, ?3, 1, 1, ?4, ?5, 'private', ?6, ?6, ?3)",
                params![
                    id,
                    project.name,
                    project.owner_id,
                    project.compiler,
                    project.image_name,
                    stamp
                ],
            )
            .during(OP)?;

            tx.execute(
                "INSERT INTO tree_nodes (id, project_id, parent_id, kind, path, created_at, deleted_at)
                 VALUES (?1, ?2, NULL, 'folder', ?3, ?4, ?5)",
                params![root_id, id, ROOT_PATH, stamp, LIVE],
            )
            .during(OP)?;

            tx.execute(
                "INSERT INTO project_members (project_id, user_id, access_source, privilege_level)
                 VALUES (?1, ?2, 'owner', ?3)",
                params![id, project.owner_id, PrivilegeLevel::Owner.as_i64()],
            )
            .during(OP)?;

            Ok(())
        })?;

        tracing::info!(project_id = %id, owner_id = %project.owner_id, "created project");

        Ok(Project {
            id,
            name: project.name.clone(),
            owner_id: project.owner_id.clone(),
            epoch: 1,
            tree_version: 1,
            compiler: project.compiler.clone(),
            image_name: project.image_name.clone(),
            public_access_level: PublicAccessLevel::Private,
            root_doc_id: None,
            created_at: now,
            last_updated_at: now,
            last_updated_by: Some(project.owner_id.clone()),
            last_opened_at: None,
            deleted_at: None,
        })
    }

    fn get_project(&self, id: &str) -> Result<Option<Project>> {
        let conn = self.conn();
        conn.query_row(
            &format!("SELECT {PROJECT_COLUMNS} FROM projects WHERE id = ?1"),
            params![id],
            project_from_row,
        )
        .optional()
        .during("get_project")
    }

    fn list_user_projects(&self, user_id: &str) -> Result<Vec<(Project, ProjectMember)>> {
        const OP: &str = "list_user_projects";

        let conn = self.conn();
        let mut stmt = conn
            .prepare(
                "SELECT p.id, p.name, p.owner_id, p.epoch, p.tree_version, p.compiler, p.image_name,
                        p.public_access_level, p.root_doc_id, p.created_at, p.last_updated_at,
                        p.last_updated_by, p.last_opened_at, p.deleted_at,
                        m.project_id, m.user_id, m.access_source, m.privilege_level, m.archived, m.trashed
                 FROM projects p
                 JOIN project_members m ON m.project_id = p.id
                 WHERE m.user_id = ?1 AND (p.deleted_at IS NULL OR p.owner_id = ?1)
                 ORDER BY p.last_updated_at DESC",
            )
            .during(OP)?;

        let rows = stmt
            .query_map(params![user_id], |row| {
                Ok((project_from_row(row)?, member_from_row(row, 14)?))
            })
            .during(OP)?;

        rows.collect::<std::result::Result<Vec<_>, _>>()
            .during(OP)
    }

    fn soft_delete_project(&self, project_id: &str, user_id: &str) -> Result<()> {
        let rows = self
            .conn()
            .execute(
                "UPDATE projects SET deleted_at = ?3, epoch = epoch + 1
                 WHERE id = ?1 AND owner_id = ?2 AND deleted_at IS NULL",
                params![project_id, user_id, format_datetime(&Utc::now())],
            )
            .during("soft_delete_project")?;

        if rows == 0 {
            return Err(Error::NotFoundOrNotAuthorized);
        }
        tracing::info!(project_id, "soft-deleted project");
        Ok(())
    }

    fn restore_project(&self, project_id: &str, user_id: &str) -> Result<()> {
        let rows = self
            .conn()
            .execute(
                "UPDATE projects SET deleted_at = NULL, epoch = epoch + 1
                 WHERE id = ?1 AND owner_id = ?2 AND deleted_at IS NOT NULL",
                params![project_id, user_id],
            )
            .during("restore_project")?;

        if rows == 0 {
            return Err(Error::NotFoundOrNotAuthorized);
        }
        tracing::info!(project_id, "restored project");
        Ok(())
    }

    fn purge_deleted_projects(&self, cutoff: DateTime<Utc>) -> Result<PurgedProjects> {
        const OP: &str = "purge_deleted_projects";

        let purged = self.write(OP, |tx| {
            let project_ids: Vec<String> = {
                let mut stmt = tx
                    .prepare(
                        "SELECT id FROM projects WHERE deleted_at IS NOT NULL AND deleted_at < ?1",
                    )
                    .during(OP)?;
                let rows = stmt
                    .query_map(params![format_datetime(&cutoff)], |row| row.get(0))
                    .during(OP)?;
                rows.collect::<std::result::Result<Vec<_>, _>>()
                    .during(OP)?
            };

            let mut file_ids = Vec::new();
            {
                let mut files = tx
                    .prepare("SELECT id FROM tree_nodes WHERE project_id = ?1 AND kind = 'file'")
                    .during(OP)?;
                for project_id in &project_ids {
                    let rows = files
                        .query_map(params![project_id], |row| row.get::<_, String>(0))
                        .during(OP)?;
                    for id in rows {
                        file_ids.push(id.during(OP)?);
                    }
                }
            }

            for project_id in &project_ids {
                tx.execute("DELETE FROM projects WHERE id = ?1", params![project_id])
                    .during(OP)?;
            }

            Ok(PurgedProjects {
                project_ids,
                file_ids,
            })
        })?;

        if !purged.project_ids.is_empty() {
            tracing::info!(count = purged.project_ids.len(), "purged deleted projects");
        }
        Ok(purged)
    }

    fn touch_project_opened(&self, project_id: &str) -> Result<()> {
        self.conn()
            .execute(
                "UPDATE projects SET last_opened_at = ?2 WHERE id = ?1",
                params![project_id, format_datetime(&Utc::now())],
            )
            .during("touch_project_opened")?;
        Ok(())
    }

    fn set_root_doc(&self, project_id: &str, user_id: &str, doc_id: &str) -> Result<()> {
        self.write("set_root_doc", |tx| {
            tree::set_root_doc(tx, project_id, user_id, doc_id)
        })
    }

    // Membership operations

    fn add_member(
        &self,
        project_id: &str,
        owner_id: &str,
        user_id: &str,
        privilege: PrivilegeLevel,
    ) -> Result<i64> {
        const OP: &str = "add_member";

        if privilege == PrivilegeLevel::Owner {
            return Err(Error::Validation(
                "use an ownership transfer to make a member owner".to_string(),
            ));
        }
        if user_id == owner_id {
            return Err(Error::Validation("the owner is already a member".to_string()));
        }

        self.write(OP, |tx| {
            require_owner(tx, OP, project_id, owner_id)?;
            tx.execute(
                "INSERT INTO project_members (project_id, user_id, access_source, privilege_level)
                 VALUES (?1, ?2, 'invite', ?3)
                 ON CONFLICT (project_id, user_id)
                 DO UPDATE SET access_source = 'invite', privilege_level = excluded.privilege_level",
                params![project_id, user_id, privilege.as_i64()],
            )
            .during(OP)?;
            bump_epoch(tx, OP, project_id)
        })
    }

    fn remove_member(&self, project_id: &str, owner_id: &str, user_id: &str) -> Result<i64> {
        const OP: &str = "remove_member";

        self.write(OP, |tx| {
            require_owner(tx, OP, project_id, owner_id)?;
            let rows = tx
                .execute(
                    "DELETE FROM project_members
                     WHERE project_id = ?1 AND user_id = ?2 AND access_source != 'owner'",
                    params![project_id, user_id],
                )
                .during(OP)?;
            if rows == 0 {
                return Err(Error::NotFoundOrNotAuthorized);
            }
            bump_epoch(tx, OP, project_id)
        })
    }

    fn transfer_ownership(
        &self,
        project_id: &str,
        owner_id: &str,
        new_owner_id: &str,
    ) -> Result<i64> {
        const OP: &str = "transfer_ownership";

        if owner_id == new_owner_id {
            return Err(Error::Validation("user already owns the project".to_string()));
        }

        self.write(OP, |tx| {
            require_owner(tx, OP, project_id, owner_id)?;

            let rows = tx
                .execute(
                    "UPDATE project_members SET access_source = 'owner', privilege_level = ?3
                     WHERE project_id = ?1 AND user_id = ?2",
                    params![project_id, new_owner_id, PrivilegeLevel::Owner.as_i64()],
                )
                .during(OP)?;
            if rows == 0 {
                return Err(Error::NotFoundOrNotAuthorized);
            }

            tx.execute(
                "UPDATE project_members SET access_source = 'invite', privilege_level = ?3
                 WHERE project_id = ?1 AND user_id = ?2",
                params![project_id, owner_id, PrivilegeLevel::ReadAndWrite.as_i64()],
            )
            .during(OP)?;
            tx.execute(
                "UPDATE projects SET owner_id = ?2 WHERE id = ?1",
                params![project_id, new_owner_id],
            )
            .during(OP)?;

            bump_epoch(tx, OP, project_id)
        })
    }

    fn set_public_access_level(
        &self,
        project_id: &str,
        owner_id: &str,
        level: PublicAccessLevel,
    ) -> Result<i64> {
        const OP: &str = "set_public_access_level";

        self.write(OP, |tx| {
            require_owner(tx, OP, project_id, owner_id)?;
            tx.execute(
                "UPDATE projects SET public_access_level = ?2 WHERE id = ?1",
                params![project_id, level.as_str()],
            )
            .during(OP)?;
            bump_epoch(tx, OP, project_id)
        })
    }

    fn add_token_member(
        &self,
        project_id: &str,
        user_id: &str,
        privilege: PrivilegeLevel,
    ) -> Result<i64> {
        const OP: &str = "add_token_member";

        if privilege == PrivilegeLevel::Owner {
            return Err(Error::Validation("tokens cannot grant ownership".to_string()));
        }

        self.write(OP, |tx| {
            let live: Option<()> = tx
                .query_row(
                    "SELECT 1 FROM projects WHERE id = ?1 AND deleted_at IS NULL",
                    params![project_id],
                    |_| Ok(()),
                )
                .optional()
                .during(OP)?;
            if live.is_none() {
                return Err(Error::NotFoundOrNotAuthorized);
            }

            // Never downgrades an invite, only upgrades an existing token grant.
            let rows = tx
                .execute(
                    "INSERT INTO project_members (project_id, user_id, access_source, privilege_level)
                     VALUES (?1, ?2, 'token', ?3)
                     ON CONFLICT (project_id, user_id)
                     DO UPDATE SET privilege_level = excluded.privilege_level
                     WHERE access_source = 'token' AND privilege_level < excluded.privilege_level",
                    params![project_id, user_id, privilege.as_i64()],
                )
                .during(OP)?;

            if rows > 0 {
                bump_epoch(tx, OP, project_id)
            } else {
                current_epoch(tx, OP, project_id)
            }
        })
    }

    fn set_member_flags(
        &self,
        project_id: &str,
        user_id: &str,
        archived: bool,
        trashed: bool,
    ) -> Result<()> {
        let rows = self
            .conn()
            .execute(
                "UPDATE project_members SET archived = ?3, trashed = ?4
                 WHERE project_id = ?1 AND user_id = ?2",
                params![project_id, user_id, archived, trashed],
            )
            .during("set_member_flags")?;

        if rows == 0 {
            return Err(Error::NotFoundOrNotAuthorized);
        }
        Ok(())
    }

    fn get_member(&self, project_id: &str, user_id: &str) -> Result<Option<ProjectMember>> {
        let conn = self.conn();
        conn.query_row(
            "SELECT project_id, user_id, access_source, privilege_level, archived, trashed
             FROM project_members WHERE project_id = ?1 AND user_id = ?2",
            params![project_id, user_id],
            |row| member_from_row(row, 0),
        )
        .optional()
        .during("get_member")
    }

    fn list_members(&self, project_id: &str) -> Result<Vec<ProjectMember>> {
        const OP: &str = "list_members";

        let conn = self.conn();
        let mut stmt = conn
            .prepare(
                "SELECT project_id, user_id, access_source, privilege_level, archived, trashed
                 FROM project_members WHERE project_id = ?1
                 ORDER BY privilege_level DESC, user_id",
            )
            .during(OP)?;

        let rows = stmt
            .query_map(params![project_id], |row| member_from_row(row, 0))
            .during(OP)?;

        rows.collect::<std::result::Result<Vec<_>, _>>()
            .during(OP)
    }

    // Authorization and access tokens

    fn get_project_access(
        &self,
        project_id: &str,
        user_id: Option<&str>,
    ) -> Result<Option<ProjectAccess>> {
        let conn = self.conn();
        conn.query_row(
            "SELECT p.owner_id, p.epoch, p.public_access_level, p.deleted_at,
                    p.token_read_only, p.token_read_and_write,
                    m.project_id, m.user_id, m.access_source, m.privilege_level, m.archived, m.trashed
             FROM projects p
             LEFT JOIN project_members m ON m.project_id = p.id AND m.user_id = ?2
             WHERE p.id = ?1",
            params![project_id, user_id],
            |row| {
                let member = match row.get::<_, Option<String>>(6)? {
                    Some(_) => Some(member_from_row(row, 6)?),
                    None => None,
                };
                Ok(ProjectAccess {
                    project_id: project_id.to_string(),
                    owner_id: row.get(0)?,
                    epoch: row.get(1)?,
                    public_access_level: parse_public_access(&row.get::<_, String>(2)?),
                    deleted: row.get::<_, Option<String>>(3)?.is_some(),
                    read_only_token: row.get(4)?,
                    read_and_write_token: row.get(5)?,
                    member,
                })
            },
        )
        .optional()
        .during("get_project_access")
    }

    fn set_access_tokens(&self, project_id: &str, tokens: &AccessTokens) -> Result<AccessTokens> {
        let conn = self.conn();
        let result = conn
            .query_row(
                "UPDATE projects SET
                     token_read_only = coalesce(token_read_only, ?2),
                     token_read_and_write = coalesce(token_read_and_write, ?3),
                     token_read_and_write_prefix = coalesce(token_read_and_write_prefix, ?4)
                 WHERE id = ?1
                 RETURNING token_read_only, token_read_and_write, token_read_and_write_prefix",
                params![
                    project_id,
                    tokens.read_only,
                    tokens.read_and_write,
                    tokens.read_and_write_prefix
                ],
                |row| {
                    Ok(AccessTokens {
                        read_only: row.get(0)?,
                        read_and_write: row.get(1)?,
                        read_and_write_prefix: row.get(2)?,
                    })
                },
            )
            .optional();

        match result {
            Ok(Some(tokens)) => Ok(tokens),
            Ok(None) => Err(Error::NotFoundOrNotAuthorized),
            Err(e) if is_unique_violation(&e) => Err(Error::TokenCollision),
            Err(source) => Err(Error::Database {
                op: "set_access_tokens",
                source,
            }),
        }
    }

    fn find_project_by_read_only_token(&self, token: &str) -> Result<Option<String>> {
        let conn = self.conn();
        conn.query_row(
            "SELECT id FROM projects WHERE token_read_only = ?1 AND deleted_at IS NULL",
            params![token],
            |row| row.get(0),
        )
        .optional()
        .during("find_project_by_read_only_token")
    }

    fn find_project_by_read_and_write_prefix(&self, prefix: &str) -> Result<Option<String>> {
        let conn = self.conn();
        conn.query_row(
            "SELECT id FROM projects WHERE token_read_and_write_prefix = ?1 AND deleted_at IS NULL",
            params![prefix],
            |row| row.get(0),
        )
        .optional()
        .during("find_project_by_read_and_write_prefix")
    }

    // Tree reads

    fn get_tree_node(&self, project_id: &str, id: &str) -> Result<Option<TreeNode>> {
        let conn = self.conn();
        conn.query_row(
            "SELECT id, project_id, parent_id, kind, path, created_at, deleted_at
             FROM tree_nodes WHERE id = ?1 AND project_id = ?2",
            params![id, project_id],
            node_from_row,
        )
        .optional()
        .during("get_tree_node")
    }

    fn get_root_folder(&self, project_id: &str) -> Result<TreeNode> {
        let conn = self.conn();
        conn.query_row(
            "SELECT id, project_id, parent_id, kind, path, created_at, deleted_at
             FROM tree_nodes WHERE project_id = ?1 AND parent_id IS NULL",
            params![project_id],
            node_from_row,
        )
        .optional()
        .during("get_root_folder")?
        .ok_or(Error::NotFoundOrNotAuthorized)
    }

    fn list_tree(&self, project_id: &str) -> Result<Vec<TreeEntry>> {
        const OP: &str = "list_tree";

        let conn = self.conn();
        let mut stmt = conn
            .prepare(
                "SELECT n.id, n.parent_id, n.kind, n.path,
                        d.version, f.hash, f.size, f.linked_file_data
                 FROM tree_nodes n
                 LEFT JOIN docs d ON d.id = n.id
                 LEFT JOIN files f ON f.id = n.id
                 WHERE n.project_id = ?1 AND n.deleted_at = ?2
                 ORDER BY n.path",
            )
            .during(OP)?;

        let rows = stmt
            .query_map(params![project_id, LIVE], |row| {
                let path: String = row.get(3)?;
                let payload = match parse_kind(&row.get::<_, String>(2)?) {
                    NodeKind::Folder => EntryPayload::Folder,
                    NodeKind::Doc => EntryPayload::Doc {
                        version: row.get::<_, Option<i64>>(4)?.unwrap_or_default(),
                    },
                    NodeKind::File => EntryPayload::File {
                        hash: row.get::<_, Option<String>>(5)?.unwrap_or_default(),
                        size: row.get::<_, Option<i64>>(6)?.unwrap_or_default(),
                        linked_file_data: row
                            .get::<_, Option<String>>(7)?
                            .and_then(|s| serde_json::from_str(&s).ok()),
                    },
                };
                Ok(TreeEntry {
                    header: EntryHeader {
                        id: row.get(0)?,
                        parent_id: row.get(1)?,
                        name: leaf_name(&path).to_string(),
                        path,
                    },
                    payload,
                })
            })
            .during(OP)?;

        rows.collect::<std::result::Result<Vec<_>, _>>()
            .during(OP)
    }

    fn list_folder_child_names(&self, project_id: &str, folder_id: &str) -> Result<Vec<String>> {
        const OP: &str = "list_folder_child_names";

        let conn = self.conn();
        let mut stmt = conn
            .prepare(
                "SELECT path FROM tree_nodes
                 WHERE project_id = ?1 AND parent_id = ?2 AND deleted_at = ?3",
            )
            .during(OP)?;

        let rows = stmt
            .query_map(params![project_id, folder_id, LIVE], |row| {
                row.get::<_, String>(0)
            })
            .during(OP)?;

        rows.map(|path| path.map(|p| leaf_name(&p).to_string()))
            .collect::<std::result::Result<Vec<_>, _>>()
            .during(OP)
    }

    fn list_deleted_docs(&self, project_id: &str) -> Result<Vec<TreeNode>> {
        const OP: &str = "list_deleted_docs";

        let conn = self.conn();
        let mut stmt = conn
            .prepare(
                "SELECT id, project_id, parent_id, kind, path, created_at, deleted_at
                 FROM tree_nodes
                 WHERE project_id = ?1 AND kind = 'doc' AND deleted_at != ?2
                 ORDER BY deleted_at DESC",
            )
            .during(OP)?;

        let rows = stmt
            .query_map(params![project_id, LIVE], node_from_row)
            .during(OP)?;

        rows.collect::<std::result::Result<Vec<_>, _>>()
            .during(OP)
    }

    fn get_doc(&self, project_id: &str, id: &str) -> Result<Option<Doc>> {
        let conn = self.conn();
        conn.query_row(
            "SELECT d.id, d.snapshot, d.version FROM docs d
             JOIN tree_nodes n ON n.id = d.id
             WHERE d.id = ?1 AND n.project_id = ?2",
            params![id, project_id],
            |row| {
                Ok(Doc {
                    id: row.get(0)?,
                    snapshot: row.get(1)?,
                    version: row.get(2)?,
                })
            },
        )
        .optional()
        .during("get_doc")
    }

    fn get_file(&self, project_id: &str, id: &str) -> Result<Option<FileMeta>> {
        let conn = self.conn();
        conn.query_row(
            "SELECT f.id, f.hash, f.linked_file_data, f.size, f.pending FROM files f
             JOIN tree_nodes n ON n.id = f.id
             WHERE f.id = ?1 AND n.project_id = ?2",
            params![id, project_id],
            |row| {
                Ok(FileMeta {
                    id: row.get(0)?,
                    hash: row.get(1)?,
                    linked_file_data: row
                        .get::<_, Option<String>>(2)?
                        .and_then(|s| serde_json::from_str(&s).ok()),
                    size: row.get(3)?,
                    pending: row.get(4)?,
                })
            },
        )
        .optional()
        .during("get_file")
    }

    // Structural mutations

    fn add_folder(
        &self,
        project_id: &str,
        user_id: &str,
        parent_id: &str,
        name: &str,
    ) -> Result<Created> {
        self.write("add_folder", |tx| {
            tree::add_folder(tx, project_id, user_id, parent_id, name)
        })
    }

    fn create_doc(
        &self,
        project_id: &str,
        user_id: &str,
        parent_id: &str,
        name: &str,
        snapshot: &str,
    ) -> Result<Created> {
        self.write("create_doc", |tx| {
            tree::create_doc(tx, project_id, user_id, parent_id, name, snapshot)
        })
    }

    fn ensure_is_doc(
        &self,
        project_id: &str,
        user_id: &str,
        parent_id: &str,
        name: &str,
        snapshot: &str,
    ) -> Result<EnsuredDoc> {
        self.write("ensure_is_doc", |tx| {
            tree::ensure_is_doc(tx, project_id, user_id, parent_id, name, snapshot)
        })
    }

    fn prepare_file_creation(
        &self,
        project_id: &str,
        user_id: &str,
        parent_id: &str,
        name: &str,
        file: &PendingFile,
    ) -> Result<String> {
        self.write("prepare_file_creation", |tx| {
            tree::prepare_file_creation(tx, project_id, user_id, parent_id, name, file)
        })
    }

    fn finalize_file_creation(
        &self,
        project_id: &str,
        user_id: &str,
        file_id: &str,
    ) -> Result<FinalizedFile> {
        self.write("finalize_file_creation", |tx| {
            tree::finalize_file_creation(tx, project_id, user_id, file_id)
        })
    }

    fn delete_doc(&self, project_id: &str, user_id: &str, doc_id: &str) -> Result<DeletedSubtree> {
        self.write("delete_doc", |tx| {
            tree::delete_leaf(tx, "delete_doc", project_id, user_id, doc_id, NodeKind::Doc)
        })
    }

    fn delete_file(
        &self,
        project_id: &str,
        user_id: &str,
        file_id: &str,
    ) -> Result<DeletedSubtree> {
        self.write("delete_file", |tx| {
            tree::delete_leaf(tx, "delete_file", project_id, user_id, file_id, NodeKind::File)
        })
    }

    fn delete_folder(
        &self,
        project_id: &str,
        user_id: &str,
        folder_id: &str,
    ) -> Result<DeletedSubtree> {
        self.write("delete_folder", |tx| {
            tree::delete_folder(tx, project_id, user_id, folder_id)
        })
    }

    fn move_doc(
        &self,
        project_id: &str,
        user_id: &str,
        doc_id: &str,
        parent_id: &str,
    ) -> Result<Moved> {
        self.write("move_doc", |tx| {
            tree::move_leaf(tx, "move_doc", project_id, user_id, doc_id, NodeKind::Doc, parent_id)
        })
    }

    fn move_file(
        &self,
        project_id: &str,
        user_id: &str,
        file_id: &str,
        parent_id: &str,
    ) -> Result<Moved> {
        self.write("move_file", |tx| {
            tree::move_leaf(tx, "move_file", project_id, user_id, file_id, NodeKind::File, parent_id)
        })
    }

    fn move_folder(
        &self,
        project_id: &str,
        user_id: &str,
        folder_id: &str,
        parent_id: &str,
    ) -> Result<MovedFolder> {
        self.write("move_folder", |tx| {
            tree::move_folder(tx, project_id, user_id, folder_id, parent_id)
        })
    }

    fn rename_doc(&self, project_id: &str, user_id: &str, doc_id: &str, name: &str) -> Result<Moved> {
        self.write("rename_doc", |tx| {
            tree::rename_leaf(tx, "rename_doc", project_id, user_id, doc_id, NodeKind::Doc, name)
        })
    }

    fn rename_file(
        &self,
        project_id: &str,
        user_id: &str,
        file_id: &str,
        name: &str,
    ) -> Result<Moved> {
        self.write("rename_file", |tx| {
            tree::rename_leaf(tx, "rename_file", project_id, user_id, file_id, NodeKind::File, name)
        })
    }

    fn rename_folder(
        &self,
        project_id: &str,
        user_id: &str,
        folder_id: &str,
        name: &str,
    ) -> Result<MovedFolder> {
        self.write("rename_folder", |tx| {
            tree::rename_folder(tx, project_id, user_id, folder_id, name)
        })
    }

    fn restore_doc(
        &self,
        project_id: &str,
        user_id: &str,
        doc_id: &str,
        name: &str,
    ) -> Result<Moved> {
        self.write("restore_doc", |tx| {
            tree::restore_doc(tx, project_id, user_id, doc_id, name)
        })
    }

    // Maintenance

    fn collect_pending_files(&self, cutoff: DateTime<Utc>) -> Result<Vec<String>> {
        const OP: &str = "collect_pending_files";

        let ids = self.write(OP, |tx| {
            let ids: Vec<String> = {
                let mut stmt = tx
                    .prepare(
                        "SELECT f.id FROM files f
                         JOIN tree_nodes n ON n.id = f.id
                         WHERE f.pending = 1 AND n.created_at < ?1",
                    )
                    .during(OP)?;
                let rows = stmt
                    .query_map(params![format_datetime(&cutoff)], |row| row.get(0))
                    .during(OP)?;
                rows.collect::<std::result::Result<Vec<_>, _>>()
                    .during(OP)?
            };

            for id in &ids {
                tx.execute("DELETE FROM tree_nodes WHERE id = ?1", params![id])
                    .during(OP)?;
            }
            Ok(ids)
        })?;

        if !ids.is_empty() {
            tracing::info!(count = ids.len(), "collected abandoned pending files");
        }
        Ok(ids)
    }

    fn close(&self) -> Result<()> {
        Ok(())
    }
}
