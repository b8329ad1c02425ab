/// Value of `tree_nodes.deleted_at` for live nodes. Any other value is the
/// instant the node was deleted.
pub const LIVE: &str = "0000-00-00T00:00:00.000000Z";

pub const SCHEMA: &str = r#"
-- Projects own one tree each
CREATE TABLE IF NOT EXISTS projects (
    id TEXT PRIMARY KEY,
    name TEXT NOT NULL,
    owner_id TEXT NOT NULL,

    -- Bumped on authorization-relevant changes only
    epoch INTEGER NOT NULL DEFAULT 1,
    -- Bumped on every structural tree mutation
    tree_version INTEGER NOT NULL DEFAULT 1,

    compiler TEXT NOT NULL DEFAULT 'pdflatex',
    image_name TEXT,

    public_access_level TEXT NOT NULL DEFAULT 'private'
        CHECK (public_access_level IN ('private', 'tokenBased')),
    token_read_only TEXT,
    token_read_and_write TEXT,
    token_read_and_write_prefix TEXT,

    root_doc_id TEXT,

    created_at TEXT NOT NULL,
    last_updated_at TEXT NOT NULL,
    last_updated_by TEXT,
    last_opened_at TEXT,
    deleted_at TEXT            -- NULL = not deleted
);

-- Folders, docs and files, addressed by materialized path
CREATE TABLE IF NOT EXISTS tree_nodes (
    id TEXT PRIMARY KEY,
    project_id TEXT NOT NULL REFERENCES projects(id) ON DELETE CASCADE,
    parent_id TEXT REFERENCES tree_nodes(id) ON DELETE CASCADE,  -- NULL only for the root folder
    kind TEXT NOT NULL CHECK (kind IN ('folder', 'doc', 'file')),
    path TEXT NOT NULL,
    created_at TEXT NOT NULL,
    deleted_at TEXT NOT NULL   -- LIVE sentinel or deletion instant
);

CREATE TABLE IF NOT EXISTS docs (
    id TEXT PRIMARY KEY REFERENCES tree_nodes(id) ON DELETE CASCADE,
    snapshot TEXT NOT NULL DEFAULT '',
    version INTEGER NOT NULL DEFAULT 0
);

CREATE TABLE IF NOT EXISTS files (
    id TEXT PRIMARY KEY REFERENCES tree_nodes(id) ON DELETE CASCADE,
    hash TEXT NOT NULL,
    linked_file_data TEXT,     -- JSON
    size INTEGER NOT NULL,
    pending INTEGER NOT NULL DEFAULT 0
);

CREATE TABLE IF NOT EXISTS project_members (
    project_id TEXT NOT NULL REFERENCES projects(id) ON DELETE CASCADE,
    user_id TEXT NOT NULL,
    access_source TEXT NOT NULL CHECK (access_source IN ('owner', 'invite', 'token')),
    privilege_level INTEGER NOT NULL,  -- 1 = readOnly, 2 = readAndWrite, 3 = owner
    archived INTEGER NOT NULL DEFAULT 0,
    trashed INTEGER NOT NULL DEFAULT 0,
    PRIMARY KEY (project_id, user_id)
);

-- One live child per name: folder `/x/` and doc `/x` share the key `/x`.
-- Deleted rows keep distinct timestamps.
CREATE UNIQUE INDEX IF NOT EXISTS idx_tree_nodes_name
    ON tree_nodes(project_id, rtrim(path, '/'), deleted_at);
CREATE UNIQUE INDEX IF NOT EXISTS idx_tree_nodes_root ON tree_nodes(project_id) WHERE parent_id IS NULL;
CREATE INDEX IF NOT EXISTS idx_tree_nodes_parent ON tree_nodes(parent_id);
CREATE INDEX IF NOT EXISTS idx_files_pending ON files(pending) WHERE pending = 1;
CREATE INDEX IF NOT EXISTS idx_project_members_user ON project_members(user_id);
CREATE INDEX IF NOT EXISTS idx_projects_owner ON projects(owner_id);
CREATE INDEX IF NOT EXISTS idx_projects_deleted ON projects(deleted_at) WHERE deleted_at IS NOT NULL;
CREATE UNIQUE INDEX IF NOT EXISTS idx_projects_token_ro ON projects(token_read_only);
CREATE UNIQUE INDEX IF NOT EXISTS idx_projects_token_rw ON projects(token_read_and_write);
CREATE UNIQUE INDEX IF NOT EXISTS idx_projects_token_rw_prefix ON projects(token_read_and_write_prefix);
"#;
