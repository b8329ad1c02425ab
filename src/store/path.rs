//! Materialized path helpers.
//!
//! Every node stores its full path. Folders end with `/`, the root folder is
//! exactly `/`, docs and files carry no trailing slash. A node lies inside a
//! folder exactly when its path starts with the folder's path.

pub const ROOT_PATH: &str = "/";

/// Path of a folder named `name` inside the folder at `parent`.
#[must_use]
pub fn folder_path(parent: &str, name: &str) -> String {
    format!("{parent}{name}/")
}

/// Path of a doc or file named `name` inside the folder at `parent`.
#[must_use]
pub fn leaf_path(parent: &str, name: &str) -> String {
    format!("{parent}{name}")
}

/// Path for a node of the given kind named `name` inside `parent`.
#[must_use]
pub fn child_path(parent: &str, name: &str, is_folder: bool) -> String {
    if is_folder {
        folder_path(parent, name)
    } else {
        leaf_path(parent, name)
    }
}

/// Last segment of a path, without the trailing slash of folders.
pub fn leaf_name(path: &str) -> &str {
    let trimmed = path.strip_suffix('/').unwrap_or(path);
    match trimmed.rfind('/') {
        Some(idx) => &trimmed[idx + 1..],
        None => trimmed,
    }
}

/// Key under which a node's name is unique in its folder: the path without
/// the trailing slash, so a folder and a doc cannot share a name.
pub fn name_key(path: &str) -> &str {
    path.strip_suffix('/').unwrap_or(path)
}

/// Path of the folder that contains `path`. The root is its own parent.
pub fn parent_path(path: &str) -> &str {
    let trimmed = path.strip_suffix('/').unwrap_or(path);
    match trimmed.rfind('/') {
        Some(idx) => &trimmed[..=idx],
        None => ROOT_PATH,
    }
}

/// Whether `path` is `folder` itself or lies somewhere below it.
pub fn is_within(path: &str, folder: &str) -> bool {
    folder.ends_with('/') && path.starts_with(folder)
}

/// Replaces the `old_prefix` of `path` with `new_prefix`. Returns `None` when
/// the path is not below `old_prefix`.
#[must_use]
pub fn rebase(path: &str, old_prefix: &str, new_prefix: &str) -> Option<String> {
    path.strip_prefix(old_prefix)
        .map(|tail| format!("{new_prefix}{tail}"))
}
