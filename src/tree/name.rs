//! Entity name rules and collision-free name generation.

use crate::error::{Error, Result};

pub const MAX_NAME_LENGTH: usize = 150;

/// Rejects names that cannot be stored as a single path segment.
pub fn validate_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(Error::Validation("name cannot be empty".to_string()));
    }
    if name.chars().count() > MAX_NAME_LENGTH {
        return Err(Error::Validation(format!(
            "name cannot exceed {MAX_NAME_LENGTH} characters"
        )));
    }
    if name == "." || name == ".." {
        return Err(Error::Validation(format!("'{name}' is not a valid name")));
    }
    if name.contains(['/', '\\']) {
        return Err(Error::Validation(
            "name cannot contain path separators".to_string(),
        ));
    }
    if name.chars().any(char::is_control) {
        return Err(Error::Validation(
            "name cannot contain control characters".to_string(),
        ));
    }
    Ok(())
}

/// Returns `name` if it is free, otherwise the first of `stem (1).ext`,
/// `stem (2).ext`, ... not present in `taken`.
pub fn unique_name<S: AsRef<str>>(name: &str, taken: &[S]) -> String {
    let is_taken = |candidate: &str| taken.iter().any(|t| t.as_ref() == candidate);
    if !is_taken(name) {
        return name.to_string();
    }

    let (stem, ext) = split_extension(name);
    (1..)
        .map(|n| {
            let suffix = format!(" ({n}){ext}");
            let room = MAX_NAME_LENGTH.saturating_sub(suffix.chars().count());
            let stem: String = stem.chars().take(room).collect();
            format!("{stem}{suffix}")
        })
        .find(|candidate| !is_taken(candidate))
        .unwrap_or_else(|| name.to_string())
}

/// Splits `main.tex` into `("main", ".tex")`. Dotfiles keep their name as stem.
fn split_extension(name: &str) -> (&str, &str) {
    match name.rfind('.') {
        Some(0) | None => (name, ""),
        Some(idx) => name.split_at(idx),
    }
}
