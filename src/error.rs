use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("{op}: database error: {source}")]
    Database {
        op: &'static str,
        #[source]
        source: rusqlite::Error,
    },

    #[error("an entity with this name already exists in the folder")]
    DuplicateNameInFolder,

    /// The project does not exist, is deleted, the node is missing, or the
    /// caller lacks the privilege. Callers cannot tell these apart.
    #[error("not found or not authorized")]
    NotFoundOrNotAuthorized,

    #[error("cannot move a folder into itself or one of its descendants")]
    CannotMoveIntoSelfOrDescendant,

    #[error("cannot move, rename or delete the root folder")]
    CannotMutateRootFolder,

    #[error("validation error: {0}")]
    Validation(String),

    #[error("bad random source: could not generate a unique access token")]
    BadRandomSource,

    #[error("access token collision")]
    TokenCollision,

    #[error("blob storage error: {0}")]
    Blob(#[from] crate::blob::BlobError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid configuration: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, Error>;

/// Attaches the failing operation's name to persistence errors.
pub trait DbResultExt<T> {
    fn during(self, op: &'static str) -> Result<T>;

    /// Like `during`, but remaps a unique-constraint violation to
    /// [`Error::DuplicateNameInFolder`].
    fn on_duplicate(self, op: &'static str) -> Result<T>;
}

impl<T> DbResultExt<T> for std::result::Result<T, rusqlite::Error> {
    fn during(self, op: &'static str) -> Result<T> {
        self.map_err(|source| Error::Database { op, source })
    }

    fn on_duplicate(self, op: &'static str) -> Result<T> {
        self.map_err(|source| {
            if is_unique_violation(&source) {
                Error::DuplicateNameInFolder
            } else {
                Error::Database { op, source }
            }
        })
    }
}

pub fn is_unique_violation(error: &rusqlite::Error) -> bool {
    match error {
        rusqlite::Error::SqliteFailure(err, _) => {
            err.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
                || err.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_PRIMARYKEY
        }
        _ => false,
    }
}
