use std::sync::Mutex;

use rand::Rng;
use rand::RngCore;
use rand::rngs::OsRng;

use crate::error::{Error, Result};
use crate::store::Store;
use crate::types::AccessTokens;

/// Lowercase consonants only, so generated tokens never spell words.
const LETTERS: &[u8] = b"bcdfghjkmnpqrstvwxyz";
const DIGITS: &[u8] = b"0123456789";

const READ_ONLY_LENGTH: usize = 12;
const PREFIX_LENGTH: usize = 10;
const MAX_ATTEMPTS: usize = 10;

/// Which comparison a presented token routes to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    ReadOnly,
    ReadAndWrite,
}

pub struct TokenGenerator<R = OsRng> {
    rng: Mutex<R>,
}

impl Default for TokenGenerator<OsRng> {
    fn default() -> Self {
        Self::new()
    }
}

impl TokenGenerator<OsRng> {
    #[must_use]
    pub fn new() -> Self {
        Self::with_rng(OsRng)
    }
}

impl<R: RngCore> TokenGenerator<R> {
    #[must_use]
    pub fn with_rng(rng: R) -> Self {
        Self {
            rng: Mutex::new(rng),
        }
    }

    /// Generates a fresh read-only / read-and-write token pair.
    pub fn generate(&self) -> AccessTokens {
        let mut rng = self.rng.lock().unwrap_or_else(|e| e.into_inner());

        let read_only = sample(&mut *rng, LETTERS, READ_ONLY_LENGTH);
        let prefix = sample(&mut *rng, DIGITS, PREFIX_LENGTH);
        let suffix = sample(&mut *rng, LETTERS, READ_ONLY_LENGTH);

        AccessTokens {
            read_only,
            read_and_write: format!("{prefix}{suffix}"),
            read_and_write_prefix: prefix,
        }
    }

    /// Makes sure the project has both tokens and returns them. Tokens that
    /// already exist are kept. A candidate that collides with another
    /// project's token is regenerated, up to a fixed number of attempts.
    pub fn ensure_tokens(&self, store: &dyn Store, project_id: &str) -> Result<AccessTokens> {
        for attempt in 1..=MAX_ATTEMPTS {
            let candidate = self.generate();
            match store.set_access_tokens(project_id, &candidate) {
                Ok(tokens) => return Ok(tokens),
                Err(Error::TokenCollision) => {
                    tracing::debug!(project_id, attempt, "access token collision, regenerating");
                }
                Err(e) => return Err(e),
            }
        }

        tracing::error!(project_id, "gave up generating unique access tokens");
        Err(Error::BadRandomSource)
    }
}

fn sample<R: RngCore>(rng: &mut R, alphabet: &[u8], len: usize) -> String {
    (0..len)
        .map(|_| alphabet[rng.gen_range(0..alphabet.len())] as char)
        .collect()
}

/// Checks the shape of a presented token. A leading digit marks a
/// read-and-write token, a leading letter a read-only one.
pub fn parse_token(token: &str) -> Result<TokenKind> {
    let invalid = || Error::Validation("malformed access token".to_string());

    match token.bytes().next() {
        Some(b) if b.is_ascii_digit() => {
            let (prefix, suffix) = token.split_at_checked(PREFIX_LENGTH).ok_or_else(invalid)?;
            if prefix.bytes().all(|b| b.is_ascii_digit())
                && suffix.len() == READ_ONLY_LENGTH
                && suffix.bytes().all(|b| b.is_ascii_lowercase())
            {
                Ok(TokenKind::ReadAndWrite)
            } else {
                Err(invalid())
            }
        }
        Some(b) if b.is_ascii_lowercase() => {
            if token.len() == READ_ONLY_LENGTH && token.bytes().all(|b| b.is_ascii_lowercase()) {
                Ok(TokenKind::ReadOnly)
            } else {
                Err(invalid())
            }
        }
        _ => Err(invalid()),
    }
}

/// Value a parsed token is looked up by: the whole read-only token, or the
/// digit prefix of a read-and-write one.
pub fn lookup_key(token: &str, kind: TokenKind) -> &str {
    match kind {
        TokenKind::ReadOnly => token,
        TokenKind::ReadAndWrite => token.get(..PREFIX_LENGTH).unwrap_or(token),
    }
}
