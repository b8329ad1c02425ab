//! Effective privilege of a user (or an anonymous visitor) on a project.

use serde::Serialize;
use sha2::{Digest, Sha256};

use super::token::{TokenKind, parse_token};
use crate::error::{Error, Result};
use crate::types::{AccessSource, PrivilegeLevel, ProjectAccess, PublicAccessLevel};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Authorization {
    pub epoch: i64,
    pub privilege_level: PrivilegeLevel,
    pub access_source: AccessSource,
    pub is_token_member: bool,
}

impl Authorization {
    pub fn can_write(&self) -> bool {
        self.privilege_level >= PrivilegeLevel::ReadAndWrite
    }
}

/// Resolves what `user_id` (or an anonymous caller when `None`) may do on the
/// project described by `access`, optionally presenting a sharing token.
pub fn resolve(
    access: &ProjectAccess,
    user_id: Option<&str>,
    token: Option<&str>,
) -> Result<Authorization> {
    let grant = |privilege_level, access_source, is_token_member| Authorization {
        epoch: access.epoch,
        privilege_level,
        access_source,
        is_token_member,
    };
    let token_based = access.public_access_level == PublicAccessLevel::TokenBased;

    if access.deleted {
        return match user_id {
            Some(user) if user == access.owner_id => {
                Ok(grant(PrivilegeLevel::Owner, AccessSource::Owner, false))
            }
            _ => Err(Error::NotFoundOrNotAuthorized),
        };
    }

    let Some(user) = user_id else {
        if !token_based {
            return Err(Error::NotFoundOrNotAuthorized);
        }
        return match_token(access, token)
            .map(|level| grant(level, AccessSource::Token, true))
            .ok_or(Error::NotFoundOrNotAuthorized);
    };

    if user == access.owner_id {
        return Ok(grant(PrivilegeLevel::Owner, AccessSource::Owner, false));
    }

    let member = access.member.as_ref().filter(|m| m.user_id == user);
    if let Some(m) = member.filter(|m| m.access_source != AccessSource::Token) {
        return Ok(grant(m.privilege_level, m.access_source, false));
    }

    if !token_based {
        return Err(Error::NotFoundOrNotAuthorized);
    }

    let from_row = member.map(|m| m.privilege_level);
    let from_token = match_token(access, token);

    // A presented token can lift a read-only token member to read-and-write.
    from_row
        .max(from_token)
        .map(|level| grant(level, AccessSource::Token, true))
        .ok_or(Error::NotFoundOrNotAuthorized)
}

/// Privilege granted by `token`, if it matches one of the project's tokens.
fn match_token(access: &ProjectAccess, token: Option<&str>) -> Option<PrivilegeLevel> {
    let token = token?;
    let (expected, level) = match parse_token(token).ok()? {
        TokenKind::ReadAndWrite => (
            access.read_and_write_token.as_deref()?,
            PrivilegeLevel::ReadAndWrite,
        ),
        TokenKind::ReadOnly => (access.read_only_token.as_deref()?, PrivilegeLevel::ReadOnly),
    };

    // Timing must not depend on how long a prefix the guess shares.
    (Sha256::digest(token.as_bytes()) == Sha256::digest(expected.as_bytes())).then_some(level)
}
