use std::fmt;

use serde::{Deserialize, Serialize};

/// Privilege a user holds on a project. Ordered: owner implies read-and-write
/// implies read-only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PrivilegeLevel {
    ReadOnly = 1,
    ReadAndWrite = 2,
    Owner = 3,
}

impl PrivilegeLevel {
    pub const fn as_i64(self) -> i64 {
        self as i64
    }

    pub fn from_i64(value: i64) -> Option<Self> {
        match value {
            1 => Some(Self::ReadOnly),
            2 => Some(Self::ReadAndWrite),
            3 => Some(Self::Owner),
            _ => None,
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "readOnly" => Some(Self::ReadOnly),
            "readAndWrite" => Some(Self::ReadAndWrite),
            "owner" => Some(Self::Owner),
            _ => None,
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::ReadOnly => "readOnly",
            Self::ReadAndWrite => "readAndWrite",
            Self::Owner => "owner",
        }
    }
}

impl fmt::Display for PrivilegeLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum AccessSource {
    Owner,
    Invite,
    Token,
}

impl AccessSource {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Owner => "owner",
            Self::Invite => "invite",
            Self::Token => "token",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "owner" => Some(Self::Owner),
            "invite" => Some(Self::Invite),
            "token" => Some(Self::Token),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PublicAccessLevel {
    #[default]
    Private,
    TokenBased,
}

impl PublicAccessLevel {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Private => "private",
            Self::TokenBased => "tokenBased",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "private" => Some(Self::Private),
            "tokenBased" => Some(Self::TokenBased),
            _ => None,
        }
    }
}
