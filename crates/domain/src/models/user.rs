//! User domain models and the role sum type driving authorization.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Actor role. Every authorization and visibility decision in the
/// messenger switches exhaustively on this enum, so a new role cannot be
/// added without revisiting each decision site.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserRole {
    Scout,
    Bookmaker,
    Supervisor,
}

impl UserRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            UserRole::Scout => "scout",
            UserRole::Bookmaker => "bookmaker",
            UserRole::Supervisor => "supervisor",
        }
    }

    /// Returns true if this role sees all MATCH chats regardless of
    /// membership (oversight roles).
    pub fn has_match_oversight(&self) -> bool {
        matches!(self, UserRole::Bookmaker | UserRole::Supervisor)
    }

    /// Returns true if this role may open a ticket without a source chat.
    pub fn can_create_standalone_ticket(&self) -> bool {
        matches!(self, UserRole::Scout | UserRole::Bookmaker)
    }
}

impl FromStr for UserRole {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "scout" => Ok(UserRole::Scout),
            "bookmaker" => Ok(UserRole::Bookmaker),
            "supervisor" => Ok(UserRole::Supervisor),
            _ => Err(format!("Invalid user role: {}", s)),
        }
    }
}

impl fmt::Display for UserRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A messenger user. The messenger consults users read-only; account
/// management lives elsewhere.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct User {
    pub id: Uuid,
    pub role: UserRole,
    pub display_name: String,
}
