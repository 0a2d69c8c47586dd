//! User entity (database row mapping).

use domain::models::{User, UserRole};
use sqlx::FromRow;
use uuid::Uuid;

/// Database enum for user_role that maps to PostgreSQL enum type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, sqlx::Type)]
#[sqlx(type_name = "user_role", rename_all = "lowercase")]
pub enum UserRoleDb {
    Scout,
    Bookmaker,
    Supervisor,
}

impl From<UserRoleDb> for UserRole {
    fn from(db_role: UserRoleDb) -> Self {
        match db_role {
            UserRoleDb::Scout => UserRole::Scout,
            UserRoleDb::Bookmaker => UserRole::Bookmaker,
            UserRoleDb::Supervisor => UserRole::Supervisor,
        }
    }
}

impl From<UserRole> for UserRoleDb {
    fn from(role: UserRole) -> Self {
        match role {
            UserRole::Scout => UserRoleDb::Scout,
            UserRole::Bookmaker => UserRoleDb::Bookmaker,
            UserRole::Supervisor => UserRoleDb::Supervisor,
        }
    }
}

/// Database row mapping for the users table.
#[derive(Debug, Clone, FromRow)]
pub struct UserEntity {
    pub id: Uuid,
    pub role: UserRoleDb,
    pub display_name: String,
}

impl From<UserEntity> for User {
    fn from(entity: UserEntity) -> Self {
        Self {
            id: entity.id,
            role: entity.role.into(),
            display_name: entity.display_name,
        }
    }
}
