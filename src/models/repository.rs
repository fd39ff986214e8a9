//! Repository entity model
//!
//! One row per remote repository, keyed by its immutable GitHub id. The owner
//! is a tagged (owner_type, owner_id) pair, not a foreign key, so user-owned
//! and organization-owned repositories live in the same table.

use sea_orm::ActiveModelBehavior;
use sea_orm::entity::prelude::*;
use sea_orm::prelude::DateTimeWithTimeZone;

/// Discriminator for the polymorphic repository owner, stored lowercase.
#[derive(Clone, Copy, Debug, PartialEq, Eq, EnumIter, DeriveActiveEnum)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::None)")]
pub enum OwnerKind {
    #[sea_orm(string_value = "user")]
    User,
    #[sea_orm(string_value = "organization")]
    Organization,
}

impl OwnerKind {
    /// Maps GitHub's `owner.type` field (`"User"` / `"Organization"`) onto the
    /// stored discriminator. Anything unrecognized is treated as a user owner,
    /// matching the case-normalizing behavior of the listing endpoints.
    pub fn from_github(kind: &str) -> Self {
        if kind.eq_ignore_ascii_case("organization") {
            OwnerKind::Organization
        } else {
            OwnerKind::User
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "repositories")]
pub struct Model {
    /// Local identifier (primary key)
    #[sea_orm(primary_key)]
    pub id: i32,

    /// Immutable GitHub repository id (unique)
    pub github_id: i64,

    /// Repository name, overwritten on every sync
    pub name: String,

    /// HTML URL of the repository
    pub url: String,

    /// Login of the owning user or organization
    pub owner_name: String,

    /// Owner discriminator
    pub owner_type: OwnerKind,

    /// GitHub id of the owning user or organization
    pub owner_id: i64,

    /// Opaque access token generated once at first creation, never rotated here
    pub token: String,

    pub created_at: DateTimeWithTimeZone,
    pub updated_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::permission::Entity")]
    Permission,
}

impl Related<super::permission::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Permission.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
