//! User entity model
//!
//! Users come from the registration flow; the worker mutates only the syncing
//! guard, the last-synced timestamp and the organization association.

use sea_orm::ActiveModelBehavior;
use sea_orm::entity::prelude::*;
use sea_orm::prelude::DateTimeWithTimeZone;

/// User entity owning the GitHub credential a sync attempt runs under
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "users")]
pub struct Model {
    /// Local identifier (primary key)
    #[sea_orm(primary_key)]
    pub id: i32,

    /// GitHub login of the user
    pub login: String,

    /// Immutable GitHub account id
    pub github_id: i64,

    /// OAuth access token used for data provider calls
    pub github_access_token: String,

    /// Advisory guard: true while one sync attempt is in flight
    pub is_syncing: bool,

    /// When the current guard was acquired; cleared on release
    pub sync_started_at: Option<DateTimeWithTimeZone>,

    /// Timestamp of the last successfully committed sync
    pub last_synced_at: Option<DateTimeWithTimeZone>,

    pub created_at: DateTimeWithTimeZone,
    pub updated_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::membership::Entity")]
    Membership,
    #[sea_orm(has_many = "super::permission::Entity")]
    Permission,
}

impl Related<super::membership::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Membership.def()
    }
}

impl Related<super::permission::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Permission.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
