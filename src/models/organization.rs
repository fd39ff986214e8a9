//! Organization entity model
//!
//! Organizations are upserted by github_id and never deleted by the worker;
//! leaving an organization only severs the membership row.

use sea_orm::ActiveModelBehavior;
use sea_orm::entity::prelude::*;
use sea_orm::prelude::DateTimeWithTimeZone;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "organizations")]
pub struct Model {
    /// Local identifier (primary key)
    #[sea_orm(primary_key)]
    pub id: i32,

    /// Immutable GitHub organization id
    pub github_id: i64,

    /// Organization login, overwritten on every sync
    pub login: String,

    /// Display name; GitHub may omit it
    pub name: Option<String>,

    pub created_at: DateTimeWithTimeZone,
    pub updated_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::membership::Entity")]
    Membership,
}

impl Related<super::membership::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Membership.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
