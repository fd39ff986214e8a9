//! SyncTask entity model
//!
//! One queued "sync this user" unit of work. Workers claim rows atomically,
//! run the reconciliation engine, and record the outcome here.

use sea_orm::ActiveModelBehavior;
use sea_orm::entity::prelude::*;
use sea_orm::prelude::DateTimeWithTimeZone;
use serde_json::Value as JsonValue;
use uuid::Uuid;

/// Task lifecycle states as stored in `status`.
pub const STATUS_QUEUED: &str = "queued";
pub const STATUS_RUNNING: &str = "running";
pub const STATUS_SUCCEEDED: &str = "succeeded";
pub const STATUS_FAILED: &str = "failed";

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "sync_tasks")]
pub struct Model {
    /// Unique identifier for the task (primary key)
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    /// User to synchronize
    pub user_id: i32,

    /// Current status: queued | running | succeeded | failed
    pub status: String,

    /// Number of attempts made for this task
    pub attempts: i32,

    /// When the task becomes due
    pub scheduled_at: DateTimeWithTimeZone,

    /// When the task becomes eligible again after a failure backoff
    pub retry_after: Option<DateTimeWithTimeZone>,

    /// When the current or last attempt started
    pub started_at: Option<DateTimeWithTimeZone>,

    /// When the task reached a terminal state
    pub finished_at: Option<DateTimeWithTimeZone>,

    /// Structured error details from the last failed attempt
    #[sea_orm(column_type = "JsonBinary")]
    pub error: Option<JsonValue>,

    pub created_at: DateTimeWithTimeZone,
    pub updated_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
