//! # Data Models
//!
//! SeaORM entity models for the tables the sync worker reads and writes.

pub mod membership;
pub mod organization;
pub mod permission;
pub mod repository;
pub mod sync_task;
pub mod user;

pub use membership::Entity as Membership;
pub use organization::Entity as Organization;
pub use permission::Entity as Permission;
pub use repository::Entity as Repository;
pub use repository::OwnerKind;
pub use sync_task::Entity as SyncTask;
pub use user::Entity as User;
