//! Database migrations for the hubsync worker.
//!
//! This module contains all database migrations using SeaORM Migration.

pub use sea_orm_migration::prelude::*;

mod m2026_08_20_000100_create_users;
mod m2026_08_20_000200_create_organizations;
mod m2026_08_20_000300_create_repositories;
mod m2026_08_20_000400_create_permissions;
mod m2026_08_20_000500_create_memberships;
mod m2026_08_20_000600_create_sync_tasks;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m2026_08_20_000100_create_users::Migration),
            Box::new(m2026_08_20_000200_create_organizations::Migration),
            Box::new(m2026_08_20_000300_create_repositories::Migration),
            Box::new(m2026_08_20_000400_create_permissions::Migration),
            Box::new(m2026_08_20_000500_create_memberships::Migration),
            Box::new(m2026_08_20_000600_create_sync_tasks::Migration),
        ]
    }
}
