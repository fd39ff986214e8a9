//! Test utilities for database testing.
//!
//! Sets up in-memory SQLite databases with migrations applied and inserts
//! fixture rows used by the sync and worker integration tests.

use anyhow::Result;
use chrono::Utc;
use hubsync::models::repository::OwnerKind;
use hubsync::models::{membership, organization, repository, user};
use migration::{Migrator, MigratorTrait};
use sea_orm::{ActiveModelTrait, ConnectionTrait, Database, DatabaseConnection, Set, Statement};
use std::sync::Arc;

/// Sets up an in-memory SQLite database with all migrations applied.
pub async fn setup_test_db() -> Result<DatabaseConnection> {
    let db = Database::connect("sqlite::memory:").await?;

    Migrator::up(&db, None).await?;

    // SQLite does not enforce our Postgres foreign key semantics; disable FK
    // checks so fixtures can be inserted without satisfying every relation.
    db.execute(Statement::from_string(
        db.get_database_backend(),
        "PRAGMA foreign_keys = OFF".to_string(),
    ))
    .await?;

    Ok(db)
}

/// Same as [`setup_test_db`] but Arc-wrapped for engine construction.
pub async fn setup_test_db_arc() -> Result<Arc<DatabaseConnection>> {
    let db = setup_test_db().await?;
    Ok(Arc::new(db))
}

/// Inserts a user owning a GitHub credential.
pub async fn insert_user(
    db: &DatabaseConnection,
    login: &str,
    github_id: i64,
) -> Result<user::Model> {
    let now = Utc::now();
    let inserted = user::ActiveModel {
        login: Set(login.to_string()),
        github_id: Set(github_id),
        github_access_token: Set(format!("token-{login}")),
        is_syncing: Set(false),
        sync_started_at: Set(None),
        last_synced_at: Set(None),
        created_at: Set(now.into()),
        updated_at: Set(now.into()),
        ..Default::default()
    }
    .insert(db)
    .await?;

    Ok(inserted)
}

/// Inserts a stored repository row directly.
#[allow(dead_code)]
pub async fn insert_repository(
    db: &DatabaseConnection,
    github_id: i64,
    name: &str,
    owner_type: OwnerKind,
    owner_id: i64,
    owner_name: &str,
) -> Result<repository::Model> {
    let now = Utc::now();
    let inserted = repository::ActiveModel {
        github_id: Set(github_id),
        name: Set(name.to_string()),
        url: Set(format!("https://github.com/{owner_name}/{name}")),
        owner_name: Set(owner_name.to_string()),
        owner_type: Set(owner_type),
        owner_id: Set(owner_id),
        token: Set(format!("fixture-token-{github_id}")),
        created_at: Set(now.into()),
        updated_at: Set(now.into()),
        ..Default::default()
    }
    .insert(db)
    .await?;

    Ok(inserted)
}

/// Inserts an organization row directly.
#[allow(dead_code)]
pub async fn insert_organization(
    db: &DatabaseConnection,
    github_id: i64,
    login: &str,
) -> Result<organization::Model> {
    let now = Utc::now();
    let inserted = organization::ActiveModel {
        github_id: Set(github_id),
        login: Set(login.to_string()),
        name: Set(Some(login.to_string())),
        created_at: Set(now.into()),
        updated_at: Set(now.into()),
        ..Default::default()
    }
    .insert(db)
    .await?;

    Ok(inserted)
}

/// Links a user to an organization.
#[allow(dead_code)]
pub async fn insert_membership(
    db: &DatabaseConnection,
    user_id: i32,
    organization_id: i32,
) -> Result<membership::Model> {
    let now = Utc::now();
    let inserted = membership::ActiveModel {
        user_id: Set(user_id),
        organization_id: Set(organization_id),
        created_at: Set(now.into()),
        ..Default::default()
    }
    .insert(db)
    .await?;

    Ok(inserted)
}
