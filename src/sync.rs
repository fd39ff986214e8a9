//! Reconciliation engine
//!
//! Drives one user's sync attempt: acquires the per-user syncing guard,
//! fetches the user's repositories and organizations from the data provider,
//! diffs them against stored rows, and applies the resulting upserts and
//! deletes in a single transaction. Running twice against unchanged remote
//! state is a no-op after the first run.
//!
//! Guard discipline: acquisition is one conditional UPDATE checked by
//! affected-row count, so two racing attempts for the same user cannot both
//! proceed. Release runs on every exit path, success or failure, outside the
//! attempt transaction.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::Utc;
use sea_orm::prelude::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, DatabaseTransaction, DbErr, EntityTrait,
    QueryFilter, QuerySelect, Set, TransactionTrait,
};
use tracing::{debug, info, instrument, warn};

use crate::github::{GithubClient, GithubError, OrgRecord, PermissionRecord, RepoRecord};
use crate::models::repository::OwnerKind;
use crate::models::{membership, organization, permission, repository, user};
use crate::token::generate_repo_token;

/// Failure of one sync attempt, surfaced to the task consumer.
#[derive(Debug, thiserror::Error)]
pub enum SyncFault {
    #[error("user {0} does not exist")]
    UserNotFound(i32),

    #[error("data provider failure: {0}")]
    Provider(#[from] GithubError),

    #[error("store failure: {0}")]
    Store(#[from] DbErr),
}

impl SyncFault {
    /// Permanent faults are not worth re-queueing.
    pub fn is_permanent(&self) -> bool {
        matches!(self, SyncFault::UserNotFound(_))
    }
}

/// Result of a sync attempt that did not fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncOutcome {
    /// Remote state was reconciled and committed.
    Completed,
    /// Another attempt holds the guard for this user; nothing was done.
    AlreadySyncing,
}

/// Reconciliation engine for one database.
#[derive(Clone)]
pub struct Syncer {
    db: Arc<DatabaseConnection>,
    github_api_base: String,
}

impl Syncer {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self::with_api_base(db, crate::github::DEFAULT_API_BASE)
    }

    /// Points provider calls at an explicit API root (mock servers in tests).
    pub fn with_api_base(db: Arc<DatabaseConnection>, api_base: impl Into<String>) -> Self {
        Self {
            db,
            github_api_base: api_base.into(),
        }
    }

    /// Synchronizes one user's repositories, organizations and permissions.
    #[instrument(skip(self))]
    pub async fn sync_user(&self, user_id: i32) -> Result<SyncOutcome, SyncFault> {
        let Some(user) = user::Entity::find_by_id(user_id).one(&*self.db).await? else {
            return Err(SyncFault::UserNotFound(user_id));
        };

        if !self.acquire_guard(user_id).await? {
            debug!(user_id, "sync already in flight, skipping");
            return Ok(SyncOutcome::AlreadySyncing);
        }

        let github =
            GithubClient::with_base_url(&user.github_access_token, &self.github_api_base);

        let result = self.run_attempt(&user, &github).await;
        let release = self.release_guard(user_id).await;

        match (result, release) {
            (Err(fault), release) => {
                if let Err(release_err) = release {
                    warn!(user_id, error = %release_err, "guard release after failed sync attempt also failed");
                }
                Err(fault)
            }
            (Ok(()), Err(err)) => Err(err.into()),
            (Ok(()), Ok(())) => {
                info!(user_id, login = %user.login, "sync completed");
                Ok(SyncOutcome::Completed)
            }
        }
    }

    /// One transactional attempt: everything inside commits or nothing does.
    async fn run_attempt(
        &self,
        user: &user::Model,
        github: &GithubClient,
    ) -> Result<(), SyncFault> {
        let txn = self.db.begin().await?;

        match self.reconcile(&txn, user, github).await {
            Ok(()) => {
                let now = Utc::now();
                let mut finished = user::ActiveModel {
                    id: Set(user.id),
                    ..Default::default()
                };
                finished.last_synced_at = Set(Some(now.into()));
                finished.updated_at = Set(now.into());
                finished.update(&txn).await?;

                txn.commit().await?;
                Ok(())
            }
            Err(fault) => {
                if let Err(rollback_err) = txn.rollback().await {
                    warn!(error = %rollback_err, "rollback after failed sync attempt also failed");
                }
                Err(fault)
            }
        }
    }

    async fn reconcile(
        &self,
        txn: &DatabaseTransaction,
        user: &user::Model,
        github: &GithubClient,
    ) -> Result<(), SyncFault> {
        self.sync_owned_repositories(txn, user, github).await?;
        self.sync_organizations(txn, user, github).await?;
        Ok(())
    }

    /// Repositories owned directly by the user: upsert the current listing,
    /// then delete whatever was stored but is no longer reported.
    async fn sync_owned_repositories(
        &self,
        txn: &DatabaseTransaction,
        user: &user::Model,
        github: &GithubClient,
    ) -> Result<(), SyncFault> {
        let stored = stored_repo_ids(txn, OwnerKind::User, user.github_id).await?;

        // The listing is fully materialized before the diff so a repository on
        // a later page is never misclassified as deleted.
        let listing = github.list_user_repositories().await?;

        let mut saved = HashSet::with_capacity(listing.len());
        for record in &listing {
            saved.insert(upsert_repository(txn, user.id, record).await?);
        }

        remove_missing_repositories(txn, &stored, &saved).await
    }

    /// Organizations: memberships are rebuilt from scratch (not diffed), and
    /// each current organization's repositories run through the same
    /// stored/saved reconciliation as user-owned ones.
    async fn sync_organizations(
        &self,
        txn: &DatabaseTransaction,
        user: &user::Model,
        github: &GithubClient,
    ) -> Result<(), SyncFault> {
        membership::Entity::delete_many()
            .filter(membership::Column::UserId.eq(user.id))
            .exec(txn)
            .await?;

        let listing = github.list_user_organizations().await?;

        let mut member_of: Vec<i32> = Vec::with_capacity(listing.len());
        for record in &listing {
            // Listing payloads omit the display name; fetch the detail record.
            let detail = github.get_organization(&record.login).await?;
            let org = upsert_organization(txn, &detail).await?;
            self.sync_org_repositories(txn, user, github, &org).await?;
            if !member_of.contains(&org.id) {
                member_of.push(org.id);
            }
        }

        let now = Utc::now();
        for organization_id in member_of {
            membership::ActiveModel {
                user_id: Set(user.id),
                organization_id: Set(organization_id),
                created_at: Set(now.into()),
                ..Default::default()
            }
            .insert(txn)
            .await?;
        }

        Ok(())
    }

    async fn sync_org_repositories(
        &self,
        txn: &DatabaseTransaction,
        user: &user::Model,
        github: &GithubClient,
        org: &organization::Model,
    ) -> Result<(), SyncFault> {
        let stored = stored_repo_ids(txn, OwnerKind::Organization, org.github_id).await?;

        let listing = github.list_org_repositories(&org.login).await?;

        let mut saved = HashSet::with_capacity(listing.len());
        for record in &listing {
            saved.insert(upsert_repository(txn, user.id, record).await?);
        }

        remove_missing_repositories(txn, &stored, &saved).await
    }

    /// Acquires the per-user guard with a single conditional UPDATE. Returns
    /// false when another attempt already holds it.
    async fn acquire_guard(&self, user_id: i32) -> Result<bool, DbErr> {
        let now = Utc::now();
        let result = user::Entity::update_many()
            .col_expr(user::Column::IsSyncing, Expr::value(true))
            .col_expr(user::Column::SyncStartedAt, Expr::value(now))
            .col_expr(user::Column::UpdatedAt, Expr::value(now))
            .filter(user::Column::Id.eq(user_id))
            .filter(user::Column::IsSyncing.eq(false))
            .exec(&*self.db)
            .await?;

        Ok(result.rows_affected > 0)
    }

    /// Releases the guard. Runs on success and failure alike, and is durable
    /// independently of the attempt transaction.
    async fn release_guard(&self, user_id: i32) -> Result<(), DbErr> {
        let now = Utc::now();
        user::Entity::update_many()
            .col_expr(user::Column::IsSyncing, Expr::value(false))
            .col_expr(
                user::Column::SyncStartedAt,
                Expr::value(Option::<chrono::DateTime<Utc>>::None),
            )
            .col_expr(user::Column::UpdatedAt, Expr::value(now))
            .filter(user::Column::Id.eq(user_id))
            .exec(&*self.db)
            .await?;

        Ok(())
    }
}

/// Local ids of every stored repository for one (owner_type, owner_id) pair.
async fn stored_repo_ids(
    txn: &DatabaseTransaction,
    owner_type: OwnerKind,
    owner_id: i64,
) -> Result<HashSet<i32>, DbErr> {
    let ids = repository::Entity::find()
        .select_only()
        .column(repository::Column::Id)
        .filter(repository::Column::OwnerType.eq(owner_type))
        .filter(repository::Column::OwnerId.eq(owner_id))
        .into_tuple::<i32>()
        .all(txn)
        .await?;

    Ok(ids.into_iter().collect())
}

/// Insert-or-update keyed by the remote repository id. New rows get a freshly
/// generated token; updates overwrite everything except the token. The
/// requesting user's permission row is refreshed either way.
async fn upsert_repository(
    txn: &DatabaseTransaction,
    user_id: i32,
    record: &RepoRecord,
) -> Result<i32, SyncFault> {
    let now = Utc::now();
    let existing = repository::Entity::find()
        .filter(repository::Column::GithubId.eq(record.id))
        .one(txn)
        .await?;

    let repository_id = match existing {
        None => {
            let inserted = repository::ActiveModel {
                github_id: Set(record.id),
                name: Set(record.name.clone()),
                url: Set(record.html_url.clone()),
                owner_name: Set(record.owner.login.clone()),
                owner_type: Set(OwnerKind::from_github(&record.owner.kind)),
                owner_id: Set(record.owner.id),
                token: Set(generate_repo_token(record.id)),
                created_at: Set(now.into()),
                updated_at: Set(now.into()),
                ..Default::default()
            }
            .insert(txn)
            .await?;
            inserted.id
        }
        Some(model) => {
            let id = model.id;
            let mut active: repository::ActiveModel = model.into();
            active.name = Set(record.name.clone());
            active.url = Set(record.html_url.clone());
            active.owner_name = Set(record.owner.login.clone());
            active.owner_type = Set(OwnerKind::from_github(&record.owner.kind));
            active.owner_id = Set(record.owner.id);
            active.updated_at = Set(now.into());
            active.update(txn).await?;
            id
        }
    };

    upsert_permission(txn, repository_id, user_id, &record.permissions).await?;

    Ok(repository_id)
}

/// Insert-or-update of the (repository, user) permission row.
async fn upsert_permission(
    txn: &DatabaseTransaction,
    repository_id: i32,
    user_id: i32,
    flags: &PermissionRecord,
) -> Result<(), SyncFault> {
    let now = Utc::now();
    let existing = permission::Entity::find()
        .filter(permission::Column::RepositoryId.eq(repository_id))
        .filter(permission::Column::UserId.eq(user_id))
        .one(txn)
        .await?;

    match existing {
        None => {
            permission::ActiveModel {
                repository_id: Set(repository_id),
                user_id: Set(user_id),
                admin: Set(flags.admin),
                push: Set(flags.push),
                pull: Set(flags.pull),
                created_at: Set(now.into()),
                updated_at: Set(now.into()),
                ..Default::default()
            }
            .insert(txn)
            .await?;
        }
        Some(model) => {
            let mut active: permission::ActiveModel = model.into();
            active.admin = Set(flags.admin);
            active.push = Set(flags.push);
            active.pull = Set(flags.pull);
            active.updated_at = Set(now.into());
            active.update(txn).await?;
        }
    }

    Ok(())
}

/// Insert-or-update keyed by the remote organization id. Organizations are
/// never deleted here; leaving one only severs the membership.
async fn upsert_organization(
    txn: &DatabaseTransaction,
    record: &OrgRecord,
) -> Result<organization::Model, SyncFault> {
    let now = Utc::now();
    let existing = organization::Entity::find()
        .filter(organization::Column::GithubId.eq(record.id))
        .one(txn)
        .await?;

    let org = match existing {
        None => {
            organization::ActiveModel {
                github_id: Set(record.id),
                login: Set(record.login.clone()),
                name: Set(record.name.clone()),
                created_at: Set(now.into()),
                updated_at: Set(now.into()),
                ..Default::default()
            }
            .insert(txn)
            .await?
        }
        Some(model) => {
            let mut active: organization::ActiveModel = model.into();
            active.login = Set(record.login.clone());
            active.name = Set(record.name.clone());
            active.updated_at = Set(now.into());
            active.update(txn).await?
        }
    };

    Ok(org)
}

/// Deletes every stored repository the current listing no longer reports,
/// clearing permission rows first so no orphan survives on backends that do
/// not enforce the cascade.
async fn remove_missing_repositories(
    txn: &DatabaseTransaction,
    stored: &HashSet<i32>,
    saved: &HashSet<i32>,
) -> Result<(), SyncFault> {
    let missing: Vec<i32> = stored.difference(saved).copied().collect();
    if missing.is_empty() {
        return Ok(());
    }

    debug!(count = missing.len(), "removing repositories no longer reported");

    permission::Entity::delete_many()
        .filter(permission::Column::RepositoryId.is_in(missing.clone()))
        .exec(txn)
        .await?;

    repository::Entity::delete_many()
        .filter(repository::Column::Id.is_in(missing))
        .exec(txn)
        .await?;

    Ok(())
}
