//! Task consumer and worker pool
//!
//! Claims due sync tasks from the `sync_tasks` table, dispatches each to the
//! reconciliation engine under a bounded concurrency limit, and owns the
//! retry policy: failed attempts are re-queued with exponential backoff and
//! jitter until `max_attempts` is exhausted. The engine itself never retries.
//!
//! Claiming is a select-then-conditional-UPDATE pair inside one transaction,
//! checked by affected rows, so two pool instances sharing a database cannot
//! run the same task twice. Tasks for a user whose previous task is still
//! running are left in the queue.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use metrics::{counter, histogram};
use rand::{Rng, thread_rng};
use sea_orm::prelude::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, DbErr, EntityTrait, QueryFilter,
    QueryOrder, QuerySelect, QueryTrait, Set, TransactionTrait,
};
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use crate::models::sync_task::{
    self, STATUS_FAILED, STATUS_QUEUED, STATUS_RUNNING, STATUS_SUCCEEDED,
};
use crate::models::user;
use crate::sync::{SyncOutcome, Syncer};

/// Tuning knobs for the worker pool.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Maximum number of sync attempts in flight at once
    pub num_workers: usize,
    /// Milliseconds between claim ticks
    pub tick_ms: u64,
    /// Maximum number of tasks claimed per tick
    pub claim_batch: u64,
    /// Attempts before a task is marked failed for good
    pub max_attempts: i32,
    /// Base retry backoff in seconds
    pub backoff_base_seconds: f64,
    /// Upper bound for the exponential backoff
    pub backoff_max_seconds: f64,
    /// Fraction of the backoff added as random jitter
    pub backoff_jitter: f64,
    /// Age after which a leftover syncing guard is considered stale
    pub stale_guard_seconds: i64,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            num_workers: 4,
            tick_ms: 5000,
            claim_batch: 50,
            max_attempts: 5,
            backoff_base_seconds: 5.0,
            backoff_max_seconds: 900.0,
            backoff_jitter: 0.1,
            stale_guard_seconds: 3600,
        }
    }
}

impl WorkerConfig {
    /// Exponential backoff with jitter for the next retry after
    /// `prior_failures` completed attempts.
    pub fn backoff_seconds(&self, prior_failures: i32) -> f64 {
        let backoff = (self.backoff_base_seconds * 2_f64.powi(prior_failures.max(0)))
            .min(self.backoff_max_seconds);
        let jitter_span = self.backoff_jitter * backoff;
        if jitter_span > 0.0 {
            backoff + thread_rng().gen_range(0.0..jitter_span)
        } else {
            backoff
        }
    }
}

/// Inserts a queued sync task for the given user, due immediately.
pub async fn enqueue(db: &DatabaseConnection, user_id: i32) -> Result<Uuid, DbErr> {
    let now = Utc::now();
    let id = Uuid::new_v4();
    sync_task::ActiveModel {
        id: Set(id),
        user_id: Set(user_id),
        status: Set(STATUS_QUEUED.to_string()),
        attempts: Set(0),
        scheduled_at: Set(now.into()),
        retry_after: Set(None),
        started_at: Set(None),
        finished_at: Set(None),
        error: Set(None),
        created_at: Set(now.into()),
        updated_at: Set(now.into()),
    }
    .insert(db)
    .await?;

    Ok(id)
}

/// Worker pool consuming sync tasks until shut down.
#[derive(Clone)]
pub struct WorkerPool {
    db: Arc<DatabaseConnection>,
    syncer: Syncer,
    config: WorkerConfig,
}

impl WorkerPool {
    pub fn new(db: Arc<DatabaseConnection>, syncer: Syncer, config: WorkerConfig) -> Self {
        Self { db, syncer, config }
    }

    pub fn config(&self) -> &WorkerConfig {
        &self.config
    }

    /// Runs the claim loop until the shutdown token fires. In-flight tasks
    /// finish before the loop returns.
    #[instrument(skip_all)]
    pub async fn run(&self, shutdown: CancellationToken) -> Result<(), DbErr> {
        info!(config = ?self.config, "starting sync worker pool");
        let tick = Duration::from_millis(self.config.tick_ms);

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    info!("worker pool shutdown requested");
                    break;
                }
                _ = sleep(tick) => {
                    let started = std::time::Instant::now();
                    match self.tick().await {
                        Ok(count) if count > 0 => {
                            debug!(count, "processed sync tasks");
                        }
                        Ok(_) => {}
                        Err(err) => {
                            error!(error = %err, "worker tick failed");
                        }
                    }
                    histogram!("sync_worker_tick_duration_ms")
                        .record(started.elapsed().as_secs_f64() * 1_000.0);
                }
            }
        }

        info!("worker pool stopped");
        Ok(())
    }

    /// One tick: recover stale guards, claim due tasks, run them bounded by
    /// the worker count.
    pub async fn tick(&self) -> Result<usize, DbErr> {
        self.clear_stale_guards().await?;

        let tasks = self.claim_tasks().await?;
        if tasks.is_empty() {
            return Ok(0);
        }
        let count = tasks.len();
        debug!(count, "claimed sync tasks");

        let semaphore = Arc::new(tokio::sync::Semaphore::new(self.config.num_workers));
        let mut handles = Vec::with_capacity(count);
        for task in tasks {
            let pool = self.clone();
            let permit = semaphore
                .clone()
                .acquire_owned()
                .await
                .expect("semaphore never closed");
            handles.push(tokio::spawn(async move {
                let _permit = permit;
                pool.run_single_task(task).await;
            }));
        }
        for handle in handles {
            let _ = handle.await;
        }

        Ok(count)
    }

    /// Atomically claims a batch of due tasks. A task is due when queued,
    /// scheduled, past any retry backoff, and its user has no running task.
    async fn claim_tasks(&self) -> Result<Vec<sync_task::Model>, DbErr> {
        let now = Utc::now();
        let txn = self.db.begin().await?;

        let eligible = sync_task::Entity::find()
            .select_only()
            .column(sync_task::Column::Id)
            .filter(
                sync_task::Column::Status
                    .eq(STATUS_QUEUED)
                    .and(sync_task::Column::ScheduledAt.lte(now))
                    .and(
                        sync_task::Column::RetryAfter
                            .is_null()
                            .or(sync_task::Column::RetryAfter.lte(now)),
                    ),
            )
            .filter(
                sync_task::Column::UserId.not_in_subquery(
                    sync_task::Entity::find()
                        .select_only()
                        .column(sync_task::Column::UserId)
                        .filter(sync_task::Column::Status.eq(STATUS_RUNNING))
                        .into_query(),
                ),
            )
            .order_by_asc(sync_task::Column::ScheduledAt)
            .limit(Some(self.config.claim_batch))
            .into_tuple::<Uuid>()
            .all(&txn)
            .await?;

        if eligible.is_empty() {
            txn.commit().await?;
            return Ok(Vec::new());
        }

        let update = sync_task::Entity::update_many()
            .col_expr(sync_task::Column::Status, Expr::value(STATUS_RUNNING))
            .col_expr(sync_task::Column::StartedAt, Expr::value(now))
            .col_expr(sync_task::Column::UpdatedAt, Expr::value(now))
            .col_expr(
                sync_task::Column::Attempts,
                Expr::col(sync_task::Column::Attempts).add(1),
            )
            .filter(sync_task::Column::Id.is_in(eligible.clone()))
            // Re-check the status so a task claimed elsewhere is skipped
            .filter(sync_task::Column::Status.eq(STATUS_QUEUED))
            .exec(&txn)
            .await?;

        // Restrict to the selected ids; started_at distinguishes this claim
        // from another pool instance claiming the same rows first.
        let claimed = if update.rows_affected > 0 {
            sync_task::Entity::find()
                .filter(sync_task::Column::Id.is_in(eligible))
                .filter(sync_task::Column::Status.eq(STATUS_RUNNING))
                .filter(sync_task::Column::StartedAt.eq(now))
                .all(&txn)
                .await?
        } else {
            Vec::new()
        };

        txn.commit().await?;
        Ok(claimed)
    }

    /// Runs one claimed task through the engine and records the outcome.
    #[instrument(skip(self), fields(task_id = %task.id, user_id = task.user_id))]
    pub async fn run_single_task(&self, task: sync_task::Model) {
        let started = std::time::Instant::now();

        let result = self.syncer.sync_user(task.user_id).await;
        histogram!("sync_task_duration_seconds").record(started.elapsed().as_secs_f64());

        match result {
            Ok(outcome) => {
                if outcome == SyncOutcome::AlreadySyncing {
                    debug!("user already syncing, task acknowledged");
                }
                counter!("sync_tasks_succeeded_total").increment(1);
                if let Err(err) = self.finish_task(&task, STATUS_SUCCEEDED, None).await {
                    error!(error = %err, "failed to record task success");
                }
            }
            Err(fault) => {
                counter!("sync_tasks_failed_total").increment(1);
                if let Err(err) = self.handle_failure(&task, &fault).await {
                    error!(error = %err, "failed to record task failure");
                }
            }
        }
    }

    /// Re-queues a failed task with backoff, or marks it failed for good once
    /// the attempts are used up or the fault cannot succeed on retry.
    async fn handle_failure(
        &self,
        task: &sync_task::Model,
        fault: &crate::sync::SyncFault,
    ) -> Result<(), DbErr> {
        let attempts_completed = task.attempts.max(1);
        let out_of_attempts = attempts_completed >= self.config.max_attempts;

        let error_details = serde_json::json!({
            "message": fault.to_string(),
            "attempts": attempts_completed,
            "timestamp": Utc::now().to_rfc3339(),
        });

        if fault.is_permanent() || out_of_attempts {
            warn!(
                attempts = attempts_completed,
                error = %fault,
                "task failed permanently"
            );
            return self
                .finish_task(task, STATUS_FAILED, Some(error_details))
                .await;
        }

        let backoff = self.config.backoff_seconds(attempts_completed - 1);
        let retry_after = Utc::now() + chrono::Duration::seconds(backoff as i64);
        warn!(
            attempts = attempts_completed,
            backoff_seconds = backoff,
            error = %fault,
            "task failed, re-queueing"
        );

        let now = Utc::now();
        let mut active: sync_task::ActiveModel = task.clone().into();
        active.status = Set(STATUS_QUEUED.to_string());
        active.retry_after = Set(Some(retry_after.into()));
        active.error = Set(Some(error_details));
        active.updated_at = Set(now.into());
        active.update(&*self.db).await?;

        Ok(())
    }

    async fn finish_task(
        &self,
        task: &sync_task::Model,
        status: &str,
        error_details: Option<serde_json::Value>,
    ) -> Result<(), DbErr> {
        let now = Utc::now();
        let mut active: sync_task::ActiveModel = task.clone().into();
        active.status = Set(status.to_string());
        active.finished_at = Set(Some(now.into()));
        active.error = Set(error_details);
        active.updated_at = Set(now.into());
        active.update(&*self.db).await?;
        Ok(())
    }

    /// Watchdog: a worker that died mid-sync leaves `is_syncing` set, which
    /// would block that user forever. Clear guards older than the threshold.
    async fn clear_stale_guards(&self) -> Result<(), DbErr> {
        let cutoff = Utc::now() - chrono::Duration::seconds(self.config.stale_guard_seconds);
        let result = user::Entity::update_many()
            .col_expr(user::Column::IsSyncing, Expr::value(false))
            .col_expr(
                user::Column::SyncStartedAt,
                Expr::value(Option::<chrono::DateTime<Utc>>::None),
            )
            .filter(user::Column::IsSyncing.eq(true))
            .filter(user::Column::SyncStartedAt.lt(cutoff))
            .exec(&*self.db)
            .await?;

        if result.rows_affected > 0 {
            warn!(
                count = result.rows_affected,
                "cleared stale syncing guards"
            );
            counter!("stale_guards_cleared_total").increment(result.rows_affected);
        }

        Ok(())
    }
}
