//! Migration to create the sync_tasks table.
//!
//! One row per queued "sync this user" unit of work, claimed atomically by
//! worker processes with retry and timing metadata.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(SyncTasks::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(SyncTasks::Id)
                            .uuid()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(SyncTasks::UserId).integer().not_null())
                    .col(
                        ColumnDef::new(SyncTasks::Status)
                            .text()
                            .not_null()
                            .default("queued"),
                    )
                    .col(
                        ColumnDef::new(SyncTasks::Attempts)
                            .integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(SyncTasks::ScheduledAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        ColumnDef::new(SyncTasks::RetryAfter)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(SyncTasks::StartedAt)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(SyncTasks::FinishedAt)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(ColumnDef::new(SyncTasks::Error).json_binary().null())
                    .col(
                        ColumnDef::new(SyncTasks::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        ColumnDef::new(SyncTasks::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .to_owned(),
            )
            .await?;

        // Claim queries filter on status and due time
        manager
            .create_index(
                Index::create()
                    .name("idx_sync_tasks_status_scheduled")
                    .table(SyncTasks::Table)
                    .col(SyncTasks::Status)
                    .col(SyncTasks::ScheduledAt)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_sync_tasks_user_id")
                    .table(SyncTasks::Table)
                    .col(SyncTasks::UserId)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_index(Index::drop().name("idx_sync_tasks_user_id").to_owned())
            .await?;

        manager
            .drop_index(
                Index::drop()
                    .name("idx_sync_tasks_status_scheduled")
                    .to_owned(),
            )
            .await?;

        manager
            .drop_table(Table::drop().table(SyncTasks::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum SyncTasks {
    Table,
    Id,
    UserId,
    Status,
    Attempts,
    ScheduledAt,
    RetryAfter,
    StartedAt,
    FinishedAt,
    Error,
    CreatedAt,
    UpdatedAt,
}
