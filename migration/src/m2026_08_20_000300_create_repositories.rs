//! Migration to create the repositories table.
//!
//! One row per remote repository, matched by its immutable GitHub id. The
//! owner is a polymorphic (owner_type, owner_id) pair rather than a foreign
//! key, so user-owned and organization-owned repositories share the table.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Repositories::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Repositories::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(Repositories::GithubId)
                            .big_integer()
                            .not_null(),
                    )
                    .col(ColumnDef::new(Repositories::Name).text().not_null())
                    .col(ColumnDef::new(Repositories::Url).text().not_null())
                    .col(ColumnDef::new(Repositories::OwnerName).text().not_null())
                    .col(ColumnDef::new(Repositories::OwnerType).text().not_null())
                    .col(
                        ColumnDef::new(Repositories::OwnerId)
                            .big_integer()
                            .not_null(),
                    )
                    .col(ColumnDef::new(Repositories::Token).text().not_null())
                    .col(
                        ColumnDef::new(Repositories::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        ColumnDef::new(Repositories::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_repositories_github_id")
                    .table(Repositories::Table)
                    .col(Repositories::GithubId)
                    .unique()
                    .to_owned(),
            )
            .await?;

        // Covers the stored-set query for one owner during reconciliation
        manager
            .create_index(
                Index::create()
                    .name("idx_repositories_owner")
                    .table(Repositories::Table)
                    .col(Repositories::OwnerType)
                    .col(Repositories::OwnerId)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_index(Index::drop().name("idx_repositories_owner").to_owned())
            .await?;

        manager
            .drop_index(Index::drop().name("idx_repositories_github_id").to_owned())
            .await?;

        manager
            .drop_table(Table::drop().table(Repositories::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum Repositories {
    Table,
    Id,
    GithubId,
    Name,
    Url,
    OwnerName,
    OwnerType,
    OwnerId,
    Token,
    CreatedAt,
    UpdatedAt,
}
