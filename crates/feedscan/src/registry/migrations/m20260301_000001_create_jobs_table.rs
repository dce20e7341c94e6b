//! Initial migration to create the jobs table.

use sea_orm_migration::{prelude::*, schema::*};

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Jobs::Table)
                    .if_not_exists()
                    .col(string(Jobs::Id).primary_key())
                    .col(string(Jobs::FileName).not_null())
                    .col(string(Jobs::SourceItemId).not_null())
                    .col(big_integer(Jobs::TotalBytes).not_null().default(0))
                    .col(string(Jobs::Status).not_null().default("queued"))
                    .col(big_integer(Jobs::ProcessedLines).not_null().default(0))
                    .col(big_integer(Jobs::ProcessedBytes).not_null().default(0))
                    .col(big_integer(Jobs::ErrorLines).not_null().default(0))
                    .col(big_integer_null(Jobs::TotalLines))
                    .col(big_integer(Jobs::NumFragments).not_null().default(0))
                    .col(big_integer(Jobs::FragmentsDone).not_null().default(0))
                    .col(timestamp_with_time_zone(Jobs::CreatedAt).not_null())
                    .col(timestamp_with_time_zone_null(Jobs::StartedAt))
                    .col(timestamp_with_time_zone_null(Jobs::FinishedAt))
                    .col(timestamp_with_time_zone_null(Jobs::HeartbeatAt))
                    .col(big_integer_null(Jobs::TotalDurationMs))
                    .col(double_null(Jobs::LinesPerSecond))
                    .col(double_null(Jobs::BytesPerSecond))
                    .col(boolean(Jobs::CancelRequested).not_null().default(false))
                    .col(string_null(Jobs::ClaimedBy))
                    .col(text_null(Jobs::ErrorMessage))
                    .col(boolean_null(Jobs::ValidationPassed))
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_jobs_status")
                    .table(Jobs::Table)
                    .col(Jobs::Status)
                    .to_owned(),
            )
            .await?;

        // Composite index for the scheduler's promotion query: filter by
        // status, order by created_at.
        manager
            .create_index(
                Index::create()
                    .name("idx_jobs_status_created_at")
                    .table(Jobs::Table)
                    .col(Jobs::Status)
                    .col(Jobs::CreatedAt)
                    .to_owned(),
            )
            .await?;

        // Supports stale-job recovery scans.
        manager
            .create_index(
                Index::create()
                    .name("idx_jobs_heartbeat_at")
                    .table(Jobs::Table)
                    .col(Jobs::HeartbeatAt)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Jobs::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum Jobs {
    Table,
    Id,
    FileName,
    SourceItemId,
    TotalBytes,
    Status,
    ProcessedLines,
    ProcessedBytes,
    ErrorLines,
    TotalLines,
    NumFragments,
    FragmentsDone,
    CreatedAt,
    StartedAt,
    FinishedAt,
    HeartbeatAt,
    TotalDurationMs,
    LinesPerSecond,
    BytesPerSecond,
    CancelRequested,
    ClaimedBy,
    ErrorMessage,
    ValidationPassed,
}
