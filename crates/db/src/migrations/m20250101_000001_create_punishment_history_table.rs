//! Create punishment history table migration.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(PunishmentHistory::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(PunishmentHistory::Id)
                            .string_len(6)
                            .not_null()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(PunishmentHistory::SubjectId)
                            .string_len(64)
                            .not_null(),
                    )
                    .col(ColumnDef::new(PunishmentHistory::SubjectAddress).string_len(64))
                    .col(
                        ColumnDef::new(PunishmentHistory::PunishmentType)
                            .string_len(16)
                            .not_null(),
                    )
                    .col(ColumnDef::new(PunishmentHistory::Reason).text().not_null())
                    .col(
                        ColumnDef::new(PunishmentHistory::IssuerName)
                            .string_len(64)
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(PunishmentHistory::IssuedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        ColumnDef::new(PunishmentHistory::ByAddress)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(
                        ColumnDef::new(PunishmentHistory::EndTimestamp)
                            .big_integer()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(PunishmentHistory::DurationLabel)
                            .string_len(64)
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(PunishmentHistory::Active)
                            .boolean()
                            .not_null()
                            .default(true),
                    )
                    .col(ColumnDef::new(PunishmentHistory::RemovedBy).string_len(64))
                    .col(ColumnDef::new(PunishmentHistory::RemovedReason).text())
                    .col(ColumnDef::new(PunishmentHistory::RemovedAt).timestamp_with_time_zone())
                    .col(
                        ColumnDef::new(PunishmentHistory::WarnLevel)
                            .integer()
                            .not_null()
                            .default(0),
                    )
                    .to_owned(),
            )
            .await?;

        // Index: (subject_id, punishment_type, active) for active-state lookups
        manager
            .create_index(
                Index::create()
                    .name("idx_punishment_history_subject_type_active")
                    .table(PunishmentHistory::Table)
                    .col(PunishmentHistory::SubjectId)
                    .col(PunishmentHistory::PunishmentType)
                    .col(PunishmentHistory::Active)
                    .to_owned(),
            )
            .await?;

        // Index: (subject_address, punishment_type, active) for address lookups
        manager
            .create_index(
                Index::create()
                    .name("idx_punishment_history_address_type_active")
                    .table(PunishmentHistory::Table)
                    .col(PunishmentHistory::SubjectAddress)
                    .col(PunishmentHistory::PunishmentType)
                    .col(PunishmentHistory::Active)
                    .to_owned(),
            )
            .await?;

        // Index: end_timestamp (for reconciliation sweep)
        manager
            .create_index(
                Index::create()
                    .name("idx_punishment_history_end_timestamp")
                    .table(PunishmentHistory::Table)
                    .col(PunishmentHistory::EndTimestamp)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(PunishmentHistory::Table).to_owned())
            .await
    }
}

#[derive(Iden)]
enum PunishmentHistory {
    Table,
    Id,
    SubjectId,
    SubjectAddress,
    PunishmentType,
    Reason,
    IssuerName,
    IssuedAt,
    ByAddress,
    EndTimestamp,
    DurationLabel,
    Active,
    RemovedBy,
    RemovedReason,
    RemovedAt,
    WarnLevel,
}
