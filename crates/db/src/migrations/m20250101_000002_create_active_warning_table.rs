//! Create active warning table migration.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(ActiveWarning::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(ActiveWarning::Id)
                            .string_len(32)
                            .not_null()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(ActiveWarning::SubjectId)
                            .string_len(64)
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(ActiveWarning::PunishmentRecordId)
                            .string_len(6)
                            .not_null()
                            .unique_key(),
                    )
                    .col(ColumnDef::new(ActiveWarning::Level).integer().not_null())
                    .col(ColumnDef::new(ActiveWarning::StartTime).big_integer().not_null())
                    .col(ColumnDef::new(ActiveWarning::EndTime).big_integer().not_null())
                    .col(
                        ColumnDef::new(ActiveWarning::Paused)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(
                        ColumnDef::new(ActiveWarning::RemainingOnPause)
                            .big_integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(ActiveWarning::AssociatedPunishmentIds)
                            .text()
                            .not_null(),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_active_warning_record")
                            .from(ActiveWarning::Table, ActiveWarning::PunishmentRecordId)
                            .to(PunishmentHistory::Table, PunishmentHistory::Id),
                    )
                    .to_owned(),
            )
            .await?;

        // Index: (subject_id, paused) for escalation lookups
        manager
            .create_index(
                Index::create()
                    .name("idx_active_warning_subject_paused")
                    .table(ActiveWarning::Table)
                    .col(ActiveWarning::SubjectId)
                    .col(ActiveWarning::Paused)
                    .to_owned(),
            )
            .await?;

        // Index: end_time (for expiry sweep)
        manager
            .create_index(
                Index::create()
                    .name("idx_active_warning_end_time")
                    .table(ActiveWarning::Table)
                    .col(ActiveWarning::EndTime)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(ActiveWarning::Table).to_owned())
            .await
    }
}

#[derive(Iden)]
enum ActiveWarning {
    Table,
    Id,
    SubjectId,
    PunishmentRecordId,
    Level,
    StartTime,
    EndTime,
    Paused,
    RemainingOnPause,
    AssociatedPunishmentIds,
}

#[derive(Iden)]
enum PunishmentHistory {
    Table,
    Id,
}
