//! Create the mute and softban "in effect" tables.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager.create_table(live_table(ActiveMute::Table)).await?;
        manager.create_table(live_table(ActiveSoftban::Table)).await?;

        // Index: end_time (for the live-table sweep)
        manager
            .create_index(
                Index::create()
                    .name("idx_active_mute_end_time")
                    .table(ActiveMute::Table)
                    .col(Live::EndTime)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_active_softban_end_time")
                    .table(ActiveSoftban::Table)
                    .col(Live::EndTime)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(ActiveSoftban::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(ActiveMute::Table).to_owned())
            .await
    }
}

fn live_table<T: IntoIden + 'static>(table: T) -> TableCreateStatement {
    Table::create()
        .table(table)
        .if_not_exists()
        .col(
            ColumnDef::new(Live::SubjectId)
                .string_len(64)
                .not_null()
                .primary_key(),
        )
        .col(ColumnDef::new(Live::RecordId).string_len(6).not_null())
        .col(ColumnDef::new(Live::EndTime).big_integer().not_null())
        .col(ColumnDef::new(Live::Reason).text().not_null())
        .to_owned()
}

#[derive(Iden)]
enum ActiveMute {
    Table,
}

#[derive(Iden)]
enum ActiveSoftban {
    Table,
}

#[derive(Iden)]
enum Live {
    SubjectId,
    RecordId,
    EndTime,
    Reason,
}
