//! Database migrations.
//!
//! Schema migrations for the ledger tables.

#![allow(missing_docs)]

use sea_orm_migration::prelude::*;

mod m20250101_000001_create_punishment_history_table;
mod m20250101_000002_create_active_warning_table;
mod m20250101_000003_create_live_punishment_tables;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20250101_000001_create_punishment_history_table::Migration),
            Box::new(m20250101_000002_create_active_warning_table::Migration),
            Box::new(m20250101_000003_create_live_punishment_tables::Migration),
        ]
    }
}
