//! Storage layer for the taskboard service
//!
//! Supports:
//! - **PostgreSQL** (production)
//! - **SQLite3** (development and small deployments: "sqlite://./taskboard.db?mode=rwc")
//! - **SQLite3 in-memory** (tests and throwaway instances: "sqlite::memory:")

pub mod entities;
pub mod lifecycle;
pub mod migrator;

use sea_orm::{ConnectionTrait, Database, DatabaseConnection, DbErr};
use tracing::info;

pub use lifecycle::{create_list, delete_list, delete_project, ListCascade, ProjectCascade};

/// Initialize database connection
pub async fn connect(database_url: &str) -> Result<DatabaseConnection, DbErr> {
    let db = Database::connect(database_url).await?;

    let backend = db.get_database_backend();
    info!("Connected to database backend: {:?}", backend);

    Ok(db)
}

/// Run pending migrations
pub async fn migrate(db: &DatabaseConnection) -> Result<(), DbErr> {
    use sea_orm_migration::MigratorTrait;

    info!("Running database migrations...");
    migrator::Migrator::up(db, None).await?;
    info!("Database migrations completed");

    Ok(())
}
