//! Conducky database crate
//!
//! Connection management, embedded migrations and the repositories used by
//! the authentication layer and the HTTP gateway.

use conducky_config::DatabaseConfig;
use sqlx::SqlitePool;

pub mod connection;
pub mod entities;
pub mod migrations;
pub mod repos;
pub mod types;

pub use connection::{ping, prepare_database};
pub use migrations::{run_migrations, MIGRATOR};

pub use repos::{
    log_audit, validate_slug, AuditRepository, CleanupSummary, CommentRepository,
    EventRepository, EvidenceRepository, InviteRepository, NotificationRepository,
    OrganizationRepository, ReportRepository, RoleRepository, UserRepository,
};

pub use entities::*;

pub use types::{new_id, now, parse_timestamp, timestamp, DatabaseError, DatabaseResult};

/// Open the pool and bring the schema up to date.
pub async fn initialize_database(config: &DatabaseConfig) -> anyhow::Result<SqlitePool> {
    let pool = prepare_database(config).await?;
    run_migrations(&pool).await?;
    Ok(pool)
}
