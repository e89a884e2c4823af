use crate::entities::{asset_audit_logs, asset_references, assets, cleanup_jobs};
use sea_orm::{ConnectOptions, ConnectionTrait, Database, DatabaseConnection, Schema};
use std::env;
use std::time::Duration;
use tracing::info;

pub async fn setup_database() -> anyhow::Result<DatabaseConnection> {
    let db_url = env::var("DATABASE_URL")
        .map_err(|_| anyhow::anyhow!("DATABASE_URL must be set"))?;

    info!("📂 Database: {}", db_url);

    let mut opt = ConnectOptions::new(&db_url);
    opt.max_connections(50)
        .min_connections(2)
        .connect_timeout(Duration::from_secs(30))
        .acquire_timeout(Duration::from_secs(30))
        .idle_timeout(Duration::from_secs(600))
        .max_lifetime(Duration::from_secs(1800))
        .sqlx_logging(true)
        .sqlx_logging_level(log::LevelFilter::Debug);

    let db = Database::connect(opt).await?;

    info!("✅ Database connected successfully");

    run_migrations(&db, &db_url).await?;

    Ok(db)
}

pub async fn run_migrations(db: &DatabaseConnection, db_url: &str) -> anyhow::Result<()> {
    if db_url.starts_with("postgres://") || db_url.starts_with("postgresql://") {
        info!("🔄 Running SQLx migrations for PostgreSQL...");
        let pool = sqlx::PgPool::connect(db_url).await?;
        sqlx::migrate!("./migrations").run(&pool).await?;
        pool.close().await;
    } else {
        info!("🔄 Creating schema from entities for SQLite/Other...");
        create_schema(db).await?;
    }

    Ok(())
}

/// Creates every lifecycle table (and its lookup indexes) if missing.
pub async fn create_schema(db: &DatabaseConnection) -> anyhow::Result<()> {
    let builder = db.get_database_backend();
    let schema = Schema::new(builder);

    let stmts = vec![
        schema
            .create_table_from_entity(assets::Entity)
            .if_not_exists()
            .to_owned(),
        schema
            .create_table_from_entity(asset_references::Entity)
            .if_not_exists()
            .to_owned(),
        schema
            .create_table_from_entity(asset_audit_logs::Entity)
            .if_not_exists()
            .to_owned(),
        schema
            .create_table_from_entity(cleanup_jobs::Entity)
            .if_not_exists()
            .to_owned(),
    ];

    for stmt in stmts {
        db.execute(builder.build(&stmt)).await?;
    }

    let indexes = [
        "CREATE INDEX IF NOT EXISTS idx_asset_references_asset_active ON asset_references(asset_id, active)",
        "CREATE INDEX IF NOT EXISTS idx_asset_references_entity ON asset_references(entity_type, entity_id)",
        "CREATE INDEX IF NOT EXISTS idx_assets_temporary ON assets(is_temporary, created_at)",
        "CREATE INDEX IF NOT EXISTS idx_assets_orphaned ON assets(is_orphaned, marked_for_deletion_at)",
        "CREATE INDEX IF NOT EXISTS idx_asset_audit_logs_asset ON asset_audit_logs(asset_id, created_at)",
    ];

    for sql in indexes {
        db.execute(sea_orm::Statement::from_string(builder, sql.to_string()))
            .await?;
    }

    Ok(())
}
