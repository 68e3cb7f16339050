//! GT Market - operator entry point
//!
//! Connects to the database, checks the schema and the audit hash chain, and
//! reports the active fee policy. The marketplace itself is embedded by the
//! calling services through the library.

use std::sync::Arc;

use gt_market::audit::AuditLog;
use gt_market::{db, Config, PgStore};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Initialize tracing/logging. `LOG_FORMAT=json` switches to JSON lines.
fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "gt_market=debug".into());
    let json = std::env::var("LOG_FORMAT").is_ok_and(|v| v.eq_ignore_ascii_case("json"));

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    init_tracing();

    let config = Config::from_env()?;
    tracing::info!(environment = %config.environment, "Starting GT Market core");
    tracing::info!("Connecting to database...");

    let pool = db::connect(&config).await?;
    db::verify_connection(&pool).await?;

    if !db::check_schema(&pool).await? {
        tracing::error!("Database schema is not complete. Please run migrations.");
        return Err(anyhow::anyhow!("Database schema incomplete"));
    }
    tracing::info!("Database connected successfully");

    let audit = AuditLog::new(Arc::new(PgStore::new(pool.clone())));
    let chain = audit.verify_chain(None).await?;
    if chain.is_valid {
        tracing::info!(entries_checked = chain.entries_checked, "Audit hash chain intact from genesis to tail");
    } else {
        tracing::error!(
            entries_checked = chain.entries_checked,
            first_invalid_entry = ?chain.first_invalid_entry,
            expected_hash = ?chain.expected_hash,
            actual_hash = ?chain.actual_hash,
            "Audit hash chain broken"
        );
        pool.close().await;
        return Err(anyhow::anyhow!("Audit hash chain verification failed"));
    }

    let policy = &config.policy;
    tracing::info!(
        normal = %policy.fee_schedule.normal,
        high = %policy.fee_schedule.high,
        urgent = %policy.fee_schedule.urgent,
        commission_rate = %policy.commission_rate,
        duplicate_prefix = policy.duplicate_guard.prefix_chars,
        default_max_revisions = policy.default_max_revisions,
        "Active market policy"
    );

    pool.close().await;
    tracing::info!("Database connections closed. Goodbye!");

    Ok(())
}
