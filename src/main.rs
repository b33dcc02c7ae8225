use referral_ledger::{
    config::{database, settings},
    core::{level, user},
    errors::Result,
    scheduler,
};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    // 1. Initialize tracing (as early as possible)
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // 2. Load .env file, non-fatal: env vars can be set externally
    dotenvy::dotenv().ok();

    // 3. Load the application configuration
    let app_config = settings::load_default_config()
        .inspect_err(|e| error!("Failed to load configuration: {}", e))?;
    info!("Loaded configuration with {} levels", app_config.levels.len());

    // 4. Connect and make sure the schema exists
    let db = database::create_connection()
        .await
        .inspect_err(|e| error!("Failed to connect to database: {}", e))?;
    database::create_tables(&db)
        .await
        .inspect(|_| info!("Database initialized successfully."))
        .inspect_err(|e| error!("Failed to initialize database: {}", e))?;

    // 5. Seed configured levels
    level::seed_levels(&db, &app_config.levels)
        .await
        .inspect_err(|e| error!("Failed to seed levels: {}", e))?;
    if let Some(bonus) = &app_config.signup_bonus {
        user::check_signup_bonus(&db, bonus)
            .await
            .inspect_err(|e| error!("Invalid signup bonus configuration: {}", e))?;
    }

    // 6. Run the accrual scheduler until Ctrl-C
    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for shutdown signal: {}", e);
            std::future::pending::<()>().await;
        }
    };
    scheduler::run_accrual_scheduler(&db, app_config.accrual, shutdown).await;

    Ok(())
}
