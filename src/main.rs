use prosograph::api::{self, AppState};
use prosograph::db::{migrate, Db};
use prosograph::{Config, RelationRegistry, RelationStore};
use std::path::Path;
use std::sync::Arc;
use anyhow::{Context, Result};

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::load()?;

    // RUST_LOG wins over the configured level
    env_logger::Builder::from_env(
        env_logger::Env::default()
            .filter_or("RUST_LOG", &config.service.log_level)
    ).init();

    let args: Vec<String> = std::env::args().collect();
    let command = args.get(1).map(|s| s.as_str()).unwrap_or("verify");

    match command {
        "serve" => run_http_server(config).await?,
        "verify" => run_schema_verification(config).await?,
        other => anyhow::bail!("Unknown command '{}'. Use 'serve' or 'verify'.", other),
    }

    Ok(())
}

/// Open the database and bring its schema up to date.
async fn open_database(config: &Config) -> Result<Db> {
    let db = Db::new(config.db_path());

    let migrations_dir = Path::new("migrations");
    db.with_connection(|conn| migrate::run_migrations(conn, migrations_dir))
        .await
        .context("Failed to apply migrations")?;

    log::info!("Database initialized at {}", config.db_path().display());
    Ok(db)
}

/// Serve the HTTP API
async fn run_http_server(config: Config) -> Result<()> {
    log::info!("Starting prosograph v{}", env!("CARGO_PKG_VERSION"));

    let db = open_database(&config).await?;
    let state = AppState::from_config(db, &config)?;

    // Relations of unknown kinds are a data-model mismatch; refuse to start
    let relation_kinds = state
        .relations()
        .check_stored_kinds()
        .await
        .context("Stored relations do not match the relation registry")?;
    log::info!("{} stored relation kinds are registered", relation_kinds);

    api::serve(state, &config).await?;
    Ok(())
}

/// Run database schema verification
async fn run_schema_verification(config: Config) -> Result<()> {
    log::info!("Verifying prosograph v{}", env!("CARGO_PKG_VERSION"));

    let db = open_database(&config).await?;

    let (applied, entities, relations) = db
        .with_connection(|conn| {
            migrate::verify_schema(conn)?;
            let applied = migrate::get_applied_migrations(conn)?;
            let entities: i64 = conn.query_row("SELECT COUNT(*) FROM entities", [], |row| row.get(0))?;
            let relations: i64 = conn.query_row("SELECT COUNT(*) FROM relations", [], |row| row.get(0))?;
            Ok((applied, entities, relations))
        })
        .await?;
    log::info!("✓ {} migrations applied", applied.len());
    log::info!("✓ {} entities, {} relations", entities, relations);

    let registry = Arc::new(RelationRegistry::sicprod()?);
    log::info!("✓ {} relation kinds registered", registry.len());

    let kinds = RelationStore::new(db, registry)
        .check_stored_kinds()
        .await
        .context("Stored relations do not match the relation registry")?;
    log::info!("✓ all {} stored relation kinds are registered", kinds);

    log::info!("✓ Database schema verification complete");
    Ok(())
}
