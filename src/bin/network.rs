use clap::Parser;
use prosograph::catalog::EntityType;
use prosograph::db::{migrate, Db};
use prosograph::entities::EntityStore;
use prosograph::{Config, EntityCatalog, NetworkBuilder, RelationRegistry, RelationStore};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use anyhow::{Context, Result};

#[derive(Parser, Debug)]
#[command(name = "network")]
#[command(about = "Export the entity network as JSON nodes with neighbor ids")]
struct Args {
    /// Entity types to include (comma separated); all types when omitted
    #[arg(short, long, value_delimiter = ',')]
    types: Vec<String>,

    /// Write to this file instead of stdout
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Pretty-print the JSON
    #[arg(short, long)]
    pretty: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let config = Config::load()?;

    env_logger::Builder::from_env(
        env_logger::Env::default()
            .filter_or("RUST_LOG", &config.service.log_level)
    ).init();

    let types = args
        .types
        .iter()
        .map(|t| t.trim().parse::<EntityType>())
        .collect::<prosograph::Result<Vec<_>>>()
        .context("Invalid --types value")?;

    let db = Db::new(config.db_path());
    let migrations_dir = Path::new("migrations");
    db.with_connection(|conn| migrate::run_migrations(conn, migrations_dir)).await?;

    let registry = Arc::new(RelationRegistry::sicprod()?);
    let entities = EntityStore::new(db.clone(), Arc::new(EntityCatalog::sicprod()));
    let relations = RelationStore::new(db, registry);
    relations
        .check_stored_kinds()
        .await
        .context("Stored relations do not match the relation registry")?;

    let nodes = NetworkBuilder::new(entities, relations).build(&types).await?;
    let json = if args.pretty {
        serde_json::to_string_pretty(&nodes)?
    } else {
        serde_json::to_string(&nodes)?
    };

    match &args.output {
        Some(path) => {
            std::fs::write(path, json)
                .with_context(|| format!("Failed to write {}", path.display()))?;
            log::info!("Wrote {} nodes to {}", nodes.len(), path.display());
        }
        None => {
            let mut stdout = std::io::stdout().lock();
            writeln!(stdout, "{}", json)?;
        }
    }

    Ok(())
}
