use std::env;

use anyhow::{Context, Result};
use diesel::prelude::*;
use tracing_subscriber::EnvFilter;

use mesa_partes::{
    config::AppConfig,
    db::{self, PgPool},
    directory,
    models::DocumentFile,
    schema::document_files,
    state::storage_from_config,
    storage::BlobStore,
};

const USAGE: &str = "Usage: maintenance <seed-offices | verify-files>";

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    init_tracing();

    let mut args = env::args().skip(1);
    match args.next().as_deref() {
        Some("seed-offices") => seed_offices()?,
        Some("verify-files") => verify_files().await?,
        Some(cmd) => {
            eprintln!("Unknown command: {cmd}\n{USAGE}");
            std::process::exit(1);
        }
        None => {
            eprintln!("{USAGE}");
            std::process::exit(1);
        }
    }

    Ok(())
}

fn connect(config: &AppConfig) -> Result<PgPool> {
    tracing::info!(
        component = "maintenance",
        database_url = %config.redacted_database_url(),
        pool_size = config.database_max_pool_size,
        "loaded configuration"
    );
    let pool = db::init_pool_with_size(&config.database_url, config.database_max_pool_size)?;
    db::run_migrations(&pool)?;
    Ok(pool)
}

fn seed_offices() -> Result<()> {
    let config = AppConfig::from_env()?;
    let pool = connect(&config)?;
    let mut conn = pool.get().context("failed to get database connection")?;

    let inserted =
        directory::seed_standard_offices(&mut conn).context("failed to seed offices")?;
    if inserted == 0 {
        println!("Offices already present, nothing seeded.");
    } else {
        println!("Seeded {inserted} offices.");
    }
    Ok(())
}

async fn verify_files() -> Result<()> {
    let config = AppConfig::from_env()?;
    let pool = connect(&config)?;
    let blobs = BlobStore::new(storage_from_config(&config).await?);

    let files: Vec<DocumentFile> = {
        let mut conn = pool.get().context("failed to get database connection")?;
        document_files::table
            .order(document_files::created_at.asc())
            .load(&mut conn)
            .context("failed to load attachment records")?
    };

    println!("Checking {} attachments…", files.len());

    let mut missing = 0usize;
    let mut mismatched = 0usize;
    for file in &files {
        match blobs.exists(&file.path).await {
            Ok(true) => match blobs.size(&file.path).await {
                Ok(size) if size as i64 != file.size => {
                    mismatched += 1;
                    println!(
                        "size mismatch: file={} path={} recorded={} stored={size}",
                        file.id, file.path, file.size
                    );
                }
                Ok(_) => {}
                Err(err) => eprintln!("Failed to size {}: {err}", file.path),
            },
            Ok(false) => {
                missing += 1;
                println!(
                    "missing blob: document={} file={} path={}",
                    file.document_id, file.id, file.path
                );
            }
            Err(err) => {
                eprintln!("Failed to inspect {}: {err}", file.path);
            }
        }
    }

    if missing == 0 && mismatched == 0 {
        println!("All attachment blobs present.");
    } else {
        println!("{missing} attachment records reference missing blobs, {mismatched} differ in size.");
    }
    Ok(())
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .init();
}
