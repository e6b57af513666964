//! Resets the flag tables and loads the demo flag set.
//!
//! Usage:
//!   cargo run --bin seed-flags
//!   # against another database:
//!   DATABASE_URL=postgres://... cargo run --bin seed-flags

use chrono::Utc;
use envconfig::Envconfig;

use flag_janitor::config::Config;
use flag_janitor::database::{get_pool, run_migrations};
use flag_janitor::flags::pg_store::PgFlagStore;
use flag_janitor::seed::reseed;

async fn run(config: &Config) -> anyhow::Result<usize> {
    let pool = get_pool(&config.database_url, 1).await?;
    if *config.run_migrations {
        run_migrations(&pool).await?;
    }

    let store = PgFlagStore::from_pool(pool);
    let created = reseed(&store, Utc::now()).await?;
    Ok(created.len())
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    println!("🌱 Seeding database...");

    let config = Config::init_from_env().expect("Invalid configuration:");
    match run(&config).await {
        Ok(count) => {
            println!("✅ Created {} flags", count);
            println!("💡 A scan with the default threshold should expire 3 of them");
        }
        Err(e) => {
            eprintln!("❌ Seed failed: {}", e);
            std::process::exit(1);
        }
    }
}
