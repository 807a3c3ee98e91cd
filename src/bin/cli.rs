use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use chrono::Utc;
use clap::{Parser, Subcommand};
use dotenvy::dotenv;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Row, SqlitePool};
use std::str::FromStr;

use admin_api::app::route_table;
use admin_api::authz::{roles, GrantLevel};
use admin_api::resources::default_registry;
use admin_api::utils::{format_timestamp, hash_password, SystemClock};

#[derive(Parser, Debug)]
#[command(author, version, about = "admin-api maintenance tool", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Apply pending migrations
    MigrateRun,
    /// Show migration status against the current database
    MigrateStatus,
    /// Roll back the last applied migration
    MigrateRollback,
    /// Create a login; `--super-admin` attaches the bypass role
    CreateUser {
        #[arg(long)]
        name: String,
        #[arg(long)]
        email: String,
        #[arg(long)]
        password: String,
        #[arg(long)]
        super_admin: bool,
    },
    /// Give a user a direct grant, e.g. `grant ada@example.com credit VIEW`
    Grant {
        email: String,
        grant_key: String,
        level: GrantLevel,
    },
    /// Print every dispatched route with its required grant
    Routes,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // CWD may differ inside containers; fall back to the crate-local `.env`.
    if dotenv().is_err() {
        let crate_env = Path::new(env!("CARGO_MANIFEST_DIR")).join(".env");
        let _ = dotenvy::from_path(crate_env);
    }

    let cli = Cli::parse();

    match cli.command {
        Commands::MigrateRun => {
            let pool = get_pool().await?;
            get_migrator().await?.run(&pool).await?;
            println!("Migrations applied");
        }
        Commands::MigrateStatus => {
            let pool = get_pool().await?;
            let migrator = get_migrator().await?;
            print_status(&pool, &migrator).await?;
        }
        Commands::MigrateRollback => {
            let pool = get_pool().await?;
            let applied = applied_versions(&pool).await?;
            let Some(&latest) = applied.iter().max() else {
                println!("Nothing to roll back");
                return Ok(());
            };
            // undo() reverts every version above the target
            let target = applied.iter().copied().filter(|version| *version < latest).max().unwrap_or(0);
            get_migrator()
                .await?
                .undo(&pool, target)
                .await
                .with_context(|| format!("failed to roll back migration {latest}"))?;
            println!("Rolled back migration {latest}");
        }
        Commands::CreateUser {
            name,
            email,
            password,
            super_admin,
        } => {
            let pool = get_pool().await?;
            let id = create_user(&pool, &name, &email, &password, super_admin).await?;
            println!("Created user {id} <{email}>{}", if super_admin { " (super_admin)" } else { "" });
        }
        Commands::Grant { email, grant_key, level } => {
            let pool = get_pool().await?;
            grant(&pool, &email, &grant_key, level).await?;
            println!("Granted {grant_key}:{level} to {email}");
        }
        Commands::Routes => {
            let registry = default_registry(Arc::new(SystemClock))?;
            for binding in route_table(&registry) {
                println!("{binding}");
            }
        }
    }

    Ok(())
}

async fn get_pool() -> anyhow::Result<SqlitePool> {
    let database_url = std::env::var("DATABASE_URL").context("DATABASE_URL not set")?;
    let options = SqliteConnectOptions::from_str(&database_url)
        .context("invalid DATABASE_URL")?
        .create_if_missing(true);

    SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(options)
        .await
        .context("failed to connect to database")
}

async fn create_user(pool: &SqlitePool, name: &str, email: &str, password: &str, super_admin: bool) -> anyhow::Result<i64> {
    let password_hash = hash_password(password)?;
    let now = format_timestamp(Utc::now());

    let mut tx = pool.begin().await?;
    let id = sqlx::query(
        "INSERT INTO users (name, email, password_hash, created_at, updated_at) VALUES (?, ?, ?, ?, ?)",
    )
    .bind(name)
    .bind(email)
    .bind(&password_hash)
    .bind(&now)
    .bind(&now)
    .execute(&mut *tx)
    .await
    .with_context(|| format!("failed to create user {email}"))?
    .last_insert_rowid();

    if super_admin {
        sqlx::query("INSERT INTO user_roles (user_id, role_id) SELECT ?, id FROM roles WHERE name = ?")
            .bind(id)
            .bind(roles::SUPER_ADMIN)
            .execute(&mut *tx)
            .await?;
    }

    tx.commit().await?;
    Ok(id)
}

async fn grant(pool: &SqlitePool, email: &str, grant_key: &str, level: GrantLevel) -> anyhow::Result<()> {
    let user_id: i64 = sqlx::query_scalar("SELECT id FROM users WHERE email = ? AND deleted_at IS NULL")
        .bind(email)
        .fetch_optional(pool)
        .await?
        .with_context(|| format!("no user with email {email}"))?;

    sqlx::query("INSERT OR IGNORE INTO user_grants (user_id, grant_key, level) VALUES (?, ?, ?)")
        .bind(user_id)
        .bind(grant_key)
        .bind(level.as_str())
        .execute(pool)
        .await?;

    Ok(())
}

async fn applied_versions(pool: &SqlitePool) -> anyhow::Result<HashSet<i64>> {
    // Without the bookkeeping table nothing has been applied yet
    let tracked = sqlx::query("SELECT name FROM sqlite_master WHERE type='table' AND name='_sqlx_migrations'")
        .fetch_optional(pool)
        .await?;
    if tracked.is_none() {
        return Ok(HashSet::new());
    }
    let rows = sqlx::query("SELECT version FROM _sqlx_migrations WHERE success = 1")
        .fetch_all(pool)
        .await?;
    Ok(rows.iter().filter_map(|row| row.try_get::<i64, _>("version").ok()).collect())
}

async fn print_status(pool: &SqlitePool, migrator: &sqlx::migrate::Migrator) -> anyhow::Result<()> {
    let applied_versions = applied_versions(pool).await?;

    println!("{:<8} {:<20} Name", "Status", "Version");
    for migration in migrator.iter() {
        let status = if applied_versions.contains(&migration.version) { "applied" } else { "pending" };
        let desc = migration.description.trim();
        let name = if desc.is_empty() { "unknown" } else { desc };
        println!("{:<8} {:<20} {}", status, migration.version, name);
    }

    Ok(())
}

async fn get_migrator() -> anyhow::Result<sqlx::migrate::Migrator> {
    // ./migrations when run from the repo root, else the crate-local folder
    let local = Path::new("./migrations");
    let migrator_path = if local.exists() {
        local.to_path_buf()
    } else {
        Path::new(env!("CARGO_MANIFEST_DIR")).join("migrations")
    };

    let display = migrator_path.display().to_string();
    sqlx::migrate::Migrator::new(migrator_path)
        .await
        .with_context(|| format!("failed to load migrations from {display}"))
}
