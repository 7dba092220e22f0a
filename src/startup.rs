use anyhow::{Context, Result};
use sqlx::PgPool;

use crate::config::Config;

pub struct ValidationReport {
    pub environment: bool,
    pub database: bool,
    pub migrations: bool,
    pub errors: Vec<String>,
}

impl ValidationReport {
    pub fn is_valid(&self) -> bool {
        self.environment && self.database && self.migrations
    }

    pub fn print(&self) {
        println!("\n=== Startup Validation Report ===");
        println!("Environment Variables: {}", status(self.environment));
        println!("Database Connectivity: {}", status(self.database));
        println!("Schema Migrations:     {}", status(self.migrations));

        if !self.errors.is_empty() {
            println!("\nErrors:");
            for error in &self.errors {
                println!("  ❌ {}", error);
            }
        }

        println!("\nOverall Status: {}", if self.is_valid() { "✅ PASS" } else { "❌ FAIL" });
        println!("=================================\n");
    }
}

fn status(ok: bool) -> &'static str {
    if ok {
        "✅ OK"
    } else {
        "❌ FAIL"
    }
}

pub async fn validate_environment(config: &Config, pool: &PgPool) -> ValidationReport {
    let mut report = ValidationReport {
        environment: true,
        database: true,
        migrations: true,
        errors: Vec::new(),
    };

    if let Err(e) = validate_env_vars(config) {
        report.environment = false;
        report.errors.push(format!("Environment: {:#}", e));
    }

    if let Err(e) = validate_database(pool).await {
        report.database = false;
        report.migrations = false;
        report.errors.push(format!("Database: {:#}", e));
    } else if let Err(e) = validate_schema(pool).await {
        report.migrations = false;
        report.errors.push(format!("Migrations: {:#}", e));
    }

    report
}

fn validate_env_vars(config: &Config) -> Result<()> {
    // Callbacks from the gateway must be able to reach the return URL.
    let public = url::Url::parse(&config.public_base_url).context("PUBLIC_BASE_URL is not a valid URL")?;
    if public.host_str().is_none() {
        anyhow::bail!("PUBLIC_BASE_URL has no host");
    }
    if config.gateway.commerce_code.trim().is_empty() {
        anyhow::bail!("GATEWAY_COMMERCE_CODE is empty");
    }
    if config.mail.is_none() {
        tracing::warn!("MAIL_API_URL not set; purchase confirmations will only be logged");
    }
    Ok(())
}

async fn validate_database(pool: &PgPool) -> Result<()> {
    sqlx::query("SELECT 1")
        .execute(pool)
        .await
        .context("Failed to connect to database")?;
    Ok(())
}

async fn validate_schema(pool: &PgPool) -> Result<()> {
    let applied: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM _sqlx_migrations WHERE success")
        .fetch_one(pool)
        .await
        .context("Failed to check migrations table")?;

    if applied == 0 {
        anyhow::bail!("No migrations applied");
    }

    Ok(())
}
