use crate::postgres::PostgresConfig;
use anyhow::{bail, Context, Result};
use tokio::process::Command;
use tracing::{debug, info};

/// Applies the schema by shelling out to the goose binary.
pub struct MigrationRunner {
    goose_binary_path: String,
    migrations_dir: String,
    dsn: String,
}

impl MigrationRunner {
    pub fn new(goose_binary_path: String, migrations_dir: String, dsn: String) -> Self {
        Self {
            goose_binary_path,
            migrations_dir,
            dsn,
        }
    }

    pub fn from_config(config: &PostgresConfig) -> Self {
        Self::new(
            config.goose_binary_path.clone(),
            config.migrations_dir.clone(),
            config.dsn(),
        )
    }

    /// Runs `goose -dir {migrations_dir} postgres {dsn} up`
    pub async fn run_migrations(&self) -> Result<()> {
        debug!(migrations_dir = %self.migrations_dir, "running postgres migrations");

        let output = Command::new(&self.goose_binary_path)
            .args(self.goose_args("up"))
            .output()
            .await
            .with_context(|| format!("Failed to spawn goose at {}", self.goose_binary_path))?;

        if !output.status.success() {
            bail!(
                "Migration failed.\nstdout: {}\nstderr: {}",
                String::from_utf8_lossy(&output.stdout),
                String::from_utf8_lossy(&output.stderr)
            );
        }

        info!("postgres migrations applied");
        debug!("{}", String::from_utf8_lossy(&output.stdout));
        Ok(())
    }

    fn goose_args<'a>(&'a self, command: &'a str) -> [&'a str; 5] {
        [
            "-dir",
            self.migrations_dir.as_str(),
            "postgres",
            self.dsn.as_str(),
            command,
        ]
    }
}
