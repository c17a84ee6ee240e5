use anyhow::Context;

use crate::cli::utils::{build_state, output_success};
use crate::cli::OutputFormat;
use crate::config;
use crate::database::DatabaseManager;

pub async fn handle(output_format: OutputFormat) -> anyhow::Result<()> {
    let state = build_state(config::config())?;
    DatabaseManager::migrate(&state.pool)
        .await
        .context("applying migrations")?;
    output_success(&output_format, "Migrations applied", None)
}
