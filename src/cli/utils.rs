use serde_json::{json, Value};

use crate::cli::OutputFormat;
use crate::config::AppConfig;
use crate::state::AppState;

/// Output a success message in the appropriate format
pub fn output_success(output_format: &OutputFormat, message: &str, data: Option<Value>) -> anyhow::Result<()> {
    match output_format {
        OutputFormat::Json => {
            let mut response = json!({
                "success": true,
                "message": message
            });
            if let Some(data_value) = data {
                response["data"] = data_value;
            }
            println!("{}", serde_json::to_string_pretty(&response)?);
        }
        OutputFormat::Text => {
            println!("✓ {}", message);
            if let Some(Value::Object(map)) = data {
                for (key, value) in map {
                    println!("  {}: {}", key, value);
                }
            }
        }
    }
    Ok(())
}

/// Shared state for commands that talk to the database
pub fn build_state(config: &AppConfig) -> anyhow::Result<AppState> {
    AppState::from_config(config)
}
