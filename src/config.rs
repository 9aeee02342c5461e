use std::env;
use std::fs;

use serde_json::{Map, Value};

use crate::dispatcher::ResponseContext;

/// Configuration for checking one captured response against a test plan.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub scenario_file: String,
    pub response_file: Option<String>,
    pub metadata_file: Option<String>,
    pub request_name: Option<String>,
    pub status_code: Option<u16>,
    pub user_name: String,
    pub log_format: LogFormat,
}

/// Output format of the log subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Text,
    Json,
}

impl Config {
    /// Loads configuration from environment variables.
    pub fn from_env() -> Result<Self, Box<dyn std::error::Error + Send + Sync>> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Loads configuration through a variable lookup; `from_env` uses the process environment.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, Box<dyn std::error::Error + Send + Sync>>
    where
        F: Fn(&str) -> Option<String>,
    {
        let scenario_file = lookup("SCENARIO_FILE")
            .filter(|s| !s.trim().is_empty())
            .ok_or("SCENARIO_FILE environment variable must be set")?;

        let status_code = match lookup("STATUS_CODE") {
            Some(s) => Some(
                s.trim()
                    .parse::<u16>()
                    .map_err(|e| format!("Invalid STATUS_CODE '{}': {}", s, e))?,
            ),
            None => None,
        };

        let log_format = match lookup("LOG_FORMAT")
            .unwrap_or_else(|| "text".to_string())
            .to_lowercase()
            .as_str()
        {
            "json" => LogFormat::Json,
            "text" => LogFormat::Text,
            other => return Err(format!("Invalid LOG_FORMAT '{}': use text or json", other).into()),
        };

        Ok(Config {
            scenario_file,
            response_file: lookup("RESPONSE_FILE"),
            metadata_file: lookup("METADATA_FILE"),
            request_name: lookup("REQUEST_NAME"),
            status_code,
            user_name: lookup("USER_NAME").unwrap_or_else(|| "user-1".to_string()),
            log_format,
        })
    }

    /// Read the captured payload and metadata files.
    pub fn load_response(&self) -> Result<ResponseContext, Box<dyn std::error::Error + Send + Sync>> {
        let payload = match &self.response_file {
            Some(path) => Some(
                fs::read_to_string(path)
                    .map_err(|e| format!("Failed to read RESPONSE_FILE '{}': {}", path, e))?,
            ),
            None => None,
        };

        let metadata = match &self.metadata_file {
            Some(path) => {
                let content = fs::read_to_string(path)
                    .map_err(|e| format!("Failed to read METADATA_FILE '{}': {}", path, e))?;
                match serde_json::from_str::<Value>(&content)? {
                    Value::Object(map) => Some(map),
                    _ => return Err(format!("METADATA_FILE '{}' must contain a JSON object", path).into()),
                }
            }
            None => None::<Map<String, Value>>,
        };

        Ok(ResponseContext::new(metadata, payload))
    }

    /// Prints a summary of the configuration.
    pub fn print_summary(&self) {
        println!("Scenario file:  {}", self.scenario_file);
        println!(
            "Response file:  {}",
            self.response_file.as_deref().unwrap_or("<none>")
        );
        println!(
            "Metadata file:  {}",
            self.metadata_file.as_deref().unwrap_or("<none>")
        );
        println!(
            "Request:        {}",
            self.request_name.as_deref().unwrap_or("<first>")
        );
        if let Some(status) = self.status_code {
            println!("Status code:    {}", status);
        }
        println!();
    }
}
