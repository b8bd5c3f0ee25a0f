use std::path::Path;

use bearsync_core::config::{default_config_path, ClientConfig};
use serde::Serialize;

use crate::cli::ConfigCommands;
use crate::error::CliError;

#[derive(Debug, Serialize)]
pub struct ConfigReport<'a> {
    pub config_file: String,
    pub database_url: String,
    pub resolved_cache_path: String,
    pub resolved_credentials_path: String,
    #[serde(flatten)]
    pub settings: &'a ClientConfig,
}

pub fn build_config_report<'a>(
    config: &'a ClientConfig,
    config_path: Option<&Path>,
) -> Result<ConfigReport<'a>, CliError> {
    let config_file = match config_path {
        Some(path) => path.to_path_buf(),
        None => default_config_path()?,
    };
    Ok(ConfigReport {
        config_file: config_file.display().to_string(),
        database_url: config.database_url()?,
        resolved_cache_path: config.resolve_cache_path()?.display().to_string(),
        resolved_credentials_path: config.resolve_credentials_path()?.display().to_string(),
        settings: config,
    })
}

pub fn run_config(
    command: ConfigCommands,
    config: &ClientConfig,
    config_path: Option<&Path>,
) -> Result<(), CliError> {
    match command {
        ConfigCommands::Show { json } => {
            let report = build_config_report(config, config_path)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                println!("config file:  {}", report.config_file);
                println!("database:     {}", report.database_url);
                println!("zone:         {}", config.zone_name);
                println!("record type:  {}", config.record_type);
                println!("device id:    {}", config.device_id);
                println!("page size:    {}", config.page_size);
                println!("cache:        {}", report.resolved_cache_path);
                println!("credentials:  {}", report.resolved_credentials_path);
            }
            Ok(())
        }
    }
}
