use bearsync_core::auth::{CredentialSource, Credentials, EnvCredentialSource};
use bearsync_core::config::ClientConfig;

use crate::cli::AuthCommands;
use crate::commands::common::credential_store;
use crate::error::CliError;

pub fn run_auth(command: AuthCommands, config: &ClientConfig) -> Result<(), CliError> {
    let store = credential_store(config)?;
    match command {
        AuthCommands::Set {
            web_auth_token,
            api_token,
        } => {
            store.save(&Credentials::new(web_auth_token.trim(), api_token.trim()))?;
            println!("Saved credentials to {}", store.path().display());
            Ok(())
        }
        AuthCommands::Status => {
            if EnvCredentialSource::from_env().acquire_credential()?.is_some() {
                println!("Using credentials from BEARSYNC_WEB_AUTH_TOKEN and BEARSYNC_API_TOKEN");
            } else if store.acquire_credential()?.is_some() {
                println!("Using credentials from {}", store.path().display());
            } else {
                println!("Not signed in.");
            }
            Ok(())
        }
        AuthCommands::Logout => {
            if store.clear()? {
                println!("Removed {}", store.path().display());
            } else {
                println!("No stored credentials at {}", store.path().display());
            }
            Ok(())
        }
    }
}
