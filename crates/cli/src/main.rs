mod cli;
mod commands;

use clap::Parser;

use campus_modules::{init_default, JsonCatalogStore, LicenseAuthority};

use crate::cli::Commands;
use crate::commands::{handle_license_command, handle_module_command, handle_status};

#[cfg(feature = "http")]
const DEFAULT_AUTHORITY_URL: &str = "https://license.campus.example/api/v1/validate";

#[tokio::main]
async fn main() -> eyre::Result<()> {
    let cli = cli::Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let data_dir = match cli.data_dir.clone() {
        Some(dir) => dir,
        None => JsonCatalogStore::default_data_dir()?,
    };

    let authority = build_authority(&cli)?;
    let mut manager = init_default(data_dir, authority).await?;

    match cli.command {
        Commands::Module { command } => {
            handle_module_command(command, &mut manager).await?;
        }
        Commands::License { command } => {
            handle_license_command(command, &mut manager).await?;
        }
        Commands::Status => {
            handle_status(&mut manager).await?;
        }
    }

    Ok(())
}

#[cfg(feature = "http")]
fn build_authority(cli: &cli::Cli) -> eyre::Result<Box<dyn LicenseAuthority>> {
    let endpoint = match cli.authority.clone() {
        Some(url) => url,
        None => url::Url::parse(DEFAULT_AUTHORITY_URL)?,
    };
    tracing::debug!("Using license authority at {}", endpoint);
    Ok(Box::new(campus_modules::HttpLicenseAuthority::new(endpoint)))
}

#[cfg(not(feature = "http"))]
fn build_authority(cli: &cli::Cli) -> eyre::Result<Box<dyn LicenseAuthority>> {
    if cli.authority.is_some() {
        tracing::warn!("--authority ignored: built without the 'http' feature");
    }
    Ok(Box::new(campus_modules::StaticAuthority::new()))
}
