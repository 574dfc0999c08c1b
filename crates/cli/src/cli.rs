use std::path::PathBuf;

use crate::commands::{LicenseCommands, ModuleCommands};

#[derive(clap::Parser, Debug)]
#[clap(name = "campus", about = "Campus module licensing and enablement")]
pub struct Cli {
    /// Data directory for the module catalog and license cache
    #[clap(long, global = true)]
    pub data_dir: Option<PathBuf>,

    /// License authority endpoint
    #[clap(long, global = true)]
    pub authority: Option<url::Url>,

    #[clap(subcommand)]
    pub command: Commands,
}

#[derive(clap::Subcommand, Debug)]
pub enum Commands {
    /// Manage feature modules
    Module {
        #[clap(subcommand)]
        command: ModuleCommands,
    },
    /// Manage the product license
    License {
        #[clap(subcommand)]
        command: LicenseCommands,
    },
    /// Show catalog health and license summary
    Status,
}
