// src/main.rs
mod app;
mod cert;
mod cluster;
mod config;
mod error;
mod kubeconfig;
mod rbac;
mod types;
mod utils;

use clap::{Parser, Subcommand};
use std::io;
use tracing::error;

use config::DEFAULT_CONFIG_FILE;
use error::ProvisioningError;
use utils::logging::{self, DEFAULT_LOG_FILE};

/// Provision cluster access for a developer identity: a signed client
/// certificate, kubeconfig files and a namespaced role.
#[derive(Parser, Debug)]
#[command(name = "k8s-access-provisioner", version, about, long_about = None)]
pub struct Args {
    #[arg(short, long, default_value = DEFAULT_CONFIG_FILE, global = true)]
    pub config: String,
    #[arg(short, long, global = true)]
    pub debug: bool,
    #[arg(long, default_value = DEFAULT_LOG_FILE, global = true)]
    pub log_file: String,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Issue the developer certificate, write kubeconfigs and bind the role (default)
    Provision,

    /// Write a default configuration file
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },

    /// Print the admin kubeconfig without contacting the cluster
    RenderAdmin,
}

async fn dispatch(args: &Args) -> Result<(), ProvisioningError> {
    match args.command.as_ref().unwrap_or(&Command::Provision) {
        Command::Provision => {
            let summary = app::provision(&args.config).await?;
            let json = serde_json::to_string_pretty(&summary)
                .map_err(|e| ProvisioningError::Serialization(e.to_string()))?;
            println!("{}", json);
        }
        Command::Init { force } => {
            app::init(&args.config, *force)?;
            println!("Wrote {}", args.config);
        }
        Command::RenderAdmin => {
            print!("{}", app::render_admin(&args.config)?);
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> io::Result<()> {
    let args = Args::parse();
    logging::init(&args.log_file, args.debug)?;

    if let Err(e) = dispatch(&args).await {
        error!(error = %e, "provisioning failed");
        return Err(e.into());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Args::command().debug_assert();
    }

    #[test]
    fn provision_is_the_default_command() {
        let args = Args::parse_from(["k8s-access-provisioner"]);
        assert!(args.command.is_none());
        assert_eq!(args.config, DEFAULT_CONFIG_FILE);
        assert_eq!(args.log_file, DEFAULT_LOG_FILE);
    }

    #[test]
    fn parses_init_with_force() {
        let args = Args::parse_from(["k8s-access-provisioner", "--config", "x.json", "init", "--force"]);
        assert_eq!(args.config, "x.json");
        assert!(matches!(args.command, Some(Command::Init { force: true })));
    }
}
