use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};

use flowprov::{Config, DeployRequest, DeployerBuilder};

/// Flowprov - credential provisioning and deploys for workflow templates
#[derive(Parser)]
#[command(name = "flowprov")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Path to the TOML config file
    #[arg(long, global = true, env = "FLOWPROV_CONFIG", default_value = "flowprov.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the credential form a template needs, as JSON
    Form {
        /// Template id in the template store
        #[arg(long)]
        template: String,
    },

    /// Provision credentials and deploy a template for a user
    Deploy {
        /// Template id in the template store
        #[arg(long)]
        template: String,

        /// User the workflow and its credentials belong to
        #[arg(long)]
        user: String,

        /// Field value as `<slot>.<field>=<value>`, e.g. `mail-inbound.port=993`
        #[arg(long = "value", value_parser = parse_value)]
        values: Vec<(String, String)>,
    },
}

fn parse_value(s: &str) -> std::result::Result<(String, String), String> {
    match s.split_once('=') {
        Some((key, value)) if !key.trim().is_empty() => Ok((key.trim().to_string(), value.to_string())),
        _ => Err(format!("expected <slot>.<field>=<value>, got '{}'", s)),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = Config::create(&cli.config).with_context(|| format!("loading {}", cli.config.display()))?;
    let deployer = DeployerBuilder::new(config).build().context("building deployer")?;

    match cli.command {
        Commands::Form {
            template,
        } => {
            let form = deployer.form(&template).await.with_context(|| format!("building form for '{}'", template))?;
            println!("{}", serde_json::to_string_pretty(&form)?);
        }
        Commands::Deploy {
            template,
            user,
            values,
        } => {
            let request = values.into_iter().fold(DeployRequest::new(&template, &user), |request, (key, value)| request.with(&key, value));
            let response = deployer.deploy(&request).await;
            println!("{}", serde_json::to_string_pretty(&response)?);
            eprintln!("{}", response.result.user_message());
            if response.result.is_failed() {
                bail!("deploy of '{}' for '{}' failed", template, user);
            }
        }
    }

    Ok(())
}
