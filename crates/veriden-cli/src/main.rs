//! Veriden CLI - operator tooling for the plugin runtime

use anyhow::Context;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use veriden_core::config::Config;
use veriden_core::storage::{BackingStore, FileStore};
use veriden_plugins::PluginDescriptor;

#[derive(Parser)]
#[command(name = "veriden")]
#[command(author, version, about = "Verifiable plugin runtime tooling", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Output format (text or json)
    #[arg(long, global = true, default_value = "text")]
    format: OutputFormat,
}

#[derive(Clone, Copy, Default, PartialEq, clap::ValueEnum)]
enum OutputFormat {
    #[default]
    Text,
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Runtime configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },

    /// Validate a discovered plugin descriptor file (JSON)
    Descriptor {
        #[command(subcommand)]
        action: DescriptorAction,
    },

    /// Inspect cached license records
    License {
        #[command(subcommand)]
        action: LicenseAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Print the effective configuration
    Show,
}

#[derive(Subcommand)]
enum DescriptorAction {
    /// Validate a descriptor file; exits non-zero when invalid
    Validate {
        /// Path to a descriptor JSON file
        file: PathBuf,
    },
}

#[derive(Subcommand)]
enum LicenseAction {
    /// Print one plugin's cached license record
    Inspect {
        /// Path to a license cache document
        cache_file: PathBuf,
        /// Plugin id to look up
        plugin_id: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("veriden=info".parse()?),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Config { action } => match action {
            ConfigAction::Show => cmd_config_show(cli.format),
        },
        Commands::Descriptor { action } => match action {
            DescriptorAction::Validate { file } => cmd_descriptor_validate(&file, cli.format),
        },
        Commands::License { action } => match action {
            LicenseAction::Inspect {
                cache_file,
                plugin_id,
            } => cmd_license_inspect(&cache_file, &plugin_id, cli.format).await,
        },
    }
}

fn cmd_config_show(format: OutputFormat) -> anyhow::Result<()> {
    let config = Config::load()?;
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&config)?),
        OutputFormat::Text => println!("{}", toml::to_string_pretty(&config)?),
    }
    Ok(())
}

fn cmd_descriptor_validate(file: &PathBuf, format: OutputFormat) -> anyhow::Result<()> {
    let contents = std::fs::read_to_string(file)
        .with_context(|| format!("Failed to read descriptor file: {}", file.display()))?;
    let descriptor: PluginDescriptor = serde_json::from_str(&contents)
        .with_context(|| format!("Invalid descriptor JSON: {}", file.display()))?;

    let report = descriptor.validate();

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&report)?),
        OutputFormat::Text => {
            if report.is_valid {
                println!("Descriptor '{}' is valid", descriptor.name);
            } else {
                println!("Descriptor is invalid:");
                for error in &report.errors {
                    println!("  error: {error}");
                }
            }
            for warning in &report.warnings {
                println!("  warning: {warning}");
            }
        }
    }

    if !report.is_valid {
        std::process::exit(1);
    }
    Ok(())
}

async fn cmd_license_inspect(
    cache_file: &PathBuf,
    plugin_id: &str,
    format: OutputFormat,
) -> anyhow::Result<()> {
    let store = FileStore::new(cache_file);
    let raw = store
        .retrieve(&format!("license:{plugin_id}"))
        .await?
        .with_context(|| format!("No cached license for plugin '{plugin_id}'"))?;

    let record: veriden_plugins::license::LicenseRecord =
        serde_json::from_slice(&raw).context("Corrupt cached license record")?;

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&record)?),
        OutputFormat::Text => {
            println!("Plugin:       {}", record.plugin_id);
            println!("Credential:   {}", record.license_credential);
            println!("Transaction:  {}", record.payment_transaction);
            println!("Issued at:    {}", record.issued_at);
            match record.expires_at {
                Some(expires) => println!("Expires at:   {expires}"),
                None => println!("Expires at:   never"),
            }
            println!("Offline:      {}", record.cached_for_offline);
            println!("Usage count:  {}", record.usage_count);
        }
    }
    Ok(())
}
