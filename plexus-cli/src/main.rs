//! Plexus CLI

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use plexus_config::{load_config, Config};
use plexus_plugin_api::PluginDescriptor;
use plexus_plugin_runtime::{load_manifests, resolve_order, resolver::direct_dependents};
use serde::Serialize;
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "plexus")]
#[command(about = "Plexus plugin runtime tools", long_about = None)]
#[command(version)]
struct Cli {
    /// Log level (trace, debug, info, warn, error); overrides the config file
    #[arg(short, long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the activation order of a plugin set
    Resolve {
        /// Path to configuration file listing plugin manifests
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Additional plugin manifests
        manifests: Vec<PathBuf>,

        /// Emit JSON instead of text
        #[arg(long)]
        json: bool,
    },

    /// Validate a configuration file and the manifests it references
    Validate {
        /// Path to configuration file
        #[arg(short, long, default_value = "plexus.yaml")]
        config: PathBuf,
    },

    /// Show version information
    Version,
}

#[derive(Serialize)]
struct ResolvedPlugin<'a> {
    position: usize,
    id: &'a str,
    version: &'a str,
    dependencies: Vec<String>,
    dependents: Vec<String>,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Resolve {
            config,
            manifests,
            json,
        } => {
            let config = config.map(load_config).transpose()?.unwrap_or_default();
            init_tracing(cli.log_level.as_deref().unwrap_or(&config.logging.level))?;

            let descriptors = load_descriptors(&config, &manifests)?;
            warn_platform(&config, &descriptors);

            let order = resolve_order(&descriptors)?;
            let resolved: Vec<ResolvedPlugin<'_>> = order
                .iter()
                .enumerate()
                .filter_map(|(position, id)| {
                    let descriptor = descriptors.iter().find(|d| &d.id == id)?;
                    Some(ResolvedPlugin {
                        position: position + 1,
                        id: &descriptor.id,
                        version: &descriptor.version,
                        dependencies: descriptor
                            .dependencies
                            .iter()
                            .map(ToString::to_string)
                            .collect(),
                        dependents: direct_dependents(&descriptors, id),
                    })
                })
                .collect();

            if json {
                println!("{}", serde_json::to_string_pretty(&resolved)?);
            } else {
                for plugin in &resolved {
                    let deps = if plugin.dependencies.is_empty() {
                        String::new()
                    } else {
                        format!("  <- {}", plugin.dependencies.join(", "))
                    };
                    println!("{:>3}. {} {}{}", plugin.position, plugin.id, plugin.version, deps);
                }
            }
            Ok(())
        }

        Commands::Validate { config } => {
            tracing_subscriber::fmt().with_target(false).init();

            tracing::info!("Validating configuration: {}", config.display());

            let result = load_config(&config)
                .map_err(anyhow::Error::from)
                .and_then(|cfg| {
                    let descriptors = load_descriptors(&cfg, &[])?;
                    let order = resolve_order(&descriptors)?;
                    Ok((cfg, order))
                });

            match result {
                Ok((cfg, order)) => {
                    tracing::info!("✓ Configuration is valid");
                    tracing::info!("  Platform: {}", cfg.runtime.platform_version);
                    tracing::info!("  Hook timeout: {:?}", cfg.runtime.hook_timeout);
                    tracing::info!("  Stop policy: {:?}", cfg.runtime.stop_policy);
                    tracing::info!("  Plugins: {}", order.len());
                    Ok(())
                }
                Err(e) => {
                    tracing::error!("✗ Configuration validation failed: {:#}", e);
                    std::process::exit(1);
                }
            }
        }

        Commands::Version => {
            println!("Plexus");
            println!("Version: {}", env!("CARGO_PKG_VERSION"));
            println!("Rust version: {}", env!("CARGO_PKG_RUST_VERSION"));
            Ok(())
        }
    }
}

fn load_descriptors(config: &Config, extra: &[PathBuf]) -> Result<Vec<PluginDescriptor>> {
    let paths = config.plugins.iter().chain(extra.iter());
    let descriptors = load_manifests(paths).context("Failed to load plugin manifests")?;
    tracing::debug!(count = descriptors.len(), "Manifests loaded");
    Ok(descriptors)
}

fn warn_platform(config: &Config, descriptors: &[PluginDescriptor]) {
    let platform = &config.runtime.platform_version;
    for descriptor in descriptors {
        if !descriptor.supports_platform(platform) {
            tracing::warn!(
                plugin = %descriptor.id,
                platform = %platform,
                "Plugin does not support this platform version"
            );
        }
    }
}

fn init_tracing(level: &str) -> Result<()> {
    let filter = match level.to_lowercase().as_str() {
        "trace" => tracing::Level::TRACE,
        "debug" => tracing::Level::DEBUG,
        "info" => tracing::Level::INFO,
        "warn" => tracing::Level::WARN,
        "error" => tracing::Level::ERROR,
        _ => tracing::Level::INFO,
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_level(true)
                .with_writer(std::io::stderr),
        )
        .with(tracing_subscriber::EnvFilter::from_default_env().add_directive(filter.into()))
        .init();

    Ok(())
}
