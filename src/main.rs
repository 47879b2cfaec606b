use std::path::Path;

use clap::Parser;
use color_eyre::{Result, eyre::Context};
use strato::config::{GatewayConfigValidator, load_config};

#[derive(Parser, Debug)]
#[clap(author, version, about)]
struct Args {
    #[clap(subcommand)]
    command: Commands,
}

#[derive(Parser, Debug)]
enum Commands {
    /// Validate configuration file
    Validate {
        /// Configuration file to validate
        #[clap(short, long, default_value = "strato.toml")]
        config: String,
    },
    /// Initialize a new configuration file
    Init {
        /// Output path for the new config file
        #[clap(short, long, default_value = "strato.toml")]
        config: String,
    },
    /// Show the configured origins and route bindings
    Origins {
        /// Configuration file to read
        #[clap(short, long, default_value = "strato.toml")]
        config: String,
    },
}

fn main() -> Result<()> {
    color_eyre::install()?;

    match Args::parse().command {
        Commands::Validate { config } => validate_config_command(&config),
        Commands::Init { config } => init_config_command(&config),
        Commands::Origins { config } => origins_command(&config),
    }
}

/// Validate configuration file and exit
fn validate_config_command(config_path: &str) -> Result<()> {
    println!("Validating configuration file: {config_path}");

    if !Path::new(config_path).exists() {
        eprintln!("Error: configuration file '{config_path}' not found");
        std::process::exit(1);
    }

    let config = match load_config(config_path) {
        Ok(config) => {
            println!("Configuration parsing: OK");
            config
        }
        Err(e) => {
            eprintln!("Configuration parsing failed:");
            eprintln!("   {e}");
            std::process::exit(1);
        }
    };

    match GatewayConfigValidator::validate(&config) {
        Ok(()) => {
            println!("Configuration validation: OK");
            println!();
            println!("Summary:");
            println!("   Origins: {}", config.origins.len());
            println!("   Route bindings: {}", config.routes.len());
            println!("   Admission control: {}", config.admission.enabled);
            Ok(())
        }
        Err(e) => {
            eprintln!("Configuration validation failed:");
            eprintln!("{e}");
            println!();
            println!("Common fixes:");
            println!("   - Servers must be 'host:port' addresses");
            println!("   - Route prefixes must start with '/'");
            println!("   - Every route binding must reference a configured origin");
            println!("   - Durations use humantime units ('500ms', '2s', '1m')");
            std::process::exit(1);
        }
    }
}

/// Initialize a new configuration file
fn init_config_command(config_path: &str) -> Result<()> {
    let path = Path::new(config_path);
    if path.exists() {
        eprintln!("Error: configuration file '{config_path}' already exists");
        std::process::exit(1);
    }

    let default_config = r#"# Strato gateway configuration

# Origins: one logical backend service per route name
[origins.api]
servers = ["127.0.0.1:3000"]
strategy = "round_robin"
max_attempts = 3
attempt_timeout = "2s"

# Route bindings: longest matching prefix wins
[[routes]]
prefix = "/api"
origin = "api"

# Token-bucket admission control per client identity
[admission]
enabled = false
capacity = 100
refill_period = "100ms"

[logging]
level = "info"
json = true
"#;

    std::fs::write(path, default_config).context("Failed to write config file")?;
    println!("Created default configuration at: {config_path}");
    println!("   Run 'strato validate --config {config_path}' to check it");
    Ok(())
}

/// Print the resolved origin table for a configuration file
fn origins_command(config_path: &str) -> Result<()> {
    let config = load_config(config_path)?;
    let origins = config
        .build_origins()
        .map_err(|e| color_eyre::eyre::eyre!(e))?;

    println!("Origins:");
    for name in origins.route_names() {
        if let Some(origin) = origins.get(&name) {
            let servers = origin
                .servers()
                .iter()
                .map(|s| s.to_string())
                .collect::<Vec<_>>()
                .join(", ");
            println!(
                "   {name}: [{servers}] (max_attempts={}, attempt_timeout={:?})",
                origin.policy().max_attempts,
                origin.policy().attempt_timeout
            );
        }
    }

    println!("Route bindings:");
    for route in &config.routes {
        println!("   {} -> {}", route.prefix, route.origin);
    }
    Ok(())
}
