mod radio;
mod session;
mod store;
mod web;

use clap::{Parser, Subcommand};
use std::process::ExitCode;

use crate::radio::{SerialConnector, TraceClient};
use crate::web::Config;

#[derive(Parser)]
#[command(name = "signal-mapper")]
#[command(about = "Mesh radio signal mapping base station")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the base station web server
    Serve {
        #[arg(short, long, default_value = "config.yaml")]
        config: String,
    },
    /// Validate a configuration file
    CheckConfig {
        #[arg(short, long, default_value = "config.yaml")]
        config: String,
    },
    /// Run a single trace against a node and print the SNR readings
    Trace {
        #[arg(short, long, default_value = "config.yaml")]
        config: String,
        mesh_identity: String,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Serve { config } => serve(&config).await,
        Commands::CheckConfig { config } => check_config(&config),
        Commands::Trace {
            config,
            mesh_identity,
        } => trace(&config, &mesh_identity).await,
    }
}

fn load_config(path: &str) -> Option<Config> {
    match Config::from_file(path) {
        Ok(c) => Some(c),
        Err(e) => {
            eprintln!("Error loading config {}: {}", path, e);
            None
        }
    }
}

async fn serve(path: &str) -> ExitCode {
    let Some(config) = load_config(path) else {
        return ExitCode::FAILURE;
    };

    match web::run_server(config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log::error!("Server error: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn check_config(path: &str) -> ExitCode {
    let Some(config) = load_config(path) else {
        return ExitCode::FAILURE;
    };

    println!("Config is valid");
    println!("  bind: {}", config.web.bind);
    println!(
        "  radio: {} @ {} baud, trace timeout {}",
        config.radio.port,
        config.radio.baud_rate,
        humantime::format_duration(config.radio.trace_timeout)
    );
    println!("  store: {}", config.store.base_folder.display());
    ExitCode::SUCCESS
}

async fn trace(path: &str, identity: &str) -> ExitCode {
    let Some(config) = load_config(path) else {
        return ExitCode::FAILURE;
    };

    let connector = SerialConnector::new(config.radio.port.clone(), config.radio.baud_rate);
    let client = match TraceClient::open(&connector, config.radio.trace_timeout).await {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Failed to open radio {}: {}", config.radio.port, e);
            return ExitCode::FAILURE;
        }
    };

    match client.measure(identity).await {
        Ok(result) => {
            println!("SNR to target:   {:.2} dB", result.snr_to_target);
            println!("SNR from target: {:.2} dB", result.snr_from_target);
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("Trace failed: {}", e);
            ExitCode::FAILURE
        }
    }
}
