use clap::Parser;
use log::info;
use peer_relay_proxy::{config::Config, logging, ForwardProxy};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use tokio::signal;

#[derive(Parser)]
#[clap(
    version = "0.1.0",
    about = "Forward HTTP/HTTPS proxy that pairs each client with its origin and relays bytes"
)]
struct Args {
    #[clap(short, long, value_name = "ADDR", help = "Listen address (e.g., 0.0.0.0:8080)")]
    listen: Option<String>,

    #[clap(short, long, value_name = "PORT", help = "Listen port on 0.0.0.0 (ignored when --listen is set)")]
    port: Option<u16>,

    #[clap(short, long, value_name = "FILE", help = "Configuration file path")]
    config: Option<String>,

    #[clap(long, value_name = "FILE", help = "Append every relayed message to this file")]
    audit_log: Option<PathBuf>,

    #[clap(long, value_name = "SECONDS", help = "Outbound connect timeout in seconds")]
    connect_timeout: Option<u64>,

    #[clap(long, value_name = "LEVEL", help = "Log level: trace, debug, info, warn, error")]
    log_level: Option<String>,

    #[clap(long, value_name = "FORMAT", help = "Log format: text or json")]
    log_format: Option<String>,

    #[clap(long, value_name = "FILE", help = "Generate a sample configuration file")]
    generate_config: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    if let Some(config_file) = &args.generate_config {
        Config::default().to_file(config_file)?;
        println!("Sample configuration file generated: {}", config_file);
        return Ok(());
    }

    let config = load_config(&args)?;
    logging::init(&config.logging)?;

    let proxy = ForwardProxy::from_config(config)?;
    info!("Starting forward proxy...");

    let server_handle = tokio::spawn(async move { proxy.run().await });

    tokio::select! {
        _ = signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down");
        }
        result = server_handle => {
            match result {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    eprintln!("Server error: {}", e);
                    return Err(e.into());
                }
                Err(e) => {
                    eprintln!("Server task error: {}", e);
                    return Err(e.into());
                }
            }
        }
    }

    info!("Proxy server stopped");
    Ok(())
}

fn load_config(args: &Args) -> Result<Config, Box<dyn std::error::Error>> {
    let mut config = match &args.config {
        Some(config_file) => {
            if !Path::new(config_file).exists() {
                return Err(format!("Configuration file not found: {}", config_file).into());
            }
            Config::from_file(config_file)?
        }
        None => Config::default(),
    };

    if let Some(listen) = &args.listen {
        config.listen_addr = listen.parse::<SocketAddr>()?;
    } else if let Some(port) = args.port {
        config.listen_addr = SocketAddr::from(([0, 0, 0, 0], port));
    }
    if let Some(path) = &args.audit_log {
        config.audit_log = Some(path.clone());
    }
    if let Some(secs) = args.connect_timeout {
        config.connect_timeout_secs = Some(secs);
    }
    if let Some(level) = &args.log_level {
        config.logging.level = logging::parse_log_level(level)?;
    }
    if let Some(format) = &args.log_format {
        config.logging.format = logging::parse_log_format(format)?;
    }

    config.validate()?;
    Ok(config)
}
