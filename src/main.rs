use clap::{Parser, Subcommand};
use gmail_relay::config::{Config, RelayConfig};
use gmail_relay::logging::{setup_logging, setup_stderr_logging};
use gmail_relay::{auth, server, GmailAuthenticator, WireFormat};
use log::{debug, error, info, LevelFilter};
use std::net::SocketAddr;
use std::sync::Arc;

#[derive(Parser)]
#[clap(name = "Gmail Relay")]
#[clap(version = "0.1.0")]
#[clap(about = "Websocket relay between a browser chat, a query planner and Gmail", long_about = None)]
struct Cli {
    #[clap(subcommand)]
    command: Option<Commands>,

    /// Force use of stderr-only logging (no file logging)
    #[clap(long, short, action)]
    memory_only: bool,

    /// Local port for browser connections
    #[clap(long)]
    port: Option<u16>,

    /// Upstream planner websocket URL
    #[clap(long)]
    upstream: Option<String>,

    /// Speak bare text frames to the planner instead of tagged envelopes
    #[clap(long, action)]
    plain: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the relay (default if no command specified)
    #[clap(name = "serve")]
    Serve,

    /// Run the OAuth consent flow to get a refresh token
    #[clap(name = "auth")]
    Auth,

    /// Test the current credentials
    #[clap(name = "test")]
    Test,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let is_read_only = std::env::var("GMAIL_RELAY_READ_ONLY").is_ok() || cli.memory_only;

    match cli.command {
        Some(Commands::Auth) => {
            setup_stderr_logging(LevelFilter::Info);
            println!("Starting OAuth authentication flow...");
            let config = Config::client_from_env()?;
            match auth::run_oauth_flow(&config).await {
                Ok(refresh_token) => {
                    println!("\nAdd this line to your .env file:\n");
                    println!("GMAIL_REFRESH_TOKEN={}", refresh_token);
                }
                Err(e) => {
                    eprintln!("Authentication failed: {}", e);
                    std::process::exit(1);
                }
            }
            return Ok(());
        }
        Some(Commands::Test) => {
            setup_stderr_logging(LevelFilter::Info);
            println!("Testing Gmail credentials...");
            let config = Config::from_env()?;
            match auth::test_credentials(&config).await {
                Ok(result) => {
                    println!("{}\n", result);
                    println!("✅ Credentials are valid and working!");
                }
                Err(e) => {
                    eprintln!("❌ Credential test failed: {}", e);
                    eprintln!("\nRun 'cargo run -- auth' to refresh your credentials.");
                    std::process::exit(1);
                }
            }
            return Ok(());
        }
        Some(Commands::Serve) | None => {}
    }

    let log_file = if is_read_only {
        setup_stderr_logging(LevelFilter::Debug);
        info!("Using in-memory logging (stderr) in read-only environment");
        String::from("stderr-only (read-only environment)")
    } else {
        setup_logging(LevelFilter::Debug, None)?
    };

    info!("Gmail relay starting...");
    info!("Logs will be saved to {}", log_file);

    let gmail_config = Config::from_env()?;
    let mut relay_config = RelayConfig::from_env()?;
    if let Some(port) = cli.port {
        relay_config.browser_addr = SocketAddr::new(relay_config.browser_addr.ip(), port);
    }
    if let Some(upstream) = cli.upstream {
        relay_config.upstream_url = upstream;
    }
    if cli.plain {
        relay_config.wire_format = WireFormat::Plain;
    }

    debug!("Creating Gmail authenticator");
    let authenticator = Arc::new(GmailAuthenticator::new(&gmail_config));

    let result = server::serve(relay_config, authenticator).await;
    if let Err(ref e) = result {
        error!("Error running relay: {}", e);
    } else {
        info!("Relay stopped");
    }

    result.map_err(|e| e.into())
}
