use clap::Parser;
use log::info;
use server::network::Server;
use shared::{CPU_PERIOD_MS, CPU_REACTION_DELAY_MS};
use std::time::Duration;

/// Main-method of the application.
/// Parses command-line arguments, binds the server, and runs it until
/// interrupted.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    // Command line arguments
    #[derive(Parser, Debug)]
    #[clap(author, version, about)]
    struct Args {
        /// Server IP address to bind to
        #[clap(short = 'H', long, default_value = "0.0.0.0")]
        host: String,
        /// Server port to listen on
        #[clap(short, long, default_value = "3000", env = "PORT")]
        port: u16,
        /// Maximum concurrent connections; joiners beyond the two role
        /// holders spectate
        #[clap(short, long, default_value = "8")]
        max_sessions: usize,
    }

    let args = Args::parse();
    let address = format!("{}:{}", args.host, args.port);

    let server = Server::bind(
        &address,
        args.max_sessions,
        Duration::from_millis(CPU_PERIOD_MS),
        Duration::from_millis(CPU_REACTION_DELAY_MS),
    )
    .await?;

    tokio::select! {
        result = server.run() => {
            result?;
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down gracefully...");
        }
    }

    Ok(())
}
