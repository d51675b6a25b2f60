mod client;
mod markdown;
mod protocol;
mod provider;
mod render;
mod server;
mod sse;
mod ui;

use clap::{Parser, Subcommand};

use crate::client::RelayClient;
use crate::server::RelayConfig;

#[derive(Parser)]
#[command(name = "brook", about = "Streaming chat front end for a hosted LLM gateway")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run the HTTP relay that forwards chat requests to the gateway
    Serve {
        #[arg(long, default_value = "127.0.0.1:3000")]
        listen: String,
        /// Upstream gateway root, e.g. https://gateway.example.com/v1
        #[arg(long, env = "BROOK_BASE_URL")]
        base_url: String,
    },
    /// Open the terminal chat UI against a running relay
    Chat {
        #[arg(long, env = "BROOK_RELAY_URL", default_value = "http://127.0.0.1:3000")]
        relay: String,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    dotenvy::dotenv().ok();

    match Cli::parse().command {
        Some(Command::Serve { listen, base_url }) => {
            tracing_subscriber::fmt()
                .with_env_filter(
                    tracing_subscriber::EnvFilter::try_from_default_env()
                        .unwrap_or_else(|_| "brook=info".into()),
                )
                .init();

            let api_key = std::env::var("BROOK_API_KEY").ok();
            server::run(RelayConfig {
                listen,
                base_url,
                api_key,
            })
            .await
        }
        Some(Command::Chat { relay }) => ui::run_tui(RelayClient::new(&relay)),
        None => {
            let relay = std::env::var("BROOK_RELAY_URL")
                .unwrap_or_else(|_| "http://127.0.0.1:3000".to_string());
            ui::run_tui(RelayClient::new(&relay))
        }
    }
}
