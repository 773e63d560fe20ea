//! Relay server example
//!
//! Runs the REST API and, when `TELEGRAM_BOT_TOKEN` is set, the chat bot,
//! both configured from the environment (a `.env` file is read if present).
//!
//! After starting, you can:
//! - View Swagger UI at http://localhost:8000/swagger-ui
//! - Inspect a video via POST http://localhost:8000/api/video-info
//! - Start a download via POST http://localhost:8000/api/download
//! - Poll progress via GET http://localhost:8000/api/progress/{id}
//! - Stream events via GET http://localhost:8000/api/events

use media_relay::api::start_api_server;
use media_relay::{ChatBot, Config, MediaRelay, run_with_shutdown};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = Config::from_env()?;
    let relay = MediaRelay::new(config.clone()).await?;
    let shared = Arc::new(relay.clone());
    let shutdown = relay.shutdown_token();

    let address = config.api.bind_address;
    let api = tokio::spawn(start_api_server(
        shared.clone(),
        Arc::new(config),
        shutdown.clone(),
    ));

    let bot = match ChatBot::from_relay(shared) {
        Some(bot) => Some(tokio::spawn(Arc::new(bot).run(shutdown.clone()))),
        None => {
            println!("ℹ️  TELEGRAM_BOT_TOKEN not set, chat bot disabled");
            None
        }
    };

    println!("🚀 media-relay listening on http://{address}");
    println!("📖 Swagger UI: http://{address}/swagger-ui");
    println!("🔄 Events stream: http://{address}/api/events");
    println!();
    println!("Example commands:");
    println!("  curl -X POST http://{address}/api/download \\");
    println!("    -H 'Content-Type: application/json' \\");
    println!("    -d '{{\"url\": \"https://www.youtube.com/watch?v=dQw4w9WgXcQ\"}}'");
    println!();
    println!("Press Ctrl+C to stop");

    run_with_shutdown(relay).await?;

    api.await??;
    if let Some(bot) = bot {
        bot.await??;
    }
    println!("👋 Stopped");
    Ok(())
}
