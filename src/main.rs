use std::io::BufRead;

use anyhow::Context;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use sso_gate::{config::Config, routes, services::realm, state::AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    // `sso-gate hash-password` reads a password from stdin and prints the
    // realm file hash for it.
    if std::env::args().nth(1).as_deref() == Some("hash-password") {
        let mut password = zeroize::Zeroizing::new(String::new());
        std::io::stdin()
            .lock()
            .read_line(&mut password)
            .context("Failed to read password from stdin")?;
        let hash = realm::hash_password(password.trim_end_matches(['\r', '\n']))?;
        println!("{}", hash);
        return Ok(());
    }

    dotenvy::dotenv().ok();

    let config = Config::from_env()?;
    tracing::info!("✅ Configuration loaded successfully");

    let state = AppState::from_config(&config).await?;
    tracing::info!("✅ AppState initialized");

    let app = routes::app(state);

    let addr = config.bind_addr;
    tracing::info!("🚀 Server listening on http://{}", addr);
    tracing::info!("✅ All systems operational");

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<std::net::SocketAddr>(),
    )
    .await?;

    Ok(())
}
