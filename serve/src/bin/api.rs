//! Gauntlet API binary: load config, init tracing, open the store, serve.

use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    if let Err(e) = config::load_and_apply("gauntlet", None) {
        eprintln!("config load failed (continuing with process env): {e}");
    }
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let settings = config::Settings::from_env();
    serve::run_serve(&settings).await
}
