use tubeproxy::{app::App, config::AppConfig};

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            std::env::var("RUST_LOG")
                .unwrap_or_else(|_| "tubeproxy=info,tower_http=info".to_string()),
        )
        .init();

    let config = match AppConfig::from_env() {
        Ok(config) => config,
        Err(error) => {
            eprintln!("Configuration error: {}", error.message);
            std::process::exit(1);
        }
    };

    if let Err(error) = App::new(config).serve().await {
        eprintln!("Server error: {}", error.message);
        std::process::exit(1);
    }
}
