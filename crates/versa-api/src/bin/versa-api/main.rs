use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use versa::{CandleClassifier, VersaAppBuilder, connect_record_store};
use versa_api::{ApiConfig, AppState, build_app};

/// Versa API Server
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Host address to bind to
    #[arg(short = 'H', long, env = "VERSA_HOST")]
    host: Option<String>,

    /// Port to listen on
    #[arg(short, long, env = "VERSA_PORT")]
    port: Option<u16>,

    /// Log level (error, warn, info, debug, trace)
    #[arg(short, long, env = "VERSA_LOG_LEVEL")]
    log_level: Option<String>,

    /// Config file path (.toml or .json)
    #[arg(short, long, env = "VERSA_CONFIG")]
    config_file: Option<PathBuf>,

    /// Directory for uploads, datasets and model artifacts
    #[arg(short, long, env = "VERSA_DATA_DIR")]
    data_dir: Option<String>,

    /// PostgreSQL connection string; records stay in memory when unset
    #[arg(long, env = "DATABASE_URL")]
    database_url: Option<String>,

    /// Disable Swagger UI
    #[arg(long, env = "VERSA_DISABLE_SWAGGER", default_value_t = false)]
    disable_swagger: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    let cli = Cli::parse();

    // Load configuration before logging so the configured level applies
    let loaded = cli.config_file.as_ref().map(|path| (path, ApiConfig::load_from_file(path)));
    let mut config = match &loaded {
        Some((_, Ok(cfg))) => cfg.clone(),
        _ => ApiConfig::default(),
    };

    // Override with CLI options
    if let Some(host) = cli.host {
        config.host = host;
    }
    if let Some(port) = cli.port {
        config.port = port;
    }
    if let Some(log_level) = cli.log_level {
        config.versa.log_level = log_level;
    }
    if let Some(data_dir) = cli.data_dir {
        config.versa.data_dir = data_dir;
    }
    if cli.database_url.is_some() {
        config.versa.database_url = cli.database_url;
    }
    if cli.disable_swagger {
        config.enable_swagger = false;
    }

    // Initialize logging
    let filter = format!(
        "versa_api={level},versa={level},versa_candle={level},tower_http=debug",
        level = config.versa.log_level
    );
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    match &loaded {
        Some((path, Ok(_))) => info!("Configuration loaded from: {}", path.display()),
        Some((_, Err(e))) => warn!(
            "Failed to load config file: {}. Using default configuration.",
            e
        ),
        None => {}
    }
    config.versa.validate()?;

    let addr = config.socket_addr()?;

    // Initialize record store, classifier and lifecycle
    let record_store = connect_record_store(&config.versa).await?;
    let classifier = CandleClassifier::new(config.versa.training.clone());
    let lifecycle = VersaAppBuilder::new(config.versa.clone())
        .classifier(classifier)
        .record_store(record_store)
        .build()?;
    let state = AppState::new(Arc::new(lifecycle));

    // Build application
    let app = build_app(state, &config);

    // Start server
    info!("Starting server on: {}", addr);
    info!("Data directory: {}", config.versa.data_dir);
    if config.enable_swagger {
        info!("Swagger UI: http://{}/swagger-ui", addr);
    }

    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, app)
        .await
        .map_err(|e| anyhow::anyhow!("Server error: {}", e))
}
