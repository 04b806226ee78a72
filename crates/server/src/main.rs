use std::sync::Arc;
use std::time::Instant;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use paperscan_core::embed::Embedder;
use paperscan_core::{CoreConfig, CoreContext};
use paperscan_server::api::create_router;
use paperscan_server::api::handlers::AppState;

#[derive(Parser)]
#[command(name = "paperscan-server", about = "Academic plagiarism detection service")]
struct Args {
    /// Port to listen on
    #[arg(short, long, default_value_t = 8080)]
    port: u16,

    /// Data directory for index persistence (overrides PAPERSCAN_DATA_DIR)
    #[arg(short, long)]
    data_dir: Option<String>,
}

#[cfg(feature = "onnx")]
fn build_embedder(config: &CoreConfig) -> Result<Arc<dyn Embedder>, Box<dyn std::error::Error>> {
    let cache_dir = config.data_dir.join("models");
    let embedder = paperscan_core::embed::fastembed::FastEmbedder::new(Some(cache_dir))?;
    tracing::info!(model = embedder.name(), "local transformer embedder ready");
    Ok(Arc::new(embedder))
}

#[cfg(not(feature = "onnx"))]
fn build_embedder(config: &CoreConfig) -> Result<Arc<dyn Embedder>, Box<dyn std::error::Error>> {
    tracing::warn!(
        dimension = config.dimension,
        "built without the onnx feature, using the feature-hash embedder"
    );
    Ok(Arc::new(paperscan_core::embed::HashEmbedder::new(
        config.dimension,
    )))
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .json()
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive(
                    "paperscan_server=info"
                        .parse()
                        .expect("valid directive literal"),
                )
                .add_directive(
                    "paperscan_core=info"
                        .parse()
                        .expect("valid directive literal"),
                ),
        )
        .init();

    let args = Args::parse();
    if args.port == 0 {
        eprintln!("Error: port must be > 0");
        std::process::exit(1);
    }

    let mut config = CoreConfig::from_env();
    if let Some(dir) = args.data_dir {
        config.data_dir = dir.into();
    }
    let data_path = config.data_dir.clone();
    if data_path.exists() && !data_path.is_dir() {
        eprintln!(
            "Error: data_dir '{}' exists but is not a directory",
            data_path.display()
        );
        std::process::exit(1);
    }

    // Embedding model initialization failure at startup is fatal by design.
    let embedder = build_embedder(&config)?;

    let prometheus_handle = metrics_exporter_prometheus::PrometheusBuilder::new()
        .install_recorder()?;

    let ctx = Arc::new(CoreContext::new(config, embedder));
    ctx.load_persisted();
    let stats = ctx.index.stats();
    tracing::info!(
        papers = stats.count,
        strategy = stats.strategy,
        corrupted = stats.corrupted,
        "index ready"
    );

    let state = AppState {
        ctx,
        prometheus_handle,
        start_time: Instant::now(),
    };
    let app = create_router(state);

    let listener = tokio::net::TcpListener::bind(("0.0.0.0", args.port)).await?;
    tracing::info!(port = args.port, "listening");
    axum::serve(listener, app).await?;
    Ok(())
}
