use common::setup_logging;
use gateway::config::GatewayConfig;
use gateway::state::AppState;
use gateway::upload::UploadStore;
use inference::InferenceEngine;
use model::{LayerRegistry, Network, PatchEmbedding};
use preprocess::{DEFAULT_INPUT_SIZE, ImagePreprocessor};
use std::sync::Arc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = GatewayConfig::from_env();
    setup_logging(config.environment.clone());

    tracing::info!(
        config = ?config,
        "Loaded configuration"
    );

    // One entry beyond the generic kinds: the custom patch-embedding layer
    // the artifact was trained with.
    let mut registry = LayerRegistry::new();
    registry.register(PatchEmbedding::KIND, model::registry::patch_embedding);

    tracing::info!(model_path = %config.model_path, "Loading model");
    let network = Network::load(&config.model_path, &registry)?;
    tracing::info!(layers = network.depth(), "Model loaded successfully");

    let state = AppState {
        engine: Arc::new(InferenceEngine::new(network)),
        preprocessor: Arc::new(ImagePreprocessor::new(DEFAULT_INPUT_SIZE)),
        uploads: Arc::new(UploadStore::new(&config.upload_dir)?),
    };

    let app = gateway::routes::router(state, &config.upload_dir);

    let listener = tokio::net::TcpListener::bind(&config.listen_addr).await?;
    tracing::info!(addr = %config.listen_addr, "Gateway listening");

    axum::serve(listener, app).await?;

    Ok(())
}
