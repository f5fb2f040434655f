use crate::error::ApiError;
use crate::state::AppState;
use axum::extract::{Multipart, State};
use axum::response::Html;
use axum::routing::{get, post};
use axum::{Json, Router};
use inference::{build_prediction, Prediction, ScanMetadata};
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;

pub fn router(state: AppState, upload_dir: &str) -> Router {
    Router::new()
        .route("/", get(home))
        .route("/predict", post(predict))
        // The reported image_path is relative to the workspace root, so the
        // stored scans are served under the same prefix.
        .nest_service("/static/uploads", ServeDir::new(upload_dir))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn home() -> Html<&'static str> {
    Html(include_str!("../templates/index.html"))
}

/// Classify one uploaded scan: persist it, preprocess, run a single forward
/// pass and report the decision.
async fn predict(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<Prediction>, ApiError> {
    let mut upload = None;
    while let Some(field) = multipart.next_field().await? {
        if field.name() == Some("image") {
            let file_name = field.file_name().unwrap_or("upload").to_string();
            let bytes = field.bytes().await?;
            upload = Some((file_name, bytes));
            break;
        }
    }
    let (file_name, bytes) = upload.ok_or(ApiError::MissingInput)?;

    tracing::debug!(file = %file_name, bytes = bytes.len(), "Received scan");

    let prediction =
        tokio::task::spawn_blocking(move || classify(state, file_name, &bytes)).await??;
    Ok(Json(prediction))
}

/// The synchronous per-request pipeline. Runs on a blocking worker and, once
/// started, runs to completion; there is no cancellation path.
fn classify(state: AppState, file_name: String, bytes: &[u8]) -> Result<Prediction, ApiError> {
    let stored = state.uploads.store(&file_name, bytes)?;
    let scan = state.preprocessor.prepare(bytes)?;
    let probability = state.engine.predict(&scan.tensor)?;

    let metadata = ScanMetadata {
        stored_path: stored.path.to_string_lossy().into_owned(),
        file_name,
        width: scan.width,
        height: scan.height,
        byte_size: stored.byte_size,
    };

    let prediction = build_prediction(probability, &metadata);
    tracing::info!(
        result = prediction.result,
        confidence = probability,
        file = %prediction.file_name,
        "Scan classified"
    );
    Ok(prediction)
}
