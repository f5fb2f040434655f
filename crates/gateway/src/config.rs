use std::env;

pub use common::Environment;

#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub environment: Environment,
    pub listen_addr: String,
    pub model_path: String,
    pub upload_dir: String,
}

impl GatewayConfig {
    /// Load configuration from environment variables with sensible defaults
    pub fn from_env() -> Self {
        let environment = Environment::from_env();

        let listen_addr =
            env::var("LISTEN_ADDR").unwrap_or_else(|_| "0.0.0.0:8080".to_string());

        let model_path =
            env::var("MODEL_PATH").unwrap_or_else(|_| "models/stroke_vit.nnet".to_string());

        let upload_dir =
            env::var("UPLOAD_DIR").unwrap_or_else(|_| "static/uploads".to_string());

        Self {
            environment,
            listen_addr,
            model_path,
            upload_dir,
        }
    }
}
