use crate::{error::AppError, state::AppState};
use actix_web::{web, HttpResponse};
use serde_json::json;

pub async fn get_config(state: web::Data<AppState>) -> Result<HttpResponse, AppError> {
    let config = state.get_config();

    Ok(HttpResponse::Ok().json(json!({
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "config": {
            "server": {
                "host": config.server.host,
                "port": config.server.port,
                "public_domain": config.server.public_domain
            },
            "backend": {
                "api_base_url": config.backend.api_base_url,
                // The bearer token never leaves the process
                "api_key": if config.backend.api_key.is_empty() { "unset" } else { "redacted" },
                "assistant_id": config.backend.assistant_id,
                "request_timeout_secs": config.backend.request_timeout_secs
            },
            "audio": {
                "default_encoding": config.audio.default_encoding,
                "default_sample_rate": config.audio.default_sample_rate,
                "default_channels": config.audio.default_channels
            }
        }
    })))
}
