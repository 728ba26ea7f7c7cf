use crate::{error::AppError, state::AppState};
use actix_web::{web, HttpResponse};
use serde::Deserialize;
use serde_json::json;
use tracing::info;

/// Call metadata posted by the telephony provider when it asks for a flow.
#[derive(Debug, Deserialize)]
pub struct CallFlowRequest {
    pub call_id: String,
    pub account_id: String,
    pub from_number: String,
    pub to_number: String,
}

/// Build the stream flow handed back to the telephony provider.
///
/// The provider calls this when a call connects; the answer tells it to open
/// a media WebSocket against this server's public address.
pub async fn stream_flow(
    state: web::Data<AppState>,
    payload: web::Json<CallFlowRequest>,
) -> Result<HttpResponse, AppError> {
    let config = state.get_config();

    info!(
        call_id = %payload.call_id,
        from = %payload.from_number,
        to = %payload.to_number,
        "Building stream flow"
    );

    Ok(HttpResponse::Ok().json(json!({
        "action": "stream",
        "ws_url": format!("wss://{}/media-stream", config.server.public_domain),
        "chunk_size": 500,
        "record": true
    })))
}
