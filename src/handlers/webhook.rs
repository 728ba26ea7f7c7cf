use crate::error::AppError;
use actix_web::{web, HttpResponse};
use tracing::info;

/// Receive call status callbacks from the telephony provider.
///
/// Payloads are logged for diagnosis and acknowledged; nothing in the bridge
/// reacts to them.
pub async fn webhook_receiver(
    data: web::Json<serde_json::Value>,
) -> Result<HttpResponse, AppError> {
    info!(payload = %data.into_inner(), "Webhook received");
    Ok(HttpResponse::Ok().json("Webhook received."))
}
