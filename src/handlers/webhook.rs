use crate::services::PaymentService;
use actix_web::{HttpResponse, ResponseError, Result, web};
use serde::Deserialize;
use serde_json::json;
use utoipa::IntoParams;

/// Server-to-server callback from the gateway, hitting the callback URL we
/// handed it at checkout. It may fire in addition to (and concurrently with)
/// the user's own confirm call for the same token; confirmation is idempotent
/// either way.
#[derive(Debug, Deserialize, IntoParams)]
pub struct PaymentCallbackQuery {
    pub token: String,
}

#[utoipa::path(
    post,
    path = "/webhook/payment",
    tag = "webhook",
    params(PaymentCallbackQuery),
    responses(
        (status = 200, description = "Confirmation applied or already applied"),
        (status = 404, description = "Unknown token")
    )
)]
pub async fn payment_callback(
    payment_service: web::Data<PaymentService>,
    query: web::Query<PaymentCallbackQuery>,
) -> Result<HttpResponse> {
    match payment_service.confirm_from_callback(&query.token).await {
        Ok(response) => Ok(HttpResponse::Ok().json(json!({
            "success": true,
            "data": response
        }))),
        Err(e) => {
            log::warn!("Payment webhook rejected: {e}");
            Ok(e.error_response())
        }
    }
}

pub fn webhook_config(cfg: &mut web::ServiceConfig) {
    cfg.service(web::scope("/webhook").route("/payment", web::post().to(payment_callback)));
}
