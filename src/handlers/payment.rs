use crate::models::*;
use crate::services::{PaymentService, SubscriptionService, TransactionService};
use actix_web::{HttpMessage, HttpRequest, HttpResponse, ResponseError, Result, web};
use serde_json::json;

fn get_user_id_from_request(req: &HttpRequest) -> Option<i64> {
    req.extensions().get::<i64>().copied()
}

#[utoipa::path(
    post,
    path = "/payments/checkout",
    tag = "payments",
    request_body = CheckoutRequest,
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Checkout session created", body = CheckoutResponse),
        (status = 401, description = "Unauthorized"),
        (status = 502, description = "Gateway unavailable, retry later")
    )
)]
pub async fn checkout(
    payment_service: web::Data<PaymentService>,
    req: HttpRequest,
    request: web::Json<CheckoutRequest>,
) -> Result<HttpResponse> {
    let user_id = get_user_id_from_request(&req).unwrap_or(0);

    match payment_service.initiate(user_id, request.into_inner()).await {
        Ok(response) => Ok(HttpResponse::Ok().json(json!({
            "success": true,
            "data": response
        }))),
        Err(e) => Ok(e.error_response()),
    }
}

#[utoipa::path(
    post,
    path = "/payments/confirm",
    tag = "payments",
    request_body = ConfirmPaymentRequest,
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Payment confirmed (repeat calls return the same state)", body = ConfirmPaymentResponse),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Token belongs to another user"),
        (status = 404, description = "Unknown token")
    )
)]
pub async fn confirm(
    payment_service: web::Data<PaymentService>,
    req: HttpRequest,
    request: web::Json<ConfirmPaymentRequest>,
) -> Result<HttpResponse> {
    let user_id = get_user_id_from_request(&req).unwrap_or(0);

    match payment_service.confirm(user_id, request.into_inner()).await {
        Ok(response) => Ok(HttpResponse::Ok().json(json!({
            "success": true,
            "data": response
        }))),
        Err(e) => Ok(e.error_response()),
    }
}

#[utoipa::path(
    get,
    path = "/payments/transactions",
    tag = "payments",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Own purchase history"),
        (status = 401, description = "Unauthorized")
    )
)]
pub async fn list_transactions(
    transaction_service: web::Data<TransactionService>,
    req: HttpRequest,
) -> Result<HttpResponse> {
    let user_id = get_user_id_from_request(&req).unwrap_or(0);

    match transaction_service.list_for_user(user_id).await {
        Ok(transactions) => {
            let transactions: Vec<TransactionResponse> =
                transactions.into_iter().map(TransactionResponse::from).collect();
            Ok(HttpResponse::Ok().json(json!({
                "success": true,
                "data": transactions
            })))
        }
        Err(e) => Ok(e.error_response()),
    }
}

#[utoipa::path(
    get,
    path = "/payments/subscription",
    tag = "payments",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Effective plan", body = SubscriptionResponse),
        (status = 401, description = "Unauthorized")
    )
)]
pub async fn get_subscription(
    subscription_service: web::Data<SubscriptionService>,
    req: HttpRequest,
) -> Result<HttpResponse> {
    let user_id = get_user_id_from_request(&req).unwrap_or(0);

    match subscription_service.get_plan(user_id).await {
        Ok(subscription) => Ok(HttpResponse::Ok().json(json!({
            "success": true,
            "data": subscription
        }))),
        Err(e) => Ok(e.error_response()),
    }
}

pub fn payment_config(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/payments")
            .route("/checkout", web::post().to(checkout))
            .route("/confirm", web::post().to(confirm))
            .route("/transactions", web::get().to(list_transactions))
            .route("/subscription", web::get().to(get_subscription)),
    );
}
