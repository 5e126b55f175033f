use crate::models::*;
use crate::services::{AffiliateService, TransactionService};
use actix_web::{HttpMessage, HttpRequest, HttpResponse, ResponseError, Result, web};
use serde_json::json;

fn get_user_id_from_request(req: &HttpRequest) -> Option<i64> {
    req.extensions().get::<i64>().copied()
}

#[utoipa::path(
    get,
    path = "/affiliate/code",
    tag = "affiliate",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Own referral code, created on first request", body = AffiliateResponse),
        (status = 401, description = "Unauthorized")
    )
)]
pub async fn get_code(
    affiliate_service: web::Data<AffiliateService>,
    req: HttpRequest,
) -> Result<HttpResponse> {
    let user_id = get_user_id_from_request(&req).unwrap_or(0);

    match affiliate_service.get_or_create_for_user(user_id).await {
        Ok(affiliate) => Ok(HttpResponse::Ok().json(json!({
            "success": true,
            "data": AffiliateResponse::from(affiliate)
        }))),
        Err(e) => Ok(e.error_response()),
    }
}

#[utoipa::path(
    put,
    path = "/affiliate/code",
    tag = "affiliate",
    request_body = UpdateAffiliateCodeRequest,
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Code replaced", body = AffiliateResponse),
        (status = 400, description = "Malformed code"),
        (status = 409, description = "Code already taken")
    )
)]
pub async fn update_code(
    affiliate_service: web::Data<AffiliateService>,
    req: HttpRequest,
    request: web::Json<UpdateAffiliateCodeRequest>,
) -> Result<HttpResponse> {
    let user_id = get_user_id_from_request(&req).unwrap_or(0);

    match affiliate_service.update_code(user_id, &request.code).await {
        Ok(affiliate) => Ok(HttpResponse::Ok().json(json!({
            "success": true,
            "data": AffiliateResponse::from(affiliate)
        }))),
        Err(e) => Ok(e.error_response()),
    }
}

#[utoipa::path(
    get,
    path = "/affiliate/referrals",
    tag = "affiliate",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Transactions this affiliate originated, with snapshotted commissions"),
        (status = 401, description = "Unauthorized")
    )
)]
pub async fn list_referrals(
    transaction_service: web::Data<TransactionService>,
    req: HttpRequest,
) -> Result<HttpResponse> {
    let user_id = get_user_id_from_request(&req).unwrap_or(0);

    match transaction_service.list_for_affiliator(user_id).await {
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

pub fn affiliate_config(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/affiliate")
            .route("/code", web::get().to(get_code))
            .route("/code", web::put().to(update_code))
            .route("/referrals", web::get().to(list_referrals)),
    );
}
