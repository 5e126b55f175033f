use actix_web::web;
use utoipa::OpenApi;
use utoipa::{
    Modify,
    openapi::security::{Http, HttpAuthScheme, SecurityScheme},
};
use utoipa_swagger_ui::SwaggerUi;

use crate::entities::{Package, Plan, TransactionStatus};
use crate::handlers;
use crate::models::*;

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        let components = openapi.components.as_mut().unwrap();
        components.add_security_scheme(
            "bearer_auth",
            SecurityScheme::Http(Http::new(HttpAuthScheme::Bearer)),
        )
    }
}

#[derive(OpenApi)]
#[openapi(
    paths(
        handlers::auth::register,
        handlers::auth::login,
        handlers::auth::refresh,
        handlers::auth::request_password_reset,
        handlers::auth::submit_password_reset,
        handlers::payment::checkout,
        handlers::payment::confirm,
        handlers::payment::list_transactions,
        handlers::payment::get_subscription,
        handlers::affiliate::get_code,
        handlers::affiliate::update_code,
        handlers::affiliate::list_referrals,
        handlers::webhook::payment_callback,
    ),
    components(
        schemas(
            RegisterRequest,
            LoginRequest,
            RefreshRequest,
            UserResponse,
            AuthResponse,
            RequestPasswordResetRequest,
            SubmitPasswordResetRequest,
            CheckoutRequest,
            CheckoutResponse,
            ConfirmPaymentRequest,
            ConfirmPaymentResponse,
            TransactionResponse,
            SubscriptionResponse,
            AffiliateResponse,
            UpdateAffiliateCodeRequest,
            Package,
            Plan,
            TransactionStatus,
            ApiError,
        )
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "auth", description = "Registration, login and password reset"),
        (name = "payments", description = "Checkout, confirmation and subscription status"),
        (name = "affiliate", description = "Referral codes and commission ledger"),
        (name = "webhook", description = "Payment gateway callbacks"),
    ),
    info(
        title = "AIHub Backend API",
        version = "1.0.0",
        description = "AIHub Backend REST API documentation"
    ),
    servers(
        (url = "/api/v1", description = "Local server")
    )
)]
pub struct ApiDoc;

pub fn swagger_config(cfg: &mut web::ServiceConfig) {
    cfg.service(
        SwaggerUi::new("/swagger-ui/{_:.*}").url("/api-docs/openapi.json", ApiDoc::openapi()),
    )
    .route(
        "/swagger-ui",
        web::get().to(|| async {
            actix_web::HttpResponse::Found()
                .append_header(("Location", "/swagger-ui/"))
                .finish()
        }),
    );
}
