use crate::config::GatewayConfig;
use crate::error::{AppError, AppResult};
use reqwest::Client;
use serde::Deserialize;

/// Hosted checkout session as returned by the payment gateway.
#[derive(Debug, Deserialize)]
pub struct CheckoutSession {
    pub id: String,
    pub url: String,
}

/// Thin client for the external checkout gateway. The gateway hosts the
/// payment page itself; we only create a session and hand the user its URL.
#[derive(Clone)]
pub struct GatewayService {
    client: Client,
    config: GatewayConfig,
}

impl GatewayService {
    pub fn new(config: GatewayConfig) -> Self {
        Self {
            client: Client::new(),
            config,
        }
    }

    /// URL the gateway sends the buyer (and its server-to-server callback)
    /// back to after payment, carrying the verification token.
    pub fn callback_url(&self, token: &str) -> String {
        format!(
            "{}/webhook/payment?token={}",
            self.config.callback_base_url.trim_end_matches('/'),
            token
        )
    }

    pub async fn create_checkout_session(
        &self,
        user_id: i64,
        email: &str,
        package: &str,
        amount: i64,
        callback_url: &str,
    ) -> AppResult<CheckoutSession> {
        let url = format!("{}/v1/checkout/sessions", self.config.base_url.trim_end_matches('/'));

        let params = [
            ("amount", amount.to_string()),
            ("currency", "usd".to_string()),
            ("customer_email", email.to_string()),
            ("success_url", callback_url.to_string()),
            ("metadata[user_id]", user_id.to_string()),
            ("metadata[package]", package.to_string()),
        ];

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.config.secret_key)
            .form(&params)
            .send()
            .await?;

        if response.status().is_success() {
            let session: CheckoutSession = response.json().await?;
            Ok(session)
        } else {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "unknown error".to_string());
            Err(AppError::ExternalApiError(format!(
                "Failed to create checkout session: {error_text}"
            )))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> GatewayConfig {
        GatewayConfig {
            secret_key: "sk_test_123".to_string(),
            base_url: "https://checkout.example.com".to_string(),
            callback_base_url: "https://app.example.com/".to_string(),
        }
    }

    #[test]
    fn test_callback_url_carries_token() {
        let service = GatewayService::new(test_config());
        assert_eq!(
            service.callback_url("tok123"),
            "https://app.example.com/webhook/payment?token=tok123"
        );
    }
}
