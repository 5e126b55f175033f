use crate::config::EmailConfig;
use crate::error::{AppError, AppResult};
use reqwest::Client;
use serde_json::json;

/// Thin client for the transactional email provider.
#[derive(Clone)]
pub struct EmailService {
    client: Client,
    config: EmailConfig,
}

impl EmailService {
    pub fn new(config: EmailConfig) -> Self {
        Self {
            client: Client::new(),
            config,
        }
    }

    pub async fn send(&self, to: &str, subject: &str, body: &str) -> AppResult<()> {
        let url = format!("{}/v1/messages", self.config.base_url.trim_end_matches('/'));

        let payload = json!({
            "from": self.config.from_address,
            "to": to,
            "subject": subject,
            "text": body,
        });

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.config.api_key)
            .json(&payload)
            .send()
            .await?;

        if response.status().is_success() {
            Ok(())
        } else {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "unknown error".to_string());
            Err(AppError::ExternalApiError(format!(
                "Failed to send email: {error_text}"
            )))
        }
    }

    pub async fn send_password_reset(&self, to: &str, token: &str) -> AppResult<()> {
        let body = format!(
            "A password reset was requested for this address.\n\n\
             Reset token: {token}\n\n\
             The token is valid for 24 hours and can be used once. If you did \
             not request this, you can ignore this message."
        );
        self.send(to, "Reset your password", &body).await
    }
}
