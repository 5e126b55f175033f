use crate::entities::{Package, Plan, TransactionStatus, subscription_entity, transaction_entity};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct CheckoutRequest {
    pub package: Package,
    pub affiliate_code: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct CheckoutResponse {
    pub checkout_url: String,
    pub transaction: TransactionResponse,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ConfirmPaymentRequest {
    pub token: String,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ConfirmPaymentResponse {
    pub transaction: TransactionResponse,
    pub subscription: SubscriptionResponse,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct TransactionResponse {
    pub id: i64,
    pub package: Package,
    pub amount: i64,
    pub commission: i64,
    pub affiliate_code: Option<String>,
    pub status: TransactionStatus,
    pub created_at: DateTime<Utc>,
}

impl From<transaction_entity::Model> for TransactionResponse {
    fn from(t: transaction_entity::Model) -> Self {
        Self {
            id: t.id,
            package: t.package,
            amount: t.amount,
            commission: t.commission,
            affiliate_code: t.affiliate_code,
            status: t.status,
            created_at: t.created_at,
        }
    }
}

/// Effective plan as seen by readers: an expired pro row already reads free.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct SubscriptionResponse {
    pub plan: Plan,
    pub valid_until: Option<DateTime<Utc>>,
}

impl SubscriptionResponse {
    pub fn free() -> Self {
        Self {
            plan: Plan::Free,
            valid_until: None,
        }
    }
}

impl From<subscription_entity::Model> for SubscriptionResponse {
    fn from(s: subscription_entity::Model) -> Self {
        Self {
            plan: s.plan,
            valid_until: s.valid_until,
        }
    }
}

/// Stored as the JSON payload of a payment-confirmation token; links the
/// token back to the transaction it gates.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentTokenPayload {
    pub transaction_id: i64,
    pub package: Package,
}
