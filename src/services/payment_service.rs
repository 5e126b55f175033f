use crate::entities::{TokenPurpose, TransactionStatus, user_entity as users};
use crate::error::{AppError, AppResult};
use crate::external::GatewayService;
use crate::models::{
    CheckoutRequest, CheckoutResponse, ConfirmPaymentRequest, ConfirmPaymentResponse,
    PaymentTokenPayload, TransactionResponse,
};
use crate::services::{
    RedeemOutcome, SubscriptionService, TokenService, TransactionService,
};
use sea_orm::entity::prelude::*;
use sea_orm::{DatabaseConnection, TransactionTrait};
use serde_json::json;

/// Orchestrates the checkout and confirmation protocol. Confirmation may be
/// invoked any number of times per transaction (duplicate webhook, page
/// reload, double submit); the token redeem is the single gate that decides
/// who applies side effects, and the conditional finalize inside
/// [`apply_credit`](Self::apply_credit) keeps the credit itself at-most-once.
#[derive(Clone)]
pub struct PaymentService {
    pool: DatabaseConnection,
    token_service: TokenService,
    transaction_service: TransactionService,
    subscription_service: SubscriptionService,
    gateway_service: GatewayService,
}

impl PaymentService {
    pub fn new(
        pool: DatabaseConnection,
        token_service: TokenService,
        transaction_service: TransactionService,
        subscription_service: SubscriptionService,
        gateway_service: GatewayService,
    ) -> Self {
        Self {
            pool,
            token_service,
            transaction_service,
            subscription_service,
            gateway_service,
        }
    }

    /// Start a checkout: open a pending transaction, issue the confirmation
    /// token and create the hosted checkout session. If the gateway is
    /// unreachable the attempt is rolled back (token discarded, transaction
    /// finalized failed) and the caller gets a retryable error.
    pub async fn initiate(
        &self,
        user_id: i64,
        req: CheckoutRequest,
    ) -> AppResult<CheckoutResponse> {
        let user = users::Entity::find_by_id(user_id)
            .one(&self.pool)
            .await?
            .ok_or_else(|| AppError::NotFound("User not found".to_string()))?;

        let transaction = self
            .transaction_service
            .open(user_id, req.package, req.affiliate_code.as_deref())
            .await?;

        let payload = PaymentTokenPayload {
            transaction_id: transaction.id,
            package: req.package,
        };
        let token = self
            .token_service
            .issue(
                TokenPurpose::PaymentConfirmation,
                &user_id.to_string(),
                Some(json!(payload)),
            )
            .await?;

        let callback_url = self.gateway_service.callback_url(&token.token);
        let session = match self
            .gateway_service
            .create_checkout_session(
                user_id,
                &user.email,
                &req.package.to_string(),
                transaction.amount,
                &callback_url,
            )
            .await
        {
            Ok(session) => session,
            Err(e) => {
                log::warn!(
                    "Gateway checkout failed for transaction {}, rolling back: {e:?}",
                    transaction.id
                );
                if let Err(rollback_err) = self.token_service.discard(&token.token).await {
                    log::error!(
                        "Failed to discard token for transaction {}: {rollback_err:?}",
                        transaction.id
                    );
                }
                if let Err(rollback_err) = self
                    .transaction_service
                    .finalize(transaction.id, TransactionStatus::Failed)
                    .await
                {
                    log::error!(
                        "Failed to mark transaction {} failed: {rollback_err:?}",
                        transaction.id
                    );
                }
                return Err(e);
            }
        };

        log::info!(
            "Opened transaction {} for user {user_id} ({}), checkout session {}",
            transaction.id,
            req.package,
            session.id
        );

        Ok(CheckoutResponse {
            checkout_url: session.url,
            transaction: TransactionResponse::from(transaction),
        })
    }

    /// Confirm a returned checkout. Safe to repeat: every call after the
    /// first successful application observes the used token and returns the
    /// recorded success without re-applying side effects.
    pub async fn confirm(
        &self,
        user_id: i64,
        req: ConfirmPaymentRequest,
    ) -> AppResult<ConfirmPaymentResponse> {
        let outcome = self
            .token_service
            .redeem(&req.token, TokenPurpose::PaymentConfirmation, &user_id.to_string())
            .await?;

        let (token, first_redeem) = match outcome {
            RedeemOutcome::Applied(token) => (token, true),
            RedeemOutcome::AlreadyUsed(token) => (token, false),
        };
        let payload = Self::parse_payload(&token)?;

        if first_redeem {
            // This caller won the redeem and owns the side effects.
            if let Err(e) = self.apply_credit(user_id, &payload).await {
                // The token is burned and cannot gate a retry; the
                // reconciler repairs this from the used-token record.
                return Err(AppError::InconsistentState(format!(
                    "token for transaction {} burned but credit did not land: {e}",
                    payload.transaction_id
                )));
            }
            log::info!(
                "Transaction {} confirmed for user {user_id}",
                payload.transaction_id
            );
        } else {
            let transaction = self
                .transaction_service
                .get_by_id(payload.transaction_id)
                .await?;
            if transaction.status == TransactionStatus::Pending {
                // Token burned on an earlier call that died before crediting;
                // the conditional finalize keeps this at-most-once even if
                // the reconciler repairs it concurrently.
                self.apply_credit(user_id, &payload).await?;
            }
            // Otherwise: plain duplicate callback or reload, nothing to do.
        }

        let transaction = self
            .transaction_service
            .get_by_id(payload.transaction_id)
            .await?;
        let subscription = self.subscription_service.get_plan(user_id).await?;

        Ok(ConfirmPaymentResponse {
            transaction: TransactionResponse::from(transaction),
            subscription,
        })
    }

    /// Entry point for the gateway's server-to-server callback, which carries
    /// only the token. The subject recorded at issue time identifies the
    /// buyer, so the callback goes through the same subject-bound confirm as
    /// the user's own call.
    pub async fn confirm_from_callback(&self, token: &str) -> AppResult<ConfirmPaymentResponse> {
        let row = self
            .token_service
            .find(token)
            .await?
            .ok_or_else(|| AppError::NotFound("Token not found".to_string()))?;
        let user_id: i64 = row
            .subject
            .parse()
            .map_err(|_| AppError::InternalError(format!("Token {} has a non-numeric subject", row.id)))?;

        self.confirm(
            user_id,
            ConfirmPaymentRequest {
                token: token.to_string(),
            },
        )
        .await
    }

    /// Apply the subscription upgrade and the transaction finalize as one
    /// database transaction, gated on the pending -> success flip: whoever
    /// wins that conditional update applies the upgrade, everyone else
    /// applies nothing.
    async fn apply_credit(&self, user_id: i64, payload: &PaymentTokenPayload) -> AppResult<bool> {
        let txn = self.pool.begin().await?;

        let credited =
            TransactionService::finalize_on(&txn, payload.transaction_id, TransactionStatus::Success)
                .await?;
        if credited {
            SubscriptionService::upgrade_to_pro_on(&txn, user_id, payload.package).await?;
        }

        txn.commit().await?;
        Ok(credited)
    }

    /// Walk recently used payment tokens and repair transactions left
    /// pending after a token burned without its credit landing.
    pub async fn reconcile_stuck_confirmations(&self, lookback_days: i64) -> AppResult<u64> {
        let tokens = self
            .token_service
            .used_payment_tokens_since(lookback_days)
            .await?;

        let mut repaired = 0u64;
        for token in tokens {
            let payload = match Self::parse_payload(&token) {
                Ok(payload) => payload,
                Err(e) => {
                    log::warn!("Skipping token {} with bad payload: {e:?}", token.id);
                    continue;
                }
            };

            let transaction = match self
                .transaction_service
                .get_by_id(payload.transaction_id)
                .await
            {
                Ok(transaction) => transaction,
                Err(e) => {
                    log::warn!(
                        "Skipping token {}: transaction {} not loadable: {e:?}",
                        token.id,
                        payload.transaction_id
                    );
                    continue;
                }
            };
            if transaction.status != TransactionStatus::Pending {
                continue;
            }

            let Ok(user_id) = token.subject.parse::<i64>() else {
                log::warn!("Skipping token {} with non-numeric subject", token.id);
                continue;
            };

            match self.apply_credit(user_id, &payload).await {
                Ok(true) => {
                    log::warn!(
                        "Reconciled stuck confirmation: transaction {} credited for user {user_id}",
                        payload.transaction_id
                    );
                    repaired += 1;
                }
                Ok(false) => {}
                Err(e) => {
                    log::error!(
                        "payment.inconsistent-state: reconcile of transaction {} failed: {e:?}",
                        payload.transaction_id
                    );
                }
            }
        }

        Ok(repaired)
    }

    fn parse_payload(
        token: &crate::entities::token_entity::Model,
    ) -> AppResult<PaymentTokenPayload> {
        let raw = token.payload.clone().ok_or_else(|| {
            AppError::InternalError(format!("Payment token {} has no payload", token.id))
        })?;
        let payload = serde_json::from_value(raw)?;
        Ok(payload)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GatewayConfig;
    use crate::entities::{Package, Plan, TokenStatus, subscription_entity, token_entity, transaction_entity};
    use crate::services::AffiliateService;
    use chrono::Utc;
    use sea_orm::{DatabaseBackend, DatabaseConnection, MockDatabase};

    fn gateway() -> GatewayService {
        GatewayService::new(GatewayConfig {
            secret_key: "sk_test".to_string(),
            base_url: "https://checkout.example.com".to_string(),
            callback_base_url: "https://app.example.com".to_string(),
        })
    }

    // Each service gets its own handle onto the same mock; only the payment
    // service's calls consume results in these tests.
    fn payment_service(db: DatabaseConnection) -> PaymentService {
        PaymentService::new(
            db.clone(),
            TokenService::new(db.clone()),
            TransactionService::new(db.clone(), AffiliateService::new(db.clone())),
            SubscriptionService::new(db),
            gateway(),
        )
    }

    fn used_token(payload: PaymentTokenPayload) -> token_entity::Model {
        token_entity::Model {
            id: 1,
            token: "tok-used".to_string(),
            purpose: TokenPurpose::PaymentConfirmation,
            subject: "42".to_string(),
            payload: Some(json!(payload)),
            status: TokenStatus::Used,
            created_at: Utc::now(),
            expires_at: None,
            used_at: Some(Utc::now()),
        }
    }

    fn success_transaction() -> transaction_entity::Model {
        transaction_entity::Model {
            id: 10,
            user_id: 42,
            package: Package::ProMonthly,
            amount: 3900,
            commission: 975,
            affiliate_code: None,
            affiliator_id: None,
            status: TransactionStatus::Success,
            created_at: Utc::now(),
            updated_at: Some(Utc::now()),
        }
    }

    fn pro_subscription() -> subscription_entity::Model {
        subscription_entity::Model {
            id: 5,
            user_id: 42,
            plan: Plan::Pro,
            valid_until: Some(Utc::now() + chrono::Duration::days(30)),
            created_at: Utc::now(),
            updated_at: Some(Utc::now()),
        }
    }

    #[tokio::test]
    async fn test_duplicate_confirm_returns_success_without_writes() {
        let payload = PaymentTokenPayload {
            transaction_id: 10,
            package: Package::ProMonthly,
        };

        // Read-only sequence: token lookup, terminal-state check, then the
        // response reads. No exec results are registered, so any ledger
        // write would fail the test.
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([vec![used_token(payload.clone())]])
            .append_query_results([vec![success_transaction()]])
            .append_query_results([vec![success_transaction()]])
            .append_query_results([vec![pro_subscription()]])
            .into_connection();

        let service = payment_service(db);
        let response = service
            .confirm(
                42,
                ConfirmPaymentRequest {
                    token: "tok-used".to_string(),
                },
            )
            .await
            .unwrap();

        assert_eq!(response.transaction.status, TransactionStatus::Success);
        assert_eq!(response.subscription.plan, Plan::Pro);
    }

    #[tokio::test]
    async fn test_confirm_with_wrong_subject_is_rejected() {
        let payload = PaymentTokenPayload {
            transaction_id: 10,
            package: Package::ProMonthly,
        };

        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([vec![used_token(payload)]])
            .into_connection();

        let service = payment_service(db);
        let err = service
            .confirm(
                99,
                ConfirmPaymentRequest {
                    token: "tok-used".to_string(),
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::SubjectMismatch));
    }

    #[test]
    fn test_payload_round_trips_through_token_json() {
        let payload = PaymentTokenPayload {
            transaction_id: 7,
            package: Package::ProYearly,
        };
        let token = used_token(payload);

        let parsed = PaymentService::parse_payload(&token).unwrap();
        assert_eq!(parsed.transaction_id, 7);
        assert_eq!(parsed.package, Package::ProYearly);
    }

    #[test]
    fn test_token_without_payload_is_an_error() {
        let mut token = used_token(PaymentTokenPayload {
            transaction_id: 7,
            package: Package::ProMonthly,
        });
        token.payload = None;

        assert!(PaymentService::parse_payload(&token).is_err());
    }
}
