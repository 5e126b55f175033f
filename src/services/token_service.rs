use crate::entities::{TokenPurpose, TokenStatus, token_entity as vt};
use crate::error::{AppError, AppResult};
use crate::utils::generate_token_string;
use chrono::{Duration, Utc};
use sea_orm::entity::prelude::*;
use sea_orm::sea_query::Expr;
use sea_orm::{ActiveEnum, DatabaseConnection, Set};

pub const PASSWORD_RESET_TTL_HOURS: i64 = 24;

/// Outcome of a redeem attempt that found a valid, correctly-bound token.
/// Lookup/binding failures are reported as errors instead.
#[derive(Debug)]
pub enum RedeemOutcome {
    /// This caller flipped the token pending -> used and owns the single
    /// right to apply side effects.
    Applied(vt::Model),
    /// The token was already used, by an earlier call or by a concurrent one
    /// that won the conditional update.
    AlreadyUsed(vt::Model),
}

#[derive(Clone)]
pub struct TokenService {
    pool: DatabaseConnection,
}

impl TokenService {
    pub fn new(pool: DatabaseConnection) -> Self {
        Self { pool }
    }

    /// Issue a fresh single-use token bound to `subject`. Password-reset
    /// tokens expire after 24h; payment tokens are bounded by their
    /// transaction's terminal state instead of wall-clock TTL.
    pub async fn issue(
        &self,
        purpose: TokenPurpose,
        subject: &str,
        payload: Option<Json>,
    ) -> AppResult<vt::Model> {
        let now = Utc::now();
        let expires_at = match purpose {
            TokenPurpose::PasswordReset => Some(now + Duration::hours(PASSWORD_RESET_TTL_HOURS)),
            TokenPurpose::PaymentConfirmation => None,
        };

        let token = vt::ActiveModel {
            token: Set(generate_token_string()),
            purpose: Set(purpose),
            subject: Set(subject.to_string()),
            payload: Set(payload),
            status: Set(TokenStatus::Pending),
            created_at: Set(now),
            expires_at: Set(expires_at),
            used_at: Set(None),
            ..Default::default()
        }
        .insert(&self.pool)
        .await?;

        Ok(token)
    }

    /// Redeem a token: at most one caller ever observes `Applied`, no matter
    /// how the calls interleave. The pending -> used flip is a single
    /// conditional update; everything before it is only a fast pre-check.
    pub async fn redeem(
        &self,
        token: &str,
        purpose: TokenPurpose,
        subject: &str,
    ) -> AppResult<RedeemOutcome> {
        let row = vt::Entity::find()
            .filter(vt::Column::Token.eq(token))
            .filter(vt::Column::Purpose.eq(purpose))
            .one(&self.pool)
            .await?
            .ok_or_else(|| AppError::NotFound("Token not found".to_string()))?;

        if row.subject != subject {
            return Err(AppError::SubjectMismatch);
        }

        if let Some(expires_at) = row.expires_at
            && expires_at < Utc::now()
        {
            return Err(AppError::TokenExpired);
        }

        if row.status == TokenStatus::Used {
            return Ok(RedeemOutcome::AlreadyUsed(row));
        }

        let used_at = Utc::now();
        let result = vt::Entity::update_many()
            .col_expr(vt::Column::Status, TokenStatus::Used.as_enum())
            .col_expr(vt::Column::UsedAt, Expr::value(Some(used_at)))
            .filter(vt::Column::Id.eq(row.id))
            .filter(vt::Column::Status.eq(TokenStatus::Pending))
            .exec(&self.pool)
            .await?;

        let mut row = row;
        row.status = TokenStatus::Used;

        if result.rows_affected == 0 {
            // Lost the race against a concurrent redeem of the same token.
            return Ok(RedeemOutcome::AlreadyUsed(row));
        }

        row.used_at = Some(used_at);
        Ok(RedeemOutcome::Applied(row))
    }

    pub async fn find(&self, token: &str) -> AppResult<Option<vt::Model>> {
        let row = vt::Entity::find()
            .filter(vt::Column::Token.eq(token))
            .one(&self.pool)
            .await?;
        Ok(row)
    }

    /// Remove a pending token that should never become redeemable, e.g. when
    /// delivering it to the user failed and the flow is rolled back.
    pub async fn discard(&self, token: &str) -> AppResult<()> {
        vt::Entity::delete_many()
            .filter(vt::Column::Token.eq(token))
            .filter(vt::Column::Status.eq(TokenStatus::Pending))
            .exec(&self.pool)
            .await?;
        Ok(())
    }

    /// Used payment tokens issued within the lookback window, oldest first.
    /// The reconciler walks these looking for transactions left pending.
    pub async fn used_payment_tokens_since(
        &self,
        lookback_days: i64,
    ) -> AppResult<Vec<vt::Model>> {
        use sea_orm::QueryOrder;

        let since = Utc::now() - Duration::days(lookback_days);
        let tokens = vt::Entity::find()
            .filter(vt::Column::Purpose.eq(TokenPurpose::PaymentConfirmation))
            .filter(vt::Column::Status.eq(TokenStatus::Used))
            .filter(vt::Column::CreatedAt.gte(since))
            .order_by_asc(vt::Column::CreatedAt)
            .all(&self.pool)
            .await?;
        Ok(tokens)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sea_orm::{DatabaseBackend, MockDatabase, MockExecResult};

    fn pending_token(subject: &str) -> vt::Model {
        vt::Model {
            id: 1,
            token: "tok-abc".to_string(),
            purpose: TokenPurpose::PaymentConfirmation,
            subject: subject.to_string(),
            payload: None,
            status: TokenStatus::Pending,
            created_at: Utc::now(),
            expires_at: None,
            used_at: None,
        }
    }

    #[tokio::test]
    async fn test_redeem_first_caller_wins() {
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([vec![pending_token("42")]])
            .append_exec_results([MockExecResult {
                last_insert_id: 0,
                rows_affected: 1,
            }])
            .into_connection();
        let service = TokenService::new(db);

        let outcome = service
            .redeem("tok-abc", TokenPurpose::PaymentConfirmation, "42")
            .await
            .unwrap();
        match outcome {
            RedeemOutcome::Applied(row) => {
                assert_eq!(row.status, TokenStatus::Used);
                assert!(row.used_at.is_some());
            }
            other => panic!("expected Applied, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_redeem_lost_race_reports_already_used() {
        // The row still reads pending but the conditional update hits zero
        // rows: a concurrent caller flipped it in between.
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([vec![pending_token("42")]])
            .append_exec_results([MockExecResult {
                last_insert_id: 0,
                rows_affected: 0,
            }])
            .into_connection();
        let service = TokenService::new(db);

        let outcome = service
            .redeem("tok-abc", TokenPurpose::PaymentConfirmation, "42")
            .await
            .unwrap();
        assert!(matches!(outcome, RedeemOutcome::AlreadyUsed(_)));
    }

    #[tokio::test]
    async fn test_redeem_used_token_is_already_used_without_update() {
        let mut row = pending_token("42");
        row.status = TokenStatus::Used;
        row.used_at = Some(Utc::now());

        // No exec results appended: the AlreadyUsed path must not write.
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([vec![row]])
            .into_connection();
        let service = TokenService::new(db);

        let outcome = service
            .redeem("tok-abc", TokenPurpose::PaymentConfirmation, "42")
            .await
            .unwrap();
        assert!(matches!(outcome, RedeemOutcome::AlreadyUsed(_)));
    }

    #[tokio::test]
    async fn test_redeem_unknown_token() {
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([Vec::<vt::Model>::new()])
            .into_connection();
        let service = TokenService::new(db);

        let err = service
            .redeem("missing", TokenPurpose::PaymentConfirmation, "42")
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_redeem_subject_mismatch() {
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([vec![pending_token("42")]])
            .into_connection();
        let service = TokenService::new(db);

        let err = service
            .redeem("tok-abc", TokenPurpose::PaymentConfirmation, "43")
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::SubjectMismatch));
    }

    #[tokio::test]
    async fn test_redeem_expired_token() {
        let mut row = pending_token("a@b.com");
        row.purpose = TokenPurpose::PasswordReset;
        row.expires_at = Some(Utc::now() - Duration::hours(1));

        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([vec![row]])
            .into_connection();
        let service = TokenService::new(db);

        let err = service
            .redeem("tok-abc", TokenPurpose::PasswordReset, "a@b.com")
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::TokenExpired));
    }
}
