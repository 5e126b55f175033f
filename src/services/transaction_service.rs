use crate::entities::{Package, TransactionStatus, transaction_entity as tx};
use crate::error::{AppError, AppResult};
use crate::services::AffiliateService;
use chrono::Utc;
use sea_orm::entity::prelude::*;
use sea_orm::sea_query::Expr;
use sea_orm::{ActiveEnum, ConnectionTrait, DatabaseConnection, QueryOrder, Set};

/// Commission share: 25% of the amount, rounded half-up to the minor unit,
/// computed once when the transaction is opened and never recomputed.
pub fn commission_minor_units(amount: i64) -> i64 {
    (amount * 25 + 50) / 100
}

#[derive(Clone)]
pub struct TransactionService {
    pool: DatabaseConnection,
    affiliate_service: AffiliateService,
}

impl TransactionService {
    pub fn new(pool: DatabaseConnection, affiliate_service: AffiliateService) -> Self {
        Self {
            pool,
            affiliate_service,
        }
    }

    /// Open a pending purchase attempt. The affiliate code, its owner and the
    /// commission are snapshotted here; later edits to the affiliate's code
    /// never retroactively change this row's attribution.
    pub async fn open(
        &self,
        user_id: i64,
        package: Package,
        affiliate_code: Option<&str>,
    ) -> AppResult<tx::Model> {
        let amount = package.price_minor_units();
        let commission = commission_minor_units(amount);

        let (code_snapshot, affiliator_id) = match affiliate_code {
            Some(code) => match self.affiliate_service.get_by_code(code).await? {
                Some(affiliate) => (Some(affiliate.code), Some(affiliate.user_id)),
                // Unknown code: recorded as unattributed rather than rejected.
                None => (None, None),
            },
            None => (None, None),
        };

        let transaction = tx::ActiveModel {
            user_id: Set(user_id),
            package: Set(package),
            amount: Set(amount),
            commission: Set(commission),
            affiliate_code: Set(code_snapshot),
            affiliator_id: Set(affiliator_id),
            status: Set(TransactionStatus::Pending),
            created_at: Set(Utc::now()),
            updated_at: Set(None),
            ..Default::default()
        }
        .insert(&self.pool)
        .await?;

        Ok(transaction)
    }

    pub async fn get_by_id(&self, transaction_id: i64) -> AppResult<tx::Model> {
        tx::Entity::find_by_id(transaction_id)
            .one(&self.pool)
            .await?
            .ok_or_else(|| AppError::NotFound("Transaction not found".to_string()))
    }

    /// One-way pending -> terminal transition. Finalizing an already-terminal
    /// transaction affects zero rows and reports `false`; it never
    /// double-applies and never flips a terminal state back.
    pub async fn finalize(
        &self,
        transaction_id: i64,
        outcome: TransactionStatus,
    ) -> AppResult<bool> {
        Self::finalize_on(&self.pool, transaction_id, outcome).await
    }

    /// Same as [`finalize`](Self::finalize) but running on a caller-provided
    /// connection, so the orchestrator can group it with the subscription
    /// write in one database transaction.
    pub async fn finalize_on<C: ConnectionTrait>(
        db: &C,
        transaction_id: i64,
        outcome: TransactionStatus,
    ) -> AppResult<bool> {
        if outcome == TransactionStatus::Pending {
            return Err(AppError::ValidationError(
                "Cannot finalize a transaction to pending".to_string(),
            ));
        }

        let result = tx::Entity::update_many()
            .col_expr(tx::Column::Status, outcome.as_enum())
            .col_expr(tx::Column::UpdatedAt, Expr::value(Some(Utc::now())))
            .filter(tx::Column::Id.eq(transaction_id))
            .filter(tx::Column::Status.eq(TransactionStatus::Pending))
            .exec(db)
            .await?;

        Ok(result.rows_affected > 0)
    }

    /// A user's own purchase attempts, newest first.
    pub async fn list_for_user(&self, user_id: i64) -> AppResult<Vec<tx::Model>> {
        let transactions = tx::Entity::find()
            .filter(tx::Column::UserId.eq(user_id))
            .order_by_desc(tx::Column::CreatedAt)
            .all(&self.pool)
            .await?;
        Ok(transactions)
    }

    /// Transactions this affiliate originated, for commission display.
    pub async fn list_for_affiliator(&self, affiliator_id: i64) -> AppResult<Vec<tx::Model>> {
        let transactions = tx::Entity::find()
            .filter(tx::Column::AffiliatorId.eq(affiliator_id))
            .order_by_desc(tx::Column::CreatedAt)
            .all(&self.pool)
            .await?;
        Ok(transactions)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sea_orm::{DatabaseBackend, MockDatabase, MockExecResult};

    #[test]
    fn test_commission_is_quarter_of_amount() {
        assert_eq!(commission_minor_units(10000), 2500); // $100.00 -> $25.00
        assert_eq!(commission_minor_units(39000), 9750);
        assert_eq!(commission_minor_units(0), 0);
    }

    #[test]
    fn test_commission_rounds_half_up() {
        assert_eq!(commission_minor_units(101), 25); // 25.25 -> 25
        assert_eq!(commission_minor_units(102), 26); // 25.5 -> 26
        assert_eq!(commission_minor_units(103), 26); // 25.75 -> 26
    }

    #[tokio::test]
    async fn test_finalize_flips_pending_row() {
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_exec_results([MockExecResult {
                last_insert_id: 0,
                rows_affected: 1,
            }])
            .into_connection();

        let applied = TransactionService::finalize_on(&db, 1, TransactionStatus::Success)
            .await
            .unwrap();
        assert!(applied);
    }

    #[tokio::test]
    async fn test_finalize_terminal_row_is_noop() {
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_exec_results([MockExecResult {
                last_insert_id: 0,
                rows_affected: 0,
            }])
            .into_connection();

        let applied = TransactionService::finalize_on(&db, 1, TransactionStatus::Success)
            .await
            .unwrap();
        assert!(!applied);
    }

    #[tokio::test]
    async fn test_finalize_to_pending_is_rejected() {
        let db = MockDatabase::new(DatabaseBackend::Postgres).into_connection();

        let err = TransactionService::finalize_on(&db, 1, TransactionStatus::Pending)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::ValidationError(_)));
    }
}
