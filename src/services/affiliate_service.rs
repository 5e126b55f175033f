use crate::entities::{affiliate_entity as aff, user_entity as users};
use crate::error::{AppError, AppResult};
use crate::utils::{
    affiliate_code_candidate, perturb_affiliate_code, random_affiliate_code,
    validate_affiliate_code,
};
use chrono::Utc;
use sea_orm::entity::prelude::*;
use sea_orm::{DatabaseConnection, Set, SqlErr};

/// Bounded perturbation attempts before falling back to a fully random code.
const MAX_CANDIDATE_ATTEMPTS: usize = 10;

#[derive(Clone)]
pub struct AffiliateService {
    pool: DatabaseConnection,
}

impl AffiliateService {
    pub fn new(pool: DatabaseConnection) -> Self {
        Self { pool }
    }

    pub async fn get_by_user(&self, user_id: i64) -> AppResult<Option<aff::Model>> {
        let affiliate = aff::Entity::find()
            .filter(aff::Column::UserId.eq(user_id))
            .one(&self.pool)
            .await?;
        Ok(affiliate)
    }

    pub async fn get_by_code(&self, code: &str) -> AppResult<Option<aff::Model>> {
        let affiliate = aff::Entity::find()
            .filter(aff::Column::Code.eq(code.to_ascii_uppercase()))
            .one(&self.pool)
            .await?;
        Ok(affiliate)
    }

    /// The user's affiliate row, created lazily on first request. Calling
    /// this twice returns the same code both times.
    pub async fn get_or_create_for_user(&self, user_id: i64) -> AppResult<aff::Model> {
        if let Some(existing) = self.get_by_user(user_id).await? {
            return Ok(existing);
        }

        let user = users::Entity::find_by_id(user_id)
            .one(&self.pool)
            .await?
            .ok_or_else(|| AppError::NotFound("User not found".to_string()))?;

        let code = self.generate_unique_code(&user.email).await?;
        match self.create(user_id, &code).await {
            Ok(affiliate) => Ok(affiliate),
            // A concurrent request for the same user or a late code collision
            // slipped past the pre-check; retry generation once.
            Err(AppError::DuplicateCode) => {
                if let Some(existing) = self.get_by_user(user_id).await? {
                    return Ok(existing);
                }
                let code = self.generate_unique_code(&user.email).await?;
                self.create(user_id, &code).await
            }
            Err(e) => Err(e),
        }
    }

    /// Derive a 7-character code from the seed, perturbing the tail on
    /// collisions up to a bounded number of attempts, then give up on the
    /// seed and go fully random. The pre-check here is best effort; the
    /// unique index on the code column is what actually guarantees
    /// uniqueness under concurrency.
    pub async fn generate_unique_code(&self, seed: &str) -> AppResult<String> {
        let mut candidate = affiliate_code_candidate(seed);

        for attempt in 0..MAX_CANDIDATE_ATTEMPTS {
            if self.get_by_code(&candidate).await?.is_none() {
                return Ok(candidate);
            }
            log::debug!("Affiliate code candidate {candidate} taken (attempt {attempt})");
            candidate = perturb_affiliate_code(&candidate);
        }

        loop {
            let candidate = random_affiliate_code();
            if self.get_by_code(&candidate).await?.is_none() {
                return Ok(candidate);
            }
        }
    }

    /// Insert the row; a unique-constraint violation surfaces as
    /// `DuplicateCode` so callers can retry generation.
    pub async fn create(&self, user_id: i64, code: &str) -> AppResult<aff::Model> {
        let result = aff::ActiveModel {
            user_id: Set(user_id),
            code: Set(code.to_ascii_uppercase()),
            created_at: Set(Utc::now()),
            ..Default::default()
        }
        .insert(&self.pool)
        .await;

        match result {
            Ok(affiliate) => Ok(affiliate),
            Err(e) => {
                if matches!(e.sql_err(), Some(SqlErr::UniqueConstraintViolation(_))) {
                    Err(AppError::DuplicateCode)
                } else {
                    Err(e.into())
                }
            }
        }
    }

    /// Replace the user's code with one they picked themselves. The code is
    /// format-validated and must not belong to anyone else.
    pub async fn update_code(&self, user_id: i64, new_code: &str) -> AppResult<aff::Model> {
        validate_affiliate_code(new_code)?;
        let new_code = new_code.to_ascii_uppercase();

        if let Some(owner) = self.get_by_code(&new_code).await? {
            if owner.user_id == user_id {
                return Ok(owner);
            }
            return Err(AppError::CodeTaken);
        }

        let existing = self.get_by_user(user_id).await?;
        let result = match existing {
            Some(affiliate) => {
                let mut active: aff::ActiveModel = affiliate.into();
                active.code = Set(new_code.clone());
                active.update(&self.pool).await
            }
            // No row yet: claiming a code is also how a first code can be
            // assigned explicitly.
            None => {
                aff::ActiveModel {
                    user_id: Set(user_id),
                    code: Set(new_code.clone()),
                    created_at: Set(Utc::now()),
                    ..Default::default()
                }
                .insert(&self.pool)
                .await
            }
        };

        match result {
            Ok(affiliate) => Ok(affiliate),
            Err(e) => {
                if matches!(e.sql_err(), Some(SqlErr::UniqueConstraintViolation(_))) {
                    Err(AppError::CodeTaken)
                } else {
                    Err(e.into())
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sea_orm::{DatabaseBackend, MockDatabase, MockExecResult};

    fn affiliate_row(user_id: i64, code: &str) -> aff::Model {
        aff::Model {
            id: 1,
            user_id,
            code: code.to_string(),
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_get_or_create_returns_existing_row() {
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([vec![affiliate_row(42, "JANEDOE")]])
            .into_connection();
        let service = AffiliateService::new(db);

        let affiliate = service.get_or_create_for_user(42).await.unwrap();
        assert_eq!(affiliate.code, "JANEDOE");
    }

    #[tokio::test]
    async fn test_generate_unique_code_perturbs_on_collision() {
        // First candidate JANEDOE is taken, the perturbed one is free.
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([
                vec![affiliate_row(7, "JANEDOE")],
                Vec::<aff::Model>::new(),
            ])
            .into_connection();
        let service = AffiliateService::new(db);

        let code = service.generate_unique_code("jane.doe@example.com").await.unwrap();
        assert_eq!(code.len(), 7);
        assert_ne!(code, "JANEDOE");
        assert!(code.starts_with("JANED"));
    }

    #[tokio::test]
    async fn test_update_code_rejects_taken_code() {
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([vec![affiliate_row(7, "COOLCAT")]])
            .into_connection();
        let service = AffiliateService::new(db);

        let err = service.update_code(42, "coolcat").await.unwrap_err();
        assert!(matches!(err, AppError::CodeTaken));
    }

    #[tokio::test]
    async fn test_update_code_rejects_malformed_code() {
        let db = MockDatabase::new(DatabaseBackend::Postgres).into_connection();
        let service = AffiliateService::new(db);

        assert!(matches!(
            service.update_code(42, "short").await.unwrap_err(),
            AppError::ValidationError(_)
        ));
        assert!(matches!(
            service.update_code(42, "has-dash").await.unwrap_err(),
            AppError::ValidationError(_)
        ));
    }

    #[tokio::test]
    async fn test_update_code_is_idempotent_for_own_code() {
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([vec![affiliate_row(42, "COOLCAT")]])
            .into_connection();
        let service = AffiliateService::new(db);

        let affiliate = service.update_code(42, "COOLCAT").await.unwrap();
        assert_eq!(affiliate.user_id, 42);
    }

    #[tokio::test]
    async fn test_update_code_replaces_existing_row() {
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([
                Vec::<aff::Model>::new(),               // code not taken
                vec![affiliate_row(42, "OLDCODE")],     // existing row
                vec![affiliate_row(42, "NEWCODE")],     // row after update
            ])
            .append_exec_results([MockExecResult {
                last_insert_id: 1,
                rows_affected: 1,
            }])
            .into_connection();
        let service = AffiliateService::new(db);

        let affiliate = service.update_code(42, "NEWCODE").await.unwrap();
        assert_eq!(affiliate.code, "NEWCODE");
    }
}
