use crate::entities::{Package, Plan, subscription_entity as sub};
use crate::error::AppResult;
use crate::models::SubscriptionResponse;
use chrono::{DateTime, Duration, Utc};
use sea_orm::entity::prelude::*;
use sea_orm::{ConnectionTrait, DatabaseConnection, Set};

/// Renewal extends the current validity instead of restarting it: paying
/// before the old period ends must not shorten what was already paid for.
pub fn next_valid_until(
    now: DateTime<Utc>,
    current: Option<DateTime<Utc>>,
    package: Package,
) -> DateTime<Utc> {
    let base = match current {
        Some(valid_until) if valid_until > now => valid_until,
        _ => now,
    };
    base + Duration::days(package.duration_days())
}

/// Read-time derivation of the caller-visible plan. A stored pro row whose
/// validity has lapsed reads as free; nothing is written back.
pub fn effective_plan(row: Option<&sub::Model>, now: DateTime<Utc>) -> SubscriptionResponse {
    match row {
        Some(model) if model.plan == Plan::Pro => match model.valid_until {
            Some(valid_until) if valid_until > now => SubscriptionResponse {
                plan: Plan::Pro,
                valid_until: Some(valid_until),
            },
            _ => SubscriptionResponse::free(),
        },
        _ => SubscriptionResponse::free(),
    }
}

#[derive(Clone)]
pub struct SubscriptionService {
    pool: DatabaseConnection,
}

impl SubscriptionService {
    pub fn new(pool: DatabaseConnection) -> Self {
        Self { pool }
    }

    pub async fn get_plan(&self, user_id: i64) -> AppResult<SubscriptionResponse> {
        let row = sub::Entity::find()
            .filter(sub::Column::UserId.eq(user_id))
            .one(&self.pool)
            .await?;
        Ok(effective_plan(row.as_ref(), Utc::now()))
    }

    pub async fn upgrade_to_pro(&self, user_id: i64, package: Package) -> AppResult<sub::Model> {
        Self::upgrade_to_pro_on(&self.pool, user_id, package).await
    }

    /// Set the plan to pro and push `valid_until` out by the package
    /// duration, extending any unexpired remainder. Runs on a caller-provided
    /// connection so the orchestrator can group it with the transaction
    /// finalize. Callers are responsible for invoking this once per confirmed
    /// purchase; the token redeem is what enforces that upstream.
    pub async fn upgrade_to_pro_on<C: ConnectionTrait>(
        db: &C,
        user_id: i64,
        package: Package,
    ) -> AppResult<sub::Model> {
        let now = Utc::now();
        let existing = sub::Entity::find()
            .filter(sub::Column::UserId.eq(user_id))
            .one(db)
            .await?;

        let model = match existing {
            Some(row) => {
                let valid_until = next_valid_until(now, row.valid_until, package);
                let mut active: sub::ActiveModel = row.into();
                active.plan = Set(Plan::Pro);
                active.valid_until = Set(Some(valid_until));
                active.updated_at = Set(Some(now));
                active.update(db).await?
            }
            None => {
                sub::ActiveModel {
                    user_id: Set(user_id),
                    plan: Set(Plan::Pro),
                    valid_until: Set(Some(next_valid_until(now, None, package))),
                    created_at: Set(now),
                    updated_at: Set(None),
                    ..Default::default()
                }
                .insert(db)
                .await?
            }
        };

        Ok(model)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pro_row(valid_until: Option<DateTime<Utc>>) -> sub::Model {
        sub::Model {
            id: 1,
            user_id: 42,
            plan: Plan::Pro,
            valid_until,
            created_at: Utc::now(),
            updated_at: None,
        }
    }

    #[test]
    fn test_early_renewal_extends_from_current_expiry() {
        let now = Utc::now();
        let t0 = now + Duration::days(10);

        let extended = next_valid_until(now, Some(t0), Package::ProMonthly);
        assert_eq!(extended, t0 + Duration::days(30));
    }

    #[test]
    fn test_renewal_after_expiry_starts_from_now() {
        let now = Utc::now();
        let lapsed = now - Duration::days(5);

        let extended = next_valid_until(now, Some(lapsed), Package::ProMonthly);
        assert_eq!(extended, now + Duration::days(30));
    }

    #[test]
    fn test_first_upgrade_starts_from_now() {
        let now = Utc::now();
        assert_eq!(
            next_valid_until(now, None, Package::ProYearly),
            now + Duration::days(365)
        );
    }

    #[test]
    fn test_effective_plan_active_pro() {
        let now = Utc::now();
        let row = pro_row(Some(now + Duration::days(3)));

        let plan = effective_plan(Some(&row), now);
        assert_eq!(plan.plan, Plan::Pro);
        assert_eq!(plan.valid_until, row.valid_until);
    }

    #[test]
    fn test_effective_plan_expired_pro_reads_free() {
        let now = Utc::now();
        let row = pro_row(Some(now - Duration::hours(1)));

        let plan = effective_plan(Some(&row), now);
        assert_eq!(plan.plan, Plan::Free);
        assert!(plan.valid_until.is_none());
    }

    #[test]
    fn test_effective_plan_missing_row_reads_free() {
        let plan = effective_plan(None, Utc::now());
        assert_eq!(plan.plan, Plan::Free);
    }

    #[test]
    fn test_effective_plan_pro_without_expiry_reads_free() {
        // A pro row must carry a validity; a null one grants nothing.
        let row = pro_row(None);
        let plan = effective_plan(Some(&row), Utc::now());
        assert_eq!(plan.plan, Plan::Free);
    }
}
