use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use sea_orm::{DeriveActiveEnum, EnumIter};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Purchasable subscription packages. Prices are in currency minor units.
#[derive(
    Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, ToSchema, DeriveActiveEnum, EnumIter,
)]
#[sea_orm(rs_type = "String", db_type = "Enum", enum_name = "package")]
#[serde(rename_all = "snake_case")]
pub enum Package {
    #[sea_orm(string_value = "pro_monthly")]
    ProMonthly,
    #[sea_orm(string_value = "pro_yearly")]
    ProYearly,
}

impl Package {
    pub fn price_minor_units(&self) -> i64 {
        match self {
            Package::ProMonthly => 3900,  // $39.00
            Package::ProYearly => 39000,  // $390.00
        }
    }

    pub fn duration_days(&self) -> i64 {
        match self {
            Package::ProMonthly => 30,
            Package::ProYearly => 365,
        }
    }
}

impl std::fmt::Display for Package {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Package::ProMonthly => write!(f, "pro_monthly"),
            Package::ProYearly => write!(f, "pro_yearly"),
        }
    }
}

#[derive(
    Debug, Clone, Serialize, Deserialize, PartialEq, Eq, ToSchema, DeriveActiveEnum, EnumIter,
)]
#[sea_orm(rs_type = "String", db_type = "Enum", enum_name = "transaction_status")]
#[serde(rename_all = "snake_case")]
pub enum TransactionStatus {
    #[sea_orm(string_value = "pending")]
    Pending,
    #[sea_orm(string_value = "success")]
    Success,
    #[sea_orm(string_value = "failed")]
    Failed,
}

impl std::fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransactionStatus::Pending => write!(f, "pending"),
            TransactionStatus::Success => write!(f, "success"),
            TransactionStatus::Failed => write!(f, "failed"),
        }
    }
}

/// Purchase attempt. `commission` and `affiliator_id` are snapshots taken at
/// open time; later edits to the affiliate's code never touch them.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Eq)]
#[sea_orm(table_name = "transactions")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    pub user_id: i64,
    pub package: Package,
    pub amount: i64,
    pub commission: i64,
    pub affiliate_code: Option<String>,
    pub affiliator_id: Option<i64>,
    pub status: TransactionStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
