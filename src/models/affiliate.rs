use crate::entities::affiliate_entity;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct AffiliateResponse {
    pub code: String,
    pub created_at: DateTime<Utc>,
}

impl From<affiliate_entity::Model> for AffiliateResponse {
    fn from(a: affiliate_entity::Model) -> Self {
        Self {
            code: a.code,
            created_at: a.created_at,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct UpdateAffiliateCodeRequest {
    pub code: String,
}
