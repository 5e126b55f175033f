pub mod affiliates;
pub mod subscriptions;
pub mod transactions;
pub mod users;
pub mod verification_tokens;

pub use affiliates as affiliate_entity;
pub use subscriptions as subscription_entity;
pub use transactions as transaction_entity;
pub use users as user_entity;
pub use verification_tokens as token_entity;

pub use subscriptions::Plan;
pub use transactions::{Package, TransactionStatus};
pub use verification_tokens::{TokenPurpose, TokenStatus};
