pub mod affiliate_service;
pub mod auth_service;
pub mod payment_service;
pub mod subscription_service;
pub mod token_service;
pub mod transaction_service;

pub use affiliate_service::*;
pub use auth_service::*;
pub use payment_service::*;
pub use subscription_service::*;
pub use token_service::*;
pub use transaction_service::*;
