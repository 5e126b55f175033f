pub mod affiliate;
pub mod auth;
pub mod payment;
pub mod webhook;

pub use affiliate::affiliate_config;
pub use auth::auth_config;
pub use payment::payment_config;
pub use webhook::webhook_config;
