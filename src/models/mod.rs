pub mod affiliate;
pub mod auth;
pub mod common;
pub mod payment;

pub use affiliate::*;
pub use auth::*;
pub use common::*;
pub use payment::*;
