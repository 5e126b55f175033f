pub mod codes;
pub mod jwt;
pub mod password;

pub use codes::*;
pub use jwt::*;
pub use password::*;
