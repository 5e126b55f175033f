pub mod email;
pub mod gateway;

pub use email::*;
pub use gateway::*;
