pub mod health_service;
pub mod rest_seed;

pub use health_service::*;
pub use rest_seed::*;
