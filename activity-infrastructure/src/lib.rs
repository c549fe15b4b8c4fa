pub mod config;
pub mod realtime;
pub mod repositories;
pub mod services;

pub use config::*;
pub use realtime::*;
pub use repositories::*;
pub use services::*;
