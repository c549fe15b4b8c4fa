pub mod activity_handlers;
pub mod ops_handlers;

pub use activity_handlers::*;
pub use ops_handlers::*;
