// Domain value objects
pub mod activity_kind;
pub mod identifiers;
pub mod resource_watch;

pub use activity_kind::*;
pub use identifiers::*;
pub use resource_watch::*;
