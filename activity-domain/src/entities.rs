// Domain entities

pub mod activity_item;
pub mod raw_record;
pub mod runtime_config;

pub use activity_item::*;
pub use raw_record::*;
pub use runtime_config::*;
