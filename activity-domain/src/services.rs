// Pure domain services: the resource mapping table and the bounded feed

pub mod feed;
pub mod mapping;

pub use feed::*;
pub use mapping::*;
