pub mod phoenix_client;
pub mod protocol;

pub use phoenix_client::*;
