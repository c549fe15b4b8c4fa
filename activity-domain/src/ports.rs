// Port traits (interfaces)
// Define what the domain needs from the realtime backend and seed providers

pub mod realtime;
pub mod seed;
pub mod services;

pub use realtime::*;
pub use seed::*;
pub use services::*;
