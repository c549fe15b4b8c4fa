pub mod context;
pub mod lifecycle;
pub mod telemetry;

pub use lifecycle::{run_standalone, run_with_config, start_embedded, FeedServiceHandle};
