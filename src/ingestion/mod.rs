pub mod pipeline;
pub mod ws_listener;

pub use pipeline::{Pipeline, PipelineOutcome};
pub use ws_listener::run_ws_listener;
