pub mod config;
pub mod errors;
pub mod jobs;
pub mod pipeline;
pub mod planner;
pub mod remote;
pub mod sandbox;
pub mod server;
pub mod telemetry;
