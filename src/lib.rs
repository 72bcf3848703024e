#![forbid(unsafe_code)]

pub mod api;
pub mod config;
pub mod control_plane;
pub mod errors;
pub mod git;
pub mod llm;
pub mod models;
pub mod orchestrator;
pub mod persistence;
pub mod sandbox;
pub mod tools;
pub mod workflow;

pub use config::GlobalConfig;
pub use errors::{AppError, Result};
