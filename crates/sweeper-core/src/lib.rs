//! `sweeper-core` — configuration and shared error types for the sweeper
//! workspace.

pub mod config;
pub mod error;

pub use config::SweeperConfig;
pub use error::{Result, SweeperError};
