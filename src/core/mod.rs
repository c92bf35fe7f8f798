//! Core types, configuration, errors and logging

pub mod types;
pub mod error;
pub mod logging;
pub mod config;
pub mod camera;

pub use types::*;
pub use error::Error;
pub use config::{StreamingConfig, HeightChannel};
pub use camera::Camera;
