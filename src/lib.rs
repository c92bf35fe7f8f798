//! Terrastream - region streaming and hierarchical culling for tiled terrain

pub mod core;
pub mod math;
pub mod culling;
pub mod streaming;
pub mod render;
