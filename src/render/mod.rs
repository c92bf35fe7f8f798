//! Render-side collaborators: upload staging, height textures, draw entry point

pub mod context;
pub mod texture;
pub mod renderer;

pub use context::{PendingUpload, Resolution, TerrainRenderContext, UploadQueue};
pub use texture::{CpuHeightTexture, CpuTextureSink, GpuHeightTexture, GpuTextureSink, HeightTexture, HeightTextureSink};
pub use renderer::{BlendParams, RenderBatch, ShaderHandle, StatsRenderer, TerrainRenderer};
