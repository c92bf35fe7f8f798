//! Renderer entry point consumed by the region manager

use crate::core::Camera;
use crate::core::Result;
use crate::math::Aabb;
use crate::streaming::chunk::RegionItem;
use crate::streaming::coord::RegionCoord;

/// Opaque id of a shader program owned by the renderer
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ShaderHandle(pub u32);

/// Cross-fade weights handed to the shader layer
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BlendParams {
    /// Weight of the fine heights, `0` = coarse only
    pub factor: f32,
    pub blending: bool,
    pub high_res_ready: bool,
}

impl Default for BlendParams {
    fn default() -> Self {
        Self {
            factor: 0.0,
            blending: false,
            high_res_ready: false,
        }
    }
}

/// Everything visible in one region this frame
#[derive(Clone, Copy, Debug)]
pub struct RenderBatch<'a> {
    pub coord: RegionCoord,
    pub aabbs: &'a [Aabb],
    pub items: &'a [RegionItem],
    pub blend: BlendParams,
}

/// Draw submission. Implemented by the GPU renderer; headless runs use
/// [`StatsRenderer`].
pub trait TerrainRenderer {
    fn draw_region(&mut self, shader: ShaderHandle, batch: &RenderBatch<'_>, camera: &Camera) -> Result<()>;

    /// Outer-ring placeholder quad
    fn draw_placeholder(&mut self, _shader: ShaderHandle, _coord: RegionCoord, _aabb: &Aabb, _camera: &Camera) -> Result<()> {
        Ok(())
    }
}

/// Renderer that only counts what it is asked to draw
#[derive(Clone, Debug, Default)]
pub struct StatsRenderer {
    pub regions: usize,
    pub boxes: usize,
    pub placeholders: usize,
    pub last_blend: Option<BlendParams>,
}

impl StatsRenderer {
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

impl TerrainRenderer for StatsRenderer {
    fn draw_region(&mut self, _shader: ShaderHandle, batch: &RenderBatch<'_>, _camera: &Camera) -> Result<()> {
        self.regions += 1;
        self.boxes += batch.aabbs.len();
        self.last_blend = Some(batch.blend);
        Ok(())
    }

    fn draw_placeholder(&mut self, _shader: ShaderHandle, _coord: RegionCoord, _aabb: &Aabb, _camera: &Camera) -> Result<()> {
        self.placeholders += 1;
        Ok(())
    }
}
