//! Streaming configuration

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::core::types::Result;

/// Which image channels carry the height value.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HeightChannel {
    /// Red channel only (also correct for single-channel images)
    #[default]
    Red,
    /// Mean of R, G and B
    RgbAverage,
}

/// Configuration shared by the region manager, every region and its loaders.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamingConfig {
    /// Root directory holding `low/`, `simple/` and the per-region tile folders
    pub data_root: PathBuf,
    /// World-space edge length of one chunk
    pub chunk_size: f32,
    /// Half the number of chunks along one region edge (a region holds `(2n)^2` chunks)
    pub half_chunks_per_side: u32,
    /// Multiplier from normalized `[0, 1]` height to world units
    pub height_scale: f32,
    /// Chunks flatter than this get their AABB widened vertically
    pub min_chunk_height_extent: f32,
    /// Number of fine tiles along one region edge
    pub tile_grid: u32,
    /// Seconds taken to cross-fade from coarse to fine heights
    pub blend_duration: f32,
    /// Capacity of the recently-evicted region cache
    pub cache_capacity: usize,
    /// Reset regions kept around for reuse at a new coordinate
    pub region_pool_capacity: usize,
    /// Capacity of the outer-ring placeholder cache
    pub simple_cache_capacity: usize,
    /// Channel(s) read from heightmap images
    pub height_channel: HeightChannel,
    /// Tiles decoded by the background streamer between cancellation checks
    pub tiles_per_task_yield: usize,
}

impl Default for StreamingConfig {
    fn default() -> Self {
        Self {
            data_root: PathBuf::from("assets/terrain"),
            chunk_size: 100.0,
            half_chunks_per_side: 10,
            height_scale: 400.0,
            min_chunk_height_extent: 1.0,
            tile_grid: 8,
            blend_duration: 2.0,
            cache_capacity: 12,
            region_pool_capacity: 4,
            simple_cache_capacity: 32,
            height_channel: HeightChannel::Red,
            tiles_per_task_yield: 1,
        }
    }
}

impl StreamingConfig {
    /// Default configuration rooted at `data_root`.
    pub fn with_root(data_root: impl Into<PathBuf>) -> Self {
        Self {
            data_root: data_root.into(),
            ..Default::default()
        }
    }

    /// Number of chunks along one region edge.
    pub fn chunks_per_side(&self) -> u32 {
        self.half_chunks_per_side * 2
    }

    /// Total chunk count of one region.
    pub fn chunk_count(&self) -> usize {
        let side = self.chunks_per_side() as usize;
        side * side
    }

    /// World-space edge length of one region.
    pub fn region_size(&self) -> f32 {
        self.chunk_size * self.chunks_per_side() as f32
    }

    pub fn from_json_str(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn from_json_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        let config = Self::from_json_str(&text)?;
        log::info!("Loaded streaming config from {}", path.display());
        Ok(config)
    }

    pub fn to_json_string(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}
