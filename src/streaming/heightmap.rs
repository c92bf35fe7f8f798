//! Heightmap buffers and on-disk layout
//!
//! Layout under the data root:
//! - `low/region{X}x{Y}.png` coarse whole-region heightmap
//! - `region_{X}x{Y}_tiles/tile_{tx}_{ty}.png` fine tiles
//! - `simple/region{X}x{Y}.png` outer-ring placeholder

use std::path::{Path, PathBuf};

use image::{GrayImage, Luma};

use crate::core::config::HeightChannel;
use crate::core::{Error, Result};
use crate::streaming::coord::RegionCoord;

/// Path of the coarse heightmap for a region
pub fn coarse_path(root: &Path, coord: RegionCoord) -> PathBuf {
    root.join("low").join(format!("region{}.png", coord))
}

/// Directory holding a region's fine tiles
pub fn tile_dir(root: &Path, coord: RegionCoord) -> PathBuf {
    root.join(format!("region_{}x{}_tiles", coord.x, coord.y))
}

/// Path of one fine tile
pub fn tile_path(root: &Path, coord: RegionCoord, tx: u32, ty: u32) -> PathBuf {
    tile_dir(root, coord).join(format!("tile_{}_{}.png", tx, ty))
}

/// Path of the outer-ring placeholder heightmap
pub fn simple_path(root: &Path, coord: RegionCoord) -> PathBuf {
    root.join("simple").join(format!("region{}.png", coord))
}

/// Existing tile positions of a region, row-major (`ty` outer).
pub fn list_tiles(root: &Path, coord: RegionCoord, tile_grid: u32) -> Vec<(u32, u32)> {
    let mut tiles = Vec::new();
    for ty in 0..tile_grid {
        for tx in 0..tile_grid {
            if tile_path(root, coord, tx, ty).exists() {
                tiles.push((tx, ty));
            }
        }
    }
    tiles
}

/// Row-major grid of normalized heights in `[0, 1]`.
///
/// Row 0 is the region's minimum y, column 0 its minimum x.
#[derive(Clone, Debug, PartialEq)]
pub struct Heightmap {
    width: u32,
    height: u32,
    data: Vec<f32>,
}

impl Heightmap {
    /// Zero-filled heightmap
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            data: vec![0.0; (width * height) as usize],
        }
    }

    pub fn from_fn(width: u32, height: u32, mut f: impl FnMut(u32, u32) -> f32) -> Self {
        let mut data = Vec::with_capacity((width * height) as usize);
        for y in 0..height {
            for x in 0..width {
                data.push(f(x, y));
            }
        }
        Self { width, height, data }
    }

    pub fn from_raw(width: u32, height: u32, data: Vec<f32>) -> Result<Self> {
        if data.len() != (width * height) as usize {
            return Err(Error::MalformedInput(format!(
                "heightmap {}x{} needs {} samples, got {}",
                width,
                height,
                width * height,
                data.len()
            )));
        }
        Ok(Self { width, height, data })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn is_square(&self) -> bool {
        self.width == self.height
    }

    pub fn data(&self) -> &[f32] {
        &self.data
    }

    /// One row of samples
    pub fn row(&self, y: u32) -> &[f32] {
        let start = (y * self.width) as usize;
        &self.data[start..start + self.width as usize]
    }

    pub fn get(&self, x: u32, y: u32) -> f32 {
        self.data[(y * self.width + x) as usize]
    }

    pub fn set(&mut self, x: u32, y: u32, value: f32) {
        self.data[(y * self.width + x) as usize] = value;
    }

    /// Copy `src` into this buffer with its top-left at `(x0, y0)`. Parts
    /// falling outside are dropped.
    pub fn blit(&mut self, src: &Heightmap, x0: u32, y0: u32) {
        let w = src.width.min(self.width.saturating_sub(x0));
        let h = src.height.min(self.height.saturating_sub(y0));
        for y in 0..h {
            let dst_start = ((y0 + y) * self.width + x0) as usize;
            let src_start = (y * src.width) as usize;
            self.data[dst_start..dst_start + w as usize]
                .copy_from_slice(&src.data[src_start..src_start + w as usize]);
        }
    }

    /// Smallest and largest sample
    pub fn min_max(&self) -> (f32, f32) {
        self.data
            .iter()
            .fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), &v| (lo.min(v), hi.max(v)))
    }

    /// Bilinear sample at pixel-space `(px, py)`; callers keep the position
    /// inside `[0, size - 1]`.
    pub fn sample_bilinear(&self, px: f32, py: f32) -> f32 {
        let max_x = self.width.saturating_sub(1);
        let max_y = self.height.saturating_sub(1);
        let x0 = (px.floor().max(0.0) as u32).min(max_x);
        let y0 = (py.floor().max(0.0) as u32).min(max_y);
        let x1 = (x0 + 1).min(max_x);
        let y1 = (y0 + 1).min(max_y);
        let s = (px - x0 as f32).clamp(0.0, 1.0);
        let t = (py - y0 as f32).clamp(0.0, 1.0);

        let h00 = self.get(x0, y0);
        let h10 = self.get(x1, y0);
        let h01 = self.get(x0, y1);
        let h11 = self.get(x1, y1);

        let bottom = h00 + (h10 - h00) * s;
        let top = h01 + (h11 - h01) * s;
        bottom + (top - bottom) * t
    }

    /// Samples scaled to world heights, ready to stage for a texture upload
    pub fn scaled(&self, scale: f32) -> Vec<f32> {
        self.data.iter().map(|v| v * scale).collect()
    }
}

/// Decode an encoded image into normalized heights.
pub fn decode_heightmap(bytes: &[u8], channel: HeightChannel) -> Result<Heightmap> {
    let image = image::load_from_memory(bytes)?.to_rgb8();
    let (width, height) = image.dimensions();
    let data = image
        .pixels()
        .map(|p| match channel {
            HeightChannel::Red => p.0[0] as f32 / 255.0,
            HeightChannel::RgbAverage => {
                (p.0[0] as f32 + p.0[1] as f32 + p.0[2] as f32) / (3.0 * 255.0)
            }
        })
        .collect();
    Ok(Heightmap { width, height, data })
}

/// Read and decode a heightmap, `Ok(None)` when the file does not exist.
pub fn read_heightmap(path: &Path, channel: HeightChannel) -> Result<Option<Heightmap>> {
    let bytes = match std::fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    decode_heightmap(&bytes, channel).map(Some)
}

/// Async variant of [`read_heightmap`]: file I/O on tokio, decode on the
/// blocking pool.
pub async fn read_heightmap_async(path: PathBuf, channel: HeightChannel) -> Result<Option<Heightmap>> {
    let bytes = match tokio::fs::read(&path).await {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    let decoded = tokio::task::spawn_blocking(move || decode_heightmap(&bytes, channel))
        .await
        .map_err(|e| Error::Concurrency(format!("heightmap decode task failed: {}", e)))??;
    Ok(Some(decoded))
}

/// Write a heightmap as an 8-bit grayscale PNG, creating parent directories.
pub fn save_heightmap(path: &Path, heightmap: &Heightmap) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let image = GrayImage::from_fn(heightmap.width, heightmap.height, |x, y| {
        Luma([(heightmap.get(x, y).clamp(0.0, 1.0) * 255.0).round() as u8])
    });
    image.save(path)?;
    Ok(())
}
