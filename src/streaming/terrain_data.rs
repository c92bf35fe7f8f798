//! Dual-resolution height storage for one region
//!
//! The coarse heightmap covers the whole region in a single image and is
//! read in one go. The fine heightmap is assembled from a `tile_grid` x
//! `tile_grid` set of tiles pulled one at a time from a pending queue. Per-chunk
//! height bounds come from the coarse image so chunk boxes can be built
//! before any fine data exists.

use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, PoisonError};

use rayon::prelude::*;

use crate::core::config::StreamingConfig;
use crate::core::types::{UVec2, Vec2};
use crate::core::{Error, Result};
use crate::render::context::{PendingUpload, Resolution, UploadQueue};
use crate::streaming::coord::RegionCoord;
use crate::streaming::heightmap::{self, Heightmap};

/// Inclusive pixel span of chunk `chunk` along an axis of `pixels` samples.
/// Neighbouring chunks share their edge pixel.
pub fn chunk_pixel_span(chunk: u32, chunks: u32, pixels: u32) -> (u32, u32) {
    let last = pixels.saturating_sub(1);
    let start = (chunk * pixels / chunks).min(last);
    let end = ((chunk + 1) * pixels / chunks).min(last);
    (start, end)
}

/// Per-chunk `(min, max)` of normalized heights, row-major by chunk.
///
/// Runs in parallel over pixel rows; each chunk row has its own lock.
pub fn compute_chunk_bounds(map: &Heightmap, chunks_per_side: u32) -> Vec<(f32, f32)> {
    let cps = chunks_per_side as usize;
    let spans_x: Vec<(u32, u32)> = (0..chunks_per_side)
        .map(|cx| chunk_pixel_span(cx, chunks_per_side, map.width()))
        .collect();
    let spans_y: Vec<(u32, u32)> = (0..chunks_per_side)
        .map(|cy| chunk_pixel_span(cy, chunks_per_side, map.height()))
        .collect();
    let rows: Vec<Mutex<Vec<(f32, f32)>>> = (0..cps)
        .map(|_| Mutex::new(vec![(f32::INFINITY, f32::NEG_INFINITY); cps]))
        .collect();

    (0..map.height()).into_par_iter().for_each(|py| {
        let row = map.row(py);
        let local: Vec<(f32, f32)> = spans_x
            .iter()
            .map(|&(start, end)| {
                row[start as usize..=end as usize]
                    .iter()
                    .fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), &v| (lo.min(v), hi.max(v)))
            })
            .collect();

        for (cy, &(start, end)) in spans_y.iter().enumerate() {
            if py < start || py > end {
                continue;
            }
            let mut bounds = rows[cy].lock().unwrap_or_else(PoisonError::into_inner);
            for (slot, (lo, hi)) in bounds.iter_mut().zip(&local) {
                slot.0 = slot.0.min(*lo);
                slot.1 = slot.1.max(*hi);
            }
        }
    });

    rows.into_iter()
        .flat_map(|row| row.into_inner().unwrap_or_else(PoisonError::into_inner))
        .collect()
}

/// A validated coarse heightmap with its derived chunk bounds and staged
/// texture upload
pub struct LowResInstall {
    coord: RegionCoord,
    map: Heightmap,
    chunk_bounds: Vec<(f32, f32)>,
    upload: PendingUpload,
}

impl LowResInstall {
    pub fn chunk_bounds(&self) -> &[(f32, f32)] {
        &self.chunk_bounds
    }
}

/// Validate a coarse heightmap and do the heavy derivation work (bounds
/// pass, scaled upload copy) without touching any region state.
pub fn prepare_low_res(coord: RegionCoord, map: Heightmap, config: &StreamingConfig) -> Result<LowResInstall> {
    if !map.is_square() {
        return Err(Error::MalformedInput(format!(
            "region {}: coarse heightmap is {}x{}, expected square",
            coord,
            map.width(),
            map.height()
        )));
    }
    if map.width() == 0 {
        return Err(Error::MalformedInput(format!("region {}: empty coarse heightmap", coord)));
    }

    let start = std::time::Instant::now();
    let scale = config.height_scale;
    let chunk_bounds: Vec<(f32, f32)> = compute_chunk_bounds(&map, config.chunks_per_side())
        .into_iter()
        .map(|(lo, hi)| (lo * scale, hi * scale))
        .collect();
    log::debug!(
        "Region {}: {} chunk bounds from {}x{} coarse map in {:.2}ms",
        coord,
        chunk_bounds.len(),
        map.width(),
        map.height(),
        start.elapsed().as_secs_f64() * 1000.0
    );

    let size = UVec2::new(map.width(), map.height());
    let upload = PendingUpload::from_heights(coord, Resolution::Low, UVec2::ZERO, size, size, &map.scaled(scale));
    Ok(LowResInstall {
        coord,
        map,
        chunk_bounds,
        upload,
    })
}

/// Height data, chunk bounds and tile queue for one region
pub struct TerrainData {
    coord: RegionCoord,
    config: Arc<StreamingConfig>,
    uploads: UploadQueue,
    low: Option<Heightmap>,
    high: Option<Heightmap>,
    tile_size: Option<u32>,
    pending_tiles: VecDeque<(u32, u32)>,
    tiles_total: usize,
    tiles_applied: usize,
    /// World-space `(min, max)` height per chunk
    chunk_bounds: Vec<(f32, f32)>,
    swapped: bool,
}

impl TerrainData {
    pub fn new(coord: RegionCoord, config: Arc<StreamingConfig>, uploads: UploadQueue) -> Self {
        Self {
            coord,
            config,
            uploads,
            low: None,
            high: None,
            tile_size: None,
            pending_tiles: VecDeque::new(),
            tiles_total: 0,
            tiles_applied: 0,
            chunk_bounds: Vec::new(),
            swapped: false,
        }
    }

    pub fn coord(&self) -> RegionCoord {
        self.coord
    }

    pub fn config(&self) -> &StreamingConfig {
        &self.config
    }

    /// Drop all data and retarget at `coord`
    pub fn reset(&mut self, coord: RegionCoord) {
        self.coord = coord;
        self.low = None;
        self.high = None;
        self.tile_size = None;
        self.pending_tiles.clear();
        self.tiles_total = 0;
        self.tiles_applied = 0;
        self.chunk_bounds.clear();
        self.swapped = false;
    }

    pub fn coarse_path(&self) -> PathBuf {
        heightmap::coarse_path(&self.config.data_root, self.coord)
    }

    pub fn tile_path(&self, tx: u32, ty: u32) -> PathBuf {
        heightmap::tile_path(&self.config.data_root, self.coord, tx, ty)
    }

    /// Read the coarse heightmap synchronously.
    ///
    /// Returns `Ok(false)` when the file is missing; the region then keeps
    /// whatever state it had.
    pub fn load_low_res(&mut self) -> Result<bool> {
        let path = self.coarse_path();
        match heightmap::read_heightmap(&path, self.config.height_channel)? {
            Some(map) => {
                self.set_low_res(map)?;
                Ok(true)
            }
            None => {
                log::warn!("Region {}: {}", self.coord, Error::MissingResource(path));
                Ok(false)
            }
        }
    }

    /// Install a decoded coarse heightmap, compute chunk bounds and stage
    /// the full texture upload.
    pub fn set_low_res(&mut self, map: Heightmap) -> Result<()> {
        let prepared = prepare_low_res(self.coord, map, &self.config)?;
        self.install_low_res(prepared)
    }

    /// Swap in a coarse map built by [`prepare_low_res`]. Only moves data
    /// and queues the upload, so it is cheap to run under the region lock.
    pub fn install_low_res(&mut self, prepared: LowResInstall) -> Result<()> {
        if prepared.coord != self.coord {
            return Err(Error::InvalidState(format!(
                "coarse data for region {} offered to region {}",
                prepared.coord, self.coord
            )));
        }
        self.chunk_bounds = prepared.chunk_bounds;
        self.uploads.push(prepared.upload);
        self.low = Some(prepared.map);
        self.swapped = false;
        Ok(())
    }

    pub fn is_low_res_loaded(&self) -> bool {
        self.low.is_some()
    }

    /// Enumerate existing tile files into the pending queue.
    pub fn initialize_high_res_loading(&mut self) -> usize {
        let tiles = heightmap::list_tiles(&self.config.data_root, self.coord, self.config.tile_grid);
        self.queue_tiles(tiles)
    }

    /// Replace the pending queue with `tiles` and clear the fine buffer.
    pub fn queue_tiles(&mut self, tiles: Vec<(u32, u32)>) -> usize {
        self.high = None;
        self.tile_size = None;
        self.tiles_applied = 0;
        self.tiles_total = tiles.len();
        self.pending_tiles = tiles.into();
        log::debug!("Region {}: {} fine tiles queued", self.coord, self.tiles_total);
        self.tiles_total
    }

    /// Pop the next tile position without decoding it
    pub fn next_pending_tile(&mut self) -> Option<(u32, u32)> {
        self.pending_tiles.pop_front()
    }

    /// Copy a decoded tile into the fine buffer and stage its sub-region upload.
    ///
    /// The first tile fixes the tile size; later tiles of a different size
    /// are rejected.
    pub fn apply_tile(&mut self, tx: u32, ty: u32, tile: Heightmap) -> Result<()> {
        let grid = self.config.tile_grid;
        if tx >= grid || ty >= grid {
            return Err(Error::MalformedInput(format!(
                "region {}: tile ({}, {}) outside {}x{} grid",
                self.coord, tx, ty, grid, grid
            )));
        }
        if !tile.is_square() || tile.width() == 0 {
            return Err(Error::MalformedInput(format!(
                "region {}: tile ({}, {}) is {}x{}, expected square",
                self.coord,
                tx,
                ty,
                tile.width(),
                tile.height()
            )));
        }

        let tile_size = *self.tile_size.get_or_insert(tile.width());
        if tile.width() != tile_size {
            return Err(Error::MalformedInput(format!(
                "region {}: tile ({}, {}) is {} px, expected {}",
                self.coord,
                tx,
                ty,
                tile.width(),
                tile_size
            )));
        }

        let side = tile_size * grid;
        let high = self.high.get_or_insert_with(|| Heightmap::new(side, side));
        let origin = UVec2::new(tx * tile_size, ty * tile_size);
        high.blit(&tile, origin.x, origin.y);

        self.uploads.push(PendingUpload::from_heights(
            self.coord,
            Resolution::High,
            origin,
            UVec2::splat(tile_size),
            UVec2::splat(side),
            &tile.scaled(self.config.height_scale),
        ));
        self.tiles_applied += 1;
        Ok(())
    }

    /// Dequeue, read and apply one tile.
    ///
    /// `Ok(false)` once the queue is empty. The tile is consumed even when
    /// an error is returned.
    pub fn load_next_tile(&mut self) -> Result<bool> {
        let Some((tx, ty)) = self.next_pending_tile() else {
            return Ok(false);
        };
        let path = self.tile_path(tx, ty);
        match heightmap::read_heightmap(&path, self.config.height_channel)? {
            Some(tile) => self.apply_tile(tx, ty, tile)?,
            None => log::warn!("Region {}: tile skipped: {}", self.coord, Error::MissingResource(path)),
        }
        Ok(true)
    }

    pub fn is_all_tiles_loaded(&self) -> bool {
        self.pending_tiles.is_empty()
    }

    /// Queue drained and at least one tile made it into the fine buffer
    pub fn is_high_res_loaded(&self) -> bool {
        self.pending_tiles.is_empty() && self.tiles_applied > 0
    }

    pub fn pending_tile_count(&self) -> usize {
        self.pending_tiles.len()
    }

    /// Fraction of queued tiles consumed; `1.0` when nothing was queued
    pub fn tile_progress(&self) -> f32 {
        if self.tiles_total == 0 {
            return 1.0;
        }
        (self.tiles_total - self.pending_tiles.len()) as f32 / self.tiles_total as f32
    }

    /// World height at region-local `local` (x/y from the region's minimum
    /// corner), blending coarse and fine by `blend` when both exist.
    ///
    /// Positions within one pixel of the border return `0`. The fine buffer
    /// is only sampled once every queued tile is in; until then unfilled
    /// tiles would read as zero.
    pub fn get_height(&self, local: Vec2, blend: f32) -> f32 {
        let uv = local / self.config.region_size();
        let sample = |map: &Heightmap| -> Option<f32> {
            let w = map.width() as f32;
            let h = map.height() as f32;
            let p = uv * Vec2::new(w - 1.0, h - 1.0);
            if p.x < 1.0 || p.y < 1.0 || p.x > w - 2.0 || p.y > h - 2.0 {
                return None;
            }
            Some(map.sample_bilinear(p.x, p.y))
        };

        let high = self.high.as_ref().filter(|_| self.is_high_res_loaded());
        let normalized = match (self.low.as_ref(), high) {
            (Some(low), Some(high)) => {
                let blend = blend.clamp(0.0, 1.0);
                match (sample(low), sample(high)) {
                    (Some(l), Some(h)) => (1.0 - blend) * l + blend * h,
                    _ => 0.0,
                }
            }
            (Some(map), None) | (None, Some(map)) => sample(map).unwrap_or(0.0),
            (None, None) => 0.0,
        };
        normalized * self.config.height_scale
    }

    /// World-space `(min, max)` height of a chunk
    pub fn get_height_bound(&self, index: usize) -> Option<(f32, f32)> {
        self.chunk_bounds.get(index).copied()
    }

    pub fn chunk_bounds(&self) -> &[(f32, f32)] {
        &self.chunk_bounds
    }

    /// World-space height range over all chunks
    pub fn height_range(&self) -> Option<(f32, f32)> {
        if self.chunk_bounds.is_empty() {
            return None;
        }
        Some(
            self.chunk_bounds
                .iter()
                .fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), &(a, b)| (lo.min(a), hi.max(b))),
        )
    }

    /// Retire the coarse buffer once fine data is complete. Chunk bounds stay.
    pub fn swap_to_high_res(&mut self) -> bool {
        if !self.is_high_res_loaded() || self.high.is_none() {
            return false;
        }
        self.low = None;
        self.swapped = true;
        log::debug!("Region {}: swapped to high resolution", self.coord);
        true
    }

    pub fn is_swapped(&self) -> bool {
        self.swapped
    }

    pub fn low_resolution(&self) -> Option<UVec2> {
        self.low.as_ref().map(|m| UVec2::new(m.width(), m.height()))
    }

    pub fn high_resolution(&self) -> Option<UVec2> {
        self.high.as_ref().map(|m| UVec2::new(m.width(), m.height()))
    }
}
