//! Render-thread context shared with the streaming layer
//!
//! Background loaders never touch texture objects. They push byte buffers
//! into the [`UploadQueue`]; the render thread drains it once per frame.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use crate::core::types::UVec2;
use crate::streaming::coord::RegionCoord;

/// Which of a region's two height textures an upload targets
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Resolution {
    Low,
    High,
}

/// One staged texture write: `size` texels at `origin` inside a texture of
/// `texture_size`. Bytes are tightly packed native-endian `f32` heights.
#[derive(Clone, Debug)]
pub struct PendingUpload {
    pub coord: RegionCoord,
    pub resolution: Resolution,
    pub origin: UVec2,
    pub size: UVec2,
    pub texture_size: UVec2,
    pub bytes: Vec<u8>,
}

impl PendingUpload {
    /// Stage `heights` (world units) for upload.
    pub fn from_heights(
        coord: RegionCoord,
        resolution: Resolution,
        origin: UVec2,
        size: UVec2,
        texture_size: UVec2,
        heights: &[f32],
    ) -> Self {
        Self {
            coord,
            resolution,
            origin,
            size,
            texture_size,
            bytes: bytemuck::cast_slice(heights).to_vec(),
        }
    }

    /// Covers the whole texture
    pub fn is_full(&self) -> bool {
        self.origin == UVec2::ZERO && self.size == self.texture_size
    }

    pub fn heights(&self) -> Vec<f32> {
        self.bytes
            .chunks_exact(4)
            .map(bytemuck::pod_read_unaligned::<f32>)
            .collect()
    }
}

/// Thread-safe list of staged uploads
#[derive(Clone, Default)]
pub struct UploadQueue {
    inner: Arc<Mutex<Vec<PendingUpload>>>,
}

impl UploadQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, upload: PendingUpload) {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(upload);
    }

    /// Take every staged upload in submission order
    pub fn drain(&self) -> Vec<PendingUpload> {
        std::mem::take(&mut *self.inner.lock().unwrap_or_else(PoisonError::into_inner))
    }

    /// Drop staged uploads of a region that is going away
    pub fn discard_region(&self, coord: RegionCoord) -> usize {
        let mut uploads = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        let before = uploads.len();
        uploads.retain(|u| u.coord != coord);
        before - uploads.len()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Per-manager render state: the upload queue plus per-region status lines
/// for overlays.
#[derive(Default)]
pub struct TerrainRenderContext {
    uploads: UploadQueue,
    status: HashMap<RegionCoord, String>,
    frame: u64,
}

impl TerrainRenderContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Handle given to loaders for staging uploads
    pub fn upload_queue(&self) -> UploadQueue {
        self.uploads.clone()
    }

    pub fn set_status(&mut self, coord: RegionCoord, status: String) {
        self.status.insert(coord, status);
    }

    pub fn clear_status(&mut self, coord: RegionCoord) {
        self.status.remove(&coord);
    }

    pub fn status(&self, coord: RegionCoord) -> Option<&str> {
        self.status.get(&coord).map(String::as_str)
    }

    /// Status lines sorted by coordinate
    pub fn status_lines(&self) -> Vec<String> {
        let mut lines: Vec<_> = self.status.iter().collect();
        lines.sort_by_key(|(coord, _)| (coord.y, coord.x));
        lines
            .into_iter()
            .map(|(coord, status)| format!("{}: {}", coord, status))
            .collect()
    }

    pub fn begin_frame(&mut self) -> u64 {
        self.frame += 1;
        self.frame
    }

    pub fn frame(&self) -> u64 {
        self.frame
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn upload(coord: RegionCoord) -> PendingUpload {
        PendingUpload::from_heights(
            coord,
            Resolution::Low,
            UVec2::ZERO,
            UVec2::new(2, 1),
            UVec2::new(2, 1),
            &[1.5, -2.0],
        )
    }

    #[test]
    fn test_queue_drain_in_order() {
        let queue = UploadQueue::new();
        let writer = queue.clone();
        std::thread::spawn(move || {
            writer.push(upload(RegionCoord::new(0, 0)));
            writer.push(upload(RegionCoord::new(1, 0)));
        })
        .join()
        .unwrap();

        let drained = queue.drain();
        assert_eq!(drained.len(), 2);
        assert_eq!(drained[1].coord, RegionCoord::new(1, 0));
        assert!(queue.is_empty());
    }

    #[test]
    fn test_upload_bytes() {
        let up = upload(RegionCoord::new(0, 0));
        assert!(up.is_full());
        assert_eq!(up.bytes.len(), 8);
        assert_eq!(up.heights(), vec![1.5, -2.0]);
    }

    #[test]
    fn test_discard_region() {
        let queue = UploadQueue::new();
        queue.push(upload(RegionCoord::new(0, 0)));
        queue.push(upload(RegionCoord::new(3, 3)));
        assert_eq!(queue.discard_region(RegionCoord::new(3, 3)), 1);
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn test_status_lines() {
        let mut ctx = TerrainRenderContext::new();
        ctx.set_status(RegionCoord::new(1, 0), "active".into());
        ctx.set_status(RegionCoord::new(0, 0), "loading".into());
        assert_eq!(ctx.status_lines(), vec!["0x0: loading", "1x0: active"]);
        ctx.clear_status(RegionCoord::new(0, 0));
        assert!(ctx.status(RegionCoord::new(0, 0)).is_none());
        assert_eq!(ctx.begin_frame(), 1);
    }
}
