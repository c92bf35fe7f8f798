//! Height texture collaborators
//!
//! [`HeightTexture`] is the contract the streaming layer uploads through: a
//! full image or a rectangular sub-region of `f32` heights. The CPU version
//! backs headless runs and tests. The wgpu version needs a live device and
//! is driven by a host renderer; it validates every write with the same
//! checks as the CPU version before touching the queue.

use std::collections::HashMap;

use crate::core::types::UVec2;
use crate::core::{Error, Result};
use crate::render::context::{PendingUpload, Resolution};
use crate::streaming::coord::RegionCoord;

/// A single-channel `f32` texture accepting full and sub-region writes
pub trait HeightTexture {
    fn size(&self) -> UVec2;

    fn upload_full(&mut self, size: UVec2, bytes: &[u8]) -> Result<()>;

    fn upload_region(&mut self, origin: UVec2, size: UVec2, bytes: &[u8]) -> Result<()>;

    /// Dispatch a staged upload to the matching call
    fn apply(&mut self, upload: &PendingUpload) -> Result<()> {
        if upload.is_full() {
            self.upload_full(upload.texture_size, &upload.bytes)
        } else {
            self.upload_region(upload.origin, upload.size, &upload.bytes)
        }
    }
}

/// Hands out the texture an upload belongs to, creating it on first use.
pub trait HeightTextureSink {
    fn texture_for(
        &mut self,
        coord: RegionCoord,
        resolution: Resolution,
        size: UVec2,
    ) -> Result<&mut dyn HeightTexture>;

    /// Free both textures of a region
    fn release(&mut self, coord: RegionCoord);
}

/// A full upload must match the texture it replaces
fn check_full(texture: UVec2, size: UVec2, bytes: &[u8]) -> Result<()> {
    if size != texture {
        return Err(Error::Gpu(format!(
            "full upload {}x{} does not match texture {}x{}",
            size.x, size.y, texture.x, texture.y
        )));
    }
    check_region(texture, UVec2::ZERO, size, bytes)
}

fn check_region(texture: UVec2, origin: UVec2, size: UVec2, bytes: &[u8]) -> Result<()> {
    let end = origin + size;
    if end.x > texture.x || end.y > texture.y {
        return Err(Error::MalformedInput(format!(
            "upload {}x{} at ({}, {}) exceeds texture {}x{}",
            size.x, size.y, origin.x, origin.y, texture.x, texture.y
        )));
    }
    let expected = (size.x * size.y) as usize * std::mem::size_of::<f32>();
    if bytes.len() != expected {
        return Err(Error::MalformedInput(format!(
            "upload of {}x{} texels needs {} bytes, got {}",
            size.x,
            size.y,
            expected,
            bytes.len()
        )));
    }
    Ok(())
}

/// Height texture kept in main memory
#[derive(Clone, Debug, Default)]
pub struct CpuHeightTexture {
    size: UVec2,
    texels: Vec<f32>,
    uploads: usize,
}

impl CpuHeightTexture {
    pub fn new(size: UVec2) -> Self {
        Self {
            size,
            texels: vec![0.0; (size.x * size.y) as usize],
            uploads: 0,
        }
    }

    pub fn texel(&self, x: u32, y: u32) -> f32 {
        self.texels[(y * self.size.x + x) as usize]
    }

    pub fn texels(&self) -> &[f32] {
        &self.texels
    }

    /// Number of writes applied so far
    pub fn upload_count(&self) -> usize {
        self.uploads
    }
}

impl HeightTexture for CpuHeightTexture {
    fn size(&self) -> UVec2 {
        self.size
    }

    fn upload_full(&mut self, size: UVec2, bytes: &[u8]) -> Result<()> {
        check_region(size, UVec2::ZERO, size, bytes)?;
        self.size = size;
        self.texels = bytes
            .chunks_exact(4)
            .map(bytemuck::pod_read_unaligned::<f32>)
            .collect();
        self.uploads += 1;
        Ok(())
    }

    fn upload_region(&mut self, origin: UVec2, size: UVec2, bytes: &[u8]) -> Result<()> {
        check_region(self.size, origin, size, bytes)?;
        let row_bytes = size.x as usize * 4;
        for (row, chunk) in bytes.chunks_exact(row_bytes).enumerate() {
            let start = ((origin.y + row as u32) * self.size.x + origin.x) as usize;
            for (i, texel) in chunk.chunks_exact(4).enumerate() {
                self.texels[start + i] = bytemuck::pod_read_unaligned(texel);
            }
        }
        self.uploads += 1;
        Ok(())
    }
}

/// Sink holding [`CpuHeightTexture`]s per region and resolution
#[derive(Default)]
pub struct CpuTextureSink {
    textures: HashMap<(RegionCoord, Resolution), CpuHeightTexture>,
}

impl CpuTextureSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, coord: RegionCoord, resolution: Resolution) -> Option<&CpuHeightTexture> {
        self.textures.get(&(coord, resolution))
    }

    pub fn len(&self) -> usize {
        self.textures.len()
    }

    pub fn is_empty(&self) -> bool {
        self.textures.is_empty()
    }
}

impl HeightTextureSink for CpuTextureSink {
    fn texture_for(
        &mut self,
        coord: RegionCoord,
        resolution: Resolution,
        size: UVec2,
    ) -> Result<&mut dyn HeightTexture> {
        let texture = self
            .textures
            .entry((coord, resolution))
            .or_insert_with(|| CpuHeightTexture::new(size));
        if texture.size() != size {
            *texture = CpuHeightTexture::new(size);
        }
        Ok(texture)
    }

    fn release(&mut self, coord: RegionCoord) {
        self.textures.retain(|(c, _), _| *c != coord);
    }
}

/// `R32Float` GPU texture written through `Queue::write_texture`
pub struct GpuHeightTexture {
    queue: wgpu::Queue,
    texture: wgpu::Texture,
    view: wgpu::TextureView,
    size: UVec2,
}

impl GpuHeightTexture {
    pub fn new(device: &wgpu::Device, queue: &wgpu::Queue, label: &str, size: UVec2) -> Self {
        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some(label),
            size: wgpu::Extent3d {
                width: size.x.max(1),
                height: size.y.max(1),
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: wgpu::TextureFormat::R32Float,
            usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        });
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        Self {
            queue: queue.clone(),
            texture,
            view,
            size,
        }
    }

    pub fn view(&self) -> &wgpu::TextureView {
        &self.view
    }

    fn write(&self, origin: UVec2, size: UVec2, bytes: &[u8]) {
        self.queue.write_texture(
            wgpu::TexelCopyTextureInfo {
                texture: &self.texture,
                mip_level: 0,
                origin: wgpu::Origin3d {
                    x: origin.x,
                    y: origin.y,
                    z: 0,
                },
                aspect: wgpu::TextureAspect::All,
            },
            bytes,
            wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(size.x * 4),
                rows_per_image: Some(size.y),
            },
            wgpu::Extent3d {
                width: size.x,
                height: size.y,
                depth_or_array_layers: 1,
            },
        );
    }
}

impl HeightTexture for GpuHeightTexture {
    fn size(&self) -> UVec2 {
        self.size
    }

    fn upload_full(&mut self, size: UVec2, bytes: &[u8]) -> Result<()> {
        check_full(self.size, size, bytes)?;
        self.write(UVec2::ZERO, size, bytes);
        Ok(())
    }

    fn upload_region(&mut self, origin: UVec2, size: UVec2, bytes: &[u8]) -> Result<()> {
        check_region(self.size, origin, size, bytes)?;
        self.write(origin, size, bytes);
        Ok(())
    }
}

/// Sink creating [`GpuHeightTexture`]s on the render thread's device
pub struct GpuTextureSink {
    device: wgpu::Device,
    queue: wgpu::Queue,
    textures: HashMap<(RegionCoord, Resolution), GpuHeightTexture>,
}

impl GpuTextureSink {
    pub fn new(device: wgpu::Device, queue: wgpu::Queue) -> Self {
        Self {
            device,
            queue,
            textures: HashMap::new(),
        }
    }

    pub fn view(&self, coord: RegionCoord, resolution: Resolution) -> Option<&wgpu::TextureView> {
        self.textures.get(&(coord, resolution)).map(GpuHeightTexture::view)
    }
}

impl HeightTextureSink for GpuTextureSink {
    fn texture_for(
        &mut self,
        coord: RegionCoord,
        resolution: Resolution,
        size: UVec2,
    ) -> Result<&mut dyn HeightTexture> {
        let stale = self
            .textures
            .get(&(coord, resolution))
            .is_some_and(|t| t.size() != size);
        if stale {
            self.textures.remove(&(coord, resolution));
        }
        let texture = self.textures.entry((coord, resolution)).or_insert_with(|| {
            let label = format!("terrain_height_{}_{:?}", coord, resolution);
            log::debug!("Creating {} ({}x{})", label, size.x, size.y);
            GpuHeightTexture::new(&self.device, &self.queue, &label, size)
        });
        Ok(texture)
    }

    fn release(&mut self, coord: RegionCoord) {
        self.textures.retain(|(c, _), _| *c != coord);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cpu_full_then_region() {
        let mut texture = CpuHeightTexture::new(UVec2::new(4, 4));
        let full: Vec<f32> = (0..16).map(|i| i as f32).collect();
        texture.upload_full(UVec2::new(4, 4), bytemuck::cast_slice(&full)).unwrap();
        assert_eq!(texture.texel(3, 2), 11.0);

        let patch = [100.0f32, 101.0, 102.0, 103.0];
        texture
            .upload_region(UVec2::new(2, 2), UVec2::new(2, 2), bytemuck::cast_slice(&patch))
            .unwrap();
        assert_eq!(texture.texel(2, 2), 100.0);
        assert_eq!(texture.texel(3, 3), 103.0);
        assert_eq!(texture.texel(1, 2), 9.0);
        assert_eq!(texture.upload_count(), 2);
    }

    #[test]
    fn test_cpu_rejects_out_of_bounds() {
        let mut texture = CpuHeightTexture::new(UVec2::new(4, 4));
        let patch = [0.0f32; 4];
        let err = texture.upload_region(UVec2::new(3, 3), UVec2::new(2, 2), bytemuck::cast_slice(&patch));
        assert!(matches!(err, Err(Error::MalformedInput(_))));
        let short = texture.upload_region(UVec2::ZERO, UVec2::new(2, 2), &[0u8; 4]);
        assert!(short.is_err());
    }

    #[test]
    fn test_sink_creates_and_releases() {
        let mut sink = CpuTextureSink::new();
        let coord = RegionCoord::new(1, 2);
        let upload = PendingUpload::from_heights(
            coord,
            Resolution::Low,
            UVec2::ZERO,
            UVec2::new(2, 2),
            UVec2::new(2, 2),
            &[1.0, 2.0, 3.0, 4.0],
        );
        sink.texture_for(coord, Resolution::Low, upload.texture_size)
            .unwrap()
            .apply(&upload)
            .unwrap();
        assert_eq!(sink.get(coord, Resolution::Low).unwrap().texel(1, 1), 4.0);
        assert!(sink.get(coord, Resolution::High).is_none());

        sink.release(coord);
        assert!(sink.is_empty());
    }

    #[test]
    fn test_full_upload_checks() {
        let texels = [0.0f32; 16];
        let bytes: &[u8] = bytemuck::cast_slice(&texels);
        assert!(check_full(UVec2::new(4, 4), UVec2::new(4, 4), bytes).is_ok());
        assert!(matches!(
            check_full(UVec2::new(8, 8), UVec2::new(4, 4), bytes),
            Err(Error::Gpu(_))
        ));
        assert!(matches!(
            check_full(UVec2::new(4, 4), UVec2::new(4, 4), &bytes[..60]),
            Err(Error::MalformedInput(_))
        ));
    }

    #[test]
    fn test_region_checks() {
        let texture = UVec2::new(16, 16);
        let patch = [0.0f32; 16];
        let bytes: &[u8] = bytemuck::cast_slice(&patch);
        assert!(check_region(texture, UVec2::new(12, 12), UVec2::new(4, 4), bytes).is_ok());
        assert!(check_region(texture, UVec2::new(13, 0), UVec2::new(4, 4), bytes).is_err());
        assert!(check_region(texture, UVec2::new(0, 13), UVec2::new(4, 4), bytes).is_err());
        assert!(check_region(texture, UVec2::ZERO, UVec2::new(4, 2), bytes).is_err());
        assert!(check_region(texture, UVec2::ZERO, UVec2::ZERO, &[]).is_ok());
    }
}
