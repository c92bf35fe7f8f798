//! End-to-end streaming scenarios against PNG datasets in temp directories

use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use glam::{Vec2, Vec3};
use tempfile::TempDir;

use terrastream::core::{Camera, StreamingConfig};
use terrastream::culling::{AlwaysVisible, HeightFloorOracle};
use terrastream::math::{Aabb, Obb};
use terrastream::render::{CpuTextureSink, Resolution, ShaderHandle, StatsRenderer, UploadQueue};
use terrastream::streaming::heightmap::{self, Heightmap, save_heightmap};
use terrastream::streaming::{RegionCoord, RegionManager, RegionState, TerrainRegion};

fn write_uniform_region(root: &Path, coord: RegionCoord, value: f32, coarse_px: u32, tiles: Option<(u32, u32, f32)>) {
    save_heightmap(
        &heightmap::coarse_path(root, coord),
        &Heightmap::from_fn(coarse_px, coarse_px, |_, _| value),
    )
    .unwrap();
    if let Some((grid, tile_px, tile_value)) = tiles {
        for ty in 0..grid {
            for tx in 0..grid {
                save_heightmap(
                    &heightmap::tile_path(root, coord, tx, ty),
                    &Heightmap::from_fn(tile_px, tile_px, |_, _| tile_value),
                )
                .unwrap();
            }
        }
    }
}

fn wait_for(mut step: impl FnMut() -> bool) {
    let deadline = Instant::now() + Duration::from_secs(20);
    while !step() {
        assert!(Instant::now() < deadline, "timed out waiting for streaming");
        std::thread::sleep(Duration::from_millis(2));
    }
}

#[test]
fn test_uniform_region_produces_400_flat_chunks() {
    let dir = TempDir::new().unwrap();
    let coord = RegionCoord::new(0, 0);
    write_uniform_region(dir.path(), coord, 0.5, 81, None);

    let config = Arc::new(StreamingConfig::with_root(dir.path()));
    let runtime = tokio::runtime::Runtime::new().unwrap();
    let mut region = TerrainRegion::new(coord, config.clone(), UploadQueue::new());
    region.begin_load(runtime.handle()).unwrap();
    wait_for(|| {
        region.poll();
        region.state() == RegionState::Active && region.is_fully_loaded()
    });

    assert_eq!(region.chunks().len(), 400);
    let expected = 400.0 * 128.0 / 255.0;
    let rep = region.representative_aabb();
    assert!((rep.min.z - expected).abs() <= config.min_chunk_height_extent);
    assert!((rep.max.z - expected).abs() <= config.min_chunk_height_extent);
    assert_eq!(rep.min.truncate(), Vec2::ZERO);
    assert_eq!(rep.max.truncate(), Vec2::splat(2000.0));

    for chunk in region.chunks() {
        assert!(chunk.aabb.min.z <= chunk.aabb.max.z);
        assert!((chunk.aabb.center().z - expected).abs() < 1e-2);
    }
    region.begin_unload(runtime.handle());
}

#[test]
fn test_crossing_region_border_swaps_three_regions() {
    let dir = TempDir::new().unwrap();
    let mut manager = RegionManager::new(StreamingConfig::with_root(dir.path())).unwrap();

    let start = Camera::look_at(Vec3::new(1000.0, 1000.0, 500.0), Vec3::new(1000.0, 2000.0, 300.0), Vec3::Z);
    manager.update(&start, &AlwaysVisible, 0.016).unwrap();
    let before = manager.active_coords();
    assert_eq!(before.len(), 9);

    let moved = Camera::look_at(Vec3::new(3000.0, 1000.0, 500.0), Vec3::new(3000.0, 2000.0, 300.0), Vec3::Z);
    manager.update(&moved, &AlwaysVisible, 0.016).unwrap();
    let after = manager.active_coords();
    assert_eq!(after.len(), 9);

    let report = manager.last_transition().unwrap();
    let dropped = before.iter().filter(|c| !after.contains(c)).count();
    let added = after.iter().filter(|c| !before.contains(c)).count();
    assert_eq!(report.evicted.len(), dropped);
    assert_eq!(report.loaded.len(), added);
    assert_eq!(dropped, 3);
    assert_eq!(added, 3);

    let mut cached = manager.cached_coords();
    cached.sort_by_key(|c| (c.y, c.x));
    assert_eq!(cached, report.evicted);
    assert_eq!(manager.current_coord(), Some(RegionCoord::new(1, 0)));
}

#[test]
fn test_fine_tiles_blend_in_and_replace_coarse() {
    let dir = TempDir::new().unwrap();
    let config = StreamingConfig {
        chunk_size: 10.0,
        half_chunks_per_side: 2,
        height_scale: 100.0,
        tile_grid: 4,
        blend_duration: 0.5,
        ..StreamingConfig::with_root(dir.path())
    };
    let coord = RegionCoord::new(0, 0);
    write_uniform_region(dir.path(), coord, 0.0, 17, Some((4, 8, 1.0)));

    let mut manager = RegionManager::new(config).unwrap();
    let camera = Camera::look_at(Vec3::new(20.0, 2.0, 120.0), Vec3::new(20.0, 30.0, 0.0), Vec3::Z);
    manager.update(&camera, &AlwaysVisible, 0.0).unwrap();
    wait_for(|| {
        manager.poll();
        manager.region(coord).is_some_and(|r| r.is_fully_loaded())
    });

    let mut last = 0.0;
    let mut heights = Vec::new();
    for _ in 0..40 {
        manager.update(&camera, &AlwaysVisible, 0.05).unwrap();
        let region = manager.region(coord).unwrap();
        let factor = region.blend().factor();
        assert!(factor >= last);
        assert!(factor <= 1.0);
        last = factor;
        heights.push(manager.height_at(Vec3::new(20.0, 20.0, 0.0)).unwrap());
    }
    assert_eq!(last, 1.0);
    assert!(heights.windows(2).all(|w| w[1] >= w[0] - 1e-4));
    assert!((heights.last().unwrap() - 100.0).abs() < 1e-3);

    let region = manager.region(coord).unwrap();
    assert!(region.with_data(|d| d.is_swapped() && d.low_resolution().is_none()));

    let mut sink = CpuTextureSink::new();
    assert_eq!(manager.apply_pending_updates(&mut sink).unwrap(), 1 + 16);
    let fine = sink.get(coord, Resolution::High).unwrap();
    assert_eq!(fine.texel(31, 31), 100.0);
}

#[test]
fn test_occlusion_floor_hides_low_chunks() {
    let dir = TempDir::new().unwrap();
    let config = StreamingConfig {
        chunk_size: 10.0,
        half_chunks_per_side: 2,
        height_scale: 100.0,
        ..StreamingConfig::with_root(dir.path())
    };
    let coord = RegionCoord::new(0, 0);
    // Left half low, right half high
    save_heightmap(
        &heightmap::coarse_path(dir.path(), coord),
        &Heightmap::from_fn(33, 33, |x, _| if x < 16 { 0.1 } else { 0.9 }),
    )
    .unwrap();

    let mut manager = RegionManager::new(config).unwrap();
    let camera = Camera::look_at(Vec3::new(20.0, 2.0, 150.0), Vec3::new(20.0, 35.0, 40.0), Vec3::Z);
    manager.update(&camera, &AlwaysVisible, 0.0).unwrap();
    wait_for(|| {
        manager.poll();
        manager.region(coord).is_some_and(|r| r.is_fully_loaded())
    });

    manager.update(&camera, &AlwaysVisible, 0.0).unwrap();
    let all = manager.region(coord).unwrap().visible().len();
    manager.update(&camera, &HeightFloorOracle { height: 50.0 }, 0.0).unwrap();
    let region = manager.region(coord).unwrap();
    let high_only = region.visible().len();
    assert!(high_only > 0);
    assert!(high_only < all);
    assert!(region.visible().visible_aabbs.iter().all(|b| b.max.z >= 50.0));

    let mut renderer = StatsRenderer::default();
    manager.render(&mut renderer, ShaderHandle(1), &camera).unwrap();
    assert_eq!(renderer.boxes, high_only);
}

#[test]
fn test_obb_gap_then_overlap() {
    let a = Obb::from_aabb(&Aabb::new(Vec3::ZERO, Vec3::ONE));
    let gap = Obb::from_aabb(&Aabb::new(Vec3::new(2.0, 0.0, 0.0), Vec3::new(3.0, 1.0, 1.0)));
    assert!(!a.intersects(&gap));
    assert!(!gap.intersects(&a));

    let overlap = Obb::from_aabb(&Aabb::new(Vec3::new(0.9, 0.0, 0.0), Vec3::new(1.9, 1.0, 1.0)));
    assert!(a.intersects(&overlap));
    assert!(overlap.intersects(&a));
}
