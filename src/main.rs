//! Terrastream - headless fly-through of the region streamer
//!
//! Usage: cargo run --release -- [OPTIONS]
//!
//! Options:
//!   --root <DIR>       Dataset root (default: assets/terrain)
//!   --config <FILE>    Streaming config JSON (default: <root>/streaming.json if present)
//!   --frames <N>       Frames to simulate (default: 1200)
//!   --speed <M/S>      Flight speed (default: 250.0)
//!   --altitude <M>     Height above ground (default: 120.0)
//!   --floor <M>        Occlude boxes entirely below this height (default: off)

use std::path::PathBuf;
use std::time::Instant;

use terrastream::core::types::Vec3;
use terrastream::core::{Camera, Result, StreamingConfig, logging};
use terrastream::culling::{AlwaysVisible, HeightFloorOracle, OcclusionOracle};
use terrastream::render::{CpuTextureSink, ShaderHandle, StatsRenderer};
use terrastream::streaming::RegionManager;

const FRAME_DT: f32 = 1.0 / 60.0;

fn main() {
    logging::init();
    log::info!("Terrastream starting...");

    if let Err(e) = run() {
        log::error!("Fly-through failed: {}", e);
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let args: Vec<String> = std::env::args().collect();
    let root = parse_str_arg(&args, "--root")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("assets/terrain"));
    let frames = parse_usize_arg(&args, "--frames").unwrap_or(1200);
    let speed = parse_f32_arg(&args, "--speed").unwrap_or(250.0);
    let altitude = parse_f32_arg(&args, "--altitude").unwrap_or(120.0);
    let floor = parse_f32_arg(&args, "--floor");

    let config_path = parse_str_arg(&args, "--config")
        .map(PathBuf::from)
        .unwrap_or_else(|| root.join("streaming.json"));
    let mut config = if config_path.exists() {
        StreamingConfig::from_json_file(&config_path)?
    } else {
        log::info!("No config at {}, using defaults", config_path.display());
        StreamingConfig::default()
    };
    config.data_root = root;

    let oracle: Box<dyn OcclusionOracle> = match floor {
        Some(height) => Box::new(HeightFloorOracle { height }),
        None => Box::new(AlwaysVisible),
    };

    let half = config.region_size() * 0.5;
    let mut manager = RegionManager::new(config)?;
    let mut sink = CpuTextureSink::new();
    let mut renderer = StatsRenderer::default();
    let heading = Vec3::new(1.0, 0.35, 0.0).normalize();
    let mut position = Vec3::new(half, half, altitude);

    let start = Instant::now();
    let mut uploads = 0;
    for frame in 0..frames {
        let ground = manager.height_at(position).unwrap_or(0.0);
        position.z = ground + altitude;
        let camera = Camera::look_at(position, position + heading * 100.0 - Vec3::Z * 30.0, Vec3::Z);

        manager.update(&camera, oracle.as_ref(), FRAME_DT)?;
        uploads += manager.apply_pending_updates(&mut sink)?;
        renderer.reset();
        manager.render(&mut renderer, ShaderHandle(0), &camera)?;

        if frame % 120 == 0 {
            let stats = manager.stats();
            log::info!(
                "frame {} at ({:.0}, {:.0}, {:.0}): {} active ({} loading), {} cached, {} visible, {} boxes, {} placeholders",
                frame,
                position.x,
                position.y,
                position.z,
                stats.active,
                stats.loading,
                stats.cached,
                stats.visible,
                renderer.boxes,
                renderer.placeholders
            );
            for line in manager.context().status_lines() {
                log::debug!("  {}", line);
            }
        }

        position += heading * speed * FRAME_DT;
    }

    let stats = manager.stats().clone();
    manager.shutdown();
    println!();
    println!("=== Fly-through complete ===");
    println!("Frames:     {} in {:.2}s", frames, start.elapsed().as_secs_f32());
    println!("Loads:      {} ({} cache hits)", stats.loads, stats.cache_hits);
    println!("Evictions:  {} ({} retired)", stats.evictions, stats.retired);
    println!("Uploads:    {} textures {}", uploads, sink.len());
    Ok(())
}

fn parse_f32_arg(args: &[String], flag: &str) -> Option<f32> {
    args.iter().position(|a| a == flag)
        .and_then(|i| args.get(i + 1))
        .and_then(|s| s.parse().ok())
}

fn parse_usize_arg(args: &[String], flag: &str) -> Option<usize> {
    args.iter().position(|a| a == flag)
        .and_then(|i| args.get(i + 1))
        .and_then(|s| s.parse().ok())
}

fn parse_str_arg(args: &[String], flag: &str) -> Option<String> {
    args.iter().position(|a| a == flag)
        .and_then(|i| args.get(i + 1))
        .cloned()
}
