//! Region dataset generator: writes coarse heightmaps, fine tiles and
//! outer-ring placeholders from fractal noise.
//!
//! Usage: cargo run --release --bin generate_regions -- [OPTIONS]
//!
//! Options:
//!   --out <DIR>        Output root (default: assets/terrain)
//!   --config <FILE>    Streaming config JSON (default: built-in defaults)
//!   --radius <R>       Regions from -R..=R on both axes (default: 3)
//!   --seed <SEED>      Noise seed (default: 12345)
//!   --scale <METERS>   Horizontal noise scale (default: 1500.0)
//!   --coarse <PX>      Coarse heightmap edge (default: 257)
//!   --tile <PX>        Fine tile edge (default: 128)
//!   --simple <PX>      Placeholder heightmap edge (default: 33)
//!
//! Output structure:
//!   <out>/
//!     streaming.json               # config with data_root = <out>
//!     low/region{X}x{Y}.png
//!     region_{X}x{Y}_tiles/tile_{tx}_{ty}.png
//!     simple/region{X}x{Y}.png

use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Instant;

use glam::Vec2;
use noise::{Fbm, MultiFractal, NoiseFn, Perlin};
use rayon::prelude::*;

use terrastream::core::{Result, StreamingConfig};
use terrastream::streaming::RegionCoord;
use terrastream::streaming::heightmap::{self, Heightmap, save_heightmap};

/// Normalized `[0, 1]` height over world x/y
struct HeightField {
    noise: Fbm<Perlin>,
    scale: f32,
}

impl HeightField {
    fn new(seed: u32, scale: f32) -> Self {
        let noise = Fbm::<Perlin>::new(seed)
            .set_octaves(6)
            .set_persistence(0.5)
            .set_lacunarity(2.0);
        Self { noise, scale }
    }

    fn sample(&self, world: Vec2) -> f32 {
        let value = self
            .noise
            .get([(world.x / self.scale) as f64, (world.y / self.scale) as f64]);
        ((value + 1.0) * 0.5).clamp(0.0, 1.0) as f32
    }

    /// `size` x `size` samples spanning `[min, min + extent]` edge to edge
    fn render(&self, min: Vec2, extent: f32, size: u32) -> Heightmap {
        let step = if size > 1 { extent / (size - 1) as f32 } else { 0.0 };
        Heightmap::from_fn(size, size, |x, y| {
            self.sample(min + Vec2::new(x as f32, y as f32) * step)
        })
    }
}

fn main() {
    env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or("info"),
    )
    .format_timestamp_millis()
    .init();

    if let Err(e) = run() {
        log::error!("Generation failed: {}", e);
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let args: Vec<String> = std::env::args().collect();
    let out = parse_str_arg(&args, "--out").map(PathBuf::from).unwrap_or_else(|| PathBuf::from("assets/terrain"));
    let radius = parse_i32_arg(&args, "--radius").unwrap_or(3).max(0);
    let seed = parse_u32_arg(&args, "--seed").unwrap_or(12345);
    let scale = parse_f32_arg(&args, "--scale").unwrap_or(1500.0);
    let coarse_px = parse_u32_arg(&args, "--coarse").unwrap_or(257).max(4);
    let tile_px = parse_u32_arg(&args, "--tile").unwrap_or(128).max(2);
    let simple_px = parse_u32_arg(&args, "--simple").unwrap_or(33).max(2);

    let mut config = match parse_str_arg(&args, "--config") {
        Some(path) => StreamingConfig::from_json_file(&PathBuf::from(path))?,
        None => StreamingConfig::default(),
    };
    config.data_root = out.clone();

    let region_size = config.region_size();
    let grid = config.tile_grid;
    let fine_side = tile_px * grid;

    println!("=== Terrastream Region Generator ===");
    println!("Output:  {}", out.display());
    println!("Regions: {}x{} ({} m each)", 2 * radius + 1, 2 * radius + 1, region_size);
    println!("Seed:    {}, scale {}", seed, scale);
    println!("Coarse:  {} px, tiles {}x{} of {} px, simple {} px", coarse_px, grid, grid, tile_px, simple_px);
    println!();

    std::fs::create_dir_all(&out)?;
    std::fs::write(out.join("streaming.json"), config.to_json_string()?)?;

    let field = HeightField::new(seed, scale);
    let coords: Vec<RegionCoord> = (-radius..=radius)
        .flat_map(|y| (-radius..=radius).map(move |x| RegionCoord::new(x, y)))
        .collect();

    let start = Instant::now();
    let done = AtomicUsize::new(0);
    coords.par_iter().try_for_each(|&coord| -> Result<()> {
        let origin = coord.world_origin(region_size);

        let coarse = field.render(origin, region_size, coarse_px);
        save_heightmap(&heightmap::coarse_path(&out, coord), &coarse)?;

        let simple = field.render(origin, region_size, simple_px);
        save_heightmap(&heightmap::simple_path(&out, coord), &simple)?;

        // Tiles partition one fine buffer whose edge texels sit on the region edge
        let texel = region_size / (fine_side - 1) as f32;
        for ty in 0..grid {
            for tx in 0..grid {
                let min = origin + Vec2::new((tx * tile_px) as f32, (ty * tile_px) as f32) * texel;
                let tile = field.render(min, texel * (tile_px - 1) as f32, tile_px);
                save_heightmap(&heightmap::tile_path(&out, coord, tx, ty), &tile)?;
            }
        }

        let n = done.fetch_add(1, Ordering::Relaxed) + 1;
        log::info!("[{}/{}] region {} written", n, coords.len(), coord);
        Ok(())
    })?;

    println!();
    println!(
        "Done: {} regions in {:.1}s",
        coords.len(),
        start.elapsed().as_secs_f32()
    );
    Ok(())
}

fn parse_f32_arg(args: &[String], flag: &str) -> Option<f32> {
    args.iter().position(|a| a == flag)
        .and_then(|i| args.get(i + 1))
        .and_then(|s| s.parse().ok())
}

fn parse_u32_arg(args: &[String], flag: &str) -> Option<u32> {
    args.iter().position(|a| a == flag)
        .and_then(|i| args.get(i + 1))
        .and_then(|s| s.parse().ok())
}

fn parse_i32_arg(args: &[String], flag: &str) -> Option<i32> {
    args.iter().position(|a| a == flag)
        .and_then(|i| args.get(i + 1))
        .and_then(|s| s.parse().ok())
}

fn parse_str_arg(args: &[String], flag: &str) -> Option<String> {
    args.iter().position(|a| a == flag)
        .and_then(|i| args.get(i + 1))
        .cloned()
}
