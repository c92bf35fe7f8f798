//! Print a summary of one region's files and derived bounds.
//!
//! Usage: cargo run --bin inspect_region -- --x <X> --y <Y> [--root <DIR>] [--config <FILE>]

use std::path::PathBuf;
use std::sync::Arc;

use terrastream::core::{Result, StreamingConfig};
use terrastream::render::UploadQueue;
use terrastream::streaming::chunk_creator::{ChunkCreator, ChunkGridInput};
use terrastream::streaming::heightmap;
use terrastream::streaming::{RegionCoord, TerrainData};

fn main() {
    env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or("warn"),
    )
    .format_timestamp_millis()
    .init();

    if let Err(e) = run() {
        eprintln!("inspect_region: {}", e);
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let args: Vec<String> = std::env::args().collect();
    let x = parse_i32_arg(&args, "--x").unwrap_or(0);
    let y = parse_i32_arg(&args, "--y").unwrap_or(0);
    let mut config = match parse_str_arg(&args, "--config") {
        Some(path) => StreamingConfig::from_json_file(&PathBuf::from(path))?,
        None => StreamingConfig::default(),
    };
    if let Some(root) = parse_str_arg(&args, "--root") {
        config.data_root = PathBuf::from(root);
    }

    let coord = RegionCoord::new(x, y);
    let config = Arc::new(config);
    let origin = coord.world_origin(config.region_size());
    println!("Region {} at ({}, {}), {} m square", coord, origin.x, origin.y, config.region_size());

    let mut data = TerrainData::new(coord, config.clone(), UploadQueue::new());
    if !data.load_low_res()? {
        println!("  coarse: missing ({})", data.coarse_path().display());
        return Ok(());
    }
    if let Some(size) = data.low_resolution() {
        println!("  coarse: {}x{} ({})", size.x, size.y, data.coarse_path().display());
    }
    if let Some((lo, hi)) = data.height_range() {
        println!("  height: {:.2} .. {:.2}", lo, hi);
    }

    let tiles = heightmap::list_tiles(&config.data_root, coord, config.tile_grid);
    println!("  tiles:  {} of {}", tiles.len(), config.tile_grid * config.tile_grid);
    data.queue_tiles(tiles);
    let mut rejected = 0;
    loop {
        match data.load_next_tile() {
            Ok(true) => {}
            Ok(false) => break,
            Err(e) => {
                rejected += 1;
                println!("    rejected: {}", e);
            }
        }
    }
    if let Some(size) = data.high_resolution() {
        println!("  fine:   {}x{} ({} rejected)", size.x, size.y, rejected);
    }

    let input = ChunkGridInput {
        origin,
        chunk_size: config.chunk_size,
        chunks_per_side: config.chunks_per_side(),
        bounds: data.chunk_bounds().to_vec(),
        min_height_extent: config.min_chunk_height_extent,
    };
    let boxes = ChunkCreator::build_blocking(&input);
    let flattest = boxes
        .iter()
        .map(|b| b.aabb.max.z - b.aabb.min.z)
        .fold(f32::INFINITY, f32::min);
    let steepest = boxes
        .iter()
        .map(|b| b.aabb.max.z - b.aabb.min.z)
        .fold(0.0, f32::max);
    println!(
        "  chunks: {} boxes, vertical extent {:.2} .. {:.2}",
        boxes.len(),
        flattest,
        steepest
    );

    let simple = heightmap::simple_path(&config.data_root, coord);
    println!(
        "  simple: {}",
        if simple.exists() { "present" } else { "missing" }
    );
    Ok(())
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
