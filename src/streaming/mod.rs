//! Region streaming: height data, chunk grids, caching and the manager

pub mod coord;
pub mod heightmap;
pub mod cancel;
pub mod chunk;
pub mod terrain_data;
pub mod chunk_creator;
pub mod region;
pub mod cache;
pub mod simple;
pub mod manager;

pub use coord::RegionCoord;
pub use heightmap::{Heightmap, read_heightmap, read_heightmap_async, save_heightmap};
pub use cancel::CancelToken;
pub use chunk::{Chunk, ChunkBox, Entity, EntityId, RegionItem};
pub use terrain_data::TerrainData;
pub use chunk_creator::{ChunkCreator, ChunkGridInput};
pub use region::{BlendState, RegionState, TerrainRegion};
pub use cache::RecentRegionCache;
pub use simple::{SimpleTerrain, SimpleTerrainRing};
pub use manager::{RegionManager, StreamingStats, TransitionReport};
