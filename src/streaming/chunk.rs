//! Chunks and the entities attached to them

use std::collections::HashMap;
use std::sync::Arc;

use crate::core::types::UVec2;
use crate::math::Aabb;

/// Identifier of an entity placed on the terrain
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EntityId(pub u64);

/// Something with bounds that lives in a chunk
#[derive(Clone, Debug, PartialEq)]
pub struct Entity {
    pub id: EntityId,
    pub name: String,
    pub aabb: Aabb,
}

impl Entity {
    pub fn new(id: EntityId, name: impl Into<String>, aabb: Aabb) -> Self {
        Self {
            id,
            name: name.into(),
            aabb,
        }
    }
}

/// Bounding box of one grid cell, as produced by the chunk creator
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ChunkBox {
    /// `cy * chunks_per_side + cx`
    pub index: u32,
    pub grid: UVec2,
    pub aabb: Aabb,
}

/// One cell of a region's chunk grid
#[derive(Clone, Debug)]
pub struct Chunk {
    pub name: String,
    pub aabb: Aabb,
    pub grid: UVec2,
    pub index: u32,
    entities: HashMap<EntityId, Arc<Entity>>,
}

impl Chunk {
    pub fn new(name: impl Into<String>, chunk_box: &ChunkBox) -> Self {
        Self {
            name: name.into(),
            aabb: chunk_box.aabb,
            grid: chunk_box.grid,
            index: chunk_box.index,
            entities: HashMap::new(),
        }
    }

    /// Insert or replace an entity, returning the previous one with that id
    pub fn add_entity(&mut self, entity: Arc<Entity>) -> Option<Arc<Entity>> {
        self.entities.insert(entity.id, entity)
    }

    pub fn remove_entity(&mut self, id: EntityId) -> Option<Arc<Entity>> {
        self.entities.remove(&id)
    }

    pub fn entity(&self, id: EntityId) -> Option<&Arc<Entity>> {
        self.entities.get(&id)
    }

    pub fn entities(&self) -> impl Iterator<Item = &Arc<Entity>> {
        self.entities.values()
    }

    pub fn entity_count(&self) -> usize {
        self.entities.len()
    }
}

/// Leaf payload of a region's BVH
#[derive(Clone, Debug)]
pub enum RegionItem {
    /// Chunk by grid index
    Chunk(u32),
    /// Entity attached to the chunk with this index
    Entity { chunk: u32, entity: Arc<Entity> },
}

impl RegionItem {
    pub fn chunk_index(&self) -> u32 {
        match self {
            RegionItem::Chunk(index) => *index,
            RegionItem::Entity { chunk, .. } => *chunk,
        }
    }
}
