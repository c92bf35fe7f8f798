//! Region grid addressing

use std::fmt;
use std::ops::{Add, Sub};

use serde::{Deserialize, Serialize};

use crate::core::types::{Vec2, Vec3};

/// Integer address of one streaming region on the world grid
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct RegionCoord {
    pub x: i32,
    pub y: i32,
}

/// Center plus the 8 surrounding offsets
pub const NEIGHBORHOOD_OFFSETS: [RegionCoord; 9] = [
    RegionCoord::new(0, 0),
    RegionCoord::new(-1, -1),
    RegionCoord::new(0, -1),
    RegionCoord::new(1, -1),
    RegionCoord::new(-1, 0),
    RegionCoord::new(1, 0),
    RegionCoord::new(-1, 1),
    RegionCoord::new(0, 1),
    RegionCoord::new(1, 1),
];

/// Chebyshev distance 1 shell
pub const RING_OFFSETS: [RegionCoord; 8] = [
    RegionCoord::new(-1, -1),
    RegionCoord::new(0, -1),
    RegionCoord::new(1, -1),
    RegionCoord::new(-1, 0),
    RegionCoord::new(1, 0),
    RegionCoord::new(-1, 1),
    RegionCoord::new(0, 1),
    RegionCoord::new(1, 1),
];

/// Chebyshev distance 2 shell
pub const OUTER_RING_OFFSETS: [RegionCoord; 16] = [
    RegionCoord::new(-2, -2),
    RegionCoord::new(-1, -2),
    RegionCoord::new(0, -2),
    RegionCoord::new(1, -2),
    RegionCoord::new(2, -2),
    RegionCoord::new(-2, -1),
    RegionCoord::new(2, -1),
    RegionCoord::new(-2, 0),
    RegionCoord::new(2, 0),
    RegionCoord::new(-2, 1),
    RegionCoord::new(2, 1),
    RegionCoord::new(-2, 2),
    RegionCoord::new(-1, 2),
    RegionCoord::new(0, 2),
    RegionCoord::new(1, 2),
    RegionCoord::new(2, 2),
];

impl RegionCoord {
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    /// Region containing a world position (x/y plane, floor division)
    pub fn from_world(position: Vec3, region_size: f32) -> Self {
        Self {
            x: (position.x / region_size).floor() as i32,
            y: (position.y / region_size).floor() as i32,
        }
    }

    /// World-space x/y of the region's minimum corner
    pub fn world_origin(&self, region_size: f32) -> Vec2 {
        Vec2::new(self.x as f32 * region_size, self.y as f32 * region_size)
    }

    pub fn manhattan_distance(&self, other: RegionCoord) -> u32 {
        self.x.abs_diff(other.x) + self.y.abs_diff(other.y)
    }

    pub fn chebyshev_distance(&self, other: RegionCoord) -> u32 {
        self.x.abs_diff(other.x).max(self.y.abs_diff(other.y))
    }

    /// This coordinate and its 8 neighbours, center first
    pub fn neighborhood(&self) -> [RegionCoord; 9] {
        NEIGHBORHOOD_OFFSETS.map(|offset| *self + offset)
    }

    pub fn ring(&self) -> [RegionCoord; 8] {
        RING_OFFSETS.map(|offset| *self + offset)
    }

    pub fn outer_ring(&self) -> [RegionCoord; 16] {
        OUTER_RING_OFFSETS.map(|offset| *self + offset)
    }
}

impl Add for RegionCoord {
    type Output = RegionCoord;

    fn add(self, rhs: RegionCoord) -> RegionCoord {
        RegionCoord::new(self.x + rhs.x, self.y + rhs.y)
    }
}

impl Sub for RegionCoord {
    type Output = RegionCoord;

    fn sub(self, rhs: RegionCoord) -> RegionCoord {
        RegionCoord::new(self.x - rhs.x, self.y - rhs.y)
    }
}

impl fmt::Display for RegionCoord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.x, self.y)
    }
}
