//! Bounding-volume geometry: boxes, planes, frusta, rays, fitting and SAT

pub mod aabb;
pub mod plane;
pub mod frustum;
pub mod obb;
pub mod obb_fit;
pub mod ray;

pub use aabb::Aabb;
pub use plane::Plane;
pub use frustum::{Frustum, ConvexVolume};
pub use obb::Obb;
pub use obb_fit::{ObbFit, fit_points};
pub use ray::Ray;
