//! Spatial partitioning for cell agents: a uniform voxel mesh, per-voxel
//! membership, Moore adjacency and the six outer buckets that hold agents
//! pushed through a domain face.

mod container;
mod mesh;

pub use container::{CellContainer, Location, Relocation};
pub use mesh::{DomainBounds, Face, GridCoord, VoxelIndex, VoxelMesh};

use glam::DVec3;
use ordered_float::OrderedFloat;
use thiserror::Error;

/// Errors emitted while building or resizing the voxel mesh.
#[derive(Debug, Error, PartialEq)]
pub enum IndexError {
    /// Domain bounds or voxel size cannot produce a mesh with at least one voxel.
    #[error("invalid configuration: {0}")]
    InvalidConfig(&'static str),
}

/// Radius queries over agents filed in a spatial container.
pub trait NeighborhoodIndex<K> {
    /// Visit every registered agent whose position lies within `radius_sq`
    /// (squared distance) of `center`, passing the squared distance along.
    fn neighbors_within(
        &self,
        center: DVec3,
        radius_sq: f64,
        visitor: &mut dyn FnMut(K, OrderedFloat<f64>),
    );
}
