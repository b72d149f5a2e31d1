use glam::DVec3;
use serde::{Deserialize, Serialize};

use crate::IndexError;

/// Axis-aligned simulation domain.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DomainBounds {
    pub min: DVec3,
    pub max: DVec3,
}

impl DomainBounds {
    #[must_use]
    pub const fn new(min: DVec3, max: DVec3) -> Self {
        Self { min, max }
    }

    /// Cube of half-width `half` centred on the origin.
    #[must_use]
    pub fn centered_cube(half: f64) -> Self {
        Self {
            min: DVec3::splat(-half),
            max: DVec3::splat(half),
        }
    }

    /// Edge lengths along each axis.
    #[must_use]
    pub fn extent(&self) -> DVec3 {
        self.max - self.min
    }

    /// Checks that the box is finite and non-degenerate along every axis.
    pub fn validate(&self) -> Result<(), IndexError> {
        if !self.min.is_finite() || !self.max.is_finite() {
            return Err(IndexError::InvalidConfig("domain bounds must be finite"));
        }
        if self.min.cmpge(self.max).any() {
            return Err(IndexError::InvalidConfig(
                "domain minimum must lie strictly below maximum on every axis",
            ));
        }
        Ok(())
    }
}

impl Default for DomainBounds {
    fn default() -> Self {
        Self::centered_cube(500.0)
    }
}

/// One of the six faces of the domain box, in escape-precedence order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Face {
    NegX,
    PosX,
    NegY,
    PosY,
    NegZ,
    PosZ,
}

impl Face {
    /// All faces in the order they are tested for escapes.
    pub const ALL: [Face; 6] = [
        Face::NegX,
        Face::PosX,
        Face::NegY,
        Face::PosY,
        Face::NegZ,
        Face::PosZ,
    ];

    /// Position of this face in [`Face::ALL`].
    #[must_use]
    pub const fn index(self) -> usize {
        self as usize
    }

    /// Coordinate axis (0 = x, 1 = y, 2 = z) the face is normal to.
    #[must_use]
    pub const fn axis(self) -> usize {
        self.index() / 2
    }

    /// True for the faces at the domain minimum.
    #[must_use]
    pub const fn is_lower(self) -> bool {
        self.index().is_multiple_of(2)
    }
}

/// Dense linear index of a voxel inside a [`VoxelMesh`].
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct VoxelIndex(pub usize);

/// Integer voxel coordinates along x, y and z.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GridCoord {
    pub i: usize,
    pub j: usize,
    pub k: usize,
}

/// Bounds-checked Cartesian mesh of equally sized voxels.
#[derive(Debug, Clone)]
pub struct VoxelMesh {
    bounds: DomainBounds,
    spacing: DVec3,
    dims: [usize; 3],
    centers: Vec<DVec3>,
    moore: Vec<Vec<VoxelIndex>>,
}

impl VoxelMesh {
    /// Build a mesh covering `bounds` with voxels of edge lengths `spacing`.
    ///
    /// The voxel count along each axis is rounded up, so the last layer may
    /// extend past the domain maximum.
    pub fn new(bounds: DomainBounds, spacing: DVec3) -> Result<Self, IndexError> {
        bounds.validate()?;
        if !spacing.is_finite() || spacing.cmple(DVec3::ZERO).any() {
            return Err(IndexError::InvalidConfig("voxel size must be positive and finite"));
        }
        let extent = bounds.extent();
        let count = |len: f64, step: f64| ((len / step).ceil() as usize).max(1);
        let dims = [
            count(extent.x, spacing.x),
            count(extent.y, spacing.y),
            count(extent.z, spacing.z),
        ];
        let total = dims[0]
            .checked_mul(dims[1])
            .and_then(|v| v.checked_mul(dims[2]))
            .ok_or(IndexError::InvalidConfig("voxel count overflows usize"))?;

        let mut mesh = Self {
            bounds,
            spacing,
            dims,
            centers: Vec::with_capacity(total),
            moore: Vec::with_capacity(total),
        };
        for linear in 0..total {
            let c = mesh.coord(VoxelIndex(linear));
            mesh.centers.push(
                bounds.min
                    + DVec3::new(
                        (c.i as f64 + 0.5) * spacing.x,
                        (c.j as f64 + 0.5) * spacing.y,
                        (c.k as f64 + 0.5) * spacing.z,
                    ),
            );
        }
        for linear in 0..total {
            let list = mesh.build_moore(VoxelIndex(linear));
            mesh.moore.push(list);
        }
        Ok(mesh)
    }

    fn build_moore(&self, voxel: VoxelIndex) -> Vec<VoxelIndex> {
        let c = self.coord(voxel);
        let mut out = Vec::with_capacity(26);
        // k outermost keeps the list sorted by linear index.
        for dk in -1i64..=1 {
            for dj in -1i64..=1 {
                for di in -1i64..=1 {
                    if di == 0 && dj == 0 && dk == 0 {
                        continue;
                    }
                    let i = c.i as i64 + di;
                    let j = c.j as i64 + dj;
                    let k = c.k as i64 + dk;
                    if i < 0
                        || j < 0
                        || k < 0
                        || i >= self.dims[0] as i64
                        || j >= self.dims[1] as i64
                        || k >= self.dims[2] as i64
                    {
                        continue;
                    }
                    out.push(self.linear(GridCoord {
                        i: i as usize,
                        j: j as usize,
                        k: k as usize,
                    }));
                }
            }
        }
        out
    }

    #[must_use]
    pub fn bounds(&self) -> &DomainBounds {
        &self.bounds
    }

    #[must_use]
    pub fn spacing(&self) -> DVec3 {
        self.spacing
    }

    /// Voxel counts along x, y and z.
    #[must_use]
    pub fn dims(&self) -> [usize; 3] {
        self.dims
    }

    /// Total number of voxels.
    #[must_use]
    pub fn len(&self) -> usize {
        self.centers.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.centers.is_empty()
    }

    #[must_use]
    pub fn coord(&self, voxel: VoxelIndex) -> GridCoord {
        let plane = self.dims[0] * self.dims[1];
        let k = voxel.0 / plane;
        let rem = voxel.0 % plane;
        GridCoord {
            i: rem % self.dims[0],
            j: rem / self.dims[0],
            k,
        }
    }

    #[must_use]
    pub fn linear(&self, coord: GridCoord) -> VoxelIndex {
        VoxelIndex(coord.i + self.dims[0] * (coord.j + self.dims[1] * coord.k))
    }

    /// Centre of `voxel`, or `None` for an index outside this mesh.
    #[must_use]
    pub fn center(&self, voxel: VoxelIndex) -> Option<DVec3> {
        self.centers.get(voxel.0).copied()
    }

    /// Moore-connected voxels of `voxel`, sorted by linear index.
    #[must_use]
    pub fn moore_neighbors(&self, voxel: VoxelIndex) -> &[VoxelIndex] {
        self.moore.get(voxel.0).map_or(&[], Vec::as_slice)
    }

    /// Voxel containing `position`, or `None` outside the closed domain box.
    #[must_use]
    pub fn voxel_at(&self, position: DVec3) -> Option<VoxelIndex> {
        if !position.is_finite()
            || position.cmplt(self.bounds.min).any()
            || position.cmpgt(self.bounds.max).any()
        {
            return None;
        }
        let rel = (position - self.bounds.min) / self.spacing;
        let axis = |value: f64, n: usize| (value.floor() as usize).min(n - 1);
        Some(self.linear(GridCoord {
            i: axis(rel.x, self.dims[0]),
            j: axis(rel.y, self.dims[1]),
            k: axis(rel.z, self.dims[2]),
        }))
    }

    /// First domain face violated by `position`, tested in [`Face::ALL`] order.
    ///
    /// Points lying exactly on a face count as escaping through it.
    #[must_use]
    pub fn escaping_face(&self, position: DVec3) -> Option<Face> {
        let min = self.bounds.min;
        let max = self.bounds.max;
        if position.x <= min.x {
            return Some(Face::NegX);
        }
        if position.x >= max.x {
            return Some(Face::PosX);
        }
        if position.y <= min.y {
            return Some(Face::NegY);
        }
        if position.y >= max.y {
            return Some(Face::PosY);
        }
        if position.z <= min.z {
            return Some(Face::NegZ);
        }
        if position.z >= max.z {
            return Some(Face::PosZ);
        }
        None
    }
}
