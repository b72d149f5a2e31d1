use std::collections::HashMap;
use std::hash::Hash;

use glam::DVec3;
use ordered_float::OrderedFloat;

use crate::{DomainBounds, Face, GridCoord, IndexError, NeighborhoodIndex, VoxelIndex, VoxelMesh};

/// Where the container has filed an agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Location {
    /// Inside the domain, member of this voxel.
    Voxel(VoxelIndex),
    /// Pushed out of the domain through this face.
    Outside(Face),
}

/// Outcome of re-registering an agent after it moved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Relocation {
    Stayed,
    Moved(VoxelIndex),
    Escaped(Face),
}

#[derive(Debug, Clone, Copy)]
struct Entry {
    location: Location,
    position: DVec3,
}

/// Uniform voxel grid that owns agent-to-voxel membership.
///
/// The container is the single authority over an agent's location: every
/// registered agent sits in exactly one voxel or exactly one outer bucket.
/// Membership lists keep insertion order so traversal is reproducible.
#[derive(Debug, Clone)]
pub struct CellContainer<K> {
    mesh: VoxelMesh,
    voxels: Vec<Vec<K>>,
    outer: [Vec<K>; 6],
    entries: HashMap<K, Entry>,
    max_interaction_distance: Vec<f64>,
}

impl<K> CellContainer<K>
where
    K: Copy + Eq + Hash,
{
    /// Build a container over `bounds` with cubic voxels of edge `voxel_size`.
    pub fn new(bounds: DomainBounds, voxel_size: f64) -> Result<Self, IndexError> {
        Self::with_spacing(bounds, DVec3::splat(voxel_size))
    }

    /// Build a container with independent voxel edge lengths per axis.
    pub fn with_spacing(bounds: DomainBounds, spacing: DVec3) -> Result<Self, IndexError> {
        let mesh = VoxelMesh::new(bounds, spacing)?;
        let voxel_count = mesh.len();
        Ok(Self {
            mesh,
            voxels: vec![Vec::new(); voxel_count],
            outer: Default::default(),
            entries: HashMap::new(),
            max_interaction_distance: vec![0.0; voxel_count],
        })
    }

    #[must_use]
    pub fn mesh(&self) -> &VoxelMesh {
        &self.mesh
    }

    /// Number of registered agents, inside or outside the domain.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[must_use]
    pub fn contains(&self, id: K) -> bool {
        self.entries.contains_key(&id)
    }

    #[must_use]
    pub fn location(&self, id: K) -> Option<Location> {
        self.entries.get(&id).map(|entry| entry.location)
    }

    /// True when `id` is filed in one of the outer buckets.
    #[must_use]
    pub fn is_out_of_domain(&self, id: K) -> bool {
        matches!(self.location(id), Some(Location::Outside(_)))
    }

    /// Agents filed in `voxel`, in registration order.
    #[must_use]
    pub fn members(&self, voxel: VoxelIndex) -> &[K] {
        self.voxels.get(voxel.0).map_or(&[], Vec::as_slice)
    }

    /// Agents that left the domain through `face`.
    #[must_use]
    pub fn outer_bucket(&self, face: Face) -> &[K] {
        &self.outer[face.index()]
    }

    /// First domain face `position` violates, if any.
    #[must_use]
    pub fn find_escaping_face(&self, position: DVec3) -> Option<Face> {
        self.mesh.escaping_face(position)
    }

    /// File `id` under the voxel implied by `position`, or under the escaping
    /// face when the position is outside the open domain box.
    pub fn register(&mut self, id: K, position: DVec3) -> Location {
        self.remove(id);
        let location = match self.classify(position) {
            Location::Voxel(voxel) => {
                self.voxels[voxel.0].push(id);
                Location::Voxel(voxel)
            }
            Location::Outside(face) => {
                self.outer[face.index()].push(id);
                Location::Outside(face)
            }
        };
        self.entries.insert(id, Entry { location, position });
        location
    }

    /// Erase `id` from whichever voxel or bucket holds it.
    pub fn remove(&mut self, id: K) -> Option<Location> {
        let entry = self.entries.remove(&id)?;
        let list = match entry.location {
            Location::Voxel(voxel) => &mut self.voxels[voxel.0],
            Location::Outside(face) => &mut self.outer[face.index()],
        };
        if let Some(pos) = list.iter().position(|member| *member == id) {
            list.remove(pos);
        }
        Some(entry.location)
    }

    /// Re-file `id` after it moved to `position`.
    pub fn update(&mut self, id: K, position: DVec3) -> Relocation {
        let target = self.classify(position);
        if self.location(id) == Some(target) {
            if let Some(entry) = self.entries.get_mut(&id) {
                entry.position = position;
            }
            return Relocation::Stayed;
        }
        match self.register(id, position) {
            Location::Voxel(voxel) => Relocation::Moved(voxel),
            Location::Outside(face) => Relocation::Escaped(face),
        }
    }

    /// Flag `id` as out of domain and file it under the face `position`
    /// escapes through. Returns `None`, leaving the agent untouched, when the
    /// position is strictly inside the domain.
    pub fn add_to_outer_bucket(&mut self, id: K, position: DVec3) -> Option<Face> {
        let face = self.find_escaping_face(position)?;
        self.remove(id);
        self.outer[face.index()].push(id);
        self.entries.insert(
            id,
            Entry {
                location: Location::Outside(face),
                position,
            },
        );
        Some(face)
    }

    /// Raise the cached maximum interaction reach of `voxel` to `distance`.
    pub fn note_interaction_distance(&mut self, voxel: VoxelIndex, distance: f64) {
        if let Some(slot) = self.max_interaction_distance.get_mut(voxel.0) {
            if *slot < distance {
                *slot = distance;
            }
        }
    }

    #[must_use]
    pub fn max_interaction_distance(&self, voxel: VoxelIndex) -> f64 {
        self.max_interaction_distance
            .get(voxel.0)
            .copied()
            .unwrap_or(0.0)
    }

    /// Early-reject test for Moore neighbours.
    ///
    /// Measures the distance from `position` (inside `home`) to the face,
    /// edge or corner shared with `other` and keeps `other` only when that
    /// gap can be bridged by `reach` plus the largest reach cached for
    /// `other`. Indices outside the mesh are never neighbours.
    #[must_use]
    pub fn is_neighbor_voxel(
        &self,
        position: DVec3,
        reach: f64,
        home: VoxelIndex,
        other: VoxelIndex,
    ) -> bool {
        let (Some(home_center), Some(other_center)) =
            (self.mesh.center(home), self.mesh.center(other))
        else {
            return false;
        };
        let limit = reach + self.max_interaction_distance(other);
        let shared = 0.5 * (home_center + other_center);
        let a = self.mesh.coord(home);
        let b = self.mesh.coord(other);
        let gap = position - shared;
        let differs = [a.i != b.i, a.j != b.j, a.k != b.k];
        // Only the axes along which the voxels differ constrain the distance.
        let mut dist_sq = 0.0;
        for (axis, differ) in differs.into_iter().enumerate() {
            if differ {
                dist_sq += gap[axis] * gap[axis];
            }
        }
        dist_sq <= limit * limit
    }

    /// Visit the candidate neighbours of `id`: members of its own voxel first,
    /// then members of every Moore voxel that passes [`Self::is_neighbor_voxel`].
    ///
    /// Agents outside the domain have no neighbours. `id` itself is skipped.
    pub fn neighbors_of(&self, id: K, reach: f64, visitor: &mut dyn FnMut(K)) {
        let Some(entry) = self.entries.get(&id) else {
            return;
        };
        let Location::Voxel(home) = entry.location else {
            return;
        };
        for &member in self.members(home) {
            if member != id {
                visitor(member);
            }
        }
        for &other in self.mesh.moore_neighbors(home) {
            if !self.is_neighbor_voxel(entry.position, reach, home, other) {
                continue;
            }
            for &member in self.members(other) {
                visitor(member);
            }
        }
    }

    /// Rebuild the mesh for new bounds or voxel size and re-file every agent
    /// from its last known position. Returns agents that now fall outside.
    pub fn resize(&mut self, bounds: DomainBounds, spacing: DVec3) -> Result<Vec<K>, IndexError> {
        let mesh = VoxelMesh::new(bounds, spacing)?;
        let mut order: Vec<(K, DVec3)> = Vec::with_capacity(self.entries.len());
        for list in self.voxels.iter().chain(self.outer.iter()) {
            for &id in list {
                if let Some(entry) = self.entries.get(&id) {
                    order.push((id, entry.position));
                }
            }
        }
        let voxel_count = mesh.len();
        self.mesh = mesh;
        self.voxels = vec![Vec::new(); voxel_count];
        self.outer = Default::default();
        self.entries.clear();
        self.max_interaction_distance = vec![0.0; voxel_count];

        let mut escaped = Vec::new();
        for (id, position) in order {
            if let Location::Outside(_) = self.register(id, position) {
                escaped.push(id);
            }
        }
        Ok(escaped)
    }

    /// Iterate over every registered agent and its location.
    pub fn iter(&self) -> impl Iterator<Item = (K, Location)> + '_ {
        self.entries.iter().map(|(id, entry)| (*id, entry.location))
    }

    fn classify(&self, position: DVec3) -> Location {
        if let Some(face) = self.find_escaping_face(position) {
            return Location::Outside(face);
        }
        match self.mesh.voxel_at(position) {
            Some(voxel) => Location::Voxel(voxel),
            // Non-finite coordinates fail every comparison above.
            None => Location::Outside(Face::NegX),
        }
    }
}

impl<K> NeighborhoodIndex<K> for CellContainer<K>
where
    K: Copy + Eq + Hash,
{
    fn neighbors_within(
        &self,
        center: DVec3,
        radius_sq: f64,
        visitor: &mut dyn FnMut(K, OrderedFloat<f64>),
    ) {
        if radius_sq < 0.0 || !center.is_finite() {
            return;
        }
        let radius = radius_sq.sqrt();
        let bounds = self.mesh.bounds();
        let spacing = self.mesh.spacing();
        let dims = self.mesh.dims();
        let lo = ((center - radius - bounds.min) / spacing).floor();
        let hi = ((center + radius - bounds.min) / spacing).floor();
        let clamp = |value: f64, n: usize| value.clamp(0.0, (n - 1) as f64) as usize;
        for k in clamp(lo.z, dims[2])..=clamp(hi.z, dims[2]) {
            for j in clamp(lo.y, dims[1])..=clamp(hi.y, dims[1]) {
                for i in clamp(lo.x, dims[0])..=clamp(hi.x, dims[0]) {
                    let voxel = self.mesh.linear(GridCoord { i, j, k });
                    for &member in self.members(voxel) {
                        let Some(entry) = self.entries.get(&member) else {
                            continue;
                        };
                        let dist_sq = entry.position.distance_squared(center);
                        if dist_sq <= radius_sq {
                            visitor(member, OrderedFloat(dist_sq));
                        }
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn container() -> CellContainer<u32> {
        CellContainer::new(
            DomainBounds::new(DVec3::ZERO, DVec3::splat(100.0)),
            20.0,
        )
        .expect("container")
    }

    #[test]
    fn register_files_into_voxel_and_outer_bucket() {
        let mut grid = container();
        let inside = grid.register(1, DVec3::splat(50.0));
        assert!(matches!(inside, Location::Voxel(_)));
        let outside = grid.register(2, DVec3::new(120.0, 50.0, 50.0));
        assert_eq!(outside, Location::Outside(Face::PosX));
        assert_eq!(grid.outer_bucket(Face::PosX), &[2]);
        assert!(grid.is_out_of_domain(2));
        assert!(!grid.is_out_of_domain(1));
        assert_eq!(grid.len(), 2);
    }

    #[test]
    fn re_register_never_duplicates_membership() {
        let mut grid = container();
        grid.register(7, DVec3::splat(10.0));
        grid.register(7, DVec3::splat(90.0));
        let total: usize = (0..grid.mesh().len())
            .map(|v| grid.members(VoxelIndex(v)).len())
            .sum();
        assert_eq!(total, 1);
    }

    #[test]
    fn update_reports_stay_move_and_escape() {
        let mut grid = container();
        grid.register(3, DVec3::splat(10.0));
        assert_eq!(grid.update(3, DVec3::splat(12.0)), Relocation::Stayed);
        assert!(matches!(
            grid.update(3, DVec3::splat(50.0)),
            Relocation::Moved(_)
        ));
        assert_eq!(
            grid.update(3, DVec3::new(50.0, 50.0, 0.0)),
            Relocation::Escaped(Face::NegZ)
        );
        assert!(grid.is_out_of_domain(3));
        assert!(matches!(
            grid.update(3, DVec3::splat(50.0)),
            Relocation::Moved(_)
        ));
        assert!(grid.outer_bucket(Face::NegZ).is_empty());
    }

    #[test]
    fn remove_erases_membership() {
        let mut grid = container();
        let Location::Voxel(voxel) = grid.register(5, DVec3::splat(30.0)) else {
            panic!("expected voxel");
        };
        assert_eq!(grid.remove(5), Some(Location::Voxel(voxel)));
        assert!(grid.members(voxel).is_empty());
        assert_eq!(grid.remove(5), None);
    }

    #[test]
    fn add_to_outer_bucket_requires_escape() {
        let mut grid = container();
        grid.register(9, DVec3::splat(30.0));
        assert_eq!(grid.add_to_outer_bucket(9, DVec3::splat(30.0)), None);
        assert!(!grid.is_out_of_domain(9));
        assert_eq!(
            grid.add_to_outer_bucket(9, DVec3::new(100.0, 100.0, 50.0)),
            Some(Face::PosX)
        );
        assert_eq!(grid.location(9), Some(Location::Outside(Face::PosX)));
    }

    #[test]
    fn neighbors_of_visits_home_voxel_first_and_skips_self() {
        let mut grid = container();
        grid.register(1, DVec3::new(39.0, 30.0, 30.0));
        grid.register(2, DVec3::new(35.0, 30.0, 30.0));
        grid.register(3, DVec3::new(41.0, 30.0, 30.0));
        let home = match grid.location(1) {
            Some(Location::Voxel(v)) => v,
            other => panic!("unexpected {other:?}"),
        };
        let neighbor = match grid.location(3) {
            Some(Location::Voxel(v)) => v,
            other => panic!("unexpected {other:?}"),
        };
        grid.note_interaction_distance(neighbor, 5.0);
        let mut seen = Vec::new();
        grid.neighbors_of(1, 5.0, &mut |id| seen.push(id));
        assert_eq!(seen, vec![2, 3]);
        assert_ne!(home, neighbor);
    }

    #[test]
    fn early_reject_prunes_far_voxels() {
        let mut grid = container();
        grid.register(1, DVec3::new(21.0, 30.0, 30.0));
        grid.register(2, DVec3::new(41.0, 30.0, 30.0));
        let mut seen = Vec::new();
        grid.neighbors_of(1, 2.0, &mut |id| seen.push(id));
        assert!(seen.is_empty());
    }

    #[test]
    fn is_neighbor_voxel_measures_to_shared_edge() {
        let mut grid = container();
        grid.register(1, DVec3::new(39.0, 39.0, 30.0));
        let home = grid.mesh().voxel_at(DVec3::new(39.0, 39.0, 30.0)).expect("home");
        let diagonal = grid.mesh().voxel_at(DVec3::new(41.0, 41.0, 30.0)).expect("diag");
        // distance to the shared edge at (40, 40) is sqrt(2)
        assert!(grid.is_neighbor_voxel(DVec3::new(39.0, 39.0, 30.0), 1.5, home, diagonal));
        assert!(!grid.is_neighbor_voxel(DVec3::new(39.0, 39.0, 30.0), 1.4, home, diagonal));
    }

    #[test]
    fn foreign_voxel_index_is_never_a_neighbor() {
        let grid = container();
        let home = grid.mesh().voxel_at(DVec3::new(39.0, 39.0, 30.0)).expect("home");
        let foreign = VoxelIndex(grid.mesh().len() + 7);
        assert!(!grid.is_neighbor_voxel(DVec3::new(39.0, 39.0, 30.0), 1e9, home, foreign));
        assert!(!grid.is_neighbor_voxel(DVec3::new(39.0, 39.0, 30.0), 1e9, foreign, home));
    }

    #[test]
    fn interaction_distance_cache_keeps_maximum() {
        let mut grid = container();
        let voxel = VoxelIndex(0);
        grid.note_interaction_distance(voxel, 4.0);
        grid.note_interaction_distance(voxel, 2.0);
        assert_eq!(grid.max_interaction_distance(voxel), 4.0);
    }

    #[test]
    fn neighbors_within_reports_squared_distances() {
        let mut grid = container();
        grid.register(1, DVec3::splat(50.0));
        grid.register(2, DVec3::new(53.0, 54.0, 50.0));
        grid.register(3, DVec3::new(80.0, 50.0, 50.0));
        let mut hits = Vec::new();
        grid.neighbors_within(DVec3::splat(50.0), 25.0, &mut |id, d| hits.push((id, d.0)));
        hits.sort_by_key(|(id, _)| *id);
        assert_eq!(hits, vec![(1, 0.0), (2, 25.0)]);
    }

    #[test]
    fn resize_refiles_agents() {
        let mut grid = container();
        grid.register(1, DVec3::splat(10.0));
        grid.register(2, DVec3::splat(90.0));
        let escaped = grid
            .resize(
                DomainBounds::new(DVec3::ZERO, DVec3::splat(50.0)),
                DVec3::splat(10.0),
            )
            .expect("resize");
        assert_eq!(escaped, vec![2]);
        assert_eq!(grid.mesh().len(), 125);
        assert!(matches!(grid.location(1), Some(Location::Voxel(_))));
        assert_eq!(grid.location(2), Some(Location::Outside(Face::PosX)));
    }
}
