use std::collections::HashSet;

use slotmap::SlotMap;

use crate::CellId;
use crate::cell::Cell;

/// Dense cell storage addressed through generational handles.
#[derive(Debug, Clone)]
pub struct CellArena {
    slots: SlotMap<CellId, usize>,
    handles: Vec<CellId>,
    cells: Vec<Cell>,
}

impl Default for CellArena {
    fn default() -> Self {
        Self::new()
    }
}

impl CellArena {
    #[must_use]
    pub fn new() -> Self {
        Self {
            slots: SlotMap::with_key(),
            handles: Vec::new(),
            cells: Vec::new(),
        }
    }

    /// Number of live cells.
    #[must_use]
    pub fn len(&self) -> usize {
        self.cells.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    /// Handles in dense iteration order.
    pub fn iter_handles(&self) -> impl Iterator<Item = CellId> + '_ {
        self.handles.iter().copied()
    }

    #[must_use]
    pub fn handles(&self) -> &[CellId] {
        &self.handles
    }

    /// Cells in dense iteration order, parallel to [`Self::handles`].
    #[must_use]
    pub fn cells(&self) -> &[Cell] {
        &self.cells
    }

    /// Handles alongside mutable cells, for per-cell parallel passes.
    pub fn split_mut(&mut self) -> (&[CellId], &mut [Cell]) {
        (&self.handles, &mut self.cells)
    }

    #[must_use]
    pub fn index_of(&self, id: CellId) -> Option<usize> {
        self.slots.get(id).copied()
    }

    /// True if `id` refers to a live cell.
    #[must_use]
    pub fn contains(&self, id: CellId) -> bool {
        self.slots.contains_key(id)
    }

    #[must_use]
    pub fn get(&self, id: CellId) -> Option<&Cell> {
        self.cells.get(self.index_of(id)?)
    }

    pub fn get_mut(&mut self, id: CellId) -> Option<&mut Cell> {
        let index = self.index_of(id)?;
        self.cells.get_mut(index)
    }

    /// Two distinct cells at once; `None` if either is absent or `a == b`.
    pub fn pair_mut(&mut self, a: CellId, b: CellId) -> Option<(&mut Cell, &mut Cell)> {
        let ia = self.index_of(a)?;
        let ib = self.index_of(b)?;
        let [first, second] = self.cells.get_disjoint_mut([ia, ib]).ok()?;
        Some((first, second))
    }

    /// Insert a new cell and return its handle.
    pub fn insert(&mut self, cell: Cell) -> CellId {
        let index = self.cells.len();
        self.cells.push(cell);
        let id = self.slots.insert(index);
        self.handles.push(id);
        id
    }

    /// Remove `id`, returning the cell if it was present.
    pub fn remove(&mut self, id: CellId) -> Option<Cell> {
        let index = self.slots.remove(id)?;
        let removed = self.cells.swap_remove(index);
        let removed_handle = self.handles.swap_remove(index);
        debug_assert_eq!(removed_handle, id);
        if index < self.handles.len() {
            let moved = self.handles[index];
            if let Some(slot) = self.slots.get_mut(moved) {
                *slot = index;
            }
        }
        Some(removed)
    }

    /// Remove every cell in `dead`, preserving iteration order of the rest.
    pub fn remove_many(&mut self, dead: &HashSet<CellId>) -> usize {
        if dead.is_empty() {
            return 0;
        }
        let before = self.cells.len();
        let mut write = 0;
        for read in 0..self.handles.len() {
            let id = self.handles[read];
            if dead.contains(&id) {
                self.slots.remove(id);
                continue;
            }
            if write != read {
                self.handles.swap(write, read);
                self.cells.swap(write, read);
            }
            if let Some(slot) = self.slots.get_mut(id) {
                *slot = write;
            }
            write += 1;
        }
        self.handles.truncate(write);
        self.cells.truncate(write);
        before - write
    }

    /// Iterate handles and cells together.
    pub fn iter(&self) -> impl Iterator<Item = (CellId, &Cell)> + '_ {
        self.handles.iter().copied().zip(self.cells.iter())
    }
}
