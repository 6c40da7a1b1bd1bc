//! Variable index: numbering of the free slots reachable from a solve root

use std::collections::{HashMap, HashSet};

use crate::parser::ast::Coord;

use super::library::Library;
use super::types::{CellId, SlotKey};

/// Column assignment for one solve.
///
/// Built fresh from a traversal of the root cell and every cell reachable
/// through instances of unfrozen templates. Frozen subtrees contribute no
/// columns; their instances are sized from the cached bounding box.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VariableIndex {
    root: CellId,
    scope: Vec<CellId>,
    columns: HashMap<SlotKey, usize>,
    keys: Vec<SlotKey>,
}

impl VariableIndex {
    pub fn build(library: &Library, root: CellId) -> Self {
        let mut scope = Vec::new();
        let mut seen = HashSet::new();
        collect_scope(library, root, &mut seen, &mut scope);

        let mut columns = HashMap::new();
        let mut keys = Vec::new();
        for &id in &scope {
            let cell = library.cell_ref(id);
            for owner in cell.owners() {
                let Some(slots) = cell.slots(owner) else {
                    continue;
                };
                for coord in Coord::ALL {
                    if slots.get(coord).is_free() {
                        let key = SlotKey::new(id, owner, coord);
                        columns.insert(key, keys.len());
                        keys.push(key);
                    }
                }
            }
        }

        Self {
            root,
            scope,
            columns,
            keys,
        }
    }

    pub fn root(&self) -> CellId {
        self.root
    }

    /// Cells whose free slots are numbered, root first, depth-first
    pub fn scope(&self) -> &[CellId] {
        &self.scope
    }

    pub fn in_scope(&self, cell: CellId) -> bool {
        self.scope.contains(&cell)
    }

    pub fn column(&self, key: &SlotKey) -> Option<usize> {
        self.columns.get(key).copied()
    }

    pub fn key(&self, column: usize) -> Option<&SlotKey> {
        self.keys.get(column)
    }

    /// Number of columns
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// `(column, slot)` pairs in column order
    pub fn iter(&self) -> impl Iterator<Item = (usize, &SlotKey)> {
        self.keys.iter().enumerate()
    }
}

fn collect_scope(library: &Library, id: CellId, seen: &mut HashSet<CellId>, out: &mut Vec<CellId>) {
    if !seen.insert(id) {
        return;
    }
    out.push(id);
    let cell = library.cell_ref(id);
    for inst in cell.instances() {
        if !library.cell_ref(inst.template).is_frozen() {
            collect_scope(library, inst.template, seen, out);
        }
    }
}
