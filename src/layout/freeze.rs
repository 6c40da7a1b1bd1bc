//! Freezing: turning a finished cell into a fixed-size template
//!
//! A frozen cell contributes only its cached bounding box to the solves of
//! its parents, so its internal slots never enter their variable index.

use tracing::{debug, info, warn};

use crate::parser::ast::Coord;

use super::cell::Cell;
use super::error::LayoutError;
use super::library::Library;
use super::types::{CellId, Rect, SlotValue};

impl Library {
    /// Freeze a cell whose primitives and instances are all resolved.
    ///
    /// Every instance must place a frozen template at that template's size.
    /// Unresolved boundary slots are taken from the extent of the cell's
    /// content. Freezing an already frozen cell does nothing.
    pub fn freeze(&mut self, id: CellId) -> Result<(), LayoutError> {
        let cell = self
            .cell(id)
            .ok_or_else(|| LayoutError::unknown_cell(id.to_string()))?;
        if cell.frozen {
            debug!(cell = %cell.name, "already frozen");
            return Ok(());
        }
        self.check_freezable(cell)?;

        let cell = self
            .cells_mut()
            .get_mut(id.0)
            .ok_or_else(|| LayoutError::unknown_cell(id.to_string()))?;
        let extent = cell.content_extent().unwrap_or_else(Rect::zero);
        for coord in Coord::ALL {
            if !cell.boundary.get(coord).is_resolved() {
                cell.boundary.set(coord, SlotValue::Solved(extent.coord(coord)));
            }
        }
        let Some(bbox) = cell.boundary.resolved() else {
            return Err(LayoutError::FreezePrecondition {
                cell: cell.name.clone(),
                slot: "self".to_string(),
            });
        };
        cell.bbox = Some(bbox);
        cell.frozen = true;
        info!(cell = %cell.name, bbox = %bbox, "frozen");
        Ok(())
    }

    fn check_freezable(&self, cell: &Cell) -> Result<(), LayoutError> {
        if let Some(slot) = cell.first_unresolved() {
            return Err(LayoutError::FreezePrecondition {
                cell: cell.name.clone(),
                slot,
            });
        }
        if let Some(slot) = cell.first_inverted() {
            return Err(LayoutError::InvertedRect {
                cell: cell.name.clone(),
                slot,
            });
        }
        for inst in &cell.instances {
            let template = self
                .cell(inst.template)
                .ok_or_else(|| LayoutError::unknown_cell(inst.template.to_string()))?;
            if !template.frozen {
                return Err(LayoutError::UnfrozenTemplate {
                    cell: cell.name.clone(),
                    instance: inst.name.clone(),
                    template: template.name.clone(),
                });
            }
            let (Some(placed), Some(bbox)) = (inst.rect(), template.bbox) else {
                continue;
            };
            if (placed.width(), placed.height()) != (bbox.width(), bbox.height()) {
                return Err(LayoutError::StaleInstance {
                    cell: cell.name.clone(),
                    instance: inst.name.clone(),
                    template: template.name.clone(),
                });
            }
        }
        Ok(())
    }

    /// Make a frozen cell editable again.
    ///
    /// Refused while a frozen cell still places it; unfreeze the parents first.
    pub fn unfreeze(&mut self, id: CellId) -> Result<(), LayoutError> {
        let frozen_parent = self
            .parents_of(id)
            .into_iter()
            .find(|&p| self.is_frozen(p))
            .and_then(|p| self.cell(p).map(|c| c.name().to_string()));
        let cell = self
            .cells_mut()
            .get_mut(id.0)
            .ok_or_else(|| LayoutError::unknown_cell(id.to_string()))?;
        if !cell.frozen {
            debug!(cell = %cell.name, "not frozen");
            return Ok(());
        }
        if let Some(parent) = frozen_parent {
            warn!(cell = %cell.name, parent = %parent, "unfreeze refused");
            return Err(LayoutError::FrozenParent {
                cell: cell.name.clone(),
                parent,
            });
        }
        cell.frozen = false;
        cell.bbox = None;
        info!(cell = %cell.name, "unfrozen");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::types::SlotOwner;

    #[test]
    fn test_freeze_requires_resolved_content() {
        let mut lib = Library::new();
        let c = lib.add_cell("c").unwrap();
        lib.add_rect(c, "a", "m1").unwrap();
        lib.assign(c, "a", Coord::X1, 0).unwrap();
        match lib.freeze(c) {
            Err(LayoutError::FreezePrecondition { cell, slot }) => {
                assert_eq!(cell, "c");
                assert_eq!(slot, "a.y1");
            }
            other => panic!("Expected precondition failure, got {:?}", other),
        }
        assert!(!lib.is_frozen(c));
    }

    #[test]
    fn test_freeze_takes_boundary_from_content() {
        let mut lib = Library::new();
        let c = lib.add_cell("c").unwrap();
        lib.add_rect(c, "a", "m1").unwrap();
        lib.place_rect(c, "a", Rect::new(1, 2, 5, 6)).unwrap();
        lib.add_rect(c, "b", "m2").unwrap();
        lib.place_rect(c, "b", Rect::new(4, 0, 8, 3)).unwrap();
        lib.freeze(c).unwrap();
        assert!(lib.is_frozen(c));
        assert_eq!(lib.bounding_box(c), Some(Rect::new(1, 0, 8, 6)));
        let boundary = lib.cell(c).unwrap().slots(SlotOwner::Boundary).copied();
        assert_eq!(boundary.and_then(|b| b.resolved()), Some(Rect::new(1, 0, 8, 6)));
    }

    #[test]
    fn test_freeze_keeps_fixed_boundary() {
        let mut lib = Library::new();
        let c = lib.add_cell("c").unwrap();
        lib.add_rect(c, "a", "m1").unwrap();
        lib.place_rect(c, "a", Rect::new(1, 1, 2, 2)).unwrap();
        lib.place_rect(c, "self", Rect::new(0, 0, 10, 10)).unwrap();
        lib.freeze(c).unwrap();
        assert_eq!(lib.bounding_box(c), Some(Rect::new(0, 0, 10, 10)));
    }

    #[test]
    fn test_empty_cell_freezes_to_zero() {
        let mut lib = Library::new();
        let c = lib.add_cell("empty").unwrap();
        lib.freeze(c).unwrap();
        assert_eq!(lib.bounding_box(c), Some(Rect::zero()));
    }

    #[test]
    fn test_freeze_and_unfreeze_are_idempotent() {
        let mut lib = Library::new();
        let c = lib.add_cell("c").unwrap();
        lib.unfreeze(c).unwrap();
        lib.freeze(c).unwrap();
        lib.freeze(c).unwrap();
        assert!(lib.is_frozen(c));
        lib.unfreeze(c).unwrap();
        assert!(!lib.is_frozen(c));
        assert_eq!(lib.bounding_box(c), None);
        lib.add_rect(c, "a", "m1").unwrap();
    }

    #[test]
    fn test_inverted_rect_blocks_freeze() {
        let mut lib = Library::new();
        let c = lib.add_cell("c").unwrap();
        lib.add_rect(c, "a", "m1").unwrap();
        lib.assign(c, "a", Coord::X1, 10).unwrap();
        lib.assign(c, "a", Coord::X2, 0).unwrap();
        lib.assign(c, "a", Coord::Y1, 0).unwrap();
        lib.assign(c, "a", Coord::Y2, 5).unwrap();
        match lib.freeze(c) {
            Err(LayoutError::InvertedRect { cell, slot }) => {
                assert_eq!(cell, "c");
                assert_eq!(slot, "a.x2");
            }
            other => panic!("Expected inverted rect, got {:?}", other),
        }
        assert!(!lib.is_frozen(c));
        assert_eq!(lib.bounding_box(c), None);
    }

    fn placed_square(lib: &mut Library) -> (CellId, CellId) {
        let t = lib.add_cell("t").unwrap();
        lib.add_rect(t, "a", "m1").unwrap();
        lib.place_rect(t, "a", Rect::new(0, 0, 2, 2)).unwrap();
        lib.freeze(t).unwrap();
        let q = lib.add_cell("q").unwrap();
        lib.add_instance(q, "u", t).unwrap();
        lib.place_instance(q, "u", 0, 0).unwrap();
        (t, q)
    }

    #[test]
    fn test_freeze_requires_frozen_templates() {
        let mut lib = Library::new();
        let (t, q) = placed_square(&mut lib);
        lib.unfreeze(t).unwrap();
        match lib.freeze(q) {
            Err(LayoutError::UnfrozenTemplate { cell, instance, template }) => {
                assert_eq!((cell.as_str(), instance.as_str(), template.as_str()), ("q", "u", "t"));
            }
            other => panic!("Expected unfrozen template, got {:?}", other),
        }
        assert!(!lib.is_frozen(q));
        lib.freeze(t).unwrap();
        lib.freeze(q).unwrap();
        assert_eq!(lib.bounding_box(q), Some(Rect::new(0, 0, 2, 2)));
    }

    #[test]
    fn test_freeze_rejects_stale_instance() {
        let mut lib = Library::new();
        let (t, q) = placed_square(&mut lib);
        lib.unfreeze(t).unwrap();
        lib.add_rect(t, "b", "m2").unwrap();
        lib.place_rect(t, "b", Rect::new(0, 0, 5, 5)).unwrap();
        lib.freeze(t).unwrap();
        assert!(matches!(
            lib.freeze(q),
            Err(LayoutError::StaleInstance { ref instance, .. }) if instance == "u"
        ));
    }

    #[test]
    fn test_unfreeze_refused_under_frozen_parent() {
        let mut lib = Library::new();
        let (t, q) = placed_square(&mut lib);
        lib.freeze(q).unwrap();
        match lib.unfreeze(t) {
            Err(LayoutError::FrozenParent { cell, parent }) => {
                assert_eq!((cell.as_str(), parent.as_str()), ("t", "q"));
            }
            other => panic!("Expected frozen parent, got {:?}", other),
        }
        assert!(lib.is_frozen(t));
        lib.unfreeze(q).unwrap();
        lib.unfreeze(t).unwrap();
    }
}
