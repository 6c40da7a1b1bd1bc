//! A cell: primitives, instances and constraints sharing one coordinate space

use crate::parser::ast::{Constraint, Coord, SELF_KEYWORD};

use super::types::{Instance, Primitive, Rect, SlotOwner, SlotRect};

#[derive(Debug, Clone, PartialEq)]
pub struct Cell {
    pub(crate) name: String,
    pub(crate) primitives: Vec<Primitive>,
    pub(crate) instances: Vec<Instance>,
    pub(crate) constraints: Vec<Constraint>,
    /// The cell's own extent
    pub(crate) boundary: SlotRect,
    pub(crate) frozen: bool,
    /// Valid after a successful solve or while frozen
    pub(crate) bbox: Option<Rect>,
}

impl Cell {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            primitives: Vec::new(),
            instances: Vec::new(),
            constraints: Vec::new(),
            boundary: SlotRect::unresolved(),
            frozen: false,
            bbox: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn primitives(&self) -> &[Primitive] {
        &self.primitives
    }

    pub fn instances(&self) -> &[Instance] {
        &self.instances
    }

    pub fn constraints(&self) -> &[Constraint] {
        &self.constraints
    }

    pub fn boundary(&self) -> &SlotRect {
        &self.boundary
    }

    pub fn is_frozen(&self) -> bool {
        self.frozen
    }

    /// Cached bounding box
    pub fn bbox(&self) -> Option<Rect> {
        self.bbox
    }

    pub fn primitive(&self, name: &str) -> Option<&Primitive> {
        self.primitives.iter().find(|p| p.name == name)
    }

    pub fn instance(&self, name: &str) -> Option<&Instance> {
        self.instances.iter().find(|i| i.name == name)
    }

    /// Find the rectangle a single path segment names
    pub fn lookup(&self, name: &str) -> Option<SlotOwner> {
        if name == SELF_KEYWORD {
            return Some(SlotOwner::Boundary);
        }
        if let Some(i) = self.primitives.iter().position(|p| p.name == name) {
            return Some(SlotOwner::Primitive(i));
        }
        self.instances
            .iter()
            .position(|i| i.name == name)
            .map(SlotOwner::Instance)
    }

    pub fn has_element(&self, name: &str) -> bool {
        self.lookup(name).is_some()
    }

    pub fn slots(&self, owner: SlotOwner) -> Option<&SlotRect> {
        match owner {
            SlotOwner::Boundary => Some(&self.boundary),
            SlotOwner::Primitive(i) => self.primitives.get(i).map(|p| &p.slots),
            SlotOwner::Instance(i) => self.instances.get(i).map(|i| &i.slots),
        }
    }

    pub(crate) fn slots_mut(&mut self, owner: SlotOwner) -> Option<&mut SlotRect> {
        match owner {
            SlotOwner::Boundary => Some(&mut self.boundary),
            SlotOwner::Primitive(i) => self.primitives.get_mut(i).map(|p| &mut p.slots),
            SlotOwner::Instance(i) => self.instances.get_mut(i).map(|i| &mut i.slots),
        }
    }

    /// Every rectangle of the cell in enumeration order: boundary, primitives, instances
    pub fn owners(&self) -> impl Iterator<Item = SlotOwner> + '_ {
        std::iter::once(SlotOwner::Boundary)
            .chain((0..self.primitives.len()).map(SlotOwner::Primitive))
            .chain((0..self.instances.len()).map(SlotOwner::Instance))
    }

    /// Display name of a rectangle (`self`, a primitive or an instance name)
    pub fn owner_name(&self, owner: SlotOwner) -> &str {
        match owner {
            SlotOwner::Boundary => SELF_KEYWORD,
            SlotOwner::Primitive(i) => self.primitives.get(i).map_or("?", |p| p.name.as_str()),
            SlotOwner::Instance(i) => self.instances.get(i).map_or("?", |i| i.name.as_str()),
        }
    }

    /// First unresolved slot of an owned primitive or instance, as `elem.coord`
    pub fn first_unresolved(&self) -> Option<String> {
        let prims = self.primitives.iter().map(|p| (&p.name, &p.slots));
        let insts = self.instances.iter().map(|i| (&i.name, &i.slots));
        prims.chain(insts).find_map(|(name, slots)| {
            slots
                .first_unresolved()
                .map(|coord: Coord| format!("{}.{}", name, coord))
        })
    }

    /// First rectangle (boundary included) with `x1 > x2` or `y1 > y2`, as `elem.coord`
    pub fn first_inverted(&self) -> Option<String> {
        self.owners().find_map(|owner| {
            let coord = self.slots(owner)?.inverted()?;
            Some(format!("{}.{}", self.owner_name(owner), coord))
        })
    }

    /// Union of all resolved primitive and instance rectangles
    pub fn content_extent(&self) -> Option<Rect> {
        self.primitives
            .iter()
            .filter_map(Primitive::rect)
            .chain(self.instances.iter().filter_map(Instance::rect))
            .reduce(|a, b| a.union(&b))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::types::{CellId, SlotValue};

    #[test]
    fn test_lookup_order() {
        let mut cell = Cell::new("top");
        cell.primitives.push(Primitive::new("a", "m1"));
        cell.instances.push(Instance::new("u1", CellId(0)));
        assert_eq!(cell.lookup("self"), Some(SlotOwner::Boundary));
        assert_eq!(cell.lookup("a"), Some(SlotOwner::Primitive(0)));
        assert_eq!(cell.lookup("u1"), Some(SlotOwner::Instance(0)));
        assert_eq!(cell.lookup("missing"), None);
        assert_eq!(
            cell.owners().collect::<Vec<_>>(),
            vec![
                SlotOwner::Boundary,
                SlotOwner::Primitive(0),
                SlotOwner::Instance(0)
            ]
        );
    }

    #[test]
    fn test_first_unresolved_reports_element_and_coord() {
        let mut cell = Cell::new("top");
        let mut a = Primitive::new("a", "m1");
        a.slots = SlotRect::fixed(Rect::new(0, 0, 1, 1));
        let mut b = Primitive::new("b", "m1");
        b.slots.set(Coord::X1, SlotValue::Fixed(0));
        cell.primitives.push(a);
        cell.primitives.push(b);
        assert_eq!(cell.first_unresolved(), Some("b.y1".to_string()));
    }

    #[test]
    fn test_content_extent() {
        let mut cell = Cell::new("top");
        assert_eq!(cell.content_extent(), None);
        let mut a = Primitive::new("a", "m1");
        a.slots = SlotRect::fixed(Rect::new(0, 0, 2, 2));
        let mut u = Instance::new("u", CellId(1));
        u.slots = SlotRect::solved(Rect::new(5, 1, 9, 8));
        cell.primitives.push(a);
        cell.instances.push(u);
        assert_eq!(cell.content_extent(), Some(Rect::new(0, 0, 9, 8)));
    }
}
