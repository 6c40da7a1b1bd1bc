//! Core types for the layout engine

use std::fmt;

use crate::parser::ast::Coord;

/// Index of a cell in its [`Library`](super::Library)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CellId(pub usize);

impl fmt::Display for CellId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// An axis-aligned rectangle on the integer grid
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Rect {
    pub x1: i64,
    pub y1: i64,
    pub x2: i64,
    pub y2: i64,
}

impl Rect {
    /// Create a rectangle, normalizing so that `x1 <= x2` and `y1 <= y2`
    pub fn new(x1: i64, y1: i64, x2: i64, y2: i64) -> Self {
        Self {
            x1: x1.min(x2),
            y1: y1.min(y2),
            x2: x1.max(x2),
            y2: y1.max(y2),
        }
    }

    /// Create a zero-sized rectangle at the origin
    pub fn zero() -> Self {
        Self::default()
    }

    pub fn width(&self) -> i64 {
        self.x2 - self.x1
    }

    pub fn height(&self) -> i64 {
        self.y2 - self.y1
    }

    pub fn area(&self) -> i64 {
        self.width() * self.height()
    }

    pub fn coord(&self, coord: Coord) -> i64 {
        match coord {
            Coord::X1 => self.x1,
            Coord::Y1 => self.y1,
            Coord::X2 => self.x2,
            Coord::Y2 => self.y2,
        }
    }

    /// Move the rectangle by `(dx, dy)`
    pub fn translate(&self, dx: i64, dy: i64) -> Rect {
        Rect {
            x1: self.x1 + dx,
            y1: self.y1 + dy,
            x2: self.x2 + dx,
            y2: self.y2 + dy,
        }
    }

    /// Smallest rectangle containing both
    pub fn union(&self, other: &Rect) -> Rect {
        Rect {
            x1: self.x1.min(other.x1),
            y1: self.y1.min(other.y1),
            x2: self.x2.max(other.x2),
            y2: self.y2.max(other.y2),
        }
    }

    /// Check if `other` lies fully inside this rectangle (edges may touch)
    pub fn contains(&self, other: &Rect) -> bool {
        other.x1 >= self.x1 && other.x2 <= self.x2 && other.y1 >= self.y1 && other.y2 <= self.y2
    }
}

impl fmt::Display for Rect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {}, {}, {})", self.x1, self.y1, self.x2, self.y2)
    }
}

/// State of a single coordinate slot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SlotValue {
    #[default]
    Unresolved,
    /// Assigned manually; a constant in every solve
    Fixed(i64),
    /// Written by a solve; free again in the next one
    Solved(i64),
}

impl SlotValue {
    pub fn value(&self) -> Option<i64> {
        match self {
            SlotValue::Unresolved => None,
            SlotValue::Fixed(v) | SlotValue::Solved(v) => Some(*v),
        }
    }

    pub fn is_resolved(&self) -> bool {
        !matches!(self, SlotValue::Unresolved)
    }

    /// Whether a solve may choose this slot's value
    pub fn is_free(&self) -> bool {
        !matches!(self, SlotValue::Fixed(_))
    }
}

/// Four coordinate slots of a rectangle, each resolved independently
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SlotRect {
    slots: [SlotValue; 4],
}

impl SlotRect {
    pub fn unresolved() -> Self {
        Self::default()
    }

    /// All four slots fixed to the given rectangle
    pub fn fixed(rect: Rect) -> Self {
        Self {
            slots: Coord::ALL.map(|c| SlotValue::Fixed(rect.coord(c))),
        }
    }

    /// All four slots marked as solver output
    pub fn solved(rect: Rect) -> Self {
        Self {
            slots: Coord::ALL.map(|c| SlotValue::Solved(rect.coord(c))),
        }
    }

    pub fn get(&self, coord: Coord) -> SlotValue {
        self.slots[coord as usize]
    }

    pub fn set(&mut self, coord: Coord, value: SlotValue) {
        self.slots[coord as usize] = value;
    }

    /// The rectangle, once every slot is resolved
    pub fn resolved(&self) -> Option<Rect> {
        Some(Rect::new(
            self.get(Coord::X1).value()?,
            self.get(Coord::Y1).value()?,
            self.get(Coord::X2).value()?,
            self.get(Coord::Y2).value()?,
        ))
    }

    /// The upper edge of the first axis whose resolved slots are out of order
    pub fn inverted(&self) -> Option<Coord> {
        [(Coord::X1, Coord::X2), (Coord::Y1, Coord::Y2)]
            .into_iter()
            .find(|&(lo, hi)| {
                matches!(
                    (self.get(lo).value(), self.get(hi).value()),
                    (Some(a), Some(b)) if a > b
                )
            })
            .map(|(_, hi)| hi)
    }

    pub fn is_resolved(&self) -> bool {
        self.slots.iter().all(SlotValue::is_resolved)
    }

    pub fn first_unresolved(&self) -> Option<Coord> {
        Coord::ALL.into_iter().find(|c| !self.get(*c).is_resolved())
    }

    pub fn has_free_slot(&self) -> bool {
        self.slots.iter().any(SlotValue::is_free)
    }
}

/// Which rectangle of a cell a slot belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum SlotOwner {
    /// The cell's own extent, `self` in constraint paths
    Boundary,
    Primitive(usize),
    Instance(usize),
}

/// Globally unique address of one coordinate slot within a library
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SlotKey {
    pub cell: CellId,
    pub owner: SlotOwner,
    pub coord: Coord,
}

impl SlotKey {
    pub fn new(cell: CellId, owner: SlotOwner, coord: Coord) -> Self {
        Self { cell, owner, coord }
    }
}

/// A layer-tagged rectangle owned by a cell
#[derive(Debug, Clone, PartialEq)]
pub struct Primitive {
    pub name: String,
    /// Opaque tag, only meaningful to exporters and extraction
    pub layer: String,
    pub slots: SlotRect,
}

impl Primitive {
    pub fn new(name: impl Into<String>, layer: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            layer: layer.into(),
            slots: SlotRect::unresolved(),
        }
    }

    pub fn rect(&self) -> Option<Rect> {
        self.slots.resolved()
    }
}

/// A placement of a template cell inside a parent cell
#[derive(Debug, Clone, PartialEq)]
pub struct Instance {
    pub name: String,
    pub template: CellId,
    /// Placement rectangle in the parent's coordinate space
    pub slots: SlotRect,
}

impl Instance {
    pub fn new(name: impl Into<String>, template: CellId) -> Self {
        Self {
            name: name.into(),
            template,
            slots: SlotRect::unresolved(),
        }
    }

    pub fn rect(&self) -> Option<Rect> {
        self.slots.resolved()
    }
}

/// A primitive flattened into the coordinate space of a root cell
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlatShape {
    pub layer: String,
    pub rect: Rect,
    /// Instance names from the root down, followed by the primitive name
    pub path: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rect_normalizes() {
        let r = Rect::new(10, 5, 0, 0);
        assert_eq!(r, Rect::new(0, 0, 10, 5));
        assert_eq!(r.width(), 10);
        assert_eq!(r.height(), 5);
        assert_eq!(r.area(), 50);
    }

    #[test]
    fn test_rect_union_and_contains() {
        let a = Rect::new(0, 0, 2, 2);
        let b = Rect::new(5, 5, 7, 7);
        let u = a.union(&b);
        assert_eq!(u, Rect::new(0, 0, 7, 7));
        assert!(u.contains(&a));
        assert!(u.contains(&b));
        assert!(!a.contains(&b));
    }

    #[test]
    fn test_slot_rect_resolution() {
        let mut slots = SlotRect::unresolved();
        assert_eq!(slots.first_unresolved(), Some(Coord::X1));
        slots.set(Coord::X1, SlotValue::Fixed(0));
        slots.set(Coord::Y1, SlotValue::Solved(1));
        slots.set(Coord::X2, SlotValue::Fixed(4));
        assert_eq!(slots.first_unresolved(), Some(Coord::Y2));
        assert_eq!(slots.resolved(), None);
        slots.set(Coord::Y2, SlotValue::Solved(3));
        assert_eq!(slots.resolved(), Some(Rect::new(0, 1, 4, 3)));
        assert!(slots.has_free_slot());
        assert!(!SlotRect::fixed(Rect::zero()).has_free_slot());
    }

    #[test]
    fn test_inverted_slots() {
        let mut slots = SlotRect::unresolved();
        slots.set(Coord::X1, SlotValue::Fixed(10));
        slots.set(Coord::X2, SlotValue::Fixed(0));
        assert_eq!(slots.inverted(), Some(Coord::X2));
        slots.set(Coord::Y1, SlotValue::Fixed(0));
        slots.set(Coord::Y2, SlotValue::Fixed(5));
        assert_eq!(slots.resolved(), Some(Rect::new(0, 0, 10, 5)));
        assert_eq!(SlotRect::fixed(Rect::new(0, 0, 1, 1)).inverted(), None);
    }
}
