//! Convenience constraints and their expansion into linear relations
//!
//! Every [`Constraint`] variant lowers to a list of [`LinearRelation`]s over
//! slot paths. The compiler only ever sees this lowered form.

use std::fmt;

use crate::parser::ast::{
    Constraint, Coord, ElementPath, LinearExpr, Property, Relation, Side, SlotPath,
};

/// `expr (= | <= | >=) 0`
#[derive(Debug, Clone, PartialEq)]
pub struct LinearRelation {
    pub expr: LinearExpr,
    pub relation: Relation,
}

impl LinearRelation {
    pub fn new(lhs: LinearExpr, relation: Relation, rhs: LinearExpr) -> Self {
        Self {
            expr: lhs.extend(rhs.scale(-1.0)),
            relation,
        }
    }
}

impl fmt::Display for LinearRelation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} 0", self.expr, self.relation.as_str())
    }
}

fn slot(path: &ElementPath, coord: Coord) -> SlotPath {
    path.prop(Property::Slot(coord))
}

/// `a.coord = b.coord`
fn flush(a: &ElementPath, b: &ElementPath, coord: Coord) -> LinearRelation {
    LinearRelation::new(
        LinearExpr::slot(slot(a, coord)),
        Relation::Eq,
        LinearExpr::slot(slot(b, coord)),
    )
}

/// `a.ca = b.cb`
fn meet(a: &ElementPath, ca: Coord, b: &ElementPath, cb: Coord) -> LinearRelation {
    LinearRelation::new(
        LinearExpr::slot(slot(a, ca)),
        Relation::Eq,
        LinearExpr::slot(slot(b, cb)),
    )
}

impl Constraint {
    /// Lower this constraint into linear relations
    pub fn expand(&self) -> Vec<LinearRelation> {
        match self {
            Constraint::Linear { lhs, relation, rhs } => {
                vec![LinearRelation::new(lhs.clone(), *relation, rhs.clone())]
            }
            Constraint::Beside {
                subject,
                anchor,
                side,
                gap,
            } => {
                let (subject_edge, anchor_edge, relation, offset) = match side {
                    Side::Right => (Coord::X1, Coord::X2, Relation::Ge, *gap),
                    Side::Left => (Coord::X2, Coord::X1, Relation::Le, -*gap),
                    Side::Top => (Coord::Y1, Coord::Y2, Relation::Ge, *gap),
                    Side::Bottom => (Coord::Y2, Coord::Y1, Relation::Le, -*gap),
                };
                vec![LinearRelation::new(
                    LinearExpr::slot(slot(subject, subject_edge)),
                    relation,
                    LinearExpr::slot(slot(anchor, anchor_edge)).plus(offset),
                )]
            }
            Constraint::Inside {
                inner,
                outer,
                margin,
            } => Coord::ALL
                .into_iter()
                .map(|coord| {
                    let low = matches!(coord, Coord::X1 | Coord::Y1);
                    let (relation, offset) = if low {
                        (Relation::Ge, *margin)
                    } else {
                        (Relation::Le, -*margin)
                    };
                    LinearRelation::new(
                        LinearExpr::slot(slot(inner, coord)),
                        relation,
                        LinearExpr::slot(slot(outer, coord)).plus(offset),
                    )
                })
                .collect(),
            Constraint::SameSize { a, b } => [Property::Width, Property::Height]
                .into_iter()
                .map(|p| {
                    LinearRelation::new(
                        LinearExpr::slot(a.prop(p)),
                        Relation::Eq,
                        LinearExpr::slot(b.prop(p)),
                    )
                })
                .collect(),
            Constraint::Subtract {
                target,
                minuend,
                subtrahend,
                side,
            } => expand_subtract(target, minuend, subtrahend, *side),
        }
    }

    /// `a = b + offset`
    pub fn equal(a: SlotPath, b: SlotPath, offset: f64) -> Self {
        Constraint::Linear {
            lhs: LinearExpr::slot(a),
            relation: Relation::Eq,
            rhs: LinearExpr::slot(b).plus(offset),
        }
    }

    /// `slot = value`
    pub fn fix(slot: SlotPath, value: f64) -> Self {
        Constraint::Linear {
            lhs: LinearExpr::slot(slot),
            relation: Relation::Eq,
            rhs: LinearExpr::constant(value),
        }
    }

    /// `a <= b + offset`
    pub fn at_most(a: SlotPath, b: SlotPath, offset: f64) -> Self {
        Constraint::Linear {
            lhs: LinearExpr::slot(a),
            relation: Relation::Le,
            rhs: LinearExpr::slot(b).plus(offset),
        }
    }

    /// `a >= b + offset`
    pub fn at_least(a: SlotPath, b: SlotPath, offset: f64) -> Self {
        Constraint::Linear {
            lhs: LinearExpr::slot(a),
            relation: Relation::Ge,
            rhs: LinearExpr::slot(b).plus(offset),
        }
    }

    pub fn beside(subject: ElementPath, side: Side, anchor: ElementPath, gap: f64) -> Self {
        Constraint::Beside {
            subject,
            anchor,
            side,
            gap,
        }
    }

    pub fn inside(inner: ElementPath, outer: ElementPath, margin: f64) -> Self {
        Constraint::Inside {
            inner,
            outer,
            margin,
        }
    }

    pub fn subtract(
        target: ElementPath,
        minuend: ElementPath,
        subtrahend: ElementPath,
        side: Side,
    ) -> Self {
        Constraint::Subtract {
            target,
            minuend,
            subtrahend,
            side,
        }
    }

    /// All element paths this constraint mentions
    pub fn element_paths(&self) -> Vec<&ElementPath> {
        match self {
            Constraint::Linear { lhs, rhs, .. } => lhs
                .terms
                .iter()
                .chain(rhs.terms.iter())
                .map(|t| &t.slot.element)
                .collect(),
            Constraint::Subtract {
                target,
                minuend,
                subtrahend,
                ..
            } => vec![target, minuend, subtrahend],
            Constraint::Beside {
                subject, anchor, ..
            } => vec![subject, anchor],
            Constraint::Inside { inner, outer, .. } => vec![inner, outer],
            Constraint::SameSize { a, b } => vec![a, b],
        }
    }
}

/// The subtrahend sits flush on `side` of the minuend spanning its full cross
/// extent; the target is the remaining strip on the opposite side.
fn expand_subtract(
    target: &ElementPath,
    minuend: &ElementPath,
    subtrahend: &ElementPath,
    side: Side,
) -> Vec<LinearRelation> {
    use Coord::*;

    // (flush edge, opposite edge, cross-axis edges)
    let (edge, opposite, cross) = match side {
        Side::Left => (X1, X2, [Y1, Y2]),
        Side::Right => (X2, X1, [Y1, Y2]),
        Side::Bottom => (Y1, Y2, [X1, X2]),
        Side::Top => (Y2, Y1, [X1, X2]),
    };

    let mut relations = vec![flush(subtrahend, minuend, edge)];
    for c in cross {
        relations.push(flush(subtrahend, minuend, c));
    }
    relations.push(meet(target, edge, subtrahend, opposite));
    relations.push(flush(target, minuend, opposite));
    for c in cross {
        relations.push(flush(target, minuend, c));
    }
    relations
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn rendered(c: &Constraint) -> Vec<String> {
        c.expand().iter().map(|r| r.to_string()).collect()
    }

    #[test]
    fn test_linear_moves_rhs_left() {
        let c = Constraint::equal(
            ElementPath::element("a").prop(Property::Slot(Coord::X2)),
            ElementPath::element("b").prop(Property::Slot(Coord::X1)),
            -5.0,
        );
        assert_eq!(rendered(&c), vec!["a.x2 - b.x1 + 5 = 0"]);
    }

    #[test]
    fn test_beside_right_and_below() {
        let right = Constraint::beside(
            ElementPath::element("b"),
            Side::Right,
            ElementPath::element("a"),
            3.0,
        );
        assert_eq!(rendered(&right), vec!["b.x1 - a.x2 - 3 >= 0"]);

        let below = Constraint::beside(
            ElementPath::element("b"),
            Side::Bottom,
            ElementPath::element("a"),
            2.0,
        );
        assert_eq!(rendered(&below), vec!["b.y2 - a.y1 + 2 <= 0"]);
    }

    #[test]
    fn test_inside_with_margin() {
        let c = Constraint::inside(ElementPath::element("a"), ElementPath::boundary(), 1.0);
        assert_eq!(
            rendered(&c),
            vec![
                "a.x1 - self.x1 - 1 >= 0",
                "a.y1 - self.y1 - 1 >= 0",
                "a.x2 - self.x2 + 1 <= 0",
                "a.y2 - self.y2 + 1 <= 0",
            ]
        );
    }

    #[test]
    fn test_subtract_left() {
        let c = Constraint::subtract(
            ElementPath::element("t"),
            ElementPath::element("m"),
            ElementPath::element("s"),
            Side::Left,
        );
        assert_eq!(
            rendered(&c),
            vec![
                "s.x1 - m.x1 = 0",
                "s.y1 - m.y1 = 0",
                "s.y2 - m.y2 = 0",
                "t.x1 - s.x2 = 0",
                "t.x2 - m.x2 = 0",
                "t.y1 - m.y1 = 0",
                "t.y2 - m.y2 = 0",
            ]
        );
    }

    #[test]
    fn test_same_size_uses_derived_properties() {
        let c = Constraint::SameSize {
            a: ElementPath::element("a"),
            b: ElementPath::element("b"),
        };
        assert_eq!(
            rendered(&c),
            vec!["a.width - b.width = 0", "a.height - b.height = 0"]
        );
    }
}
