//! Abstract Syntax Tree types for the cell layout language
//!
//! The constraint types here are the closed expression language shared by the
//! parser and the programmatic API. The compiler never sees surface syntax,
//! only these variants.

use std::fmt;

/// Byte range in source text
pub type Span = std::ops::Range<usize>;

/// AST node with source location
#[derive(Debug, Clone, PartialEq)]
pub struct Spanned<T> {
    pub node: T,
    pub span: Span,
}

impl<T> Spanned<T> {
    pub fn new(node: T, span: Span) -> Self {
        Self { node, span }
    }
}

/// Valid identifier (alphanumeric + underscore, starts with letter/_)
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Identifier(pub String);

impl Identifier {
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Root AST node - a complete layout script
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub statements: Vec<Spanned<Statement>>,
}

/// Top-level statement, executed in order
#[derive(Debug, Clone, PartialEq)]
pub enum Statement {
    /// Cell declaration: `cell name { ... }`
    Cell(CellDecl),
    /// `solve name`
    Solve(Spanned<Identifier>),
    /// `freeze name`
    Freeze(Spanned<Identifier>),
    /// `unfreeze name`
    Unfreeze(Spanned<Identifier>),
    /// `copy source as target`
    Copy {
        source: Spanned<Identifier>,
        target: Spanned<Identifier>,
    },
}

/// Cell declaration with its body
#[derive(Debug, Clone, PartialEq)]
pub struct CellDecl {
    pub name: Spanned<Identifier>,
    pub items: Vec<Spanned<CellItem>>,
}

/// One item inside a cell body
#[derive(Debug, Clone, PartialEq)]
pub enum CellItem {
    /// `rect name on layer [x1: 0, ...]`
    Rect(RectDecl),
    /// `inst name of template [at x, y]`
    Inst(InstDecl),
    /// `constrain <constraint>`
    Constrain(Constraint),
}

/// Rectangle primitive declaration
#[derive(Debug, Clone, PartialEq)]
pub struct RectDecl {
    pub name: Spanned<Identifier>,
    pub layer: Spanned<String>,
    /// Manually assigned coordinates
    pub coords: Vec<(Coord, f64)>,
}

/// Instance declaration
#[derive(Debug, Clone, PartialEq)]
pub struct InstDecl {
    pub name: Spanned<Identifier>,
    pub template: Spanned<Identifier>,
    /// Manual placement of the lower-left corner
    pub at: Option<(f64, f64)>,
}

/// One of the four coordinate slots of a rectangle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Coord {
    X1,
    Y1,
    X2,
    Y2,
}

impl Coord {
    pub const ALL: [Coord; 4] = [Coord::X1, Coord::Y1, Coord::X2, Coord::Y2];

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "x1" => Some(Self::X1),
            "y1" => Some(Self::Y1),
            "x2" => Some(Self::X2),
            "y2" => Some(Self::Y2),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::X1 => "x1",
            Self::Y1 => "y1",
            Self::X2 => "x2",
            Self::Y2 => "y2",
        }
    }

    /// Whether this slot lies on the horizontal axis
    pub fn is_x(&self) -> bool {
        matches!(self, Self::X1 | Self::X2)
    }
}

impl fmt::Display for Coord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Properties that can be referenced in a linear expression.
///
/// Beyond the four raw slots, `width`/`height` and the centers are linear
/// combinations of them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Property {
    Slot(Coord),
    Width,
    Height,
    CenterX,
    CenterY,
}

impl Property {
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "width" => Some(Self::Width),
            "height" => Some(Self::Height),
            "cx" => Some(Self::CenterX),
            "cy" => Some(Self::CenterY),
            other => Coord::from_str(other).map(Self::Slot),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Slot(c) => c.as_str(),
            Self::Width => "width",
            Self::Height => "height",
            Self::CenterX => "cx",
            Self::CenterY => "cy",
        }
    }
}

/// Dotted path to a rectangle, relative to the cell the constraint lives in.
///
/// `self` names the cell boundary, `a` a primitive or instance, `u1.a` the
/// element `a` of the template placed by instance `u1`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ElementPath {
    pub segments: Vec<String>,
}

impl ElementPath {
    pub fn new<S: Into<String>>(segments: impl IntoIterator<Item = S>) -> Self {
        Self {
            segments: segments.into_iter().map(Into::into).collect(),
        }
    }

    /// Path to a single element of the current cell
    pub fn element(name: impl Into<String>) -> Self {
        Self {
            segments: vec![name.into()],
        }
    }

    /// Path to the boundary of the current cell
    pub fn boundary() -> Self {
        Self::element(SELF_KEYWORD)
    }

    pub fn prop(&self, property: Property) -> SlotPath {
        SlotPath {
            element: self.clone(),
            property,
        }
    }
}

/// Reserved element name for the enclosing cell's boundary
pub const SELF_KEYWORD: &str = "self";

impl fmt::Display for ElementPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.segments.join("."))
    }
}

/// Property of an element: `a.x2`, `u1.a.width`
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SlotPath {
    pub element: ElementPath,
    pub property: Property,
}

impl SlotPath {
    pub fn new(element: ElementPath, property: Property) -> Self {
        Self { element, property }
    }
}

impl fmt::Display for SlotPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.element, self.property.as_str())
    }
}

/// `coefficient * slot`
#[derive(Debug, Clone, PartialEq)]
pub struct Term {
    pub coefficient: f64,
    pub slot: SlotPath,
}

/// Sum of terms plus a constant
#[derive(Debug, Clone, PartialEq, Default)]
pub struct LinearExpr {
    pub terms: Vec<Term>,
    pub constant: f64,
}

impl LinearExpr {
    pub fn constant(value: f64) -> Self {
        Self {
            terms: Vec::new(),
            constant: value,
        }
    }

    pub fn slot(slot: SlotPath) -> Self {
        Self {
            terms: vec![Term {
                coefficient: 1.0,
                slot,
            }],
            constant: 0.0,
        }
    }

    pub fn plus(mut self, value: f64) -> Self {
        self.constant += value;
        self
    }

    pub fn add_term(mut self, coefficient: f64, slot: SlotPath) -> Self {
        self.terms.push(Term { coefficient, slot });
        self
    }

    /// Multiply every term and the constant by `factor`
    pub fn scale(mut self, factor: f64) -> Self {
        for term in &mut self.terms {
            term.coefficient *= factor;
        }
        self.constant *= factor;
        self
    }

    /// Append another expression
    pub fn extend(mut self, other: LinearExpr) -> Self {
        self.terms.extend(other.terms);
        self.constant += other.constant;
        self
    }
}

impl From<SlotPath> for LinearExpr {
    fn from(slot: SlotPath) -> Self {
        Self::slot(slot)
    }
}

impl fmt::Display for LinearExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for term in &self.terms {
            let magnitude = term.coefficient.abs();
            if first {
                if term.coefficient < 0.0 {
                    f.write_str("-")?;
                }
            } else if term.coefficient < 0.0 {
                f.write_str(" - ")?;
            } else {
                f.write_str(" + ")?;
            }
            if magnitude != 1.0 {
                write!(f, "{} * ", magnitude)?;
            }
            write!(f, "{}", term.slot)?;
            first = false;
        }
        if first {
            write!(f, "{}", self.constant)?;
        } else if self.constant > 0.0 {
            write!(f, " + {}", self.constant)?;
        } else if self.constant < 0.0 {
            write!(f, " - {}", -self.constant)?;
        }
        Ok(())
    }
}

/// Comparison between two sides of a linear constraint
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Relation {
    Eq,
    Le,
    Ge,
}

impl Relation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Eq => "=",
            Self::Le => "<=",
            Self::Ge => ">=",
        }
    }
}

/// Side of a rectangle, used by relational and subtract constraints.
///
/// `Top` is the high-y side (layout coordinates grow upwards).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Left,
    Right,
    Top,
    Bottom,
}

impl Side {
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "left" => Some(Self::Left),
            "right" => Some(Self::Right),
            "top" => Some(Self::Top),
            "bottom" => Some(Self::Bottom),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Left => "left",
            Self::Right => "right",
            Self::Top => "top",
            Self::Bottom => "bottom",
        }
    }
}

/// A declarative relation between coordinate slots
#[derive(Debug, Clone, PartialEq)]
pub enum Constraint {
    /// `lhs (= | <= | >=) rhs`
    Linear {
        lhs: LinearExpr,
        relation: Relation,
        rhs: LinearExpr,
    },
    /// `target = minuend - subtrahend`: the subtrahend sits flush against
    /// `side` of the minuend and the target is the remaining strip.
    Subtract {
        target: ElementPath,
        minuend: ElementPath,
        subtrahend: ElementPath,
        side: Side,
    },
    /// `subject right_of anchor [gap: g]` and friends
    Beside {
        subject: ElementPath,
        anchor: ElementPath,
        side: Side,
        gap: f64,
    },
    /// `inner inside outer [margin: m]`
    Inside {
        inner: ElementPath,
        outer: ElementPath,
        margin: f64,
    },
    /// `a same_size b`
    SameSize { a: ElementPath, b: ElementPath },
}

impl fmt::Display for Constraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Constraint::Linear { lhs, relation, rhs } => {
                write!(f, "{} {} {}", lhs, relation.as_str(), rhs)
            }
            Constraint::Subtract {
                target,
                minuend,
                subtrahend,
                side,
            } => write!(
                f,
                "{} = {} - {} [side: {}]",
                target,
                minuend,
                subtrahend,
                side.as_str()
            ),
            Constraint::Beside {
                subject,
                anchor,
                side,
                gap,
            } => {
                let keyword = match side {
                    Side::Left => "left_of",
                    Side::Right => "right_of",
                    Side::Top => "above",
                    Side::Bottom => "below",
                };
                write!(f, "{} {} {}", subject, keyword, anchor)?;
                if *gap != 0.0 {
                    write!(f, " [gap: {}]", gap)?;
                }
                Ok(())
            }
            Constraint::Inside {
                inner,
                outer,
                margin,
            } => {
                write!(f, "{} inside {}", inner, outer)?;
                if *margin != 0.0 {
                    write!(f, " [margin: {}]", margin)?;
                }
                Ok(())
            }
            Constraint::SameSize { a, b } => write!(f, "{} same_size {}", a, b),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn slot(element: &str, prop: &str) -> SlotPath {
        ElementPath::element(element).prop(Property::from_str(prop).unwrap())
    }

    #[test]
    fn test_property_names() {
        assert_eq!(Property::from_str("x1"), Some(Property::Slot(Coord::X1)));
        assert_eq!(Property::from_str("width"), Some(Property::Width));
        assert_eq!(Property::from_str("cy"), Some(Property::CenterY));
        assert_eq!(Property::from_str("left"), None);
    }

    #[test]
    fn test_linear_display() {
        let c = Constraint::Linear {
            lhs: LinearExpr::slot(slot("a", "x2")).plus(5.0),
            relation: Relation::Eq,
            rhs: LinearExpr::slot(slot("b", "x1")),
        };
        insta::assert_snapshot!(c.to_string(), @"a.x2 + 5 = b.x1");
    }

    #[test]
    fn test_scaled_display() {
        let lhs = LinearExpr::default()
            .add_term(2.0, slot("a", "cx"))
            .add_term(-1.0, slot("self", "x2"));
        let c = Constraint::Linear {
            lhs,
            relation: Relation::Le,
            rhs: LinearExpr::constant(-1.0),
        };
        insta::assert_snapshot!(c.to_string(), @"2 * a.cx - self.x2 <= -1");
    }

    #[test]
    fn test_relation_display() {
        let c = Constraint::Beside {
            subject: ElementPath::element("b"),
            anchor: ElementPath::new(["u1", "a"]),
            side: Side::Right,
            gap: 3.0,
        };
        assert_eq!(c.to_string(), "b right_of u1.a [gap: 3]");
    }
}
