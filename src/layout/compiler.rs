//! Constraint compiler: cells in scope → linear program
//!
//! Rows are emitted per cell in scope: rectangle ordering, containment in the
//! cell boundary, instance sizes, then the user's constraints. Slot paths are
//! resolved to columns of the [`VariableIndex`] or to constants.

use std::collections::BTreeMap;

use crate::parser::ast::{Coord, ElementPath, LinearExpr, Property, Relation};

use super::config::Objective;
use super::constraint::LinearRelation;
use super::error::{CompileError, LayoutError};
use super::index::VariableIndex;
use super::library::Library;
use super::types::{CellId, SlotKey, SlotOwner};

/// Tolerance for rows whose terms all turned out constant
const CONSTANT_EPSILON: f64 = 1e-9;

/// Why a row exists
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowKind {
    /// `x1 <= x2`, `y1 <= y2`
    Ordering,
    /// Element inside the cell boundary
    Containment,
    /// Instance size equals its template's bounding box
    InstanceSize,
    /// Written by the user
    User,
}

/// Where a row came from, for error reporting
#[derive(Debug, Clone, PartialEq)]
pub struct RowOrigin {
    pub cell: CellId,
    pub cell_name: String,
    pub description: String,
    pub kind: RowKind,
}

/// `sum(coefficient * column) (= | <= | >=) rhs`
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    pub terms: Vec<(usize, f64)>,
    pub relation: Relation,
    pub rhs: f64,
    pub origin: RowOrigin,
}

impl Row {
    pub fn lhs(&self, values: &[f64]) -> f64 {
        self.terms
            .iter()
            .map(|&(col, coef)| coef * values.get(col).copied().unwrap_or(0.0))
            .sum()
    }

    /// How far the row is from holding; zero when satisfied
    pub fn violation(&self, values: &[f64]) -> f64 {
        let diff = self.lhs(values) - self.rhs;
        match self.relation {
            Relation::Eq => diff.abs(),
            Relation::Le => diff.max(0.0),
            Relation::Ge => (-diff).max(0.0),
        }
    }

    /// `x - y (rel) c` or `x (rel) c`, up to a positive scale
    pub fn is_difference(&self) -> bool {
        match self.terms.as_slice() {
            [(_, a)] => *a != 0.0,
            [(_, a), (_, b)] => *a != 0.0 && (a + b).abs() < CONSTANT_EPSILON,
            _ => false,
        }
    }
}

/// A compiled linear system
#[derive(Debug, Clone, PartialEq)]
pub struct Program {
    /// Number of columns, equal to the index size
    pub columns: usize,
    pub rows: Vec<Row>,
    /// Non-negative linear expressions whose sum should be minimized
    pub objective: Vec<Vec<(usize, f64)>>,
}

impl Program {
    /// Rows violated by more than `tolerance`
    pub fn violated<'a>(&'a self, values: &'a [f64], tolerance: f64) -> impl Iterator<Item = &'a Row> {
        self.rows
            .iter()
            .filter(move |row| row.violation(values) > tolerance)
    }
}

/// Linear form over columns with a constant part
#[derive(Debug, Clone, Default, PartialEq)]
struct Form {
    terms: BTreeMap<usize, f64>,
    constant: f64,
}

impl Form {
    fn constant(value: f64) -> Self {
        Self {
            terms: BTreeMap::new(),
            constant: value,
        }
    }

    fn column(column: usize) -> Self {
        let mut terms = BTreeMap::new();
        terms.insert(column, 1.0);
        Self {
            terms,
            constant: 0.0,
        }
    }

    fn add_scaled(&mut self, other: &Form, factor: f64) {
        for (&col, &coef) in &other.terms {
            *self.terms.entry(col).or_insert(0.0) += coef * factor;
        }
        self.constant += other.constant * factor;
    }

    fn plus(mut self, other: &Form) -> Self {
        self.add_scaled(other, 1.0);
        self
    }

    fn minus(mut self, other: &Form) -> Self {
        self.add_scaled(other, -1.0);
        self
    }

    fn into_terms(self) -> (Vec<(usize, f64)>, f64) {
        let terms = self
            .terms
            .into_iter()
            .filter(|(_, coef)| coef.abs() > CONSTANT_EPSILON)
            .collect();
        (terms, self.constant)
    }
}

/// A path resolved to a rectangle, with the translation into the
/// coordinate space of the cell the path started from
struct Target {
    cell: CellId,
    owner: SlotOwner,
    dx: Form,
    dy: Form,
}

/// Compile every cell in the index scope into one program
pub fn compile(
    library: &Library,
    index: &VariableIndex,
    objective: Objective,
) -> Result<Program, LayoutError> {
    let mut compiler = Compiler {
        library,
        index,
        rows: Vec::new(),
    };

    for &id in index.scope() {
        compiler.structural_rows(id)?;
        compiler.user_rows(id)?;
    }

    let mut goals = Vec::new();
    if objective == Objective::MinArea {
        for &id in index.scope() {
            let x = compiler.span_form(id, SlotOwner::Boundary, Coord::X1, Coord::X2);
            let y = compiler.span_form(id, SlotOwner::Boundary, Coord::Y1, Coord::Y2);
            for form in [x, y].into_iter().flatten() {
                let (terms, _) = form.into_terms();
                if !terms.is_empty() {
                    goals.push(terms);
                }
            }
        }
    }

    Ok(Program {
        columns: index.len(),
        rows: compiler.rows,
        objective: goals,
    })
}

struct Compiler<'a> {
    library: &'a Library,
    index: &'a VariableIndex,
    rows: Vec<Row>,
}

impl Compiler<'_> {
    fn cell_name(&self, id: CellId) -> &str {
        self.library.cell_ref(id).name()
    }

    /// Column or constant for one slot
    fn slot_form(&self, key: SlotKey) -> Result<Form, String> {
        if let Some(col) = self.index.column(&key) {
            return Ok(Form::column(col));
        }
        let cell = self.library.cell_ref(key.cell);
        let slots = cell
            .slots(key.owner)
            .ok_or_else(|| format!("no rectangle {:?} in cell '{}'", key.owner, cell.name()))?;
        match slots.get(key.coord).value() {
            Some(v) => Ok(Form::constant(v as f64)),
            None => Err(format!(
                "slot '{}.{}' of cell '{}' is unresolved but not part of this solve",
                cell.owner_name(key.owner),
                key.coord,
                cell.name()
            )),
        }
    }

    /// `hi - lo` for one axis of a rectangle
    fn span_form(&self, cell: CellId, owner: SlotOwner, lo: Coord, hi: Coord) -> Option<Form> {
        let hi = self.slot_form(SlotKey::new(cell, owner, hi)).ok()?;
        let lo = self.slot_form(SlotKey::new(cell, owner, lo)).ok()?;
        Some(hi.minus(&lo))
    }

    /// A template's bounding box slot: the cached box if frozen, else its boundary
    fn template_form(&self, template: CellId, coord: Coord) -> Result<Form, String> {
        let cell = self.library.cell_ref(template);
        if cell.is_frozen() {
            return cell
                .bbox()
                .map(|bbox| Form::constant(bbox.coord(coord) as f64))
                .ok_or_else(|| format!("frozen cell '{}' has no bounding box", cell.name()));
        }
        self.slot_form(SlotKey::new(template, SlotOwner::Boundary, coord))
    }

    fn resolve_path(&self, start: CellId, path: &ElementPath) -> Result<Target, String> {
        let mut current = start;
        let mut dx = Form::default();
        let mut dy = Form::default();

        let Some((last, hops)) = path.segments.split_last() else {
            return Err("empty element path".to_string());
        };

        for segment in hops {
            let cell = self.library.cell_ref(current);
            let owner = cell.lookup(segment).ok_or_else(|| {
                format!("unknown element '{}' in cell '{}'", segment, cell.name())
            })?;
            let SlotOwner::Instance(i) = owner else {
                return Err(format!("'{}' in cell '{}' is not an instance", segment, cell.name()));
            };
            let template = cell.instances()[i].template;
            let template_cell = self.library.cell_ref(template);
            if template_cell.is_frozen() {
                return Err(format!(
                    "'{}' reaches into frozen cell '{}'",
                    path,
                    template_cell.name()
                ));
            }
            // Template coordinates map to the parent by the instance offset
            let inst_x1 = self.slot_form(SlotKey::new(current, owner, Coord::X1))?;
            let inst_y1 = self.slot_form(SlotKey::new(current, owner, Coord::Y1))?;
            let tmpl_x1 = self.template_form(template, Coord::X1)?;
            let tmpl_y1 = self.template_form(template, Coord::Y1)?;
            dx = dx.plus(&inst_x1.minus(&tmpl_x1));
            dy = dy.plus(&inst_y1.minus(&tmpl_y1));
            current = template;
        }

        let cell = self.library.cell_ref(current);
        let owner = cell
            .lookup(last)
            .ok_or_else(|| format!("unknown element '{}' in cell '{}'", last, cell.name()))?;
        Ok(Target {
            cell: current,
            owner,
            dx,
            dy,
        })
    }

    fn property_form(&self, target: &Target, property: Property) -> Result<Form, String> {
        let slot = |coord: Coord| self.slot_form(SlotKey::new(target.cell, target.owner, coord));
        Ok(match property {
            Property::Slot(coord) => {
                let shift = if coord.is_x() { &target.dx } else { &target.dy };
                slot(coord)?.plus(shift)
            }
            Property::Width => slot(Coord::X2)?.minus(&slot(Coord::X1)?),
            Property::Height => slot(Coord::Y2)?.minus(&slot(Coord::Y1)?),
            Property::CenterX => {
                let mut form = target.dx.clone();
                form.add_scaled(&slot(Coord::X1)?, 0.5);
                form.add_scaled(&slot(Coord::X2)?, 0.5);
                form
            }
            Property::CenterY => {
                let mut form = target.dy.clone();
                form.add_scaled(&slot(Coord::Y1)?, 0.5);
                form.add_scaled(&slot(Coord::Y2)?, 0.5);
                form
            }
        })
    }

    fn expr_form(&self, cell: CellId, expr: &LinearExpr) -> Result<Form, String> {
        let mut form = Form::constant(expr.constant);
        for term in &expr.terms {
            let target = self.resolve_path(cell, &term.slot.element)?;
            let slot = self.property_form(&target, term.slot.property)?;
            form.add_scaled(&slot, term.coefficient);
        }
        Ok(form)
    }

    /// Push `form (rel) 0`, checking constant rows on the spot
    fn push(
        &mut self,
        cell: CellId,
        form: Form,
        relation: Relation,
        description: String,
        kind: RowKind,
    ) -> Result<(), LayoutError> {
        let (terms, constant) = form.into_terms();
        if terms.is_empty() {
            let holds = match relation {
                Relation::Eq => constant.abs() <= CONSTANT_EPSILON,
                Relation::Le => constant <= CONSTANT_EPSILON,
                Relation::Ge => constant >= -CONSTANT_EPSILON,
            };
            if holds {
                return Ok(());
            }
            return Err(LayoutError::infeasible(
                self.cell_name(cell),
                format!("'{}' cannot hold for the fixed coordinates", description),
            ));
        }
        self.rows.push(Row {
            terms,
            relation,
            rhs: -constant,
            origin: RowOrigin {
                cell,
                cell_name: self.cell_name(cell).to_string(),
                description,
                kind,
            },
        });
        Ok(())
    }

    fn structural_rows(&mut self, id: CellId) -> Result<(), LayoutError> {
        let library = self.library;
        let cell = library.cell_ref(id);
        let internal = |reason: String| {
            LayoutError::Compile(CompileError::new(cell.name(), "<derived>", reason))
        };

        for owner in cell.owners() {
            let name = cell.owner_name(owner);
            for (lo, hi) in [(Coord::X1, Coord::X2), (Coord::Y1, Coord::Y2)] {
                let form = self.span_form(id, owner, lo, hi).ok_or_else(|| {
                    internal(format!("cannot resolve slots of '{}'", name))
                })?;
                let description = format!("{}.{} <= {}.{}", name, lo, name, hi);
                self.push(id, form, Relation::Ge, description, RowKind::Ordering)?;
            }

            if owner == SlotOwner::Boundary {
                continue;
            }
            for coord in Coord::ALL {
                let inner = self
                    .slot_form(SlotKey::new(id, owner, coord))
                    .map_err(internal)?;
                let outer = self
                    .slot_form(SlotKey::new(id, SlotOwner::Boundary, coord))
                    .map_err(internal)?;
                let relation = match coord {
                    Coord::X1 | Coord::Y1 => Relation::Ge,
                    Coord::X2 | Coord::Y2 => Relation::Le,
                };
                let description = format!("{}.{} {} self.{}", name, coord, relation.as_str(), coord);
                self.push(
                    id,
                    inner.minus(&outer),
                    relation,
                    description,
                    RowKind::Containment,
                )?;
            }
        }

        for (i, inst) in cell.instances().iter().enumerate() {
            let owner = SlotOwner::Instance(i);
            let template_name = library.cell_ref(inst.template).name();
            for (lo, hi) in [(Coord::X1, Coord::X2), (Coord::Y1, Coord::Y2)] {
                let own = self
                    .span_form(id, owner, lo, hi)
                    .ok_or_else(|| internal(format!("cannot resolve slots of '{}'", inst.name)))?;
                let tmpl = self
                    .template_form(inst.template, hi)
                    .and_then(|h| Ok(h.minus(&self.template_form(inst.template, lo)?)))
                    .map_err(internal)?;
                let axis = if lo.is_x() { "width" } else { "height" };
                let description = format!("{}.{} = {}.{}", inst.name, axis, template_name, axis);
                self.push(id, own.minus(&tmpl), Relation::Eq, description, RowKind::InstanceSize)?;
            }
        }
        Ok(())
    }

    fn user_rows(&mut self, id: CellId) -> Result<(), LayoutError> {
        let cell = self.library.cell_ref(id);
        for constraint in cell.constraints() {
            let text = constraint.to_string();
            for LinearRelation { expr, relation } in constraint.expand() {
                let form = self
                    .expr_form(id, &expr)
                    .map_err(|reason| CompileError::new(cell.name(), text.clone(), reason))?;
                self.push(id, form, relation, text.clone(), RowKind::User)?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::types::Rect;
    use crate::parser::parse_constraint;

    fn constrain(lib: &mut Library, cell: CellId, text: &str) {
        lib.add_constraint(cell, parse_constraint(text).unwrap())
            .unwrap();
    }

    fn user_rows(program: &Program) -> Vec<&Row> {
        program
            .rows
            .iter()
            .filter(|r| r.origin.kind == RowKind::User)
            .collect()
    }

    #[test]
    fn test_linear_row_terms() {
        let mut lib = Library::new();
        let c = lib.add_cell("c").unwrap();
        lib.add_rect(c, "a", "m1").unwrap();
        lib.add_rect(c, "b", "m1").unwrap();
        lib.assign(c, "a", Coord::X2, 10).unwrap();
        constrain(&mut lib, c, "a.x2 + 5 = b.x1");

        let index = VariableIndex::build(&lib, c);
        let program = compile(&lib, &index, Objective::Feasible).unwrap();
        let rows = user_rows(&program);
        assert_eq!(rows.len(), 1);
        let b_x1 = index
            .column(&SlotKey::new(c, SlotOwner::Primitive(1), Coord::X1))
            .unwrap();
        // 10 + 5 - b.x1 = 0
        assert_eq!(rows[0].terms, vec![(b_x1, -1.0)]);
        assert_eq!(rows[0].rhs, -15.0);
        assert!(rows[0].is_difference());
        assert!(program.objective.is_empty());
    }

    #[test]
    fn test_unknown_element_is_compile_error() {
        let mut lib = Library::new();
        let c = lib.add_cell("c").unwrap();
        lib.add_rect(c, "a", "m1").unwrap();
        constrain(&mut lib, c, "a.x1 = ghost.x2");

        let index = VariableIndex::build(&lib, c);
        match compile(&lib, &index, Objective::MinArea) {
            Err(LayoutError::Compile(e)) => {
                assert_eq!(e.cell, "c");
                assert_eq!(e.constraint, "a.x1 = ghost.x2");
                assert!(e.reason.contains("ghost"));
            }
            other => panic!("Expected compile error, got {:?}", other),
        }
    }

    #[test]
    fn test_violated_constant_row_is_infeasible() {
        let mut lib = Library::new();
        let c = lib.add_cell("c").unwrap();
        lib.add_rect(c, "a", "m1").unwrap();
        lib.place_rect(c, "a", Rect::new(0, 0, 4, 4)).unwrap();
        constrain(&mut lib, c, "a.width = 5");

        let index = VariableIndex::build(&lib, c);
        assert!(matches!(
            compile(&lib, &index, Objective::MinArea),
            Err(LayoutError::Infeasible { .. })
        ));
    }

    #[test]
    fn test_path_into_unfrozen_template_is_translated() {
        let mut lib = Library::new();
        let t = lib.add_cell("t").unwrap();
        lib.add_rect(t, "a", "m1").unwrap();
        let top = lib.add_cell("top").unwrap();
        lib.add_instance(top, "u1", t).unwrap();
        lib.add_rect(top, "b", "m1").unwrap();
        constrain(&mut lib, top, "b.x1 = u1.a.x2");

        let index = VariableIndex::build(&lib, top);
        let program = compile(&lib, &index, Objective::Feasible).unwrap();
        let row = user_rows(&program)[0];
        let col = |cell, owner, coord| index.column(&SlotKey::new(cell, owner, coord)).unwrap();
        // b.x1 - (u1.x1 - t.self.x1 + a.x2) = 0
        let mut expected = vec![
            (col(top, SlotOwner::Primitive(0), Coord::X1), 1.0),
            (col(top, SlotOwner::Instance(0), Coord::X1), -1.0),
            (col(t, SlotOwner::Boundary, Coord::X1), 1.0),
            (col(t, SlotOwner::Primitive(0), Coord::X2), -1.0),
        ];
        expected.sort_by_key(|(c, _)| *c);
        assert_eq!(row.terms, expected);
    }

    #[test]
    fn test_path_into_frozen_template_is_rejected_at_compile() {
        let mut lib = Library::new();
        let t = lib.add_cell("t").unwrap();
        lib.add_rect(t, "a", "m1").unwrap();
        lib.place_rect(t, "a", Rect::new(0, 0, 2, 2)).unwrap();
        let top = lib.add_cell("top").unwrap();
        lib.add_instance(top, "u1", t).unwrap();
        lib.add_rect(top, "b", "m1").unwrap();
        // Accepted while t is still open
        constrain(&mut lib, top, "b.x1 = u1.a.x2");
        lib.freeze(t).unwrap();

        let index = VariableIndex::build(&lib, top);
        match compile(&lib, &index, Objective::MinArea) {
            Err(LayoutError::Compile(e)) => assert!(e.reason.contains("frozen")),
            other => panic!("Expected compile error, got {:?}", other),
        }
    }

    #[test]
    fn test_min_area_objective_covers_scope_boundaries() {
        let mut lib = Library::new();
        let t = lib.add_cell("t").unwrap();
        let top = lib.add_cell("top").unwrap();
        lib.add_instance(top, "u1", t).unwrap();
        let index = VariableIndex::build(&lib, top);
        let program = compile(&lib, &index, Objective::MinArea).unwrap();
        assert_eq!(program.objective.len(), 4);
    }
}
