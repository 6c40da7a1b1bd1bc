//! Library: the arena owning every cell of a design
//!
//! Cells refer to each other through [`CellId`]s. All mutation goes through
//! the library so that frozen cells and hierarchy cycles are checked in one
//! place.

use std::collections::HashMap;

use petgraph::algo::{has_path_connecting, toposort};
use petgraph::graph::{DiGraph, NodeIndex};
use tracing::{debug, info, info_span, warn};

use crate::parser::ast::{Constraint, Coord, ElementPath, SELF_KEYWORD};

use super::cell::Cell;
use super::compiler::compile;
use super::config::{BackendKind, SolveConfig};
use super::difference::DifferenceBackend;
use super::error::{CompileError, LayoutError, RoundingViolation};
use super::index::VariableIndex;
use super::rounding;
use super::solver::{Assignment, CassowaryBackend, SolverBackend, SolverError};
use super::types::{
    CellId, FlatShape, Instance, Primitive, Rect, SlotOwner, SlotRect, SlotValue,
};

/// Outcome of a successful solve
#[derive(Debug, Clone, PartialEq)]
pub struct SolveReport {
    pub cell: String,
    pub backend: &'static str,
    /// Number of free slots in the solve
    pub columns: usize,
    pub rows: usize,
    /// Rows that no longer hold after rounding
    pub violations: Vec<RoundingViolation>,
}

impl SolveReport {
    pub fn is_clean(&self) -> bool {
        self.violations.is_empty()
    }
}

#[derive(Debug, Clone, Default)]
pub struct Library {
    cells: Vec<Cell>,
    names: HashMap<String, CellId>,
}

impl Library {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    /// Create an empty cell
    pub fn add_cell(&mut self, name: impl Into<String>) -> Result<CellId, LayoutError> {
        let name = name.into();
        if self.names.contains_key(&name) {
            return Err(LayoutError::DuplicateCell { name });
        }
        let id = CellId(self.cells.len());
        self.names.insert(name.clone(), id);
        self.cells.push(Cell::new(name));
        Ok(id)
    }

    pub fn find(&self, name: &str) -> Option<CellId> {
        self.names.get(name).copied()
    }

    pub fn cell_id(&self, name: &str) -> Result<CellId, LayoutError> {
        self.find(name).ok_or_else(|| LayoutError::unknown_cell(name))
    }

    pub fn cell(&self, id: CellId) -> Option<&Cell> {
        self.cells.get(id.0)
    }

    /// Cell lookup for ids handed out by this library
    pub(crate) fn cell_ref(&self, id: CellId) -> &Cell {
        &self.cells[id.0]
    }

    pub(crate) fn cells_mut(&mut self) -> &mut [Cell] {
        &mut self.cells
    }

    /// All cells in creation order
    pub fn cells(&self) -> impl Iterator<Item = (CellId, &Cell)> {
        self.cells.iter().enumerate().map(|(i, c)| (CellId(i), c))
    }

    pub fn is_frozen(&self, id: CellId) -> bool {
        self.cell(id).is_some_and(Cell::is_frozen)
    }

    /// Cached bounding box, set by a solve or a freeze
    pub fn bounding_box(&self, id: CellId) -> Option<Rect> {
        self.cell(id).and_then(Cell::bbox)
    }

    /// Mutable access to a cell that is not frozen
    fn open_cell(&mut self, id: CellId) -> Result<&mut Cell, LayoutError> {
        let cell = self
            .cells
            .get_mut(id.0)
            .ok_or_else(|| LayoutError::unknown_cell(id.to_string()))?;
        if cell.frozen {
            return Err(LayoutError::frozen(&cell.name));
        }
        Ok(cell)
    }

    fn check_new_element(cell: &Cell, name: &str) -> Result<(), LayoutError> {
        if name == SELF_KEYWORD || cell.has_element(name) {
            return Err(LayoutError::duplicate_element(&cell.name, name));
        }
        Ok(())
    }

    /// Add an unresolved rectangle on `layer`
    pub fn add_rect(&mut self, id: CellId, name: &str, layer: &str) -> Result<(), LayoutError> {
        let cell = self.open_cell(id)?;
        Self::check_new_element(cell, name)?;
        cell.primitives.push(Primitive::new(name, layer));
        Ok(())
    }

    /// Fix one slot of an element (`self`, a primitive or an instance)
    pub fn assign(
        &mut self,
        id: CellId,
        element: &str,
        coord: Coord,
        value: i64,
    ) -> Result<(), LayoutError> {
        let cell = self.open_cell(id)?;
        let owner = cell
            .lookup(element)
            .ok_or_else(|| LayoutError::unknown_element(&cell.name, element))?;
        if let Some(slots) = cell.slots_mut(owner) {
            slots.set(coord, SlotValue::Fixed(value));
        }
        Ok(())
    }

    /// Fix all four slots of an element
    pub fn place_rect(&mut self, id: CellId, element: &str, rect: Rect) -> Result<(), LayoutError> {
        let cell = self.open_cell(id)?;
        let owner = cell
            .lookup(element)
            .ok_or_else(|| LayoutError::unknown_element(&cell.name, element))?;
        if let Some(slots) = cell.slots_mut(owner) {
            *slots = SlotRect::fixed(rect);
        }
        Ok(())
    }

    /// Containment graph: an edge from each parent to each template it places.
    /// Node `i` is cell `i`.
    pub(crate) fn hierarchy(&self) -> DiGraph<CellId, ()> {
        let mut graph = DiGraph::new();
        for i in 0..self.cells.len() {
            graph.add_node(CellId(i));
        }
        for (i, cell) in self.cells.iter().enumerate() {
            for inst in &cell.instances {
                graph.add_edge(NodeIndex::new(i), NodeIndex::new(inst.template.0), ());
            }
        }
        graph
    }

    /// Place `template` inside `parent` as an unresolved instance
    pub fn add_instance(
        &mut self,
        parent: CellId,
        name: &str,
        template: CellId,
    ) -> Result<(), LayoutError> {
        let template_name = self
            .cell(template)
            .map(|c| c.name.clone())
            .ok_or_else(|| LayoutError::unknown_cell(template.to_string()))?;
        let creates_cycle = parent == template
            || has_path_connecting(
                &self.hierarchy(),
                NodeIndex::new(template.0),
                NodeIndex::new(parent.0),
                None,
            );
        let cell = self.open_cell(parent)?;
        if creates_cycle {
            return Err(LayoutError::HierarchyCycle {
                parent: cell.name.clone(),
                template: template_name,
            });
        }
        Self::check_new_element(cell, name)?;
        cell.instances.push(Instance::new(name, template));
        Ok(())
    }

    /// Put an instance's lower-left corner at `(x, y)`, bypassing the solver
    pub fn place_instance(
        &mut self,
        parent: CellId,
        name: &str,
        x: i64,
        y: i64,
    ) -> Result<(), LayoutError> {
        let parent_cell = self
            .cell(parent)
            .ok_or_else(|| LayoutError::unknown_cell(parent.to_string()))?;
        let inst = parent_cell
            .instance(name)
            .ok_or_else(|| LayoutError::unknown_element(&parent_cell.name, name))?;
        let template = self.cell_ref(inst.template);
        let bbox = template
            .bbox()
            .or_else(|| template.boundary().resolved())
            .ok_or_else(|| {
                LayoutError::unplaceable(
                    &parent_cell.name,
                    name,
                    format!(
                        "template '{}' has no bounding box yet; solve or freeze it first",
                        template.name()
                    ),
                )
            })?;
        let rect = Rect::new(x, y, x + bbox.width(), y + bbox.height());
        self.place_rect(parent, name, rect)
    }

    /// Attach a constraint to a cell.
    ///
    /// Paths reaching into frozen templates are rejected here; all other
    /// reference errors surface when the cell is compiled.
    pub fn add_constraint(&mut self, id: CellId, constraint: Constraint) -> Result<(), LayoutError> {
        let cell = self
            .cell(id)
            .ok_or_else(|| LayoutError::unknown_cell(id.to_string()))?;
        if cell.frozen {
            return Err(LayoutError::frozen(&cell.name));
        }
        for path in constraint.element_paths() {
            if let Err(reason) = self.check_frozen_internals(id, path) {
                return Err(CompileError::new(&cell.name, constraint.to_string(), reason).into());
            }
        }
        self.open_cell(id)?.constraints.push(constraint);
        Ok(())
    }

    /// Parse `text` and attach it to a cell
    pub fn constrain(&mut self, id: CellId, text: &str) -> Result<(), LayoutError> {
        let constraint = crate::parser::parse_constraint(text).map_err(|errors| {
            LayoutError::InvalidConstraint {
                cell: self.cell(id).map(|c| c.name.clone()).unwrap_or_default(),
                text: text.to_string(),
                reason: errors
                    .iter()
                    .map(|e| e.to_string())
                    .collect::<Vec<_>>()
                    .join("; "),
            }
        })?;
        self.add_constraint(id, constraint)
    }

    fn check_frozen_internals(&self, start: CellId, path: &ElementPath) -> Result<(), String> {
        let mut current = start;
        let hops = path.segments.len().saturating_sub(1);
        for segment in path.segments.iter().take(hops) {
            let cell = self.cell_ref(current);
            let Some(inst) = cell.instance(segment) else {
                return Ok(());
            };
            let template = self.cell_ref(inst.template);
            if template.is_frozen() {
                return Err(format!(
                    "'{}' reaches into frozen cell '{}'",
                    path,
                    template.name()
                ));
            }
            current = inst.template;
        }
        Ok(())
    }

    /// Duplicate a cell under a new name.
    ///
    /// The copy keeps the frozen flag, cached bounding box, resolved slots and
    /// constraints, and shares no state with the original.
    pub fn copy_cell(&mut self, source: CellId, name: impl Into<String>) -> Result<CellId, LayoutError> {
        let mut copy = self
            .cell(source)
            .cloned()
            .ok_or_else(|| LayoutError::unknown_cell(source.to_string()))?;
        let name = name.into();
        if self.names.contains_key(&name) {
            return Err(LayoutError::DuplicateCell { name });
        }
        debug!(source = %copy.name, copy = %name, "copying cell");
        copy.name = name.clone();
        let id = CellId(self.cells.len());
        self.names.insert(name, id);
        self.cells.push(copy);
        Ok(id)
    }

    /// Cells that place `template` directly
    pub fn parents_of(&self, template: CellId) -> Vec<CellId> {
        self.cells()
            .filter(|(_, c)| c.instances.iter().any(|i| i.template == template))
            .map(|(id, _)| id)
            .collect()
    }

    /// Every cell, templates before the cells that place them
    pub fn dependency_order(&self) -> Vec<CellId> {
        match toposort(&self.hierarchy(), None) {
            Ok(order) => order.into_iter().rev().map(|n| CellId(n.index())).collect(),
            // add_instance rejects cycles
            Err(_) => (0..self.cells.len()).map(CellId).collect(),
        }
    }

    /// Numbering of the free slots a solve of `id` would use
    pub fn variable_index(&self, id: CellId) -> VariableIndex {
        VariableIndex::build(self, id)
    }

    /// Solve with the default configuration
    pub fn solve(&mut self, id: CellId) -> Result<SolveReport, LayoutError> {
        self.solve_with(id, &SolveConfig::default())
    }

    /// Solve every free slot reachable from `id`.
    ///
    /// Results are written only once compile, solve and rounding have all
    /// succeeded; on error nothing changes.
    pub fn solve_with(&mut self, id: CellId, config: &SolveConfig) -> Result<SolveReport, LayoutError> {
        let name = self
            .cell(id)
            .map(|c| c.name.clone())
            .ok_or_else(|| LayoutError::unknown_cell(id.to_string()))?;
        let _span = info_span!("solve", cell = %name).entered();
        if self.is_frozen(id) {
            return Err(LayoutError::frozen(name));
        }

        let index = VariableIndex::build(self, id);
        let program = compile(self, &index, config.objective)?;
        debug!(
            scope = index.scope().len(),
            columns = program.columns,
            rows = program.rows.len(),
            "compiled"
        );

        let mut backend: Box<dyn SolverBackend> = match config.backend {
            BackendKind::Cassowary => Box::new(CassowaryBackend::new()),
            BackendKind::Difference => Box::new(DifferenceBackend::new()),
        };
        let assignment = backend.solve(&program).map_err(|e| match e {
            SolverError::Infeasible { origin, reason } => LayoutError::infeasible(
                origin.map_or_else(|| name.clone(), |o| o.cell_name),
                reason,
            ),
            other => LayoutError::Solver(other),
        })?;
        if assignment.len() != index.len() {
            return Err(SolverError::Internal(format!(
                "backend returned {} values for {} columns",
                assignment.len(),
                index.len()
            ))
            .into());
        }

        let (values, violated) = match assignment {
            Assignment::Continuous(continuous) => {
                let rounded =
                    rounding::round(&program, &continuous, config.tolerance, config.max_passes);
                (rounded.values, rounded.violated)
            }
            Assignment::Integral(values) => {
                let violated = rounding::violated_rows(&program, &values, config.tolerance);
                (values, violated)
            }
        };

        let as_f64: Vec<f64> = values.iter().map(|&v| v as f64).collect();
        let violations: Vec<RoundingViolation> = violated
            .iter()
            .filter_map(|&i| program.rows.get(i))
            .map(|row| RoundingViolation {
                cell: row.origin.cell_name.clone(),
                constraint: row.origin.description.clone(),
                residual: row.violation(&as_f64),
            })
            .collect();
        for v in &violations {
            warn!(cell = %v.cell, constraint = %v.constraint, residual = v.residual, "rounding violation");
        }

        for (col, key) in index.iter() {
            if let Some(slots) = self.cells[key.cell.0].slots_mut(key.owner) {
                slots.set(key.coord, SlotValue::Solved(values[col]));
            }
        }
        for &scope_id in index.scope() {
            let cell = &mut self.cells[scope_id.0];
            cell.bbox = cell.boundary.resolved().map(|b| Rect::new(b.x1, b.y1, b.x2, b.y2));
        }

        info!(
            backend = backend.name(),
            columns = program.columns,
            violations = violations.len(),
            "solved"
        );
        Ok(SolveReport {
            cell: name,
            backend: backend.name(),
            columns: program.columns,
            rows: program.rows.len(),
            violations,
        })
    }

    /// Every primitive of the hierarchy under `id`, in `id`'s coordinates
    pub fn flatten(&self, id: CellId) -> Result<Vec<FlatShape>, LayoutError> {
        let mut shapes = Vec::new();
        let mut path = Vec::new();
        self.flatten_into(id, 0, 0, &mut path, &mut shapes)?;
        Ok(shapes)
    }

    fn flatten_into(
        &self,
        id: CellId,
        dx: i64,
        dy: i64,
        path: &mut Vec<String>,
        out: &mut Vec<FlatShape>,
    ) -> Result<(), LayoutError> {
        let cell = self
            .cell(id)
            .ok_or_else(|| LayoutError::unknown_cell(id.to_string()))?;
        let unresolved = |name: &str, slots: &SlotRect| LayoutError::Unresolved {
            cell: cell.name.clone(),
            slot: format!("{}.{}", name, slots.first_unresolved().unwrap_or(Coord::X1)),
        };

        for prim in &cell.primitives {
            let rect = prim.rect().ok_or_else(|| unresolved(&prim.name, &prim.slots))?;
            let mut shape_path = path.clone();
            shape_path.push(prim.name.clone());
            out.push(FlatShape {
                layer: prim.layer.clone(),
                rect: rect.translate(dx, dy),
                path: shape_path,
            });
        }

        for inst in &cell.instances {
            let rect = inst.rect().ok_or_else(|| unresolved(&inst.name, &inst.slots))?;
            let template = self.cell_ref(inst.template);
            let origin = template
                .bbox()
                .or_else(|| template.boundary().resolved())
                .ok_or_else(|| unresolved(SELF_KEYWORD, template.boundary()))?;
            path.push(inst.name.clone());
            self.flatten_into(
                inst.template,
                dx + rect.x1 - origin.x1,
                dy + rect.y1 - origin.y1,
                path,
                out,
            )?;
            path.pop();
        }
        Ok(())
    }

    /// Owner of a named element, for callers outside the crate
    pub fn element(&self, id: CellId, name: &str) -> Result<SlotOwner, LayoutError> {
        let cell = self
            .cell(id)
            .ok_or_else(|| LayoutError::unknown_cell(id.to_string()))?;
        cell.lookup(name)
            .ok_or_else(|| LayoutError::unknown_element(&cell.name, name))
    }

    /// Resolved rectangle of an element, if every slot has a value
    pub fn rect_of(&self, id: CellId, name: &str) -> Result<Option<Rect>, LayoutError> {
        let owner = self.element(id, name)?;
        Ok(self
            .cell_ref(id)
            .slots(owner)
            .and_then(SlotRect::resolved))
    }
}
