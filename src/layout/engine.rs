//! Script execution
//!
//! Runs the statements of a parsed [`Document`] against a [`Library`] in
//! source order. Cell declarations create (or reopen) cells; `solve`,
//! `freeze`, `unfreeze` and `copy` act on the cells declared so far.

use tracing::{debug, info_span};

use crate::parser::ast::{CellDecl, CellItem, Document, Identifier, Spanned, Statement};

use super::config::SolveConfig;
use super::error::LayoutError;
use super::library::{Library, SolveReport};
use super::types::CellId;

/// Execute every statement of `doc`, returning one report per `solve`
pub fn execute(
    library: &mut Library,
    doc: &Document,
    config: &SolveConfig,
) -> Result<Vec<SolveReport>, LayoutError> {
    let mut reports = Vec::new();
    for stmt in &doc.statements {
        if let Some(report) = execute_statement(library, &stmt.node, config)? {
            reports.push(report);
        }
    }
    Ok(reports)
}

fn execute_statement(
    library: &mut Library,
    stmt: &Statement,
    config: &SolveConfig,
) -> Result<Option<SolveReport>, LayoutError> {
    match stmt {
        Statement::Cell(decl) => {
            declare_cell(library, decl)?;
            Ok(None)
        }
        Statement::Solve(name) => {
            let id = resolve(library, name)?;
            library.solve_with(id, config).map(Some)
        }
        Statement::Freeze(name) => {
            let id = resolve(library, name)?;
            library.freeze(id)?;
            Ok(None)
        }
        Statement::Unfreeze(name) => {
            let id = resolve(library, name)?;
            library.unfreeze(id)?;
            Ok(None)
        }
        Statement::Copy { source, target } => {
            let id = resolve(library, source)?;
            library.copy_cell(id, target.node.as_str())?;
            Ok(None)
        }
    }
}

fn resolve(library: &Library, name: &Spanned<Identifier>) -> Result<CellId, LayoutError> {
    library.cell_id(name.node.as_str())
}

/// Script numbers are parsed as reals; slots live on the integer grid
fn to_grid(cell: &str, what: impl FnOnce() -> String, value: f64) -> Result<i64, LayoutError> {
    if value.fract() != 0.0 || !value.is_finite() {
        return Err(LayoutError::OffGrid {
            cell: cell.to_string(),
            what: what(),
            value,
        });
    }
    Ok(value as i64)
}

fn declare_cell(library: &mut Library, decl: &CellDecl) -> Result<(), LayoutError> {
    let name = decl.name.node.as_str();
    let _span = info_span!("cell", name).entered();
    let id = match library.find(name) {
        Some(id) => {
            debug!("reopening existing cell");
            id
        }
        None => library.add_cell(name)?,
    };

    for item in &decl.items {
        match &item.node {
            CellItem::Rect(rect) => {
                let rect_name = rect.name.node.as_str();
                library.add_rect(id, rect_name, &rect.layer.node)?;
                for &(coord, value) in &rect.coords {
                    let value = to_grid(name, || format!("{}.{}", rect_name, coord), value)?;
                    library.assign(id, rect_name, coord, value)?;
                }
            }
            CellItem::Inst(inst) => {
                let inst_name = inst.name.node.as_str();
                let template = resolve(library, &inst.template)?;
                library.add_instance(id, inst_name, template)?;
                if let Some((x, y)) = inst.at {
                    let x = to_grid(name, || format!("{}.x1", inst_name), x)?;
                    let y = to_grid(name, || format!("{}.y1", inst_name), y)?;
                    library.place_instance(id, inst_name, x, y)?;
                }
            }
            CellItem::Constrain(constraint) => {
                library.add_constraint(id, constraint.clone())?;
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::types::Rect;
    use crate::parser::parse;

    fn run(source: &str) -> (Library, Vec<SolveReport>) {
        let doc = parse(source).expect("Should parse");
        let mut lib = Library::new();
        let reports = execute(&mut lib, &doc, &SolveConfig::default()).expect("Should execute");
        (lib, reports)
    }

    #[test]
    fn test_declare_and_solve() {
        let (lib, reports) = run(r#"
            cell pair {
                rect a on m1 [x1: 0, y1: 0, x2: 10, y2: 10]
                rect b on m1 [x2: 20]
                constrain a.x2 + 5 = b.x1
                constrain b.y1 = a.y1
                constrain b.y2 = a.y2
            }
            solve pair
        "#);
        assert_eq!(reports.len(), 1);
        let pair = lib.cell_id("pair").unwrap();
        assert_eq!(lib.rect_of(pair, "b").unwrap(), Some(Rect::new(15, 0, 20, 10)));
    }

    #[test]
    fn test_reopened_cell_extends_body() {
        let (lib, _) = run(r#"
            cell c { rect a on m1 [x1: 0, y1: 0, x2: 1, y2: 1] }
            cell c { rect b on m2 [x1: 2, y1: 0, x2: 3, y2: 1] }
        "#);
        let c = lib.cell_id("c").unwrap();
        assert_eq!(lib.cell(c).unwrap().primitives().len(), 2);
    }

    #[test]
    fn test_statements_run_in_order() {
        let doc = parse(r#"
            cell leaf { rect a on m1 [x1: 0, y1: 0, x2: 2, y2: 2] }
            freeze leaf
            cell leaf { rect b on m1 }
        "#)
        .unwrap();
        let mut lib = Library::new();
        let err = execute(&mut lib, &doc, &SolveConfig::default()).unwrap_err();
        assert!(matches!(err, LayoutError::Frozen { .. }));
    }

    #[test]
    fn test_manual_instance_placement() {
        let (lib, _) = run(r#"
            cell leaf { rect a on m1 [x1: 0, y1: 0, x2: 2, y2: 3] }
            freeze leaf
            cell top { inst u of leaf at 5, 7 }
            copy top as top2
        "#);
        let top2 = lib.cell_id("top2").unwrap();
        assert_eq!(lib.rect_of(top2, "u").unwrap(), Some(Rect::new(5, 7, 7, 10)));
    }

    #[test]
    fn test_fractional_coordinate_rejected() {
        let doc = parse("cell c { rect a on m1 [x1: 0.5] }").unwrap();
        let mut lib = Library::new();
        let err = execute(&mut lib, &doc, &SolveConfig::default()).unwrap_err();
        assert!(matches!(err, LayoutError::OffGrid { .. }));
    }

    #[test]
    fn test_unknown_cell_statement() {
        let doc = parse("solve nowhere").unwrap();
        let mut lib = Library::new();
        assert!(matches!(
            execute(&mut lib, &doc, &SolveConfig::default()),
            Err(LayoutError::UnknownCell { .. })
        ));
    }
}
