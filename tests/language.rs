//! Scripts in the cell layout language, end to end

use cellsolve::{build, build_with_config, describe, BuildError, EngineConfig, LayoutError, Rect};
use pretty_assertions::assert_eq;

#[test]
fn two_rectangles_script() {
    let built = build(
        r#"
        // Two rectangles five units apart
        cell ab {
            rect A on m1
            rect B on m1
            constrain A.x2 + 5 = B.x1
            constrain A.y1 = 0
            constrain A.x1 = 0
            constrain A.y2 = 10
            constrain A.x2 = 10
            constrain B.y1 = 0
            constrain B.y2 = 10
            constrain B.x2 = 20
        }
        solve ab
        freeze ab
    "#,
    )
    .unwrap();
    let ab = built.library.cell_id("ab").unwrap();
    assert_eq!(built.library.rect_of(ab, "A").unwrap(), Some(Rect::new(0, 0, 10, 10)));
    assert_eq!(built.library.rect_of(ab, "B").unwrap(), Some(Rect::new(15, 0, 20, 10)));
    assert!(built.library.is_frozen(ab));
}

#[test]
fn subtract_splits_a_region() {
    let built = build(
        r#"
        cell split {
            rect well on nwell [x1: 0, y1: 0, x2: 10, y2: 4]
            rect tap on m1
            rect rest on m1
            constrain rest = well - tap [side: right]
            constrain tap.width = 3
        }
        solve split
    "#,
    )
    .unwrap();
    let split = built.library.cell_id("split").unwrap();
    assert_eq!(built.library.rect_of(split, "tap").unwrap(), Some(Rect::new(7, 0, 10, 4)));
    assert_eq!(built.library.rect_of(split, "rest").unwrap(), Some(Rect::new(0, 0, 7, 4)));
}

#[test]
fn subtract_defaults_to_left() {
    let built = build(
        r#"
        cell split {
            rect well on nwell [x1: 0, y1: 0, x2: 10, y2: 4]
            rect tap on m1
            rect rest on m1
            constrain rest = well - tap
            constrain tap.width = 3
        }
        solve split
    "#,
    )
    .unwrap();
    let split = built.library.cell_id("split").unwrap();
    assert_eq!(built.library.rect_of(split, "tap").unwrap(), Some(Rect::new(0, 0, 3, 4)));
    assert_eq!(built.library.rect_of(split, "rest").unwrap(), Some(Rect::new(3, 0, 10, 4)));
}

#[test]
fn centers_and_margins() {
    let built = build(
        r#"
        cell pad {
            rect metal on m1 [x1: 0, y1: 0, x2: 20, y2: 20]
            rect via on v1
            constrain via.width = 4
            constrain via.height = 4
            constrain via.cx = metal.cx
            constrain via.cy = metal.cy
            constrain metal inside self [margin: 2]
        }
        solve pad
    "#,
    )
    .unwrap();
    let pad = built.library.cell_id("pad").unwrap();
    assert_eq!(built.library.rect_of(pad, "via").unwrap(), Some(Rect::new(8, 8, 12, 12)));
    assert_eq!(built.library.bounding_box(pad), Some(Rect::new(-2, -2, 22, 22)));
}

#[test]
fn hierarchy_with_copy_and_manual_placement() {
    let built = build(
        r#"
        cell inv {
            rect n on active [x1: 0, y1: 0, x2: 4, y2: 2]
            rect p on active [x1: 0, y1: 4, x2: 4, y2: 7]
            rect g on poly
            constrain g.x1 = 1
            constrain g.width = 1
            constrain g.y1 = n.y1 - 1
            constrain g.y2 = p.y2 + 1
        }
        solve inv
        freeze inv

        cell chain {
            inst i0 of inv at 0, 0
            inst i1 of inv
            constrain i1 right_of i0 [gap: 1]
            constrain i1.y1 = i0.y1
        }
        solve chain
        copy chain as chain2
        freeze chain
    "#,
    )
    .unwrap();
    let lib = &built.library;
    let inv = lib.cell_id("inv").unwrap();
    assert_eq!(lib.bounding_box(inv), Some(Rect::new(0, -1, 4, 8)));

    let chain = lib.cell_id("chain").unwrap();
    assert_eq!(lib.rect_of(chain, "i1").unwrap(), Some(Rect::new(5, 0, 9, 9)));
    assert_eq!(lib.bounding_box(chain), Some(Rect::new(0, 0, 9, 9)));

    let chain2 = lib.cell_id("chain2").unwrap();
    assert!(!lib.is_frozen(chain2));
    assert_eq!(lib.bounding_box(chain2), lib.bounding_box(chain));

    let report = describe(&built);
    assert!(report.contains("solve inv [cassowary]"));
    assert!(report.contains("solve chain [cassowary]"));
    assert!(report.contains("cell chain (frozen)"));
}

#[test]
fn difference_backend_from_config() {
    let config = EngineConfig::from_str("[solver]\nbackend = \"difference\"\n").unwrap();
    let built = build_with_config(
        r#"
        cell row {
            rect a on m1 [x1: 0, y1: 0, x2: 3, y2: 3]
            rect b on m1
            rect c on m1
            constrain b same_size a
            constrain c same_size a
            constrain b right_of a [gap: 2]
            constrain c right_of b [gap: 2]
            constrain b.y1 = a.y1
            constrain c.y1 = a.y1
        }
        solve row
    "#,
        &config,
    )
    .unwrap();
    assert_eq!(built.reports[0].backend, "difference");
    let row = built.library.cell_id("row").unwrap();
    assert_eq!(built.library.rect_of(row, "c").unwrap(), Some(Rect::new(10, 0, 13, 3)));
}

#[test]
fn parse_errors_are_reported() {
    match build("cell broken { rect a on }") {
        Err(BuildError::Parse(errors)) => {
            assert!(!errors.is_empty());
            let rendered = errors[0].format("cell broken { rect a on }", "broken.cs");
            assert!(rendered.contains("broken.cs"));
        }
        other => panic!("Expected parse errors, got {:?}", other.map(|b| b.reports)),
    }
}

#[test]
fn frozen_cells_reject_redeclaration() {
    let result = build(
        r#"
        cell leaf { rect a on m1 [x1: 0, y1: 0, x2: 1, y2: 1] }
        freeze leaf
        cell leaf { rect b on m1 }
    "#,
    );
    assert!(matches!(
        result,
        Err(BuildError::Layout(LayoutError::Frozen { .. }))
    ));
}

#[test]
fn instance_cycles_are_rejected() {
    let result = build(
        r#"
        cell a { }
        cell b { inst x of a }
        cell a { inst y of b }
    "#,
    );
    assert!(matches!(
        result,
        Err(BuildError::Layout(LayoutError::HierarchyCycle { .. }))
    ));
}
