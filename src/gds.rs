//! GDSII interchange
//!
//! Export writes one structure per cell, one BOUNDARY per primitive and one
//! SREF per instance. A resolved cell boundary is written as one more
//! BOUNDARY on the map's boundary layer. Import reads the same subset back,
//! builds cells templates-first and freezes every imported cell.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::Path;

use gds21::{
    GdsBoundary, GdsElement, GdsLibrary, GdsPoint, GdsStrans, GdsStruct, GdsStructRef,
};
use petgraph::algo::toposort;
use petgraph::graph::{DiGraph, NodeIndex};
use thiserror::Error;
use tracing::{debug, info, info_span, warn};

use crate::layout::{CellId, Library, LayoutError, Rect};

/// Longest structure name most GDSII readers accept
const MAX_NAME_LEN: usize = 32;

/// Library name written into exported files
const LIBRARY_NAME: &str = "cellsolve";

/// Errors that can occur while exporting or importing GDSII
#[derive(Debug, Error)]
pub enum GdsError {
    /// Reading or writing the stream failed
    #[error("GDSII error: {0}")]
    Stream(String),

    #[error("'{name}' is not a valid GDSII structure name (at most 32 of A-Z a-z 0-9 _ ? $)")]
    InvalidName { name: String },

    #[error("layer '{layer}' has no GDSII layer/datatype")]
    UnmappedLayer { layer: String },

    #[error("layer '{layer}' is mapped to {pair:?}, which carries cell boundaries")]
    ReservedLayer { layer: String, pair: (i16, i16) },

    #[error("coordinate {value} does not fit in a GDSII point")]
    CoordinateOverflow { value: i64 },

    #[error("unsupported GDSII content in '{structure}': {reason}")]
    Unsupported { structure: String, reason: String },

    #[error("structure '{structure}' references unknown structure '{name}'")]
    UnknownStructure { structure: String, name: String },

    #[error(transparent)]
    Layout(#[from] LayoutError),
}

impl From<gds21::GdsError> for GdsError {
    fn from(e: gds21::GdsError) -> Self {
        GdsError::Stream(format!("{:?}", e))
    }
}

/// Two-way mapping between layer tags and GDSII `(layer, datatype)` pairs.
///
/// One pair, `(0, 0)` unless set, is reserved for cell boundaries.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LayerMap {
    forward: BTreeMap<String, (i16, i16)>,
    reverse: HashMap<(i16, i16), String>,
    boundary: (i16, i16),
}

impl LayerMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_pairs(pairs: impl IntoIterator<Item = (String, (i16, i16))>) -> Self {
        let mut map = Self::new();
        for (tag, pair) in pairs {
            map.insert(tag, pair);
        }
        map
    }

    /// Number every layer tag used in `library`, in sorted tag order from 1
    pub fn auto(library: &Library) -> Self {
        let mut map = Self::new();
        map.assign_missing(used_layers(library).iter().map(String::as_str));
        map
    }

    pub fn insert(&mut self, tag: impl Into<String>, pair: (i16, i16)) {
        let tag = tag.into();
        if let Some(old) = self.forward.insert(tag.clone(), pair) {
            self.reverse.remove(&old);
        }
        self.reverse.insert(pair, tag);
    }

    /// Give each unmapped tag the next free layer number, datatype 0
    pub fn assign_missing<'a>(&mut self, tags: impl IntoIterator<Item = &'a str>) {
        let missing: BTreeSet<&str> = tags
            .into_iter()
            .filter(|t| !self.forward.contains_key(*t))
            .collect();
        let mut next = self.forward.values().map(|(l, _)| *l).max().unwrap_or(0);
        for tag in missing {
            next += 1;
            if (next, 0) == self.boundary {
                next += 1;
            }
            self.insert(tag, (next, 0));
        }
    }

    pub fn set_boundary_layer(&mut self, pair: (i16, i16)) {
        self.boundary = pair;
    }

    pub fn boundary_layer(&self) -> (i16, i16) {
        self.boundary
    }

    pub fn get(&self, tag: &str) -> Option<(i16, i16)> {
        self.forward.get(tag).copied()
    }

    /// Tag for a GDSII pair; unmapped pairs get a synthetic `L<layer>D<datatype>` tag
    pub fn tag(&self, layer: i16, datatype: i16) -> String {
        self.reverse
            .get(&(layer, datatype))
            .cloned()
            .unwrap_or_else(|| format!("L{}D{}", layer, datatype))
    }

    pub fn len(&self) -> usize {
        self.forward.len()
    }

    pub fn is_empty(&self) -> bool {
        self.forward.is_empty()
    }
}

/// Every layer tag used by a primitive in `library`
pub fn used_layers(library: &Library) -> BTreeSet<String> {
    library
        .cells()
        .flat_map(|(_, c)| c.primitives().iter().map(|p| p.layer.clone()))
        .collect()
}

fn check_name(name: &str) -> Result<(), GdsError> {
    let valid = !name.is_empty()
        && name.len() <= MAX_NAME_LEN
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '?' | '$'));
    if valid {
        Ok(())
    } else {
        Err(GdsError::InvalidName {
            name: name.to_string(),
        })
    }
}

fn point(x: i64, y: i64) -> Result<GdsPoint, GdsError> {
    let x = i32::try_from(x).map_err(|_| GdsError::CoordinateOverflow { value: x })?;
    let y = i32::try_from(y).map_err(|_| GdsError::CoordinateOverflow { value: y })?;
    Ok(GdsPoint::new(x, y))
}

/// Closed outline of a rectangle, counter-clockwise from the lower left
fn outline(rect: &Rect) -> Result<Vec<GdsPoint>, GdsError> {
    let bl = point(rect.x1, rect.y1)?;
    Ok(vec![
        bl.clone(),
        point(rect.x2, rect.y1)?,
        point(rect.x2, rect.y2)?,
        point(rect.x1, rect.y2)?,
        bl,
    ])
}

/// Convert every cell of `library` into a GDSII library, templates first
pub fn export(library: &Library, layers: &LayerMap) -> Result<GdsLibrary, GdsError> {
    let _span = info_span!("gds_export", cells = library.len()).entered();
    let mut gds = GdsLibrary::new(LIBRARY_NAME);

    for id in library.dependency_order() {
        let Some(cell) = library.cell(id) else {
            continue;
        };
        check_name(cell.name())?;
        let unresolved = |element: &str| LayoutError::Unresolved {
            cell: cell.name().to_string(),
            slot: element.to_string(),
        };

        let mut strukt = GdsStruct::new(cell.name());
        if let Some(bbox) = cell.bbox().or_else(|| cell.boundary().resolved()) {
            let (layer, datatype) = layers.boundary_layer();
            strukt.elems.push(GdsElement::GdsBoundary(GdsBoundary {
                layer,
                datatype,
                xy: outline(&bbox)?,
                ..Default::default()
            }));
        }
        for prim in cell.primitives() {
            let rect = prim.rect().ok_or_else(|| unresolved(&prim.name))?;
            let (layer, datatype) = layers.get(&prim.layer).ok_or_else(|| GdsError::UnmappedLayer {
                layer: prim.layer.clone(),
            })?;
            if (layer, datatype) == layers.boundary_layer() {
                return Err(GdsError::ReservedLayer {
                    layer: prim.layer.clone(),
                    pair: (layer, datatype),
                });
            }
            strukt.elems.push(GdsElement::GdsBoundary(GdsBoundary {
                layer,
                datatype,
                xy: outline(&rect)?,
                ..Default::default()
            }));
        }
        for inst in cell.instances() {
            let rect = inst.rect().ok_or_else(|| unresolved(&inst.name))?;
            let template = library
                .cell(inst.template)
                .ok_or_else(|| LayoutError::unknown_cell(inst.template.to_string()))?;
            let origin = template
                .bbox()
                .or_else(|| template.boundary().resolved())
                .ok_or_else(|| LayoutError::Unresolved {
                    cell: template.name().to_string(),
                    slot: "self".to_string(),
                })?;
            strukt.elems.push(GdsElement::GdsStructRef(GdsStructRef {
                name: template.name().to_string(),
                xy: point(rect.x1 - origin.x1, rect.y1 - origin.y1)?,
                ..Default::default()
            }));
        }
        debug!(cell = cell.name(), elements = strukt.elems.len(), "exported structure");
        gds.structs.push(strukt);
    }

    info!(structures = gds.structs.len(), "export complete");
    Ok(gds)
}

/// Export `library` and write it to `path`
pub fn write(library: &Library, layers: &LayerMap, path: &Path) -> Result<(), GdsError> {
    export(library, layers)?.save(path)?;
    Ok(())
}

/// The rectangle an outline describes, if it is an axis-aligned rectangle
fn rectangle(xy: &[GdsPoint]) -> Option<Rect> {
    let pts = match xy {
        [first, rest @ ..] if rest.last() == Some(first) => &xy[..xy.len() - 1],
        _ => xy,
    };
    let [a, b, c, d] = pts else {
        return None;
    };
    let clockwise = a.x == b.x && b.y == c.y && c.x == d.x && d.y == a.y;
    let counter = a.y == b.y && b.x == c.x && c.y == d.y && d.x == a.x;
    if !(clockwise || counter) {
        return None;
    }
    Some(Rect::new(a.x as i64, a.y as i64, c.x as i64, c.y as i64))
}

fn check_strans(structure: &str, strans: &Option<GdsStrans>) -> Result<(), GdsError> {
    let Some(strans) = strans else {
        return Ok(());
    };
    let plain = !strans.reflected
        && !strans.abs_mag
        && !strans.abs_angle
        && strans.mag.map_or(true, |m| m == 1.0)
        && strans.angle.map_or(true, |a| a == 0.0);
    if plain {
        Ok(())
    } else {
        Err(GdsError::Unsupported {
            structure: structure.to_string(),
            reason: "rotated, mirrored or scaled references".to_string(),
        })
    }
}

/// Structure indices ordered so that every structure follows the ones it references
fn import_order(gds: &GdsLibrary) -> Result<Vec<usize>, GdsError> {
    let mut by_name: HashMap<&str, usize> = HashMap::new();
    for (i, s) in gds.structs.iter().enumerate() {
        if by_name.insert(s.name.as_str(), i).is_some() {
            return Err(GdsError::Unsupported {
                structure: s.name.clone(),
                reason: "structure defined twice".to_string(),
            });
        }
    }

    let mut graph: DiGraph<usize, ()> = DiGraph::new();
    let nodes: Vec<NodeIndex> = (0..gds.structs.len()).map(|i| graph.add_node(i)).collect();
    for (i, s) in gds.structs.iter().enumerate() {
        for elem in &s.elems {
            let GdsElement::GdsStructRef(sref) = elem else {
                continue;
            };
            let target = by_name.get(sref.name.as_str()).ok_or_else(|| {
                GdsError::UnknownStructure {
                    structure: s.name.clone(),
                    name: sref.name.clone(),
                }
            })?;
            graph.add_edge(nodes[i], nodes[*target], ());
        }
    }

    let order = toposort(&graph, None).map_err(|cycle| GdsError::Unsupported {
        structure: gds.structs[graph[cycle.node_id()]].name.clone(),
        reason: "recursive structure references".to_string(),
    })?;
    Ok(order.into_iter().rev().map(|n| graph[n]).collect())
}

/// Read a GDSII library into `library`, returning the new cells in import order.
///
/// Imported cells are frozen. Primitives are named `<layer>_<n>` and
/// instances `<template>_<n>`, numbered per cell in element order. A
/// rectangle on the boundary layer becomes the cell's own boundary; without
/// one, the boundary is the extent of the content.
pub fn import_into(
    library: &mut Library,
    gds: &GdsLibrary,
    layers: &LayerMap,
) -> Result<Vec<CellId>, GdsError> {
    let _span = info_span!("gds_import", structures = gds.structs.len()).entered();
    let mut imported = Vec::new();

    for index in import_order(gds)? {
        let strukt = &gds.structs[index];
        let id = library.add_cell(strukt.name.as_str())?;
        let mut counter = 0usize;
        let mut next_name = |stem: &str| {
            let name = format!("{}_{}", stem, counter);
            counter += 1;
            name
        };

        let mut has_boundary = false;
        for elem in &strukt.elems {
            match elem {
                GdsElement::GdsBoundary(boundary) => {
                    let rect = rectangle(&boundary.xy).ok_or_else(|| GdsError::Unsupported {
                        structure: strukt.name.clone(),
                        reason: "non-rectangular boundary".to_string(),
                    })?;
                    if (boundary.layer, boundary.datatype) == layers.boundary_layer() {
                        if has_boundary {
                            return Err(GdsError::Unsupported {
                                structure: strukt.name.clone(),
                                reason: "more than one cell boundary".to_string(),
                            });
                        }
                        has_boundary = true;
                        library.place_rect(id, "self", rect)?;
                        continue;
                    }
                    let tag = layers.tag(boundary.layer, boundary.datatype);
                    let name = next_name(&tag);
                    library.add_rect(id, &name, &tag)?;
                    library.place_rect(id, &name, rect)?;
                }
                GdsElement::GdsStructRef(sref) => {
                    check_strans(&strukt.name, &sref.strans)?;
                    let template = library.cell_id(&sref.name)?;
                    let name = next_name(&sref.name);
                    library.add_instance(id, &name, template)?;
                    let origin = library.bounding_box(template).unwrap_or_else(Rect::zero);
                    let rect = origin.translate(sref.xy.x as i64, sref.xy.y as i64);
                    library.place_rect(id, &name, rect)?;
                }
                GdsElement::GdsArrayRef(aref) => {
                    return Err(GdsError::Unsupported {
                        structure: strukt.name.clone(),
                        reason: format!("array reference to '{}'", aref.name),
                    });
                }
                other => {
                    warn!(structure = %strukt.name, element = ?other, "skipping unsupported element");
                }
            }
        }

        library.freeze(id)?;
        debug!(cell = %strukt.name, "imported structure");
        imported.push(id);
    }

    info!(cells = imported.len(), "import complete");
    Ok(imported)
}

/// Import a whole GDSII library into a fresh [`Library`]
pub fn import(gds: &GdsLibrary, layers: &LayerMap) -> Result<Library, GdsError> {
    let mut library = Library::new();
    import_into(&mut library, gds, layers)?;
    Ok(library)
}

/// Load a GDSII file from `path` into a fresh [`Library`]
pub fn read(path: &Path, layers: &LayerMap) -> Result<Library, GdsError> {
    let gds = GdsLibrary::load(path)?;
    import(&gds, layers)
}
