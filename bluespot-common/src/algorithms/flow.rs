/*
This code is part of the BluespotTools pluvial flood screening library.
Authors: Dr. Mette Kirkeby
Created: 04/04/2023
Last Modified: 17/02/2025
License: MIT
*/

use crate::structures::Array2D;
use std::io::Error;

const SQRT2: f64 = std::f64::consts::SQRT_2;

// Flow direction codes. Do not change these; several algorithms and the
// on-disk flow direction rasters depend on these exact values.
pub const FLOWDIR_UP: u8 = 0;
pub const FLOWDIR_UP_RIGHT: u8 = 1;
pub const FLOWDIR_RIGHT: u8 = 2;
pub const FLOWDIR_DOWN_RIGHT: u8 = 3;
pub const FLOWDIR_DOWN: u8 = 4;
pub const FLOWDIR_DOWN_LEFT: u8 = 5;
pub const FLOWDIR_LEFT: u8 = 6;
pub const FLOWDIR_UP_LEFT: u8 = 7;
pub const FLOWDIR_NODIR: u8 = 8;

// Cell offsets indexed by flow direction code.
const DELTA_ROW: [isize; 8] = [-1, -1, 0, 1, 1, 1, 0, -1];
const DELTA_COL: [isize; 8] = [0, 1, 1, 1, 0, -1, -1, -1];

/// Cell index delta `(row_delta, col_delta)` for a flow direction code.
/// `FLOWDIR_NODIR` has no delta.
pub fn direction_delta(direction: u8) -> Option<(isize, isize)> {
    if direction < 8 {
        Some((DELTA_ROW[direction as usize], DELTA_COL[direction as usize]))
    } else {
        None
    }
}

pub fn cell_in_raster(shape: (isize, isize), cell: (isize, isize)) -> bool {
    cell.0 >= 0 && cell.0 < shape.0 && cell.1 >= 0 && cell.1 < shape.1
}

/// Indexes of all edge cells: for each column the top and bottom cell, then
/// for each interior row the left and right cell.
pub fn edge_cells(shape: (isize, isize)) -> Vec<(isize, isize)> {
    let maxr = shape.0 - 1;
    let maxc = shape.1 - 1;
    let mut cells = Vec::with_capacity((2 * (shape.0 + shape.1)) as usize);
    for c in 0..=maxc {
        cells.push((0, c));
        if maxr > 0 {
            cells.push((maxr, c));
        }
    }
    for r in 1..maxr {
        cells.push((r, 0));
        if maxc > 0 {
            cells.push((r, maxc));
        }
    }
    cells
}

/// Computes the D8 flow directions of a single row.
///
/// Interior cells flow to the neighbour with the steepest positive descent;
/// diagonal drops are scaled by `1/sqrt(2)`. Ties resolve in code order, i.e.
/// the first maximum wins. Cells with no lower neighbour get `FLOWDIR_NODIR`.
/// With `edges_flow_outward` edge cells are hardcoded to point off the raster
/// (corner cells use the corresponding diagonal code).
///
/// Cells are assumed square (cell width == cell height).
pub fn flow_direction_row(terrain: &Array2D<f64>, row: isize, edges_flow_outward: bool) -> Vec<u8> {
    let rows = terrain.rows;
    let columns = terrain.columns;
    let maxr = rows - 1;
    let maxc = columns - 1;
    let mut data = vec![FLOWDIR_NODIR; columns as usize];

    if edges_flow_outward && (row == 0 || row == maxr) {
        let updown = if row == 0 { FLOWDIR_UP } else { FLOWDIR_DOWN };
        for col in 0..columns as usize {
            data[col] = updown;
        }
        if row == 0 {
            data[0] = FLOWDIR_UP_LEFT;
            data[maxc as usize] = FLOWDIR_UP_RIGHT;
        } else {
            data[0] = FLOWDIR_DOWN_LEFT;
            data[maxc as usize] = FLOWDIR_DOWN_RIGHT;
        }
        return data;
    }

    if row > 0 && row < maxr {
        let up = row - 1;
        let down = row + 1;
        let mut z: f64;
        let mut dz: f64;
        for col in 1..maxc {
            let left = col - 1;
            let right = col + 1;
            z = terrain.get_value(row, col);

            let mut dir = FLOWDIR_NODIR;
            let mut dzmax = 0f64;

            dz = z - terrain.get_value(up, col);
            if dz > dzmax {
                dzmax = dz;
                dir = FLOWDIR_UP;
            }
            dz = (z - terrain.get_value(up, right)) / SQRT2;
            if dz > dzmax {
                dzmax = dz;
                dir = FLOWDIR_UP_RIGHT;
            }
            dz = z - terrain.get_value(row, right);
            if dz > dzmax {
                dzmax = dz;
                dir = FLOWDIR_RIGHT;
            }
            dz = (z - terrain.get_value(down, right)) / SQRT2;
            if dz > dzmax {
                dzmax = dz;
                dir = FLOWDIR_DOWN_RIGHT;
            }
            dz = z - terrain.get_value(down, col);
            if dz > dzmax {
                dzmax = dz;
                dir = FLOWDIR_DOWN;
            }
            dz = (z - terrain.get_value(down, left)) / SQRT2;
            if dz > dzmax {
                dzmax = dz;
                dir = FLOWDIR_DOWN_LEFT;
            }
            dz = z - terrain.get_value(row, left);
            if dz > dzmax {
                dzmax = dz;
                dir = FLOWDIR_LEFT;
            }
            dz = (z - terrain.get_value(up, left)) / SQRT2;
            if dz > dzmax {
                dir = FLOWDIR_UP_LEFT;
            }

            data[col as usize] = dir;
        }
    }

    if edges_flow_outward {
        data[0] = FLOWDIR_LEFT;
        data[maxc as usize] = FLOWDIR_RIGHT;
    }
    data
}

/// Calculates D8 flow directions for the whole terrain.
///
/// Water always flows via the steepest descent from cell to cell; it never
/// flows up slope and never between cells of equal elevation. Run this on a
/// no-flats filled terrain to guarantee a direction for every interior cell.
pub fn terrain_flow_directions(terrain: &Array2D<f64>, edges_flow_outward: bool) -> Array2D<u8> {
    let mut flowdir: Array2D<u8> =
        Array2D::new(terrain.rows, terrain.columns, FLOWDIR_NODIR, FLOWDIR_NODIR).unwrap();
    for row in 0..terrain.rows {
        flowdir.set_row_data(row, flow_direction_row(terrain, row, edges_flow_outward));
    }
    flowdir
}

/// Does the cell in the indicated direction flow back into `cell`?
pub fn is_upstream_cell(flowdir: &Array2D<u8>, cell: (isize, isize), direction: u8) -> bool {
    let delta = match direction_delta(direction) {
        Some(d) => d,
        None => return false,
    };
    let to_cell = (cell.0 + delta.0, cell.1 + delta.1);
    if !cell_in_raster(flowdir.shape(), to_cell) {
        return false;
    }
    let neighbour_direction = flowdir.get_value(to_cell.0, to_cell.1);
    (direction + 4) % 8 == neighbour_direction
}

/// The cells which drain directly into the specified cell.
pub fn upstream_cells(flowdir: &Array2D<u8>, cell: (isize, isize)) -> Vec<(isize, isize)> {
    let mut upstream = vec![];
    for direction in 0..8u8 {
        if is_upstream_cell(flowdir, cell, direction) {
            let delta = direction_delta(direction).unwrap();
            upstream.push((cell.0 + delta.0, cell.1 + delta.1));
        }
    }
    upstream
}

/// Iterator over the downstream cell chain starting at (and including) a cell.
/// The trace ends when it leaves the raster or reaches a cell with no
/// direction.
pub struct DownstreamTrace<'a> {
    flowdir: &'a Array2D<u8>,
    cell: Option<(isize, isize)>,
}

impl<'a> Iterator for DownstreamTrace<'a> {
    type Item = (isize, isize);

    fn next(&mut self) -> Option<(isize, isize)> {
        let cell = self.cell?;
        if !cell_in_raster(self.flowdir.shape(), cell) {
            self.cell = None;
            return None;
        }
        let direction = self.flowdir.get_value(cell.0, cell.1);
        self.cell = direction_delta(direction).map(|d| (cell.0 + d.0, cell.1 + d.1));
        Some(cell)
    }
}

pub fn trace_downstream<'a>(flowdir: &'a Array2D<u8>, cell: (isize, isize)) -> DownstreamTrace<'a> {
    DownstreamTrace {
        flowdir: flowdir,
        cell: Some(cell),
    }
}

/// Calculates the accumulated flow raster from a flow direction raster. Each
/// cell counts the number of cells draining through it, itself included, so
/// every cell ends up >= 1.
///
/// A cell's count is defined only once all of its upstream cells are known.
/// Every cell with no upstream contributors starts a downstream trace; the
/// trace stops at the first cell that still has an unresolved contributor and
/// leaves it for a later trace to finish.
pub fn accumulated_flow(flowdir: &Array2D<u8>) -> Result<Array2D<f64>, Error> {
    let mut accum: Array2D<f64> = Array2D::new(flowdir.rows, flowdir.columns, 0f64, -1f64)?;
    for row in 0..flowdir.rows {
        for col in 0..flowdir.columns {
            if upstream_cells(flowdir, (row, col)).is_empty() {
                // A leaf in the inverse flow tree.
                trace_accumulated_flow(flowdir, &mut accum, (row, col));
            }
        }
    }
    Ok(accum)
}

fn trace_accumulated_flow(flowdir: &Array2D<u8>, accum: &mut Array2D<f64>, cell: (isize, isize)) {
    let mut cell = cell;
    while cell_in_raster(flowdir.shape(), cell) {
        let mut sum = 0f64;
        let mut unresolved = false;
        for up in upstream_cells(flowdir, cell) {
            let val = accum.get_value(up.0, up.1);
            if val <= 0f64 {
                unresolved = true;
                break;
            }
            sum += val;
        }
        if unresolved {
            // Another trace will resolve this cell later.
            break;
        }
        accum.set_value(cell.0, cell.1, sum + 1f64);
        match direction_delta(flowdir.get_value(cell.0, cell.1)) {
            Some(delta) => cell = (cell.0 + delta.0, cell.1 + delta.1),
            None => break,
        }
    }
}

/// Paints local watersheds by propagating labels upstream against the flow
/// directions. Every cell that drains into a labelled cell receives that
/// label; cells draining off the raster keep `unassigned`.
///
/// Existing labels are never overwritten. Two labels propagating along the
/// same stream cannot conflict because each cell has exactly one downstream
/// cell and hence a unique ancestor chain to any seed.
pub fn watersheds_from_labels(flowdir: &Array2D<u8>, labelled: &mut Array2D<i32>, unassigned: i32) {
    for cell in edge_cells(flowdir.shape()) {
        assign_watersheds_upstream(flowdir, labelled, cell, unassigned);
    }
}

fn assign_watersheds_upstream(
    flowdir: &Array2D<u8>,
    labelled: &mut Array2D<i32>,
    cell: (isize, isize),
    unassigned: i32,
) {
    // The stack holds a cell and the label of its downstream cell. Inverse
    // flow depths can reach thousands of cells, hence no recursion.
    let mut stack: Vec<(isize, isize, i32)> = vec![(cell.0, cell.1, unassigned)];
    while let Some((row, col, downstream_label)) = stack.pop() {
        let mut label = labelled.get_value(row, col);
        if label == unassigned {
            labelled.set_value(row, col, downstream_label);
            label = downstream_label;
        }
        for up in upstream_cells(flowdir, (row, col)) {
            stack.push((up.0, up.1, label));
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::structures::Array2D;

    fn terrain_from_rows(rows: &[Vec<f64>]) -> Array2D<f64> {
        let mut t: Array2D<f64> =
            Array2D::new(rows.len() as isize, rows[0].len() as isize, 0f64, -999f64).unwrap();
        for (r, row) in rows.iter().enumerate() {
            t.set_row_data(r as isize, row.clone());
        }
        t
    }

    #[test]
    fn test_direction_delta() {
        assert_eq!(direction_delta(FLOWDIR_UP), Some((-1, 0)));
        assert_eq!(direction_delta(FLOWDIR_DOWN_RIGHT), Some((1, 1)));
        assert_eq!(direction_delta(FLOWDIR_UP_LEFT), Some((-1, -1)));
        assert_eq!(direction_delta(FLOWDIR_NODIR), None);
    }

    #[test]
    fn test_flow_directions_steepest_descent() {
        // Centre cell drops hardest to the right.
        let terrain = terrain_from_rows(&[
            vec![9.0, 9.0, 9.0],
            vec![9.0, 5.0, 1.0],
            vec![9.0, 9.0, 9.0],
        ]);
        let flowdir = terrain_flow_directions(&terrain, false);
        assert_eq!(flowdir.get_value(1, 1), FLOWDIR_RIGHT);
    }

    #[test]
    fn test_flow_directions_first_maximum_wins() {
        // UP and RIGHT drop equally; UP comes first in code order.
        let terrain = terrain_from_rows(&[
            vec![9.0, 1.0, 9.0],
            vec![9.0, 5.0, 1.0],
            vec![9.0, 9.0, 9.0],
        ]);
        let flowdir = terrain_flow_directions(&terrain, false);
        assert_eq!(flowdir.get_value(1, 1), FLOWDIR_UP);
    }

    #[test]
    fn test_flow_directions_diagonal_distance_scaling() {
        // The diagonal drop of 1.2 is less attractive than the cardinal drop
        // of 1.0 once divided by sqrt(2).
        let terrain = terrain_from_rows(&[
            vec![9.0, 9.0, 3.8],
            vec![9.0, 5.0, 4.0],
            vec![9.0, 9.0, 9.0],
        ]);
        let flowdir = terrain_flow_directions(&terrain, false);
        assert_eq!(flowdir.get_value(1, 1), FLOWDIR_RIGHT);
    }

    #[test]
    fn test_flow_directions_flat_cell_gets_nodir() {
        let terrain = terrain_from_rows(&[
            vec![5.0, 5.0, 5.0],
            vec![5.0, 5.0, 5.0],
            vec![5.0, 5.0, 5.0],
        ]);
        let flowdir = terrain_flow_directions(&terrain, false);
        assert_eq!(flowdir.get_value(1, 1), FLOWDIR_NODIR);
    }

    #[test]
    fn test_edges_flow_outward() {
        let terrain = terrain_from_rows(&[
            vec![5.0, 5.0, 5.0, 5.0],
            vec![5.0, 4.0, 3.0, 5.0],
            vec![5.0, 5.0, 5.0, 5.0],
        ]);
        let flowdir = terrain_flow_directions(&terrain, true);
        assert_eq!(flowdir.get_value(0, 0), FLOWDIR_UP_LEFT);
        assert_eq!(flowdir.get_value(0, 3), FLOWDIR_UP_RIGHT);
        assert_eq!(flowdir.get_value(2, 0), FLOWDIR_DOWN_LEFT);
        assert_eq!(flowdir.get_value(2, 3), FLOWDIR_DOWN_RIGHT);
        assert_eq!(flowdir.get_value(0, 1), FLOWDIR_UP);
        assert_eq!(flowdir.get_value(2, 2), FLOWDIR_DOWN);
        assert_eq!(flowdir.get_value(1, 0), FLOWDIR_LEFT);
        assert_eq!(flowdir.get_value(1, 3), FLOWDIR_RIGHT);
    }

    // 4x5 grid where every cell flows right; column c then accumulates c+1.
    fn all_right_flowdir() -> Array2D<u8> {
        Array2D::new(4, 5, FLOWDIR_RIGHT, FLOWDIR_NODIR).unwrap()
    }

    #[test]
    fn test_upstream_cells() {
        let flowdir = all_right_flowdir();
        assert_eq!(upstream_cells(&flowdir, (1, 2)), vec![(1, 1)]);
        assert_eq!(upstream_cells(&flowdir, (1, 0)), vec![]);
    }

    #[test]
    fn test_trace_downstream() {
        let flowdir = all_right_flowdir();
        let trace: Vec<(isize, isize)> = trace_downstream(&flowdir, (2, 1)).collect();
        assert_eq!(trace, vec![(2, 1), (2, 2), (2, 3), (2, 4)]);
    }

    #[test]
    fn test_accumulated_flow_incline() {
        let flowdir = all_right_flowdir();
        let accum = accumulated_flow(&flowdir).unwrap();
        let mut sum = 0f64;
        let mut min = f64::INFINITY;
        for row in 0..4 {
            for col in 0..5 {
                let a = accum.get_value(row, col);
                assert_eq!(a, (col + 1) as f64);
                sum += a;
                min = min.min(a);
            }
        }
        assert!(min >= 1f64);
        assert_eq!(sum, 4.0 * (1.0 + 2.0 + 3.0 + 4.0 + 5.0));
    }

    #[test]
    fn test_accumulated_flow_confluence() {
        // Two arms meeting: (0,1) flows down, (1,0) flows right, junction at
        // (1,1) flows down and exits at (2,1).
        let mut flowdir: Array2D<u8> = Array2D::new(3, 3, FLOWDIR_NODIR, FLOWDIR_NODIR).unwrap();
        flowdir.set_value(0, 1, FLOWDIR_DOWN);
        flowdir.set_value(1, 0, FLOWDIR_RIGHT);
        flowdir.set_value(1, 1, FLOWDIR_DOWN);
        flowdir.set_value(2, 1, FLOWDIR_DOWN);
        let accum = accumulated_flow(&flowdir).unwrap();
        assert_eq!(accum.get_value(0, 1), 1.0);
        assert_eq!(accum.get_value(1, 0), 1.0);
        assert_eq!(accum.get_value(1, 1), 3.0);
        assert_eq!(accum.get_value(2, 1), 4.0);
        // Cells off the stream count only themselves.
        assert_eq!(accum.get_value(0, 0), 1.0);
        assert_eq!(accum.get_value(2, 2), 1.0);
    }

    #[test]
    fn test_watersheds_from_labels() {
        // Left half drains to the labelled cell (1,1), right half exits right.
        let mut flowdir: Array2D<u8> = Array2D::new(3, 4, FLOWDIR_RIGHT, FLOWDIR_NODIR).unwrap();
        flowdir.set_value(0, 0, FLOWDIR_DOWN);
        flowdir.set_value(2, 0, FLOWDIR_UP);
        flowdir.set_value(1, 0, FLOWDIR_RIGHT);
        flowdir.set_value(1, 1, FLOWDIR_RIGHT);

        let mut labelled: Array2D<i32> = Array2D::new(3, 4, 0, -1).unwrap();
        labelled.set_value(1, 1, 1);
        watersheds_from_labels(&flowdir, &mut labelled, 0);

        // The labelled cell and everything upstream of it carry label 1.
        assert_eq!(labelled.get_value(1, 1), 1);
        assert_eq!(labelled.get_value(1, 0), 1);
        assert_eq!(labelled.get_value(0, 0), 1);
        assert_eq!(labelled.get_value(2, 0), 1);
        // Cells downstream of the label drain off the raster unlabelled.
        assert_eq!(labelled.get_value(1, 2), 0);
        assert_eq!(labelled.get_value(1, 3), 0);
        assert_eq!(labelled.get_value(0, 2), 0);
    }

    #[test]
    fn test_watershed_labels_are_connected() {
        use crate::algorithms::label::connected_components;

        // Rows drain towards the centre column, the centre column drains
        // south through two labelled cells.
        let mut flowdir: Array2D<u8> = Array2D::new(5, 5, FLOWDIR_NODIR, FLOWDIR_NODIR).unwrap();
        for row in 0..5 {
            for col in 0..2 {
                flowdir.set_value(row, col, FLOWDIR_RIGHT);
            }
            for col in 3..5 {
                flowdir.set_value(row, col, FLOWDIR_LEFT);
            }
            flowdir.set_value(row, 2, FLOWDIR_DOWN);
        }
        let mut labelled: Array2D<i32> = Array2D::new(5, 5, 0, -1).unwrap();
        labelled.set_value(1, 2, 1);
        labelled.set_value(3, 2, 2);
        watersheds_from_labels(&flowdir, &mut labelled, 0);

        // Every painted watershed is one 8-connected component.
        for lbl in 1..=2 {
            let mut mask: Array2D<u8> = Array2D::new(5, 5, 0, 0).unwrap();
            let mut count = 0;
            for row in 0..5 {
                for col in 0..5 {
                    if labelled.get_value(row, col) == lbl {
                        mask.set_value(row, col, 1);
                        count += 1;
                    }
                }
            }
            assert!(count > 0);
            let (_, ncomponents) = connected_components(&mask, 0u8).unwrap();
            assert_eq!(ncomponents, 1, "watershed {} is not connected", lbl);
        }
    }

    #[test]
    fn test_edge_cells_cover_perimeter() {
        let cells = edge_cells((3, 4));
        assert_eq!(cells.len(), 2 * 4 + 2 * 1);
        assert!(cells.contains(&(0, 0)));
        assert!(cells.contains(&(2, 3)));
        assert!(cells.contains(&(1, 0)));
        assert!(!cells.contains(&(1, 1)));
    }
}
