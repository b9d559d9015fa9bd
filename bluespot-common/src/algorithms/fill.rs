/*
This code is part of the BluespotTools pluvial flood screening library.
Authors: Dr. Mette Kirkeby
Created: 21/03/2023
Last Modified: 09/01/2025
License: MIT
*/

use crate::structures::Array2D;

const SQRT2: f64 = std::f64::consts::SQRT_2;

// Neighbour offsets in row scan order, upper-left first.
const DX: [isize; 8] = [-1, 0, 1, -1, 1, -1, 0, 1];
const DY: [isize; 8] = [-1, -1, -1, 0, 0, 1, 1, 1];

/// Creates a depressionless terrain model using the iterative sweep method of
/// Planchon and Darboux (2002). In the output every cell has at least one
/// non-uphill path to the raster edge. Flat areas are permitted.
///
/// Nodata values are not supported; every cell value is treated as a valid
/// elevation. Callers must substitute nodata before filling. A value clearly
/// below the lowest real elevation (e.g. -999) works in most cases.
///
/// # Reference
/// Planchon, O. and Darboux, F., 2002. A fast, simple and versatile algorithm to
/// fill the depressions of digital elevation models. Catena, 46(2-3), pp.159-176.
pub fn fill_terrain(dem: &Array2D<f32>) -> Array2D<f32> {
    let mut filled = initialize_filled_f32(dem);
    let maxrow = dem.rows - 2;
    let maxcol = dem.columns - 2;
    if maxrow < 1 || maxcol < 1 {
        // No interior cells; the edge copy is already the answer.
        return filled;
    }

    let mut keep_going = true;
    while keep_going {
        // One cycle is four sweeps, one per rasterised scan order. The change
        // flags of all four sweeps count towards continuing the outer loop.
        let mut changed = fill_sweep(dem, &mut filled, 1, maxrow, 1, maxcol); // UL -> LR
        changed |= fill_sweep(dem, &mut filled, maxrow, 1, maxcol, 1); // LR -> UL
        changed |= fill_sweep(dem, &mut filled, 1, maxrow, maxcol, 1); // UR -> LL
        changed |= fill_sweep(dem, &mut filled, maxrow, 1, 1, maxcol); // LL -> UR
        keep_going = changed;
    }
    filled
}

/// Creates a depressionless terrain model in which every cell additionally has
/// at least one strictly downslope path to the raster edge. Strict descent is
/// enforced by requiring a minimum elevation drop of `short` across
/// edge-sharing neighbours and `diag` across corner-sharing neighbours.
///
/// The output is 64-bit because a safe `short` derived from
/// [`minimum_safe_short_and_diag`] is smaller than the 32-bit resolution at the
/// top of the elevation range.
pub fn fill_terrain_no_flats(dem: &Array2D<f32>, short: f64, diag: f64) -> Array2D<f64> {
    let mut filled = initialize_filled_f64(dem);
    let maxrow = dem.rows - 2;
    let maxcol = dem.columns - 2;
    if maxrow < 1 || maxcol < 1 {
        return filled;
    }

    let mut keep_going = true;
    while keep_going {
        let mut changed = fill_sweep_no_flats(dem, &mut filled, 1, maxrow, 1, maxcol, short, diag);
        changed |= fill_sweep_no_flats(dem, &mut filled, maxrow, 1, maxcol, 1, short, diag);
        changed |= fill_sweep_no_flats(dem, &mut filled, 1, maxrow, maxcol, 1, short, diag);
        changed |= fill_sweep_no_flats(dem, &mut filled, maxrow, 1, 1, maxcol, short, diag);
        keep_going = changed;
    }
    filled
}

/// Calculates the smallest safe minimum elevation steps for the no-flats fill.
///
/// `short` is scaled from the unit-in-the-last-place at the largest absolute
/// elevation so that adding it to any elevation in the grid is guaranteed to
/// be representable. `diag` is `short * sqrt(2)`.
pub fn minimum_safe_short_and_diag(dem: &Array2D<f32>) -> (f64, f64) {
    let mut zmin = f64::INFINITY;
    let mut zmax = f64::NEG_INFINITY;
    let mut z: f64;
    for row in 0..dem.rows {
        for col in 0..dem.columns {
            z = dem.get_value(row, col) as f64;
            if z < zmin {
                zmin = z;
            }
            if z > zmax {
                zmax = z;
            }
        }
    }
    let maxval = zmax.abs().max(zmin.abs());
    let short = (next_after_up(maxval) - maxval) * 1024f64;
    let diag = short * SQRT2;
    (short, diag)
}

// The smallest representable f64 greater than v.
fn next_after_up(v: f64) -> f64 {
    if v.is_nan() || v == f64::INFINITY {
        return v;
    }
    if v == 0f64 {
        return f64::from_bits(1);
    }
    if v > 0f64 {
        f64::from_bits(v.to_bits() + 1)
    } else {
        f64::from_bits(v.to_bits() - 1)
    }
}

fn initialize_filled_f32(dem: &Array2D<f32>) -> Array2D<f32> {
    let mut filled: Array2D<f32> =
        Array2D::new(dem.rows, dem.columns, f32::INFINITY, dem.nodata()).unwrap();
    copy_edges_f64(dem, |row, col, z| filled.set_value(row, col, z as f32));
    filled
}

fn initialize_filled_f64(dem: &Array2D<f32>) -> Array2D<f64> {
    let mut filled: Array2D<f64> =
        Array2D::new(dem.rows, dem.columns, f64::INFINITY, dem.nodata() as f64).unwrap();
    copy_edges_f64(dem, |row, col, z| filled.set_value(row, col, z));
    filled
}

fn copy_edges_f64<F: FnMut(isize, isize, f64)>(dem: &Array2D<f32>, mut set: F) {
    let maxrow = dem.rows - 1;
    let maxcol = dem.columns - 1;
    for col in 0..dem.columns {
        set(0, col, dem.get_value(0, col) as f64);
        set(maxrow, col, dem.get_value(maxrow, col) as f64);
    }
    for row in 0..dem.rows {
        set(row, 0, dem.get_value(row, 0) as f64);
        set(row, maxcol, dem.get_value(row, maxcol) as f64);
    }
}

// One rasterised pass over the interior. The scan direction is given by the
// from/to bounds; both bounds are inclusive.
fn fill_sweep(
    dem: &Array2D<f32>,
    filled: &mut Array2D<f32>,
    fromrow: isize,
    torow: isize,
    fromcol: isize,
    tocol: isize,
) -> bool {
    let rowstep: isize = if torow > fromrow { 1 } else { -1 };
    let colstep: isize = if tocol > fromcol { 1 } else { -1 };

    let mut changed_something = false;
    let mut row = fromrow;
    while row != torow + rowstep {
        let mut col = fromcol;
        while col != tocol + colstep {
            if fill_cell(dem, filled, row, col) {
                changed_something = true;
            }
            col += colstep;
        }
        row += rowstep;
    }
    changed_something
}

fn fill_cell(dem: &Array2D<f32>, filled: &mut Array2D<f32>, row: isize, col: isize) -> bool {
    let filled_value = filled.get_value(row, col);
    let dem_value = dem.get_value(row, col);
    if filled_value <= dem_value {
        return false;
    }

    let mut min_value = filled_value;
    for n in 0..8 {
        let zn = filled.get_value(row + DY[n], col + DX[n]);
        if zn < min_value {
            min_value = zn;
        }
    }

    // Cannot be lower than terrain
    let new_value = min_value.max(dem_value);
    if new_value != filled_value {
        filled.set_value(row, col, new_value);
        return true;
    }
    false
}

fn fill_sweep_no_flats(
    dem: &Array2D<f32>,
    filled: &mut Array2D<f64>,
    fromrow: isize,
    torow: isize,
    fromcol: isize,
    tocol: isize,
    short: f64,
    diag: f64,
) -> bool {
    let rowstep: isize = if torow > fromrow { 1 } else { -1 };
    let colstep: isize = if tocol > fromcol { 1 } else { -1 };

    let mut changed_something = false;
    let mut row = fromrow;
    while row != torow + rowstep {
        let mut col = fromcol;
        while col != tocol + colstep {
            if fill_cell_no_flats(dem, filled, row, col, short, diag) {
                changed_something = true;
            }
            col += colstep;
        }
        row += rowstep;
    }
    changed_something
}

fn fill_cell_no_flats(
    dem: &Array2D<f32>,
    filled: &mut Array2D<f64>,
    row: isize,
    col: isize,
    short: f64,
    diag: f64,
) -> bool {
    let filled_value = filled.get_value(row, col);
    let dem_value = dem.get_value(row, col) as f64;
    if filled_value <= dem_value {
        return false;
    }

    let up = row - 1;
    let down = row + 1;
    let left = col - 1;
    let right = col + 1;

    let corner_min = filled
        .get_value(up, left)
        .min(filled.get_value(up, right))
        .min(filled.get_value(down, left))
        .min(filled.get_value(down, right));
    let edge_min = filled
        .get_value(up, col)
        .min(filled.get_value(row, left))
        .min(filled.get_value(row, right))
        .min(filled.get_value(down, col));
    let min_value = (corner_min + diag).min(edge_min + short).min(filled_value);

    // Cannot be lower than terrain
    let new_value = min_value.max(dem_value);
    if new_value != filled_value {
        filled.set_value(row, col, new_value);
        return true;
    }
    false
}

#[cfg(test)]
mod test {
    use super::{fill_terrain, fill_terrain_no_flats, minimum_safe_short_and_diag, next_after_up};
    use crate::structures::Array2D;

    fn dem_from_rows(rows: &[Vec<f32>]) -> Array2D<f32> {
        let mut dem: Array2D<f32> =
            Array2D::new(rows.len() as isize, rows[0].len() as isize, 0f32, -999f32).unwrap();
        for (r, row) in rows.iter().enumerate() {
            dem.set_row_data(r as isize, row.clone());
        }
        dem
    }

    #[test]
    fn test_fill_single_pit() {
        // A ring at 9 m draining through the 8 m edge cell, with a 2 m pit at
        // the centre. The pit fills to the level of its lowest escape route.
        let dem = dem_from_rows(&[
            vec![10.0, 10.0, 10.0, 10.0, 10.0],
            vec![10.0, 9.0, 9.0, 9.0, 10.0],
            vec![8.0, 9.0, 2.0, 9.0, 10.0],
            vec![10.0, 9.0, 9.0, 9.0, 10.0],
            vec![10.0, 10.0, 10.0, 10.0, 10.0],
        ]);
        let filled = fill_terrain(&dem);
        assert_eq!(filled.get_value(2, 2), 9.0);
        // Everything else already drains and is untouched.
        for row in 0..5 {
            for col in 0..5 {
                if (row, col) != (2, 2) {
                    assert_eq!(filled.get_value(row, col), dem.get_value(row, col));
                }
            }
        }
        // Universal invariants.
        let mut max_filled = f32::NEG_INFINITY;
        for row in 0..5 {
            for col in 0..5 {
                assert!(filled.get_value(row, col) >= dem.get_value(row, col));
                max_filled = max_filled.max(filled.get_value(row, col));
            }
        }
        assert_eq!(max_filled, 10.0);
    }

    #[test]
    fn test_fill_enclosed_basin_rises_to_rim() {
        // With no drain the whole interior fills to the enclosing edge level.
        let dem = dem_from_rows(&[
            vec![10.0, 10.0, 10.0, 10.0, 10.0],
            vec![10.0, 9.0, 9.0, 9.0, 10.0],
            vec![10.0, 9.0, 2.0, 9.0, 10.0],
            vec![10.0, 9.0, 9.0, 9.0, 10.0],
            vec![10.0, 10.0, 10.0, 10.0, 10.0],
        ]);
        let filled = fill_terrain(&dem);
        for row in 1..4 {
            for col in 1..4 {
                assert_eq!(filled.get_value(row, col), 10.0);
            }
        }
    }

    #[test]
    fn test_fill_preserves_drained_terrain() {
        // A monotonic incline has no depressions.
        let mut rows = vec![];
        for r in 0..6 {
            rows.push((0..6).map(|c| (r + c) as f32).collect());
        }
        let dem = dem_from_rows(&rows);
        let filled = fill_terrain(&dem);
        for row in 0..6 {
            for col in 0..6 {
                assert_eq!(filled.get_value(row, col), dem.get_value(row, col));
            }
        }
    }

    #[test]
    fn test_fill_is_idempotent() {
        let dem = dem_from_rows(&[
            vec![5.0, 5.0, 5.0, 5.0],
            vec![5.0, 1.0, 4.0, 5.0],
            vec![5.0, 4.0, 1.0, 5.0],
            vec![5.0, 5.0, 5.0, 5.0],
        ]);
        let filled = fill_terrain(&dem);
        let refilled = fill_terrain(&filled);
        for row in 0..4 {
            for col in 0..4 {
                assert_eq!(refilled.get_value(row, col), filled.get_value(row, col));
            }
        }
    }

    #[test]
    fn test_fill_no_interior() {
        let dem = dem_from_rows(&[vec![3.0, 1.0, 2.0], vec![4.0, 5.0, 6.0]]);
        let filled = fill_terrain(&dem);
        for row in 0..2 {
            for col in 0..3 {
                assert_eq!(filled.get_value(row, col), dem.get_value(row, col));
            }
        }
    }

    #[test]
    fn test_fill_no_flats_enforces_descent() {
        // A perfectly level plateau must come out strictly drained.
        let dem = dem_from_rows(&[
            vec![10.0; 6],
            vec![10.0; 6],
            vec![10.0; 6],
            vec![10.0; 6],
            vec![10.0; 6],
            vec![10.0; 6],
        ]);
        let (short, diag) = minimum_safe_short_and_diag(&dem);
        assert!(short > 0.0);
        let filled = fill_terrain_no_flats(&dem, short, diag);

        let dx: [isize; 8] = [-1, 0, 1, -1, 1, -1, 0, 1];
        let dy: [isize; 8] = [-1, -1, -1, 0, 0, 1, 1, 1];
        for row in 1..5 {
            for col in 1..5 {
                let z = filled.get_value(row, col);
                assert!(z >= dem.get_value(row, col) as f64);
                // At least one neighbour lies at least a full step below.
                let mut has_descent = false;
                for n in 0..8 {
                    let zn = filled.get_value(row + dy[n], col + dx[n]);
                    let step = if dx[n] != 0 && dy[n] != 0 { diag } else { short };
                    // Relative comparison; the enforced steps are at ulp scale.
                    if zn <= z - 0.99 * step {
                        has_descent = true;
                    }
                }
                assert!(has_descent, "no strict descent at ({}, {})", row, col);
            }
        }
    }

    #[test]
    fn test_fill_no_flats_with_negative_values() {
        let mut dem: Array2D<f32> = Array2D::new(10, 10, -9999f32, -32768f32).unwrap();
        for row in 4..6 {
            for col in 4..6 {
                dem.set_value(row, col, 0f32);
            }
        }
        let (short, diag) = minimum_safe_short_and_diag(&dem);
        let filled = fill_terrain_no_flats(&dem, short, diag);
        assert!(filled.get_value(1, 1) != -9999f64);
    }

    #[test]
    fn test_minimum_safe_short_and_diag_ratio() {
        let dem = dem_from_rows(&[vec![0.0, 55.5], vec![-12.0, 3.25]]);
        let (short, diag) = minimum_safe_short_and_diag(&dem);
        assert!((diag / short - 2f64.sqrt()).abs() < 0.0001);
        // Adding short at the top of the range must be representable.
        assert!(55.5 + short > 55.5);
    }

    #[test]
    fn test_next_after_up() {
        assert!(next_after_up(1.0) > 1.0);
        assert_eq!(next_after_up(1.0), f64::from_bits(1.0f64.to_bits() + 1));
        assert!(next_after_up(-1.0) > -1.0);
        assert!(next_after_up(0.0) > 0.0);
    }
}
