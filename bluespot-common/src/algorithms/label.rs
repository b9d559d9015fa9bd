/*
This code is part of the BluespotTools pluvial flood screening library.
Authors: Dr. Mette Kirkeby
Created: 11/04/2023
Last Modified: 03/10/2024
License: MIT
*/

use crate::structures::Array2D;
use std::io::Error;
use std::ops::{AddAssign, SubAssign};

// 8-connected neighbourhood offsets.
const DX: [isize; 8] = [1, 1, 1, 0, -1, -1, -1, 0];
const DY: [isize; 8] = [-1, 0, 1, 1, 1, 0, -1, -1];

/// Per-label reductions over a single raster scan.
///
/// `min_cell`/`max_cell` hold the first cell (row-major order) at which the
/// extreme value was seen.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct LabelStats {
    pub min: f64,
    pub max: f64,
    pub sum: f64,
    pub count: i64,
    pub min_cell: (isize, isize),
    pub max_cell: (isize, isize),
}

impl LabelStats {
    fn new() -> LabelStats {
        LabelStats {
            min: f64::INFINITY,
            max: f64::NEG_INFINITY,
            sum: 0f64,
            count: 0,
            min_cell: (-1, -1),
            max_cell: (-1, -1),
        }
    }
}

/// Labels the 8-connected components of all cells differing from `background`.
///
/// Features are numbered 1..=nlabels in the row-major order their first cell
/// is encountered; the background keeps label 0. Returns the label grid and
/// the number of features found.
pub fn connected_components<T>(
    data: &Array2D<T>,
    background: T,
) -> Result<(Array2D<i32>, i32), Error>
where
    T: Copy + AddAssign + SubAssign + PartialEq,
{
    let rows = data.rows;
    let columns = data.columns;
    let unvisited = -1i32;
    let mut labelled: Array2D<i32> = Array2D::new(rows, columns, unvisited, unvisited)?;
    let mut nlabels = 0i32;
    let mut stack = vec![];
    for row in 0..rows {
        for col in 0..columns {
            if data.get_value(row, col) == background {
                labelled.set_value(row, col, 0);
                continue;
            }
            if labelled.get_value(row, col) != unvisited {
                continue;
            }
            nlabels += 1;
            labelled.set_value(row, col, nlabels);
            stack.push((row, col));
            while let Some((r, c)) = stack.pop() {
                for n in 0..8 {
                    let rn = r + DY[n];
                    let cn = c + DX[n];
                    if !crate::algorithms::flow::cell_in_raster((rows, columns), (rn, cn)) {
                        continue;
                    }
                    if data.get_value(rn, cn) != background
                        && labelled.get_value(rn, cn) == unvisited
                    {
                        labelled.set_value(rn, cn, nlabels);
                        stack.push((rn, cn));
                    }
                }
            }
        }
    }
    Ok((labelled, nlabels))
}

/// Calculates data stats for each label 0..=nlabels in a single scan.
pub fn label_stats(data: &Array2D<f64>, labelled: &Array2D<i32>, nlabels: i32) -> Vec<LabelStats> {
    let mut stats = vec![LabelStats::new(); (nlabels + 1) as usize];
    for row in 0..data.rows {
        for col in 0..data.columns {
            let val = data.get_value(row, col);
            let lbl = labelled.get_value(row, col);
            let record = &mut stats[lbl as usize];
            record.count += 1;
            record.sum += val;
            if val < record.min {
                record.min = val;
                record.min_cell = (row, col);
            }
            if val > record.max {
                record.max = val;
                record.max_cell = (row, col);
            }
        }
    }
    stats
}

/// Counts the number of cells of each label. The result covers at least
/// 0..=nlabels and grows if larger labels occur.
pub fn label_count(labelled: &Array2D<i32>, nlabels: i32) -> Vec<i64> {
    let mut counts = vec![0i64; (nlabels + 1) as usize];
    for row in 0..labelled.rows {
        for col in 0..labelled.columns {
            let lbl = labelled.get_value(row, col) as usize;
            if lbl >= counts.len() {
                counts.resize(lbl + 1, 0);
            }
            counts[lbl] += 1;
        }
    }
    counts
}

/// Produces a boolean raster (1/0) that is true wherever the cell's label is
/// kept. `keep[n]` decides label n; the background label 0 is never kept.
/// Rerun [`connected_components`] on the result to obtain contiguous labels.
pub fn keep_labels(labelled: &Array2D<i32>, keep: &[bool]) -> Array2D<u8> {
    let mut kept: Array2D<u8> = Array2D::new(labelled.rows, labelled.columns, 0u8, 0u8).unwrap();
    for row in 0..labelled.rows {
        for col in 0..labelled.columns {
            let lbl = labelled.get_value(row, col) as usize;
            if lbl != 0 && keep[lbl] {
                kept.set_value(row, col, 1u8);
            }
        }
    }
    kept
}

#[cfg(test)]
mod test {
    use super::{connected_components, keep_labels, label_count, label_stats};
    use crate::structures::Array2D;

    fn mask_from_rows(rows: &[Vec<f64>]) -> Array2D<f64> {
        let mut m: Array2D<f64> =
            Array2D::new(rows.len() as isize, rows[0].len() as isize, 0f64, -999f64).unwrap();
        for (r, row) in rows.iter().enumerate() {
            m.set_row_data(r as isize, row.clone());
        }
        m
    }

    #[test]
    fn test_connected_components_diagonal_connectivity() {
        // The two blobs touch only at a corner; 8-connectivity joins them.
        let mask = mask_from_rows(&[
            vec![1.0, 0.0, 0.0, 0.0],
            vec![0.0, 1.0, 0.0, 0.0],
            vec![0.0, 0.0, 0.0, 1.0],
        ]);
        let (labelled, nlabels) = connected_components(&mask, 0f64).unwrap();
        assert_eq!(nlabels, 2);
        assert_eq!(labelled.get_value(0, 0), 1);
        assert_eq!(labelled.get_value(1, 1), 1);
        assert_eq!(labelled.get_value(2, 3), 2);
        assert_eq!(labelled.get_value(0, 2), 0);
    }

    #[test]
    fn test_connected_components_label_order_is_row_major() {
        let mask = mask_from_rows(&[
            vec![0.0, 2.0, 0.0, 5.0],
            vec![0.0, 2.0, 0.0, 5.0],
        ]);
        let (labelled, nlabels) = connected_components(&mask, 0f64).unwrap();
        assert_eq!(nlabels, 2);
        assert_eq!(labelled.get_value(0, 1), 1);
        assert_eq!(labelled.get_value(0, 3), 2);
    }

    #[test]
    fn test_label_stats() {
        let data = mask_from_rows(&[
            vec![5.0, 2.0, 0.0],
            vec![3.0, 2.0, 0.0],
        ]);
        let mut labelled: Array2D<i32> = Array2D::new(2, 3, 0, -1).unwrap();
        labelled.set_value(0, 0, 1);
        labelled.set_value(0, 1, 1);
        labelled.set_value(1, 0, 1);
        labelled.set_value(1, 1, 1);

        let stats = label_stats(&data, &labelled, 1);
        assert_eq!(stats.len(), 2);
        assert_eq!(stats[1].min, 2.0);
        assert_eq!(stats[1].max, 5.0);
        assert_eq!(stats[1].sum, 12.0);
        assert_eq!(stats[1].count, 4);
        // First minimum in row-major order wins: (0,1) before (1,1).
        assert_eq!(stats[1].min_cell, (0, 1));
        assert_eq!(stats[1].max_cell, (0, 0));
        // Background record covers the remaining cells.
        assert_eq!(stats[0].count, 2);
        assert_eq!(stats[0].sum, 0.0);
    }

    #[test]
    fn test_keep_labels_recount() {
        let mask = mask_from_rows(&[
            vec![1.0, 0.0, 1.0, 0.0, 1.0],
            vec![0.0, 0.0, 0.0, 0.0, 0.0],
        ]);
        let (labelled, nlabels) = connected_components(&mask, 0f64).unwrap();
        assert_eq!(nlabels, 3);
        // Drop the middle feature; the background flag is ignored even if set.
        let keep = vec![true, true, false, true];
        let kept = keep_labels(&labelled, &keep);
        let (relabelled, n) = connected_components(&kept, 0u8).unwrap();
        assert_eq!(n, 2);
        assert_eq!(relabelled.get_value(0, 0), 1);
        assert_eq!(relabelled.get_value(0, 2), 0);
        assert_eq!(relabelled.get_value(0, 4), 2);
    }

    #[test]
    fn test_label_count() {
        let mask = mask_from_rows(&[vec![1.0, 1.0, 0.0], vec![0.0, 1.0, 0.0]]);
        let (labelled, nlabels) = connected_components(&mask, 0f64).unwrap();
        let counts = label_count(&labelled, nlabels);
        assert_eq!(counts, vec![3, 3]);
    }
}
