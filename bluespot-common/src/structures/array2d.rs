/////////////////////////////////////////////
// A generic 2-dimensional array structure //
/////////////////////////////////////////////

use std::io::Error;
use std::io::ErrorKind;
use std::ops::{AddAssign, Index, IndexMut, SubAssign};

/// A simple in-memory 2-D raster data structure that is not connected to a file.
/// Out-of-grid reads return the grid's nodata value, which lets neighbourhood
/// scans run without explicit bounds tests.
///
/// Example:
///
/// ```
/// use bluespot_common::structures::Array2D;
///
/// # fn main() -> Result<(), std::io::Error> {
/// let rows = 100;
/// let columns = 500;
/// let mut x: Array2D<f64> = Array2D::new(rows, columns, 0f64, -999f64)?;
/// let cell_val = x.get_value(50, 100);
/// x.set_value(50, 100, 1f64);
/// # Ok(())
/// # }
/// ```
#[derive(Clone, Debug)]
pub struct Array2D<T: Copy + AddAssign + SubAssign> {
    pub columns: isize,
    pub rows: isize,
    data: Vec<T>,
    pub nodata: T,
}

impl<T> Array2D<T>
where
    T: Copy + AddAssign + SubAssign,
{
    pub fn new(
        rows: isize,
        columns: isize,
        initial_value: T,
        nodata: T,
    ) -> Result<Array2D<T>, Error> {
        if rows < 0 || columns < 0 {
            return Err(Error::new(
                ErrorKind::InvalidData,
                "Only non-negative rows and columns values accepted.",
            ));
        }
        Ok(Array2D {
            columns: columns,
            rows: rows,
            nodata: nodata,
            data: vec![initial_value; (rows * columns) as usize],
        })
    }

    pub fn set_value(&mut self, row: isize, column: isize, value: T) {
        if column >= 0 && row >= 0 {
            if column < self.columns && row < self.rows {
                self.data[(row * self.columns + column) as usize] = value;
            }
        }
    }

    pub fn get_value(&self, row: isize, column: isize) -> T {
        if row < 0 || column < 0 {
            return self.nodata;
        }
        if row >= self.rows || column >= self.columns {
            return self.nodata;
        }
        self.data[(row * self.columns + column) as usize]
    }

    pub fn set_row_data(&mut self, row: isize, values: Vec<T>) {
        for column in 0..values.len() as isize {
            if row >= 0 {
                if column < self.columns && row < self.rows {
                    self.data[(row * self.columns + column) as usize] = values[column as usize];
                }
            }
        }
    }

    pub fn get_row_data(&self, row: isize) -> Vec<T> {
        let columns = self.columns as usize;
        let mut values: Vec<T> = vec![self.nodata; columns];
        if row >= 0 && row < self.rows {
            for column in 0..columns {
                values[column] = self.data[row as usize * columns + column];
            }
        }
        values
    }

    pub fn duplicate(&self) -> Array2D<T> {
        Array2D {
            columns: self.columns,
            rows: self.rows,
            nodata: self.nodata,
            data: self.data.clone(),
        }
    }

    pub fn reinitialize_values(&mut self, value: T) {
        self.data = vec![value; (self.rows * self.columns) as usize];
    }

    pub fn columns(&self) -> isize {
        self.columns
    }

    pub fn rows(&self) -> isize {
        self.rows
    }

    /// Grid shape as a (rows, columns) pair.
    pub fn shape(&self) -> (isize, isize) {
        (self.rows, self.columns)
    }

    pub fn nodata(&self) -> T {
        self.nodata
    }
}

impl<T: Copy> Index<(isize, isize)> for Array2D<T>
where
    T: Copy + AddAssign + SubAssign,
{
    type Output = T;

    fn index<'a>(&'a self, index: (isize, isize)) -> &'a T {
        let row = index.0;
        let column = index.1;
        if row < 0 || column < 0 {
            return &self.nodata;
        }
        if row >= self.rows || column >= self.columns {
            return &self.nodata;
        }
        let idx = row * self.columns + column;
        &self.data[idx as usize]
    }
}

impl<T: Copy> IndexMut<(isize, isize)> for Array2D<T>
where
    T: Copy + AddAssign + SubAssign + PartialEq,
{
    fn index_mut<'a>(&'a mut self, index: (isize, isize)) -> &'a mut T {
        let row = index.0;
        let column = index.1;
        if row < 0 || column < 0 {
            return &mut self.nodata;
        }
        if row >= self.rows || column >= self.columns {
            return &mut self.nodata;
        }
        let idx = row * self.columns + column;
        &mut self.data[idx as usize]
    }
}

#[cfg(test)]
mod test {
    use super::Array2D;

    #[test]
    fn test_out_of_grid_reads_return_nodata() {
        let a: Array2D<i32> = Array2D::new(3, 4, 7, -1).unwrap();
        assert_eq!(a.get_value(1, 2), 7);
        assert_eq!(a.get_value(-1, 0), -1);
        assert_eq!(a.get_value(0, -1), -1);
        assert_eq!(a.get_value(3, 0), -1);
        assert_eq!(a.get_value(0, 4), -1);
    }

    #[test]
    fn test_row_data_round_trip() {
        let mut a: Array2D<f64> = Array2D::new(2, 3, 0f64, -999f64).unwrap();
        a.set_row_data(1, vec![1.5, 2.5, 3.5]);
        assert_eq!(a.get_row_data(1), vec![1.5, 2.5, 3.5]);
        assert_eq!(a.get_row_data(0), vec![0.0, 0.0, 0.0]);
        assert_eq!(a[(1, 2)], 3.5);
    }
}
