/*
This code is part of the BluespotTools pluvial flood screening library.
Authors: Dr. Mette Kirkeby
Created: 14/03/2023
Last Modified: 22/05/2025
License: MIT
*/

extern crate num_traits;

mod arcascii_raster;
mod esri_float_raster;
mod io;

use self::arcascii_raster::*;
use self::esri_float_raster::*;
pub use self::io::{
    FileRasterSink, FileRasterSource, MemoryRasterSink, MemoryRasterSource, RasterSink,
    RasterSource,
};
use bluespot_common::structures::Array2D;
use num_traits::cast::AsPrimitive;
use std::default::Default;
use std::f64;
use std::io::Error;
use std::io::ErrorKind;
use std::ops::{AddAssign, Index, IndexMut, SubAssign};
use std::path::Path;

/// Raster is a common data structure that abstracts over the supported raster
/// file formats (ESRI ASCII grids and ESRI float grids). Cell values are held
/// as f64 regardless of the file data type.
///
/// Examples:
///
/// ```ignore
/// // Read an existing raster file
/// let input = Raster::new(&input_file, "r")?;
///
/// // Create a new raster file with the dimensions
/// // and location of an existing file.
/// let mut output = Raster::initialize_using_file(&output_file, &input);
/// ```
#[derive(Default, Clone)]
pub struct Raster {
    pub file_name: String,
    pub file_mode: String,
    pub raster_type: RasterType,
    pub configs: RasterConfigs,
    data: Vec<f64>,
}

impl Index<(isize, isize)> for Raster {
    type Output = f64;

    fn index<'a>(&'a self, index: (isize, isize)) -> &'a f64 {
        let row = index.0;
        let column = index.1;
        if row < 0 || column < 0 {
            return &self.configs.nodata;
        }
        let r = row as usize;
        let c = column as usize;
        if r >= self.configs.rows || c >= self.configs.columns {
            return &self.configs.nodata;
        }
        &self.data[r * self.configs.columns + c]
    }
}

impl IndexMut<(isize, isize)> for Raster {
    fn index_mut<'a>(&'a mut self, index: (isize, isize)) -> &'a mut f64 {
        let row = index.0;
        let column = index.1;
        if row < 0 || column < 0 {
            return &mut self.configs.nodata;
        }
        let r = row as usize;
        let c = column as usize;
        if r >= self.configs.rows || c >= self.configs.columns {
            return &mut self.configs.nodata;
        }
        &mut self.data[r * self.configs.columns + c]
    }
}

impl Raster {
    /// Creates an in-memory `Raster` object. The data are either read from an
    /// existing file (`file_name`; `file_mode` is 'r') or prepared for new
    /// file creation (`file_mode` is 'w'). The raster format is determined by
    /// the file extension of the `file_name` string.
    pub fn new<'a>(file_name: &'a str, file_mode: &'a str) -> Result<Raster, Error> {
        let fm: String = file_mode.to_lowercase();
        let mut r = Raster {
            file_name: file_name.to_string(),
            file_mode: fm.clone(),
            raster_type: get_raster_type_from_file(file_name.to_string()),
            ..Default::default()
        };
        if r.file_mode.contains("r") {
            match r.raster_type {
                RasterType::ArcAscii => {
                    read_arcascii(&r.file_name, &mut r.configs, &mut r.data)?;
                    r.update_min_max();
                    Ok(r)
                }
                RasterType::EsriFloat => {
                    read_esri_float(&r.file_name, &mut r.configs, &mut r.data)?;
                    r.update_min_max();
                    Ok(r)
                }
                RasterType::Unknown => Err(Error::new(
                    ErrorKind::InvalidInput,
                    format!("Unrecognized raster file type: {}", file_name),
                )),
            }
        } else {
            // write
            Ok(r)
        }
    }

    /// Creates a new in-memory `Raster` object with grid extent and location
    /// based on specified configurations contained within a `RasterConfigs`.
    pub fn initialize_using_config<'a>(file_name: &'a str, configs: &'a RasterConfigs) -> Raster {
        let new_file_name = if file_name.contains(".") {
            file_name.to_string()
        } else {
            // likely no extension provided; default to .asc
            format!("{}.asc", file_name)
        };
        let mut output = Raster {
            file_name: new_file_name.clone(),
            file_mode: "w".to_string(),
            raster_type: get_raster_type_from_file(new_file_name),
            ..Default::default()
        };
        output.configs = configs.clone();
        output.configs.metadata = vec![];
        output.data = vec![output.configs.nodata; output.configs.rows * output.configs.columns];
        output
    }

    /// Creates a new in-memory `Raster` object with grid extent and location
    /// based on an existing `Raster` contained within `file_name`.
    pub fn initialize_using_file<'a>(file_name: &'a str, input: &'a Raster) -> Raster {
        Raster::initialize_using_config(file_name, &input.configs)
    }

    /// Creates a new in-memory `Raster` from an `Array2D`, taking grid extent
    /// and location from the specified configurations.
    pub fn initialize_using_array2d<'a, T: AsPrimitive<f64> + Copy + AddAssign + SubAssign>(
        file_name: &'a str,
        configs: &'a RasterConfigs,
        data: Array2D<T>,
    ) -> Raster {
        let mut output = Raster::initialize_using_config(file_name, configs);
        output.data.clear();
        for row in 0..output.configs.rows as isize {
            for col in 0..output.configs.columns as isize {
                output.data.push(data.get_value(row, col).as_());
            }
        }
        output
    }

    /// Returns the file name of the `Raster`, without the directory and file
    /// extension.
    pub fn get_short_filename(&self) -> String {
        match Path::new(&self.file_name).file_stem() {
            Some(stem) => stem.to_string_lossy().to_string(),
            None => self.file_name.clone(),
        }
    }

    pub fn num_cells(&self) -> usize {
        self.configs.rows * self.configs.columns
    }

    /// Returns the value contained within a grid cell specified by `row` and
    /// `column`. Reads outside the grid return the nodata value.
    pub fn get_value(&self, row: isize, column: isize) -> f64 {
        if row >= 0
            && column >= 0
            && (row as usize) < self.configs.rows
            && (column as usize) < self.configs.columns
        {
            return self.data[row as usize * self.configs.columns + column as usize];
        }
        self.configs.nodata
    }

    pub fn set_value(&mut self, row: isize, column: isize, value: f64) {
        if row >= 0
            && column >= 0
            && (row as usize) < self.configs.rows
            && (column as usize) < self.configs.columns
        {
            self.data[row as usize * self.configs.columns + column as usize] = value;
        }
    }

    pub fn set_row_data(&mut self, row: isize, values: Vec<f64>) {
        if row < 0 || row as usize >= self.configs.rows {
            return;
        }
        for column in 0..values.len().min(self.configs.columns) {
            self.data[row as usize * self.configs.columns + column] = values[column];
        }
    }

    pub fn get_row_data(&self, row: isize) -> Vec<f64> {
        let mut values = vec![self.configs.nodata; self.configs.columns];
        if row >= 0 && (row as usize) < self.configs.rows {
            for column in 0..self.configs.columns {
                values[column] = self.data[row as usize * self.configs.columns + column];
            }
        }
        values
    }

    pub fn reinitialize_values(&mut self, value: f64) {
        self.data = vec![value; self.configs.rows * self.configs.columns];
    }

    /// Copies the grid into a 64-bit `Array2D`.
    pub fn get_data_as_array2d(&self) -> Array2D<f64> {
        let mut data: Array2D<f64> = Array2D::new(
            self.configs.rows as isize,
            self.configs.columns as isize,
            self.configs.nodata,
            self.configs.nodata,
        )
        .unwrap();
        for row in 0..self.configs.rows as isize {
            data.set_row_data(row, self.get_row_data(row));
        }
        data
    }

    /// Copies the grid into a 32-bit `Array2D`.
    pub fn get_data_as_f32_array2d(&self) -> Array2D<f32> {
        let out_nodata = self.configs.nodata as f32;
        let mut data: Array2D<f32> = Array2D::new(
            self.configs.rows as isize,
            self.configs.columns as isize,
            out_nodata,
            out_nodata,
        )
        .unwrap();
        for row in 0..self.configs.rows as isize {
            for col in 0..self.configs.columns as isize {
                data.set_value(row, col, self.get_value(row, col) as f32);
            }
        }
        data
    }

    /// Replaces every occurrence of the nodata value with a substitute. When
    /// the nodata value is NaN, NaN cells are replaced.
    pub fn substitute_nodata(&mut self, substitute: f64) {
        let nodata = self.configs.nodata;
        if nodata.is_nan() {
            for value in self.data.iter_mut() {
                if value.is_nan() {
                    *value = substitute;
                }
            }
        } else {
            for value in self.data.iter_mut() {
                if *value == nodata {
                    *value = substitute;
                }
            }
        }
        self.configs.nodata = substitute;
    }

    pub fn update_min_max(&mut self) {
        let mut minimum = f64::INFINITY;
        let mut maximum = f64::NEG_INFINITY;
        for value in &self.data {
            if *value != self.configs.nodata {
                if *value < minimum {
                    minimum = *value;
                }
                if *value > maximum {
                    maximum = *value;
                }
            }
        }
        self.configs.minimum = minimum;
        self.configs.maximum = maximum;
    }

    pub fn add_metadata_entry(&mut self, value: String) {
        self.configs.metadata.push(value);
    }

    /// Updates the output file name, re-deriving the raster format from the
    /// new extension.
    pub fn set_file_name(&mut self, file_name: &str) {
        self.file_name = file_name.to_string();
        self.raster_type = get_raster_type_from_file(self.file_name.clone());
    }

    /// Writes the in-memory raster to its file.
    pub fn write(&mut self) -> Result<(), Error> {
        match self.raster_type {
            RasterType::ArcAscii => write_arcascii(self)?,
            RasterType::EsriFloat => write_esri_float(self)?,
            RasterType::Unknown => {
                return Err(Error::new(
                    ErrorKind::InvalidInput,
                    format!("Unrecognized raster file type: {}", self.file_name),
                ));
            }
        }
        Ok(())
    }
}

pub fn get_raster_type_from_file(file_name: String) -> RasterType {
    let extension = match Path::new(&file_name).extension() {
        Some(ext) => ext.to_string_lossy().to_lowercase(),
        None => return RasterType::Unknown,
    };
    match extension.as_str() {
        "asc" | "txt" => RasterType::ArcAscii,
        "flt" => RasterType::EsriFloat,
        _ => RasterType::Unknown,
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RasterType {
    Unknown,
    ArcAscii,
    EsriFloat,
}

impl Default for RasterType {
    fn default() -> RasterType {
        RasterType::Unknown
    }
}

/// The grid metadata shared by all rasters of a pipeline: shape, world
/// location, nodata value, cell data type and coordinate reference system.
#[derive(Debug, Clone, PartialEq)]
pub struct RasterConfigs {
    pub title: String,
    pub rows: usize,
    pub columns: usize,
    pub nodata: f64,
    pub north: f64,
    pub south: f64,
    pub east: f64,
    pub west: f64,
    pub resolution_x: f64,
    pub resolution_y: f64,
    pub minimum: f64,
    pub maximum: f64,
    pub data_type: DataType,
    pub endian: Endianness,
    pub coordinate_ref_system_wkt: String,
    pub metadata: Vec<String>,
}

impl Default for RasterConfigs {
    fn default() -> RasterConfigs {
        RasterConfigs {
            title: String::from(""),
            rows: 0,
            columns: 0,
            nodata: -32768.0,
            north: f64::NEG_INFINITY,
            south: f64::INFINITY,
            east: f64::NEG_INFINITY,
            west: f64::INFINITY,
            resolution_x: f64::NEG_INFINITY,
            resolution_y: f64::NEG_INFINITY,
            minimum: f64::INFINITY,
            maximum: f64::NEG_INFINITY,
            data_type: DataType::Unknown,
            endian: Endianness::LittleEndian,
            coordinate_ref_system_wkt: "not specified".to_string(),
            metadata: vec![],
        }
    }
}

impl RasterConfigs {
    /// GDAL-style affine transformation parameters
    /// `(x0, dx, rxy, y0, ryx, dy)` taking fractional cell coordinates to
    /// world coordinates.
    pub fn transform(&self) -> [f64; 6] {
        [self.west, self.resolution_x, 0.0, self.north, 0.0, -self.resolution_y]
    }

    /// World coordinates of the centre of a cell.
    pub fn cell_to_world(&self, row: isize, column: isize) -> (f64, f64) {
        let t = self.transform();
        let col = column as f64 + 0.5;
        let rw = row as f64 + 0.5;
        (t[0] + col * t[1] + rw * t[2], t[3] + col * t[4] + rw * t[5])
    }

    /// Cells are treated as square when the two resolutions agree within 1%.
    pub fn cells_are_square(&self) -> bool {
        (self.resolution_x.abs() - self.resolution_y.abs()).abs()
            < 0.01 * self.resolution_x.abs()
    }

    pub fn cell_area(&self) -> f64 {
        self.resolution_x.abs() * self.resolution_y.abs()
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DataType {
    F64,
    F32,
    I32,
    I16,
    U8,
    Unknown,
}

impl Default for DataType {
    fn default() -> DataType {
        DataType::Unknown
    }
}

impl DataType {
    pub fn get_data_size(&self) -> usize {
        match *self {
            DataType::F64 => 8usize,
            DataType::F32 => 4usize,
            DataType::I32 => 4usize,
            DataType::I16 => 2usize,
            DataType::U8 => 1usize,
            DataType::Unknown => 0usize,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Endianness {
    LittleEndian,
    BigEndian,
}

impl Default for Endianness {
    fn default() -> Endianness {
        Endianness::LittleEndian
    }
}

#[cfg(test)]
mod test {
    use super::{Raster, RasterConfigs};

    fn configs() -> RasterConfigs {
        RasterConfigs {
            rows: 4,
            columns: 5,
            nodata: -999.0,
            west: 1000.0,
            north: 2000.0,
            south: 1996.0,
            east: 1005.0,
            resolution_x: 1.0,
            resolution_y: 1.0,
            ..Default::default()
        }
    }

    #[test]
    fn test_cell_to_world_centres() {
        let configs = configs();
        assert_eq!(configs.cell_to_world(0, 0), (1000.5, 1999.5));
        assert_eq!(configs.cell_to_world(3, 4), (1004.5, 1996.5));
    }

    #[test]
    fn test_cells_are_square_tolerance() {
        let mut configs = configs();
        assert!(configs.cells_are_square());
        configs.resolution_y = 1.005;
        assert!(configs.cells_are_square());
        configs.resolution_y = 1.5;
        assert!(!configs.cells_are_square());
    }

    #[test]
    fn test_nodata_substitution() {
        let mut raster = Raster::initialize_using_config("tmp.asc", &configs());
        raster.reinitialize_values(-999.0);
        raster.set_value(1, 1, 42.0);
        raster.substitute_nodata(-1.0);
        assert_eq!(raster.get_value(0, 0), -1.0);
        assert_eq!(raster.get_value(1, 1), 42.0);
        assert_eq!(raster.configs.nodata, -1.0);
    }
}
