/*
This code is part of the BluespotTools pluvial flood screening library.
Authors: Dr. Mette Kirkeby
Created: 02/06/2023
Last Modified: 22/05/2025
License: MIT
*/

use super::Raster;
use std::io::Error;

/// A raster input collaborator: something that can hand the pipeline a dense
/// grid together with its shape, affine transform and coordinate reference
/// system.
///
/// The core algorithms do not know the nodata concept, so a source may be
/// configured with a substitution value; `read` then returns the grid with
/// every nodata cell replaced. A value clearly below the lowest real
/// elevation (e.g. -999) works in most cases.
pub trait RasterSource {
    fn shape(&self) -> (usize, usize);
    fn transform(&self) -> [f64; 6];
    fn crs(&self) -> String;
    fn nodata(&self) -> Option<f64>;
    fn nodata_subst(&self) -> Option<f64>;
    /// Reads the grid, with nodata substituted when a substitute is set.
    fn read(&self) -> Result<Raster, Error>;
}

/// A raster output collaborator. The datatype written is whatever the raster
/// carries in its configurations.
pub trait RasterSink {
    fn write(&mut self, raster: &mut Raster) -> Result<(), Error>;
}

/// File-backed raster source. The file is read once up front; `read` hands
/// out copies so a source can feed several pipeline stages.
pub struct FileRasterSource {
    pub file_name: String,
    nodata_subst: Option<f64>,
    raster: Raster,
}

impl FileRasterSource {
    pub fn new(file_name: &str, nodata_subst: Option<f64>) -> Result<FileRasterSource, Error> {
        let raster = Raster::new(file_name, "r")?;
        Ok(FileRasterSource {
            file_name: file_name.to_string(),
            nodata_subst: nodata_subst,
            raster: raster,
        })
    }
}

impl RasterSource for FileRasterSource {
    fn shape(&self) -> (usize, usize) {
        (self.raster.configs.rows, self.raster.configs.columns)
    }

    fn transform(&self) -> [f64; 6] {
        self.raster.configs.transform()
    }

    fn crs(&self) -> String {
        self.raster.configs.coordinate_ref_system_wkt.clone()
    }

    fn nodata(&self) -> Option<f64> {
        Some(self.raster.configs.nodata)
    }

    fn nodata_subst(&self) -> Option<f64> {
        self.nodata_subst
    }

    fn read(&self) -> Result<Raster, Error> {
        let mut raster = self.raster.clone();
        if let Some(substitute) = self.nodata_subst {
            raster.substitute_nodata(substitute);
        }
        Ok(raster)
    }
}

/// In-memory raster source, useful for composing pipelines without touching
/// the file system.
pub struct MemoryRasterSource {
    raster: Raster,
    nodata_subst: Option<f64>,
}

impl MemoryRasterSource {
    pub fn new(raster: Raster, nodata_subst: Option<f64>) -> MemoryRasterSource {
        MemoryRasterSource {
            raster: raster,
            nodata_subst: nodata_subst,
        }
    }
}

impl RasterSource for MemoryRasterSource {
    fn shape(&self) -> (usize, usize) {
        (self.raster.configs.rows, self.raster.configs.columns)
    }

    fn transform(&self) -> [f64; 6] {
        self.raster.configs.transform()
    }

    fn crs(&self) -> String {
        self.raster.configs.coordinate_ref_system_wkt.clone()
    }

    fn nodata(&self) -> Option<f64> {
        Some(self.raster.configs.nodata)
    }

    fn nodata_subst(&self) -> Option<f64> {
        self.nodata_subst
    }

    fn read(&self) -> Result<Raster, Error> {
        let mut raster = self.raster.clone();
        if let Some(substitute) = self.nodata_subst {
            raster.substitute_nodata(substitute);
        }
        Ok(raster)
    }
}

/// File-backed raster sink; the output format follows the file extension.
pub struct FileRasterSink {
    pub file_name: String,
}

impl FileRasterSink {
    pub fn new(file_name: &str) -> FileRasterSink {
        FileRasterSink {
            file_name: file_name.to_string(),
        }
    }
}

impl RasterSink for FileRasterSink {
    fn write(&mut self, raster: &mut Raster) -> Result<(), Error> {
        raster.set_file_name(&self.file_name);
        raster.write()
    }
}

/// In-memory raster sink keeping the last written raster.
pub struct MemoryRasterSink {
    pub raster: Option<Raster>,
}

impl MemoryRasterSink {
    pub fn new() -> MemoryRasterSink {
        MemoryRasterSink { raster: None }
    }
}

impl RasterSink for MemoryRasterSink {
    fn write(&mut self, raster: &mut Raster) -> Result<(), Error> {
        self.raster = Some(raster.clone());
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::super::{Raster, RasterConfigs};
    use super::{MemoryRasterSink, MemoryRasterSource, RasterSink, RasterSource};

    #[test]
    fn test_memory_source_substitutes_nodata() {
        let configs = RasterConfigs {
            rows: 2,
            columns: 2,
            nodata: -9999.0,
            west: 0.0,
            south: 0.0,
            north: 2.0,
            east: 2.0,
            resolution_x: 1.0,
            resolution_y: 1.0,
            ..Default::default()
        };
        let mut raster = Raster::initialize_using_config("mem.asc", &configs);
        raster.set_value(0, 0, 5.0);

        let source = MemoryRasterSource::new(raster, Some(-999.0));
        let read = source.read().unwrap();
        assert_eq!(read.get_value(0, 0), 5.0);
        assert_eq!(read.get_value(1, 1), -999.0);
        assert_eq!(source.nodata(), Some(-9999.0));
        assert_eq!(source.shape(), (2, 2));

        let mut sink = MemoryRasterSink::new();
        let mut copy = source.read().unwrap();
        sink.write(&mut copy).unwrap();
        assert_eq!(sink.raster.as_ref().unwrap().get_value(0, 0), 5.0);
    }
}
