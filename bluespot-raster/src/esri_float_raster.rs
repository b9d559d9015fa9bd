use super::*;
use byteorder::{BigEndian, LittleEndian, ReadBytesExt, WriteBytesExt};
use std::f64;
use std::fs::File;
use std::io::prelude::*;
use std::io::BufReader;
use std::io::BufWriter;
use std::io::Error;

// ESRI float grids come as a pair of files: a binary .flt holding 32-bit
// cell values and a small text .hdr next to it.

fn header_file_name(file_name: &str) -> String {
    if file_name.to_lowercase().ends_with(".flt") {
        let mut s = file_name[..file_name.len() - 4].to_string();
        s.push_str(".hdr");
        return s;
    }
    format!("{}.hdr", file_name)
}

pub fn read_esri_float(
    file_name: &String,
    configs: &mut RasterConfigs,
    data: &mut Vec<f64>,
) -> Result<(), Error> {
    let header = File::open(header_file_name(file_name))?;
    let header = BufReader::new(header);

    let mut xllcenter = f64::NEG_INFINITY;
    let mut yllcenter = f64::NEG_INFINITY;
    let mut xllcorner = f64::NEG_INFINITY;
    let mut yllcorner = f64::NEG_INFINITY;
    for line in header.lines() {
        let line_unwrapped = line?;
        let vec: Vec<&str> = line_unwrapped.split_whitespace().collect();
        if vec.len() < 2 {
            continue;
        }
        let key = vec[0].to_lowercase();
        let value = vec[vec.len() - 1].trim();
        match key.as_str() {
            "nrows" => configs.rows = parse_header_value(value, file_name)? as usize,
            "ncols" => configs.columns = parse_header_value(value, file_name)? as usize,
            "xllcorner" => xllcorner = parse_header_value(value, file_name)?,
            "yllcorner" => yllcorner = parse_header_value(value, file_name)?,
            "xllcenter" => xllcenter = parse_header_value(value, file_name)?,
            "yllcenter" => yllcenter = parse_header_value(value, file_name)?,
            "cellsize" => {
                configs.resolution_x = parse_header_value(value, file_name)?;
                configs.resolution_y = configs.resolution_x;
            }
            "nodata_value" => configs.nodata = parse_header_value(value, file_name)?,
            "byteorder" => {
                configs.endian = if value.to_lowercase().starts_with("msb") {
                    Endianness::BigEndian
                } else {
                    Endianness::LittleEndian
                };
            }
            _ => {}
        }
    }
    configs.data_type = DataType::F32;

    if xllcorner != f64::NEG_INFINITY {
        configs.west = xllcorner;
        configs.south = yllcorner;
    } else {
        configs.west = xllcenter - 0.5 * configs.resolution_x;
        configs.south = yllcenter - 0.5 * configs.resolution_y;
    }
    configs.east = configs.west + configs.columns as f64 * configs.resolution_x;
    configs.north = configs.south + configs.rows as f64 * configs.resolution_y;

    let num_cells = configs.rows * configs.columns;
    let mut reader = BufReader::new(File::open(file_name)?);
    data.reserve(num_cells);
    for _ in 0..num_cells {
        let value = match configs.endian {
            Endianness::LittleEndian => reader.read_f32::<LittleEndian>()?,
            Endianness::BigEndian => reader.read_f32::<BigEndian>()?,
        };
        data.push(value as f64);
    }
    Ok(())
}

fn parse_header_value(value: &str, file_name: &str) -> Result<f64, Error> {
    value.parse::<f64>().map_err(|_| {
        Error::new(
            ErrorKind::InvalidData,
            format!("Error parsing header value '{}' for {}.", value, file_name),
        )
    })
}

pub fn write_esri_float<'a>(r: &'a mut Raster) -> Result<(), Error> {
    let header = File::create(header_file_name(&r.file_name))?;
    let mut header = BufWriter::new(header);
    header.write_all(format!("NCOLS {}\n", r.configs.columns).as_bytes())?;
    header.write_all(format!("NROWS {}\n", r.configs.rows).as_bytes())?;
    header.write_all(format!("XLLCORNER {}\n", r.configs.west).as_bytes())?;
    header.write_all(format!("YLLCORNER {}\n", r.configs.south).as_bytes())?;
    header.write_all(format!("CELLSIZE {}\n", r.configs.resolution_x).as_bytes())?;
    header.write_all(format!("NODATA_VALUE {}\n", r.configs.nodata).as_bytes())?;
    let byteorder = match r.configs.endian {
        Endianness::LittleEndian => "LSBFIRST",
        Endianness::BigEndian => "MSBFIRST",
    };
    header.write_all(format!("BYTEORDER {}\n", byteorder).as_bytes())?;
    header.flush()?;

    let mut writer = BufWriter::new(File::create(&r.file_name)?);
    for row in 0..r.configs.rows as isize {
        for col in 0..r.configs.columns as isize {
            let value = r.get_value(row, col) as f32;
            match r.configs.endian {
                Endianness::LittleEndian => writer.write_f32::<LittleEndian>(value)?,
                Endianness::BigEndian => writer.write_f32::<BigEndian>(value)?,
            }
        }
    }
    writer.flush()?;
    Ok(())
}

#[cfg(test)]
mod test {
    use super::super::Raster;
    use super::{read_esri_float, write_esri_float};
    use std::fs;

    #[test]
    fn test_esri_float_round_trip() {
        let dir = std::env::temp_dir();
        let file_name = dir
            .join("bluespot_float_test.flt")
            .to_string_lossy()
            .to_string();

        let mut raster = Raster::new(&file_name, "w").unwrap();
        raster.configs.rows = 3;
        raster.configs.columns = 2;
        raster.configs.west = 10.0;
        raster.configs.south = 20.0;
        raster.configs.north = 23.0;
        raster.configs.east = 12.0;
        raster.configs.resolution_x = 1.0;
        raster.configs.resolution_y = 1.0;
        raster.configs.nodata = -9999.0;
        raster.reinitialize_values(0.0);
        raster.set_value(0, 1, 7.5);
        raster.set_value(2, 0, -1.25);
        write_esri_float(&mut raster).unwrap();

        let mut configs = Default::default();
        let mut data = vec![];
        read_esri_float(&file_name, &mut configs, &mut data).unwrap();
        assert_eq!(configs.rows, 3);
        assert_eq!(configs.columns, 2);
        assert_eq!(configs.nodata, -9999.0);
        assert_eq!(data[1], 7.5);
        assert_eq!(data[4], -1.25);

        let _ = fs::remove_file(&file_name);
        let _ = fs::remove_file(file_name.replace(".flt", ".hdr"));
    }
}
