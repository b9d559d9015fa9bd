use super::*;
use std::f64;
use std::fs::File;
use std::io::prelude::*;
use std::io::BufReader;
use std::io::BufWriter;
use std::io::Error;

pub fn read_arcascii(
    file_name: &String,
    configs: &mut RasterConfigs,
    data: &mut Vec<f64>,
) -> Result<(), Error> {
    let f = File::open(file_name)?;
    let f = BufReader::new(f);

    let mut xllcenter = f64::NEG_INFINITY;
    let mut yllcenter = f64::NEG_INFINITY;
    let mut xllcorner = f64::NEG_INFINITY;
    let mut yllcorner = f64::NEG_INFINITY;
    for line in f.lines() {
        let line_unwrapped = line?;
        let vec: Vec<&str> = line_unwrapped.split_whitespace().collect();
        if vec.is_empty() {
            continue;
        }
        let key = vec[0].to_lowercase();
        let last = vec[vec.len() - 1].trim();
        if key.contains("nrows") {
            configs.rows = parse_value(last, file_name)? as usize;
            if configs.columns > 0 {
                data.reserve(configs.rows * configs.columns);
            }
        } else if key.contains("ncols") {
            configs.columns = parse_value(last, file_name)? as usize;
            if configs.rows > 0 {
                data.reserve(configs.rows * configs.columns);
            }
        } else if key.contains("xllcorner") {
            xllcorner = parse_value(last, file_name)?;
        } else if key.contains("yllcorner") {
            yllcorner = parse_value(last, file_name)?;
        } else if key.contains("xllcenter") {
            xllcenter = parse_value(last, file_name)?;
        } else if key.contains("yllcenter") {
            yllcenter = parse_value(last, file_name)?;
        } else if key.contains("cellsize") {
            configs.resolution_x = parse_value(last, file_name)?;
            configs.resolution_y = configs.resolution_x;
        } else if key.contains("nodata_value") {
            if last.contains(".") {
                configs.data_type = DataType::F32;
            } else {
                configs.data_type = DataType::I32;
            }
            configs.nodata = parse_value(last, file_name)?;
        } else {
            // it's a data line
            for val in vec {
                if !val.trim().is_empty() {
                    data.push(parse_value(val.trim(), file_name)?);
                }
            }
        }
    }

    if data.len() != configs.rows * configs.columns {
        return Err(Error::new(
            ErrorKind::InvalidData,
            format!(
                "Expected {} cell values in {} but found {}.",
                configs.rows * configs.columns,
                file_name,
                data.len()
            ),
        ));
    }

    // set the North, East, South, and West coordinates
    if xllcorner != f64::NEG_INFINITY {
        configs.west = xllcorner;
        configs.east = xllcorner + configs.columns as f64 * configs.resolution_x;
        configs.south = yllcorner;
        configs.north = yllcorner + configs.rows as f64 * configs.resolution_y;
    } else {
        configs.west = xllcenter - 0.5 * configs.resolution_x;
        configs.east = configs.west + configs.columns as f64 * configs.resolution_x;
        configs.south = yllcenter - 0.5 * configs.resolution_y;
        configs.north = configs.south + configs.rows as f64 * configs.resolution_y;
    }

    Ok(())
}

fn parse_value(value: &str, file_name: &str) -> Result<f64, Error> {
    value.parse::<f64>().map_err(|_| {
        Error::new(
            ErrorKind::InvalidData,
            format!("Error parsing value '{}' in {}.", value, file_name),
        )
    })
}

pub fn write_arcascii<'a>(r: &'a mut Raster) -> Result<(), Error> {
    let f = File::create(&r.file_name)?;
    let mut writer = BufWriter::new(f);

    writer.write_all(format!("NCOLS {}\n", r.configs.columns).as_bytes())?;
    writer.write_all(format!("NROWS {}\n", r.configs.rows).as_bytes())?;
    writer.write_all(format!("XLLCORNER {}\n", r.configs.west).as_bytes())?;
    writer.write_all(format!("YLLCORNER {}\n", r.configs.south).as_bytes())?;
    writer.write_all(format!("CELLSIZE {}\n", r.configs.resolution_x).as_bytes())?;
    writer.write_all(format!("NODATA_VALUE {}\n", r.configs.nodata).as_bytes())?;

    // Cell values are written with shortest round-trip formatting, so the
    // full f64 precision survives the text representation.
    let mut line = String::new();
    for row in 0..r.configs.rows as isize {
        line.clear();
        for col in 0..r.configs.columns as isize {
            if col > 0 {
                line.push(' ');
            }
            line.push_str(&format!("{}", r.get_value(row, col)));
        }
        line.push('\n');
        writer.write_all(line.as_bytes())?;
    }
    writer.flush()?;
    Ok(())
}

#[cfg(test)]
mod test {
    use super::super::Raster;
    use super::{read_arcascii, write_arcascii};
    use std::fs;

    #[test]
    fn test_arcascii_round_trip() {
        let dir = std::env::temp_dir();
        let file_name = dir
            .join("bluespot_arcascii_test.asc")
            .to_string_lossy()
            .to_string();

        let mut raster = Raster::new(&file_name, "w").unwrap();
        raster.configs.rows = 2;
        raster.configs.columns = 3;
        raster.configs.west = 100.0;
        raster.configs.south = 200.0;
        raster.configs.north = 202.0;
        raster.configs.east = 103.0;
        raster.configs.resolution_x = 1.0;
        raster.configs.resolution_y = 1.0;
        raster.configs.nodata = -999.0;
        raster.reinitialize_values(-999.0);
        raster.set_value(0, 0, 1.25);
        raster.set_value(1, 2, 0.1);
        write_arcascii(&mut raster).unwrap();

        let mut configs = Default::default();
        let mut data = vec![];
        read_arcascii(&file_name, &mut configs, &mut data).unwrap();
        assert_eq!(configs.rows, 2);
        assert_eq!(configs.columns, 3);
        assert_eq!(configs.west, 100.0);
        assert_eq!(configs.north, 202.0);
        assert_eq!(configs.nodata, -999.0);
        assert_eq!(data[0], 1.25);
        assert_eq!(data[5], 0.1);
        assert_eq!(data[1], -999.0);

        let _ = fs::remove_file(&file_name);
    }
}
